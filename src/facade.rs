//! The byte-stream facade exposed to callers: `connect`/`send`/`recv`/
//! `close`/`dump_metrics`, wiring link facts, ARP resolution, and the TCP
//! engine together behind one handle.

use std::net::Ipv4Addr;
use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::config::StackConfig;
use crate::engine::{FlowIdentity, TcpEngine};
use crate::error::Result;
use crate::link::LinkFacts;
use crate::metrics::Metrics;
use crate::resolver::resolve_gateway_mac;
use crate::socket::RawLink;

/// Operations MUST be called in order `connect -> (send|recv)* -> close`;
/// any other order is undefined behavior, matching the underlying engine.
pub struct RawSocketStream<L: RawLink> {
    engine: TcpEngine<L>,
}

impl<L: RawLink> RawSocketStream<L> {
    /// Resolves the gateway MAC over `link` and runs the TCP handshake
    /// against `remote_ip:remote_port`.
    pub fn connect(
        mut link: L,
        facts: &impl LinkFacts,
        cfg: StackConfig,
        remote_ip: Ipv4Addr,
        remote_port: u16,
    ) -> Result<Self> {
        let local_ip = facts.local_ipv4(&cfg.interface)?;
        let local_mac = facts.local_mac(&cfg.interface)?;
        let gateway_ip = facts.gateway_ipv4(&cfg.interface)?;

        info!(interface = %cfg.interface, %local_ip, %gateway_ip, "link facts resolved");
        let gateway_mac = resolve_gateway_mac(&mut link, local_mac, local_ip, gateway_ip, cfg.tick)?;

        let local_port = rand::thread_rng().gen_range(cfg.src_port_range.0..=cfg.src_port_range.1);
        let flow = FlowIdentity {
            local_mac,
            gateway_mac,
            local_ip,
            remote_ip,
            local_port,
            remote_port,
        };

        let mut engine = TcpEngine::new(link, flow, cfg);
        info!(%remote_ip, remote_port, "connecting");
        engine.connect()?;
        Ok(Self { engine })
    }

    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.engine.send(data)
    }

    pub fn recv(&mut self, bufsize: usize) -> Result<Vec<u8>> {
        self.engine.recv(bufsize)
    }

    pub fn close(mut self) -> Result<()> {
        self.engine.close()
    }

    pub fn dump_metrics(&self) -> (String, Metrics) {
        self.engine.metrics.dump()
    }
}

/// Default `recv` buffer size, matching the facade's documented default.
pub const DEFAULT_RECV_BUFSIZE: usize = 8192;

/// A convenience timer for reporting elapsed time around one phase, in the
/// spirit of measuring handshake/transfer/teardown latency for logging.
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self { start: std::time::Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
