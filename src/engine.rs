//! The TCP connection engine: the client-side state machine, send/receive
//! paths, ingress filtering, and the single-frame retransmission policy.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::ethernet::{EthernetFrame, ETHERTYPE_IPV4};
use crate::flags::TcpFlags;
use crate::ipv4::Ipv4Datagram;
use crate::metrics::Metrics;
use crate::socket::RawLink;
use crate::tcp::TcpSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    SynSent,
    Established,
    FinWait1,
    FinWait2,
}

/// Identity of one flow: local/remote endpoints plus the MAC pair needed to
/// address Ethernet frames.
#[derive(Debug, Clone)]
pub struct FlowIdentity {
    pub local_mac: [u8; 6],
    pub gateway_mac: [u8; 6],
    pub local_ip: Ipv4Addr,
    pub remote_ip: Ipv4Addr,
    pub local_port: u16,
    pub remote_port: u16,
}

/// The client-side TCP control block, advanced only by this engine.
pub struct TcpEngine<L: RawLink> {
    link: L,
    flow: FlowIdentity,
    cfg: StackConfig,
    pub state: State,
    snd_next: u32,
    rcv_next: u32,
    last_sent_frame: Vec<u8>,
    reorder_map: HashMap<u32, (Vec<u8>, bool)>,
    in_order_buf: Vec<Vec<u8>>,
    pub metrics: Metrics,
}

impl<L: RawLink> TcpEngine<L> {
    pub fn new(link: L, flow: FlowIdentity, cfg: StackConfig) -> Self {
        let snd_next = rand::thread_rng().gen_range(cfg.initial_seq_range.0..=cfg.initial_seq_range.1);
        Self {
            link,
            flow,
            cfg,
            state: State::Closed,
            snd_next,
            rcv_next: 0,
            last_sent_frame: Vec::new(),
            reorder_map: HashMap::new(),
            in_order_buf: Vec::new(),
            metrics: Metrics::new(),
        }
    }

    fn emit(&mut self, flags: TcpFlags, ack: u32, payload: Vec<u8>) -> Result<()> {
        let mut segment = TcpSegment::new(
            self.flow.local_port,
            self.flow.remote_port,
            self.snd_next,
            ack,
            flags,
            self.cfg.rcv_window,
            payload,
        );
        let tcp_bytes = segment.pack(self.flow.local_ip, self.flow.remote_ip);
        let datagram = Ipv4Datagram::new(self.flow.local_ip, self.flow.remote_ip, tcp_bytes);
        let ip_bytes = datagram.pack();
        let frame = EthernetFrame::new(self.flow.gateway_mac, self.flow.local_mac, ETHERTYPE_IPV4, ip_bytes);
        let framed = frame.pack();

        trace!(%segment, "emitting segment");
        self.link.send_frame(&framed)?;
        self.last_sent_frame = framed;
        self.metrics.send += 1;
        Ok(())
    }

    fn retransmit(&mut self) -> Result<()> {
        warn!("retransmitting last frame");
        self.link.send_frame(&self.last_sent_frame)?;
        self.metrics.retry += 1;
        Ok(())
    }

    /// Waits up to `tick` for one validated segment addressed to this flow,
    /// retransmitting and recursing on timeout or checksum failure until
    /// the retry budget is exhausted.
    fn receive_one(&mut self, retries_left: u32) -> Result<Option<TcpSegment>> {
        self.metrics.recv += 1;
        let frame = match self.link.recv_frame(self.cfg.tick, 1500)? {
            Some(frame) => frame,
            None => {
                if retries_left == 0 {
                    return Ok(None);
                }
                self.retransmit()?;
                return self.receive_one(retries_left - 1);
            }
        };

        let Some(eth) = EthernetFrame::unpack(&frame) else {
            return self.receive_one(retries_left);
        };
        if eth.ethertype != ETHERTYPE_IPV4 {
            return self.receive_one(retries_left);
        }
        let Some(ip) = Ipv4Datagram::unpack(&eth.payload) else {
            return self.receive_one(retries_left);
        };
        if ip.version != 4 {
            return self.receive_one(retries_left);
        }
        if ip.src != self.flow.remote_ip {
            return self.receive_one(retries_left);
        }
        if ip.protocol != crate::ipv4::PROTO_TCP {
            return self.receive_one(retries_left);
        }
        if !ip.verify_checksum() {
            if retries_left == 0 {
                return Ok(None);
            }
            self.retransmit()?;
            return self.receive_one(retries_left - 1);
        }

        let Some(segment) = TcpSegment::unpack(&ip.payload, ip.src, ip.dst) else {
            return self.receive_one(retries_left);
        };
        if segment.src_port != self.flow.remote_port || segment.dst_port != self.flow.local_port {
            return self.receive_one(retries_left);
        }
        if segment.flags.contains(TcpFlags::RST) {
            return Err(StackError::ConnectionReset);
        }
        if !segment.verify_checksum() {
            self.metrics.cksumfail += 1;
            if retries_left == 0 {
                return Ok(None);
            }
            self.retransmit()?;
            return self.receive_one(retries_left - 1);
        }

        debug!(%segment, "accepted segment");
        self.metrics.erecv += 1;
        Ok(Some(segment))
    }

    /// Performs the three-way handshake, leaving the engine in
    /// `Established` on success.
    pub fn connect(&mut self) -> Result<()> {
        self.state = State::SynSent;
        self.emit(TcpFlags::SYN, 0, Vec::new())?;

        let segment = self
            .receive_one(self.cfg.max_retries())?
            .ok_or(StackError::Timeout)?;
        if !(segment.flags.contains(TcpFlags::SYN) && segment.flags.contains(TcpFlags::ACK)) {
            return Err(StackError::Protocol(format!(
                "expected SYN|ACK during handshake, got {}",
                segment.flags
            )));
        }

        self.snd_next = segment.ack;
        self.rcv_next = segment.seq.wrapping_add(1);
        self.emit(TcpFlags::ACK, self.rcv_next, Vec::new())?;
        self.state = State::Established;
        Ok(())
    }

    /// Splits `data` into `snd_window`-sized chunks and emits each as an
    /// ACK segment. Returns the number of bytes handed to the socket.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.cfg.snd_window).min(data.len());
            let chunk = data[offset..end].to_vec();
            let chunk_len = chunk.len();
            self.emit(TcpFlags::ACK, self.rcv_next, chunk)?;
            self.snd_next = self.snd_next.wrapping_add(chunk_len as u32);
            offset = end;
        }
        Ok(data.len())
    }

    /// Applies one freshly-accepted in-order segment: appends its payload,
    /// advances `rcv_next`, drains the reorder map, and returns whether the
    /// segment itself or any segment drained from the reorder map carried
    /// FIN.
    fn absorb_in_order(&mut self, segment: TcpSegment) -> bool {
        let mut fin_seen = segment.flags.contains(TcpFlags::FIN);
        let payload_len = segment.payload.len() as u32;
        self.in_order_buf.push(segment.payload);
        self.rcv_next = self.rcv_next.wrapping_add(payload_len);
        self.snd_next = segment.ack;

        loop {
            let Some((payload, fin)) = self.reorder_map.remove(&self.rcv_next) else {
                break;
            };
            let len = payload.len() as u32;
            self.in_order_buf.push(payload);
            self.rcv_next = self.rcv_next.wrapping_add(len);
            if fin {
                fin_seen = true;
            }
        }
        fin_seen
    }

    /// Runs the receive path for a requested byte count, returning the
    /// accumulated payload (which may be shorter than `bufsize` if FIN
    /// arrived first).
    pub fn recv(&mut self, bufsize: usize) -> Result<Vec<u8>> {
        let rounds = bufsize.div_ceil(self.cfg.rcv_window as usize) + 1;
        let mut out = Vec::new();

        for _ in 0..rounds {
            let mut accumulated = 0usize;
            let mut done = false;

            while accumulated < self.cfg.rcv_window as usize && !done {
                let segment = self
                    .receive_one(self.cfg.max_retries())?
                    .ok_or(StackError::Timeout)?;
                if !segment.flags.contains(TcpFlags::ACK) {
                    continue;
                }
                if segment.seq == self.rcv_next {
                    accumulated += segment.payload.len();
                    if self.absorb_in_order(segment) {
                        done = true;
                    }
                    self.emit(TcpFlags::ACK, self.rcv_next, Vec::new())?;
                } else if segment.seq > self.rcv_next && !self.reorder_map.contains_key(&segment.seq) {
                    let fin = segment.flags.contains(TcpFlags::FIN);
                    self.reorder_map.insert(segment.seq, (segment.payload, fin));
                } else {
                    // Duplicate or stale segment: drop silently.
                }
            }

            for chunk in self.in_order_buf.drain(..) {
                out.extend_from_slice(&chunk);
            }
            self.reorder_map.clear();

            if done {
                return Ok(out);
            }
        }
        Ok(out)
    }

    /// Emits FIN|ACK, expects peer ACK then FIN, and acknowledges the FIN.
    pub fn close(&mut self) -> Result<()> {
        self.state = State::FinWait1;
        self.emit(TcpFlags::FIN | TcpFlags::ACK, self.rcv_next, Vec::new())?;

        let peer_ack = self
            .receive_one(self.cfg.max_retries())?
            .ok_or(StackError::Timeout)?;
        if !peer_ack.flags.contains(TcpFlags::ACK) {
            return Err(StackError::Protocol(format!(
                "expected ACK during teardown, got {}",
                peer_ack.flags
            )));
        }
        self.state = State::FinWait2;

        let peer_fin = self
            .receive_one(self.cfg.max_retries())?
            .ok_or(StackError::Timeout)?;
        if !peer_fin.flags.contains(TcpFlags::FIN) {
            return Err(StackError::Protocol(format!(
                "expected FIN during teardown, got {}",
                peer_fin.flags
            )));
        }
        self.snd_next = peer_fin.ack;
        self.rcv_next = peer_fin.seq.wrapping_add(1);

        self.emit(TcpFlags::ACK, self.rcv_next, Vec::new())?;
        self.state = State::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::test_support::SyntheticLink;
    use std::time::Duration;

    fn flow() -> FlowIdentity {
        FlowIdentity {
            local_mac: [0x02, 0, 0, 0, 0, 1],
            gateway_mac: [0x02, 0, 0, 0, 0, 2],
            local_ip: Ipv4Addr::new(192, 168, 1, 10),
            remote_ip: Ipv4Addr::new(93, 184, 216, 34),
            local_port: 40000,
            remote_port: 80,
        }
    }

    fn test_cfg() -> StackConfig {
        let mut cfg = StackConfig::new("eth0");
        cfg.tick = Duration::from_millis(1);
        cfg.timeout = Duration::from_millis(5);
        cfg
    }

    /// Builds an Ethernet-framed TCP segment from the peer to this flow.
    fn peer_frame(flow: &FlowIdentity, flags: TcpFlags, seq: u32, ack: u32, payload: Vec<u8>) -> Vec<u8> {
        let mut seg = TcpSegment::new(flow.remote_port, flow.local_port, seq, ack, flags, 65535, payload);
        let tcp_bytes = seg.pack(flow.remote_ip, flow.local_ip);
        let dgram = Ipv4Datagram::new(flow.remote_ip, flow.local_ip, tcp_bytes);
        let eth = EthernetFrame::new(flow.local_mac, flow.gateway_mac, ETHERTYPE_IPV4, dgram.pack());
        eth.pack()
    }

    #[test]
    fn handshake_reaches_established_with_expected_sequence_numbers() {
        let flow = flow();
        let mut link = SyntheticLink::default();
        let mut engine = TcpEngine::new(SyntheticLink::default(), flow.clone(), test_cfg());
        let initial_seq = engine.snd_next;

        link.inbox.push_back(peer_frame(&flow, TcpFlags::SYN | TcpFlags::ACK, 5000, initial_seq + 1, vec![]));
        engine.link = link;

        engine.connect().unwrap();
        assert_eq!(engine.state, State::Established);
        assert_eq!(engine.snd_next, initial_seq + 1);
        assert_eq!(engine.rcv_next, 5001);
    }

    #[test]
    fn reorder_buffer_delivers_in_sequence_order_and_stops_on_fin() {
        // Seq deltas (100 apart) must match payload lengths: rcv_next only
        // advances by a segment's payload length, so a 100-byte seq gap
        // needs a 100-byte payload to ever become contiguous.
        let flow = flow();
        let mut engine = TcpEngine::new(SyntheticLink::default(), flow.clone(), test_cfg());
        engine.state = State::Established;
        engine.rcv_next = 100;
        engine.snd_next = 1;

        let chunk = |b: u8| vec![b; 100];

        let mut link = SyntheticLink::default();
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK, 300, 1, chunk(b'C')));
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK, 100, 1, chunk(b'A')));
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK, 200, 1, chunk(b'B')));
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK | TcpFlags::FIN, 400, 1, chunk(b'D')));
        engine.link = link;

        let out = engine.recv(400).unwrap();
        let expected: Vec<u8> =
            chunk(b'A').into_iter().chain(chunk(b'B')).chain(chunk(b'C')).chain(chunk(b'D')).collect();
        assert_eq!(out, expected);
        assert_eq!(engine.rcv_next, 500);
    }

    #[test]
    fn rcv_next_never_decreases_across_stale_duplicate_and_in_order_segments() {
        let flow = flow();
        let mut engine = TcpEngine::new(SyntheticLink::default(), flow.clone(), test_cfg());
        engine.state = State::Established;
        engine.rcv_next = 100;
        engine.snd_next = 1;

        let chunk = |b: u8| vec![b; 50];

        let mut link = SyntheticLink::default();
        // In-order: advances rcv_next from 100 to 150.
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK, 100, 1, chunk(b'A')));
        // Stale retransmit of the segment just absorbed (seq < rcv_next): must be
        // dropped, not re-absorbed, and must not move rcv_next backwards.
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK, 100, 1, chunk(b'A')));
        // In-order: advances rcv_next from 150 to 200.
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK, 150, 1, chunk(b'B')));
        // In-order, carries FIN: advances rcv_next from 200 to 250.
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK | TcpFlags::FIN, 200, 1, chunk(b'C')));
        engine.link = link;

        let mut observed = vec![engine.rcv_next];
        for _ in 0..4 {
            let Some(segment) = engine.receive_one(engine.cfg.max_retries()).unwrap() else {
                break;
            };
            if segment.seq == engine.rcv_next {
                engine.absorb_in_order(segment);
            }
            // else: stale/duplicate/out-of-order, dropped exactly as recv() does.
            observed.push(engine.rcv_next);
        }

        for pair in observed.windows(2) {
            assert!(pair[1] >= pair[0], "rcv_next decreased: {:?}", observed);
        }
        assert_eq!(engine.rcv_next, 250);
    }

    #[test]
    fn bad_ip_checksum_triggers_retransmission_then_accepts_retry() {
        let flow = flow();
        let mut engine = TcpEngine::new(SyntheticLink::default(), flow.clone(), test_cfg());
        engine.state = State::Established;
        engine.rcv_next = 100;
        engine.snd_next = 1;
        engine.last_sent_frame = vec![0xAA; 10];

        let mut corrupted = peer_frame(&flow, TcpFlags::ACK, 100, 1, b"A".to_vec());
        let ip_start = 14;
        corrupted[ip_start + 10] ^= 0x01;

        let good = peer_frame(&flow, TcpFlags::ACK | TcpFlags::FIN, 100, 1, b"A".to_vec());

        let mut link = SyntheticLink::default();
        link.inbox.push_back(corrupted);
        link.inbox.push_back(good);
        engine.link = link;

        let out = engine.recv(1).unwrap();
        assert_eq!(out, b"A".to_vec());
        assert_eq!(engine.metrics.retry, 1);
    }

    #[test]
    fn rst_aborts_with_connection_reset() {
        let flow = flow();
        let mut engine = TcpEngine::new(SyntheticLink::default(), flow.clone(), test_cfg());
        engine.state = State::Established;
        engine.rcv_next = 100;
        engine.snd_next = 1;

        let mut link = SyntheticLink::default();
        link.inbox.push_back(peer_frame(&flow, TcpFlags::RST, 100, 1, vec![]));
        engine.link = link;

        let err = engine.recv(1).unwrap_err();
        assert!(matches!(err, StackError::ConnectionReset));
    }

    #[test]
    fn teardown_closes_after_ack_then_fin() {
        let flow = flow();
        let mut engine = TcpEngine::new(SyntheticLink::default(), flow.clone(), test_cfg());
        engine.state = State::Established;
        engine.rcv_next = 500;
        engine.snd_next = 200;

        let mut link = SyntheticLink::default();
        link.inbox.push_back(peer_frame(&flow, TcpFlags::ACK, 500, 201, vec![]));
        link.inbox.push_back(peer_frame(&flow, TcpFlags::FIN | TcpFlags::ACK, 500, 201, vec![]));
        engine.link = link;

        engine.close().unwrap();
        assert_eq!(engine.state, State::Closed);
        assert_eq!(engine.rcv_next, 501);
        assert!(engine.metrics.send > 0);
        assert!(engine.metrics.erecv > 0);
    }

    #[test]
    fn retry_budget_is_exhausted_exactly_at_max_retries() {
        let flow = flow();
        let cfg = test_cfg();
        let expected_retries = cfg.max_retries();
        let mut engine = TcpEngine::new(SyntheticLink::default(), flow, cfg);
        engine.state = State::SynSent;
        // Empty inbox: every recv_frame call times out immediately.
        let err = engine.connect().unwrap_err();
        assert!(matches!(err, StackError::Timeout));
        assert_eq!(engine.metrics.retry, expected_retries as u64);
    }
}
