//! CLI front-end: resolves a hostname, performs one HTTP/1.1 GET over the
//! raw-socket stack, and writes the response body to stdout.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, Level};

use rawget::config::StackConfig;
use rawget::facade::{RawSocketStream, Timer, DEFAULT_RECV_BUFSIZE};
use rawget::link::SystemLinkFacts;
use rawget::socket::PacketSocket;

#[derive(Parser, Debug)]
#[command(name = "rawget", about = "Fetch a URL over a hand-rolled raw-socket TCP/IPv4 stack")]
struct Cli {
    /// Host to connect to, e.g. example.com
    host: String,

    /// TCP port to connect to.
    #[arg(short, long, default_value_t = 80)]
    port: u16,

    /// HTTP request path.
    #[arg(long, default_value = "/")]
    path: String,

    /// Link-layer interface to bind the raw socket to.
    #[arg(short, long)]
    interface: String,

    /// Number of bytes requested per `recv` call.
    #[arg(long, default_value_t = DEFAULT_RECV_BUFSIZE)]
    bufsize: usize,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn level_for_verbosity(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn resolve_ipv4(host: &str, port: u16) -> Result<Ipv4Addr> {
    let addrs = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("DNS resolution failed for {host}"))?;
    for addr in addrs {
        if let SocketAddr::V4(v4) = addr {
            return Ok(*v4.ip());
        }
    }
    bail!("no IPv4 address found for {host}")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(level_for_verbosity(cli.verbose))
        .with_target(false)
        .init();

    let remote_ip = resolve_ipv4(&cli.host, cli.port)?;
    info!(host = %cli.host, %remote_ip, port = cli.port, "resolved destination");

    let cfg = StackConfig::new(cli.interface.clone());
    let link = PacketSocket::bind(&cli.interface)
        .with_context(|| format!("failed to bind raw socket on {}", cli.interface))?;
    let facts = SystemLinkFacts;

    let timer = Timer::start();
    let mut stream = RawSocketStream::connect(link, &facts, cfg, remote_ip, cli.port)
        .context("connect failed")?;
    info!(elapsed = ?timer.elapsed(), "handshake complete");

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        cli.path, cli.host
    );
    stream.send(request.as_bytes()).context("send failed")?;

    let body = stream.recv(cli.bufsize).context("recv failed")?;
    let (metrics_text, _snapshot) = stream.dump_metrics();
    info!("{metrics_text}");

    stream.close().context("close failed")?;
    info!(elapsed = ?timer.elapsed(), "transaction complete");

    std::io::stdout().write_all(&body)?;
    Ok(())
}
