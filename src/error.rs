//! Error taxonomy for the raw-socket stack.
//!
//! `ChecksumError` is deliberately absent: checksum failures are never
//! surfaced to the caller, they are recovered locally by retransmission
//! and only counted in [`crate::metrics::Metrics`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    /// Interface missing, no IPv4/MAC, or no default gateway found.
    #[error("configuration error: {0}")]
    Config(String),

    /// Raw-socket I/O failure, or ARP resolution failure.
    #[error("link error: {0}")]
    Link(String),

    /// Retry budget exhausted on a blocking phase (handshake, receive, teardown).
    #[error("operation timed out after exhausting the retry budget")]
    Timeout,

    /// Peer response violated the expected flag combination.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// RST observed on an accepted segment.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// Underlying socket I/O error, e.g. from `send`/`recv`/`bind`.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StackError>;
