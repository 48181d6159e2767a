//! Typed configuration for the raw-socket stack, holding the tunables of
//! the original's `RawSocket.__init__` defaults.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Name of the link-layer interface to bind the raw socket to.
    pub interface: String,
    /// Cumulative retry budget before a blocking phase fails with `Timeout`.
    pub timeout: Duration,
    /// Per-wait timeout of the readiness primitive.
    pub tick: Duration,
    /// Advertised receive window.
    pub rcv_window: u16,
    /// Fixed outgoing chunk size.
    pub snd_window: usize,
    /// Inclusive range the random source port is drawn from.
    pub src_port_range: (u16, u16),
    /// Inclusive range the random initial sequence number is drawn from.
    pub initial_seq_range: (u32, u32),
}

impl StackConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self { interface: interface.into(), ..Self::default() }
    }

    /// Number of retries before the retry budget is exhausted:
    /// `timeout / tick`, truncated.
    pub fn max_retries(&self) -> u32 {
        (self.timeout.as_secs_f64() / self.tick.as_secs_f64()).floor() as u32
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            timeout: Duration::from_secs(180),
            tick: Duration::from_secs(2),
            rcv_window: 65535,
            snd_window: 64,
            src_port_range: (0x7530, 0xFFFF),
            initial_seq_range: (0x0001, 0xFFFF),
        }
    }
}
