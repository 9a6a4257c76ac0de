use std::fmt;
use std::time::Instant;

/// Link state of a [`crate::Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State plus activity bookkeeping, guarded by one mutex.
#[derive(Debug, Clone)]
pub(crate) struct LinkStatus {
    pub(crate) state: ConnectionState,
    pub(crate) last_send: Option<Instant>,
    pub(crate) last_recv: Option<Instant>,
    pub(crate) last_attempt: Option<Instant>,
    pub(crate) failed_attempts: u32,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_send: None,
            last_recv: None,
            last_attempt: None,
            failed_attempts: 0,
        }
    }
}

/// Point-in-time copy of a connection's bookkeeping.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub last_send: Option<Instant>,
    pub last_recv: Option<Instant>,
    pub last_attempt: Option<Instant>,
    pub failed_attempts: u32,
    pub pending: usize,
}
