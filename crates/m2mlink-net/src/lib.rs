//! Persistent framed session over an unreliable bearer.
//!
//! [`Connection`] owns the socket to the server. It sends the ident frame on
//! every connect, delivers queued frames at least once, reconnects on any
//! I/O failure with rate-limited attempts, and pushes inbound frames to a
//! [`ProtocolLayer`]. With a [`m2mlink_at::RadioControl`] attached it also
//! power-cycles the radio after repeated failures to force a GPRS re-attach.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
mod queue;
pub mod state;

pub use config::{
    ConnectionConfig, ReconnectPolicy, DEFAULT_MIN_ATTEMPT_INTERVAL, DEFAULT_RADIO_OFF_PAUSE,
    DEFAULT_RADIO_ON_PAUSE, DEFAULT_READ_TIMEOUT, DEFAULT_REATTACH_EVERY, DEFAULT_TOO_SOON_PAUSE,
    DEFAULT_WRITE_TIMEOUT,
};
pub use connection::{Connection, RECV_THREAD_NAME, SEND_THREAD_NAME};
pub use error::{NetError, Result};
pub use protocol::ProtocolLayer;
pub use state::{ConnectionState, ConnectionStats};
