use std::time::Duration;

/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] m2mlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] m2mlink_frame::FrameError),

    /// A connection attempt came too soon after the previous one.
    #[error("connection attempt too soon, {remaining:?} left")]
    TooSoon { remaining: Duration },

    /// Every configured endpoint refused the connection or the ident frame.
    #[error("no endpoint accepted the connection ({attempted} tried)")]
    AllEndpointsFailed { attempted: usize },

    /// There is no live link.
    #[error("not connected")]
    NotConnected,

    /// The connection is shutting down.
    #[error("connection shut down")]
    Shutdown,

    /// `start` was called twice.
    #[error("connection already started")]
    AlreadyStarted,

    /// The configuration cannot work.
    #[error("invalid connection configuration: {0}")]
    InvalidConfig(&'static str),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, NetError>;
