use std::time::Duration;

/// Errors returned by the AT channel pool.
///
/// Conduit failures during a send are not errors at this level: they are
/// logged and surface as a `None` response.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No pooled channel became free within the acquisition bound.
    #[error("no AT channel available after {waited:?}")]
    PoolExhausted { waited: Duration },

    /// A release did not match the channel's current owner.
    #[error("release of {channel} by a caller that does not own it")]
    NotOwned { channel: String },

    /// The modem refused to open a channel.
    #[error("failed to open AT channel {channel}: {source}")]
    Open {
        channel: String,
        #[source]
        source: std::io::Error,
    },

    /// The pool configuration cannot work.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(&'static str),

    /// A radio control command was never acknowledged.
    #[error("radio {action} not acknowledged")]
    RadioNotAcknowledged { action: &'static str },
}

pub type Result<T> = std::result::Result<T, PoolError>;
