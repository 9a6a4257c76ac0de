/// Errors that can occur in socket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An endpoint string could not be parsed.
    #[error("invalid endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: &'static str },

    /// The endpoint host did not resolve to any address.
    #[error("could not resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
