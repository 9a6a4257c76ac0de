use std::fmt;
use std::io;

use m2mlink_at::PoolError;
use m2mlink_frame::FrameError;
use m2mlink_net::NetError;
use m2mlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Resolve { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidEndpoint { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::SpecializedPayload { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::InvalidLayout { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn pool_error(context: &str, err: PoolError) -> CliError {
    match err {
        PoolError::Open { source, channel } => {
            io_error(&format!("{context} ({channel})"), source)
        }
        PoolError::PoolExhausted { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PoolError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        PoolError::RadioNotAcknowledged { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        PoolError::NotOwned { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn net_error(context: &str, err: NetError) -> CliError {
    match err {
        NetError::Transport(err) => transport_error(context, err),
        NetError::Frame(err) => frame_error(context, err),
        NetError::Spawn { source, .. } => io_error(context, source),
        NetError::AllEndpointsFailed { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        NetError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        NetError::TooSoon { .. } | NetError::NotConnected | NetError::Shutdown => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        NetError::AlreadyStarted => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
