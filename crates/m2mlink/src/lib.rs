//! AT command multiplexing and a framed GPRS session transport for M2M
//! modems.
//!
//! # Crate Structure
//!
//! - [`transport`]: endpoints and the TCP dialer
//! - [`frame`]: the type-byte selected frame codec with blocking reader/writer
//! - [`at`]: the AT channel pool, URC fan-out and serial conduits
//! - [`net`]: the reconnecting session with its outbound queue

/// Re-export transport types.
pub mod transport {
    pub use m2mlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use m2mlink_frame::*;
}

/// Re-export AT channel pool types.
pub mod at {
    pub use m2mlink_at::*;
}

/// Re-export session types.
pub mod net {
    pub use m2mlink_net::*;
}
