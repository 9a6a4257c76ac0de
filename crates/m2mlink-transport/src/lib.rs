//! Blocking socket transport for m2mlink sessions.
//!
//! This is the lowest layer of m2mlink. It resolves `host:port` endpoints,
//! dials them over TCP (the GPRS bearer on the module), and hands back a
//! [`NetStream`] that the connection layer splits into a reader and a writer.

pub mod endpoint;
pub mod error;
pub mod tcp;
pub mod traits;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use tcp::TcpDialer;
pub use traits::{Dialer, NetStream};
