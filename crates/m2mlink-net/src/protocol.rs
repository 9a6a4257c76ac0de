use std::any::Any;
use std::fmt;
use std::sync::Arc;

use m2mlink_frame::Frame;

/// Consumer of inbound frames.
///
/// Called from the connection's receive thread, one frame at a time in wire
/// order. A panic in `on_frame` is caught and logged; the stream continues
/// with the next frame.
pub trait ProtocolLayer: Send + Sync {
    fn on_frame(&self, frame: &Frame);

    /// The link went down (socket error, EOF, or explicit disconnect).
    fn on_disconnected(&self) {}
}

impl<P: ProtocolLayer + ?Sized> ProtocolLayer for Arc<P> {
    fn on_frame(&self, frame: &Frame) {
        (**self).on_frame(frame)
    }

    fn on_disconnected(&self) {
        (**self).on_disconnected()
    }
}

/// Displays a panic payload caught around a protocol callback.
pub(crate) struct PanicMessage(pub(crate) Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            f.write_str("non-string panic payload")
        }
    }
}
