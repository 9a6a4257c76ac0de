//! Interfaces to the modem's AT command ports.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Identity of an AT channel within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelSlot {
    /// General-purpose channel handed out for exclusive use (zero-based).
    Pooled(usize),
    /// The dedicated channel that receives unsolicited result codes.
    Unsolicited,
}

impl ChannelSlot {
    /// Whether this slot is the unsolicited channel.
    pub fn is_unsolicited(self) -> bool {
        matches!(self, ChannelSlot::Unsolicited)
    }
}

impl fmt::Display for ChannelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSlot::Pooled(index) => write!(f, "AT{}", index + 1),
            ChannelSlot::Unsolicited => f.write_str("ATURC"),
        }
    }
}

/// Completion callback for a command whose response arrives later.
///
/// Called exactly once: with the response text, or `None` if the conduit
/// gave up on the command.
pub type ResponseListener = Box<dyn FnOnce(Option<String>) + Send>;

/// Receives every unsolicited line read on the unsolicited channel.
pub type UrcSink = Arc<dyn Fn(&str) + Send + Sync>;

/// One AT command port.
pub trait Conduit: Send {
    /// Send a command and block until its full response is available.
    fn send(&mut self, cmd: &str) -> io::Result<String>;

    /// Send a command and return immediately; `listener` gets the response.
    ///
    /// If this returns `Err`, the listener has been dropped uncalled.
    fn send_with_listener(&mut self, cmd: &str, listener: ResponseListener) -> io::Result<()>;
}

/// Opens AT command ports on a modem.
pub trait Modem {
    /// Open the conduit backing `slot`.
    ///
    /// `urc` is `Some` only for [`ChannelSlot::Unsolicited`].
    fn open_channel(&self, slot: ChannelSlot, urc: Option<UrcSink>) -> io::Result<Box<dyn Conduit>>;
}

impl<M: Modem + ?Sized> Modem for &M {
    fn open_channel(&self, slot: ChannelSlot, urc: Option<UrcSink>) -> io::Result<Box<dyn Conduit>> {
        (**self).open_channel(slot, urc)
    }
}
