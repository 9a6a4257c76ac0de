use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use m2mlink_transport::NetStream;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write an already encoded frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_wire(frame.wire())
    }

    /// Encode and send a payload with the given frame type.
    ///
    /// The size class comes from the writer's [`crate::FrameLayout`].
    pub fn send(&mut self, frame_type: u8, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(&self.config.layout, frame_type, payload, &mut self.buf)?;

        let wire = self.buf.split().freeze();
        self.write_wire(&wire)
    }

    /// Write raw wire bytes in full, then flush.
    ///
    /// Queued outbound messages are stored pre-encoded and go through here.
    pub fn write_wire(&mut self, wire: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < wire.len() {
            match self.inner.write(&wire[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<NetStream> {
    /// Create a frame writer for `NetStream` and apply write timeout from config.
    pub fn with_config_net(inner: NetStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
