use std::io::{ErrorKind, Read};

use bytes::Bytes;
use m2mlink_transport::NetStream;
use tracing::trace;

use crate::codec::{total_length, Frame, FrameConfig, SizeClass, MAX_HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` stream.
///
/// Assembly is resumable: header bytes are pulled one at a time until the
/// size class and length are known, then the rest of the frame is read in
/// as few calls as the stream allows. If a read fails with a timeout the
/// partial frame is kept and the next `read_frame` call continues it.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
    header: [u8; MAX_HEADER_SIZE],
    offset: usize,
    class: Option<SizeClass>,
    frame: Option<Vec<u8>>,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            header: [0; MAX_HEADER_SIZE],
            offset: 0,
            class: None,
            frame: None,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Timeouts surface as `FrameError::Io` and leave the partial frame intact.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.take_complete() {
                return Ok(frame);
            }

            match &mut self.frame {
                None => {
                    let mut byte = [0u8; 1];
                    if read_some(&mut self.inner, &mut byte)? == 0 {
                        return Err(FrameError::ConnectionClosed);
                    }
                    self.header[self.offset] = byte[0];
                    self.offset += 1;

                    let layout = self.config.layout;
                    let class = *self
                        .class
                        .get_or_insert_with(|| layout.classify(byte[0]));
                    if let Some(total) = total_length(class, &self.header[..self.offset]) {
                        trace!(frame_type = self.header[0], ?class, total, "frame header");
                        let mut buf = vec![0u8; total];
                        buf[..self.offset].copy_from_slice(&self.header[..self.offset]);
                        self.frame = Some(buf);
                    }
                }
                Some(buf) => {
                    let read = read_some(&mut self.inner, &mut buf[self.offset..])?;
                    if read == 0 {
                        return Err(FrameError::ConnectionClosed);
                    }
                    self.offset += read;
                }
            }
        }
    }

    /// Drop any partially assembled frame.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.class = None;
        self.frame = None;
    }

    /// Bytes of the current partial frame consumed so far.
    pub fn pending_bytes(&self) -> usize {
        self.offset
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn take_complete(&mut self) -> Option<Frame> {
        let done = matches!(&self.frame, Some(buf) if buf.len() == self.offset);
        if !done {
            return None;
        }
        let class = self.class?;
        let wire = self.frame.take()?;
        self.reset();
        Some(Frame::from_wire(class, Bytes::from(wire)))
    }
}

impl FrameReader<NetStream> {
    /// Create a frame reader for `NetStream` and apply read timeout from config.
    pub fn with_config_net(inner: NetStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

fn read_some<R: Read>(inner: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match inner.read(buf) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

pub(crate) fn transport_to_frame_error(err: m2mlink_transport::TransportError) -> FrameError {
    match err {
        m2mlink_transport::TransportError::Io(io)
        | m2mlink_transport::TransportError::Connect { source: io, .. } => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_frame, FrameLayout};
    use crate::types::{ACK_REQUEST, DATA, DATA_LARGE};

    fn wire(frames: &[(u8, &[u8])]) -> Vec<u8> {
        let layout = FrameLayout::default();
        let mut buf = BytesMut::new();
        for (frame_type, payload) in frames {
            encode_frame(&layout, *frame_type, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[(DATA, b"hello")])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.frame_type(), DATA);
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(reader.pending_bytes(), 0);
    }

    #[test]
    fn read_frames_of_every_class() {
        let bytes = wire(&[(ACK_REQUEST, &[9]), (DATA, b"one"), (DATA_LARGE, b"two")]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.frame_type(), f1.payload()), (ACK_REQUEST, &[9u8][..]));
        assert_eq!((f2.frame_type(), f2.payload()), (DATA, &b"one"[..]));
        assert_eq!((f3.frame_type(), f3.payload()), (DATA_LARGE, &b"two"[..]));
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn zero_length_frame_completes_on_header() {
        let mut reader = FrameReader::new(Cursor::new(vec![DATA, 0x00]));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.wire().as_ref(), &[DATA, 0x00]);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn read_max_two_byte_frame() {
        let payload = vec![0xAB; 65535];
        let mut reader = FrameReader::new(Cursor::new(wire(&[(DATA_LARGE, &payload)])));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload().len(), 65535);
        assert_eq!(frame.wire_size(), 65538);
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[(DATA_LARGE, b"slow")]),
            pos: 0,
            calls: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload(), b"slow");
        assert_eq!(reader.get_ref().calls, 7);
    }

    #[test]
    fn header_is_read_one_byte_at_a_time_then_payload_in_bulk() {
        let recorder = RecordingReader {
            bytes: wire(&[(DATA_LARGE, b"payload")]),
            pos: 0,
            requested: Vec::new(),
        };
        let mut reader = FrameReader::new(recorder);
        reader.read_frame().unwrap();

        assert_eq!(reader.get_ref().requested, vec![1, 1, 1, 7]);
    }

    #[test]
    fn timeout_mid_frame_resumes() {
        let bytes = wire(&[(DATA, b"resume")]);
        let stalling = StallingReader {
            bytes,
            pos: 0,
            stall_at: 4,
            stalled: false,
        };
        let mut reader = FrameReader::new(stalling);

        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
        assert_eq!(reader.pending_bytes(), 4);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload(), b"resume");
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut bytes = wire(&[(DATA, b"abc")]);
        bytes.truncate(3);
        bytes.extend(wire(&[(DATA, b"xyz")]));

        let stalling = StallingReader {
            bytes,
            pos: 0,
            stall_at: 3,
            stalled: false,
        };
        let mut reader = FrameReader::new(stalling);
        assert!(reader.read_frame().is_err());
        assert_eq!(reader.pending_bytes(), 3);

        reader.reset();
        assert_eq!(reader.pending_bytes(), 0);
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload(), b"xyz");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = wire(&[(DATA, b"only-part-of-it")]);
        partial.truncate(6);

        let mut reader = FrameReader::new(Cursor::new(partial));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[(DATA, b"ok")])),
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.payload(), b"ok");
    }

    #[test]
    fn custom_layout_changes_classification() {
        let config = FrameConfig {
            layout: FrameLayout::new(0, 0).unwrap(),
            ..FrameConfig::default()
        };
        let mut reader =
            FrameReader::with_config(Cursor::new(vec![0x02, 0x00, 0x01, 0x7F]), config);
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.class(), SizeClass::TwoBytesSized);
        assert_eq!(frame.payload(), &[0x7F]);
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send(DATA, b"ping").unwrap();
        writer.send(ACK_REQUEST, &[1]).unwrap();

        assert_eq!(reader.read_frame().unwrap().payload(), b"ping");
        assert_eq!(reader.read_frame().unwrap().payload(), &[1]);
    }

    #[test]
    #[cfg(unix)]
    fn applies_read_timeout_for_net_stream() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };

        let mut reader = FrameReader::with_config_net(NetStream::from_unix(left), cfg).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Io(ref e)
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut
        ));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
        calls: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.calls += 1;
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct RecordingReader {
        bytes: Vec<u8>,
        pos: usize,
        requested: Vec<usize>,
    }

    impl Read for RecordingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.requested.push(buf.len());
            let n = buf.len().min(self.bytes.len() - self.pos);
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    /// Returns `WouldBlock` once when `stall_at` bytes have been delivered.
    struct StallingReader {
        bytes: Vec<u8>,
        pos: usize,
        stall_at: usize,
        stalled: bool,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos == self.stall_at && !self.stalled {
                self.stalled = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            let limit = if self.stalled {
                self.bytes.len()
            } else {
                self.stall_at
            };
            let n = buf.len().min(limit - self.pos);
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
