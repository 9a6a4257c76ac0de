use std::io::ErrorKind;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use m2mlink_at::RadioControl;
use m2mlink_frame::{
    encode_frame, ident_frame, type_name, Frame, FrameError, FrameReader, FrameWriter,
};
use m2mlink_transport::{Dialer, Endpoint, NetStream};
use tracing::{debug, error, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{NetError, Result};
use crate::protocol::{PanicMessage, ProtocolLayer};
use crate::queue::OutboundQueue;
use crate::state::{ConnectionState, ConnectionStats, LinkStatus};

/// Name of the outbound delivery thread.
pub const SEND_THREAD_NAME: &str = "m2mlink-send";

/// Name of the inbound receive thread.
pub const RECV_THREAD_NAME: &str = "m2mlink-recv";

/// A persistent framed session to one of a list of servers.
///
/// Outbound frames are queued and delivered at least once by a send thread
/// that reconnects whenever a write fails. A receive thread keeps the link
/// up, assembles inbound frames, and hands them to the [`ProtocolLayer`] in
/// wire order. Connection attempts are rate-limited and, when a radio
/// control is attached, every few consecutive failures force the module to
/// re-attach to the packet network.
pub struct Connection {
    inner: Arc<Inner>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Build a connection. Nothing is dialed until [`Connection::start`] or
    /// [`Connection::connect`].
    pub fn new<D, P>(config: ConnectionConfig, dialer: D, protocol: P) -> Result<Self>
    where
        D: Dialer + 'static,
        P: ProtocolLayer + 'static,
    {
        if config.endpoints.is_empty() {
            return Err(NetError::InvalidConfig("at least one endpoint is required"));
        }
        let ident = ident_frame(&config.client_id)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                ident,
                dialer: Box::new(dialer),
                protocol: Box::new(protocol),
                radio: OnceLock::new(),
                queue: OutboundQueue::default(),
                link: Mutex::new(Link::default()),
                status: Mutex::new(LinkStatus::default()),
                connecting: Mutex::new(()),
                stopped: Mutex::new(false),
                stop_signal: Condvar::new(),
            }),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Attach the radio used for forced re-attach.
    pub fn with_radio_control(self, radio: Arc<dyn RadioControl>) -> Self {
        if self.inner.radio.set(radio).is_err() {
            warn!("radio control already attached");
        }
        self
    }

    /// Spawn the send and receive threads.
    pub fn start(&self) -> Result<()> {
        let mut threads = lock(&self.threads);
        if !threads.is_empty() {
            return Err(NetError::AlreadyStarted);
        }
        if self.inner.is_stopped() {
            return Err(NetError::Shutdown);
        }

        threads.push(spawn(SEND_THREAD_NAME, &self.inner, Inner::send_loop)?);
        threads.push(spawn(RECV_THREAD_NAME, &self.inner, Inner::receive_loop)?);
        debug!(client_id = %self.inner.config.client_id, "connection started");
        Ok(())
    }

    /// Stop both threads, close the socket, and wait for the threads to end.
    ///
    /// Queued frames that were not delivered are kept but never sent.
    pub fn shutdown(&self) {
        self.inner.stop();
        self.inner.queue.close();
        self.inner.close_link(None, "shutdown");

        let threads: Vec<_> = lock(&self.threads).drain(..).collect();
        for handle in threads {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "connection thread panicked");
            }
        }
        // Threads are gone; close a link left by a concurrent `connect` caller.
        self.inner.close_link(None, "shutdown");
    }

    /// Queue an already encoded frame.
    pub fn send_frame(&self, wire: impl Into<Bytes>) {
        let id = self.inner.queue.push_back(wire.into());
        trace!(id, pending = self.inner.queue.len(), "frame queued");
    }

    /// Queue an already encoded frame ahead of everything else.
    pub fn send_frame_first(&self, wire: impl Into<Bytes>) {
        let id = self.inner.queue.push_front(wire.into());
        trace!(id, pending = self.inner.queue.len(), "frame queued first");
    }

    /// Encode and queue a frame.
    pub fn send(&self, frame_type: u8, payload: &[u8]) -> Result<()> {
        let wire = self.encode(frame_type, payload)?;
        self.send_frame(wire);
        Ok(())
    }

    /// Encode and queue a frame ahead of everything else.
    pub fn send_first(&self, frame_type: u8, payload: &[u8]) -> Result<()> {
        let wire = self.encode(frame_type, payload)?;
        self.send_frame_first(wire);
        Ok(())
    }

    fn encode(&self, frame_type: u8, payload: &[u8]) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        encode_frame(&self.inner.config.frame.layout, frame_type, payload, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Establish the link now if it is down, subject to the reconnect policy.
    pub fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    /// Close the current link. The threads reconnect on their own.
    pub fn disconnect(&self) {
        self.inner.close_link(None, "disconnect requested");
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Last successful write (or connect).
    pub fn last_send_time(&self) -> Option<Instant> {
        self.inner.status().last_send
    }

    /// Last received frame (or connect).
    pub fn last_recv_time(&self) -> Option<Instant> {
        self.inner.status().last_recv
    }

    /// Last connection attempt, successful or not.
    pub fn last_attempt_time(&self) -> Option<Instant> {
        self.inner.status().last_attempt
    }

    /// Consecutive failed connection attempts.
    pub fn failed_attempts(&self) -> u32 {
        self.inner.status().failed_attempts
    }

    /// Frames queued but not yet written.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Record inbound activity seen outside the frame stream.
    pub fn update_last_recv_time(&self) {
        lock(&self.inner.status).last_recv = Some(Instant::now());
    }

    pub fn stats(&self) -> ConnectionStats {
        let status = self.inner.status();
        ConnectionStats {
            state: status.state,
            last_send: status.last_send,
            last_recv: status.last_recv,
            last_attempt: status.last_attempt,
            failed_attempts: status.failed_attempts,
            pending: self.pending(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("client_id", &self.inner.config.client_id)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

/// The current socket. `closer` is present exactly while a link is up; the
/// writer is lent to the send thread for the duration of each write.
#[derive(Default)]
struct Link {
    writer: Option<FrameWriter<NetStream>>,
    reader: Option<NetStream>,
    closer: Option<NetStream>,
    generation: u64,
}

struct Opened {
    endpoint: Endpoint,
    writer: FrameWriter<NetStream>,
    reader: NetStream,
    closer: NetStream,
}

struct Inner {
    config: ConnectionConfig,
    ident: Bytes,
    dialer: Box<dyn Dialer>,
    protocol: Box<dyn ProtocolLayer>,
    radio: OnceLock<Arc<dyn RadioControl>>,
    queue: OutboundQueue,
    link: Mutex<Link>,
    status: Mutex<LinkStatus>,
    connecting: Mutex<()>,
    stopped: Mutex<bool>,
    stop_signal: Condvar,
}

impl Inner {
    fn status(&self) -> LinkStatus {
        lock(&self.status).clone()
    }

    fn is_connected(&self) -> bool {
        lock(&self.status).state == ConnectionState::Connected
    }

    fn is_stopped(&self) -> bool {
        *lock(&self.stopped)
    }

    fn stop(&self) {
        *lock(&self.stopped) = true;
        self.stop_signal.notify_all();
    }

    /// Sleep for `duration` or until shutdown, whichever comes first.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut stopped = lock(&self.stopped);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            stopped = self
                .stop_signal
                .wait_timeout(stopped, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn connect(&self) -> Result<()> {
        let _attempt = lock(&self.connecting);
        if self.is_connected() {
            return Ok(());
        }
        if self.is_stopped() {
            return Err(NetError::Shutdown);
        }

        let policy = &self.config.policy;
        let (failed, last_attempt) = {
            let status = lock(&self.status);
            (status.failed_attempts, status.last_attempt)
        };

        if let Some(remaining) = last_attempt.and_then(|last| policy.remaining_wait(last.elapsed())) {
            trace!(?remaining, "connection attempt too soon");
            self.pause(policy.too_soon_pause);
            return Err(NetError::TooSoon { remaining });
        }

        lock(&self.status).state = ConnectionState::Connecting;
        if policy.reattach_due(failed) {
            self.reattach(failed);
        }

        match self.dial_any() {
            Ok(opened) => self.install(opened),
            Err(err) => {
                let failed = {
                    let mut status = lock(&self.status);
                    status.state = ConnectionState::Disconnected;
                    status.last_attempt = Some(Instant::now());
                    if !matches!(err, NetError::Shutdown) {
                        status.failed_attempts += 1;
                    }
                    status.failed_attempts
                };
                if !matches!(err, NetError::Shutdown) {
                    warn!(failed, error = %err, "connection attempt failed");
                }
                Err(err)
            }
        }
    }

    /// Publish a freshly opened link, unless shutdown began while dialing.
    ///
    /// The stop flag is checked under the link lock so `close_link` either
    /// sees this link or this call sees the flag.
    fn install(&self, opened: Opened) -> Result<()> {
        let Opened {
            endpoint,
            writer,
            reader,
            closer,
        } = opened;

        let mut link = lock(&self.link);
        if self.is_stopped() {
            drop(link);
            if let Err(err) = closer.shutdown() {
                trace!(error = %err, "socket shutdown");
            }
            let mut status = lock(&self.status);
            status.state = ConnectionState::Disconnected;
            status.last_attempt = Some(Instant::now());
            debug!(%endpoint, "dial finished after shutdown, link dropped");
            return Err(NetError::Shutdown);
        }

        link.generation += 1;
        link.writer = Some(writer);
        link.reader = Some(reader);
        link.closer = Some(closer);
        let generation = link.generation;

        let now = Instant::now();
        {
            let mut status = lock(&self.status);
            status.state = ConnectionState::Connected;
            status.failed_attempts = 0;
            status.last_attempt = Some(now);
            status.last_send = Some(now);
            status.last_recv = Some(now);
        }
        drop(link);

        info!(%endpoint, generation, client_id = %self.config.client_id, "connected");
        Ok(())
    }

    /// Radio off, pause, radio on, settle. The radio is always switched back
    /// on, even during shutdown.
    fn reattach(&self, failed: u32) {
        let Some(radio) = self.radio.get() else {
            debug!(failed, "re-attach due but no radio control attached");
            return;
        };
        let policy = &self.config.policy;

        info!(failed, "forcing GPRS re-attach");
        if let Err(err) = radio.set_radio_enabled(false) {
            warn!(error = %err, "could not switch radio off");
        }
        self.pause(policy.radio_off_pause);
        if let Err(err) = radio.set_radio_enabled(true) {
            warn!(error = %err, "could not switch radio on");
        }
        self.pause(policy.radio_on_pause);
        info!("GPRS re-attach done");
    }

    fn dial_any(&self) -> Result<Opened> {
        for endpoint in &self.config.endpoints {
            if self.is_stopped() {
                return Err(NetError::Shutdown);
            }
            match self.open(endpoint) {
                Ok(opened) => return Ok(opened),
                Err(err) => warn!(%endpoint, error = %err, "could not connect"),
            }
        }
        Err(NetError::AllEndpointsFailed {
            attempted: self.config.endpoints.len(),
        })
    }

    fn open(&self, endpoint: &Endpoint) -> Result<Opened> {
        let stream = self.dialer.dial(endpoint)?;
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        reader.set_read_timeout(self.config.frame.read_timeout)?;

        let mut writer = FrameWriter::with_config_net(stream, self.config.frame.clone())?;
        writer.write_wire(&self.ident)?;
        debug!(%endpoint, client_id = %self.config.client_id, "ident sent");
        Ok(Opened {
            endpoint: endpoint.clone(),
            writer,
            reader,
            closer,
        })
    }

    /// Tear down the link. With `Some(generation)`, only if that link is
    /// still the current one.
    ///
    /// Never waits for an in-flight write: shutting the socket down through
    /// the closer handle fails that write instead.
    fn close_link(&self, generation: Option<u64>, reason: &str) {
        let closer = {
            let mut link = lock(&self.link);
            if generation.is_some_and(|generation| generation != link.generation) {
                return;
            }
            let Some(closer) = link.closer.take() else {
                return;
            };
            link.reader = None;
            link.writer = None;
            lock(&self.status).state = ConnectionState::Disconnected;
            closer
        };

        if let Err(err) = closer.shutdown() {
            trace!(error = %err, "socket shutdown");
        }
        info!(reason, "disconnected");

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.protocol.on_disconnected())) {
            error!(panic = %PanicMessage(panic), "protocol layer panicked on disconnect");
        }
    }

    fn write(&self, wire: &[u8]) -> Result<()> {
        let (mut writer, generation) = {
            let mut link = lock(&self.link);
            match link.writer.take() {
                Some(writer) => (writer, link.generation),
                None => return Err(NetError::NotConnected),
            }
        };

        let result = writer.write_wire(wire);
        {
            let mut link = lock(&self.link);
            if link.generation == generation && link.closer.is_some() {
                link.writer = Some(writer);
            }
        }

        match result {
            Ok(()) => {
                lock(&self.status).last_send = Some(Instant::now());
                trace!(bytes = wire.len(), "frame sent");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "write failed");
                self.close_link(Some(generation), "write failed");
                Err(err.into())
            }
        }
    }

    fn send_loop(&self) {
        debug!("send loop started");
        while let Some(item) = self.queue.peek_wait() {
            match self.write(&item.wire) {
                Ok(()) => {
                    self.queue.complete(item.id);
                }
                Err(_) => match self.connect() {
                    Ok(()) | Err(NetError::TooSoon { .. }) => {}
                    Err(NetError::Shutdown) => break,
                    Err(err) => debug!(error = %err, "send loop could not reconnect"),
                },
            }
        }
        debug!("send loop stopped");
    }

    /// Keeps the link up and runs one receive pass per connection.
    fn receive_loop(&self) {
        debug!("receive loop started");
        while !self.is_stopped() {
            match self.connect() {
                Ok(()) => {}
                Err(NetError::Shutdown) => break,
                Err(_) => continue,
            }

            if let Some((stream, generation)) = self.take_reader() {
                self.receive(stream, generation);
            }
        }
        debug!("receive loop stopped");
    }

    fn take_reader(&self) -> Option<(NetStream, u64)> {
        let mut link = lock(&self.link);
        if link.closer.is_none() {
            return None;
        }
        let generation = link.generation;
        link.reader.take().map(|reader| (reader, generation))
    }

    fn receive(&self, stream: NetStream, generation: u64) {
        let mut reader = FrameReader::with_config(stream, self.config.frame.clone());
        loop {
            if self.is_stopped() {
                return;
            }
            match reader.read_frame() {
                Ok(frame) => {
                    lock(&self.status).last_recv = Some(Instant::now());
                    self.dispatch(&frame);
                }
                Err(FrameError::Io(err))
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue
                }
                Err(err) => {
                    if !self.is_stopped() {
                        info!(generation, error = %err, "receive failed");
                    }
                    self.close_link(Some(generation), "receive failed");
                    return;
                }
            }
        }
    }

    fn dispatch(&self, frame: &Frame) {
        let frame_type = frame.frame_type();
        trace!(
            frame_type,
            name = type_name(frame_type),
            len = frame.payload().len(),
            "frame received"
        );
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.protocol.on_frame(frame))) {
            error!(frame_type, panic = %PanicMessage(panic), "protocol layer panicked; frame dropped");
        }
    }
}

fn spawn(name: &'static str, inner: &Arc<Inner>, body: fn(&Inner)) -> Result<JoinHandle<()>> {
    let inner = Arc::clone(inner);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(&inner))
        .map_err(|source| NetError::Spawn { name, source })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
