use std::collections::{HashMap, VecDeque};
use std::ptr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use crate::error::{PoolError, Result};
use crate::lock;
use crate::modem::{ChannelSlot, Conduit, Modem, ResponseListener, UrcSink};
use crate::urc::{ListenerId, UrcListener, UrcListeners};

/// Default number of general-purpose channels.
pub const DEFAULT_POOL_SIZE: usize = 2;

/// Default bound on waiting for a free channel.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of attempts for `send_until_acknowledged`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default backoff unit between unacknowledged attempts.
pub const DEFAULT_RETRY_STEP: Duration = Duration::from_secs(1);

/// Channel pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of general-purpose channels.
    pub pool_size: usize,
    /// Bound on `acquire` for the `send_*` helpers.
    pub acquire_timeout: Duration,
    /// Substring that marks a successful response.
    pub ack_marker: String,
    /// Attempt `i` that fails waits `i * retry_step` before the next one.
    pub retry_step: Duration,
    /// Attempts used by radio control.
    pub max_attempts: u32,
    /// Bound on waiting for a long response. `None` waits for the conduit.
    pub long_response_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            ack_marker: "OK".to_string(),
            retry_step: DEFAULT_RETRY_STEP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            long_response_timeout: None,
        }
    }
}

struct Channel {
    slot: ChannelSlot,
    conduit: Mutex<Box<dyn Conduit>>,
}

impl Channel {
    fn send_raw(&self, cmd: &str) -> Option<String> {
        debug!(channel = %self.slot, cmd = cmd.trim_end(), "<--");
        match lock(&self.conduit).send(cmd) {
            Ok(response) => {
                debug!(channel = %self.slot, response = response.trim_end(), "-->");
                Some(response)
            }
            Err(err) => {
                warn!(channel = %self.slot, cmd = cmd.trim_end(), error = %err, "AT command failed");
                None
            }
        }
    }

    fn send_long_raw(&self, cmd: &str, timeout: Option<Duration>) -> Option<String> {
        let (tx, rx) = mpsc::sync_channel(1);
        let listener: ResponseListener = Box::new(move |response: Option<String>| {
            let _ = tx.send(response);
        });

        debug!(channel = %self.slot, cmd = cmd.trim_end(), "<--- (long)");
        if let Err(err) = lock(&self.conduit).send_with_listener(cmd, listener) {
            warn!(channel = %self.slot, cmd = cmd.trim_end(), error = %err, "long AT command failed");
            return None;
        }

        let response = match timeout {
            None => rx.recv().unwrap_or_else(|_| {
                warn!(channel = %self.slot, "long response listener dropped");
                None
            }),
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(response) => response,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(channel = %self.slot, ?timeout, "long response timed out");
                    None
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(channel = %self.slot, "long response listener dropped");
                    None
                }
            },
        };

        let response = response.filter(|text| !text.is_empty());
        debug!(channel = %self.slot, response = ?response, "---> (long)");
        response
    }
}

struct Waiter {
    ticket: u64,
    wake: Arc<Condvar>,
}

#[derive(Default)]
struct PoolState {
    owners: Vec<Option<u64>>,
    waiters: VecDeque<Waiter>,
    granted: HashMap<u64, usize>,
    next_ticket: u64,
}

/// A fixed set of exclusive AT channels plus one unsolicited channel.
///
/// Callers borrow a pooled channel for a sequence of commands with
/// [`ChannelPool::acquire`] or use the one-shot `send_*` helpers. Waiters are
/// served in arrival order: a released channel is handed straight to the
/// oldest waiter.
pub struct ChannelPool {
    channels: Vec<Channel>,
    unsolicited: Channel,
    state: Mutex<PoolState>,
    listeners: Arc<UrcListeners>,
    config: PoolConfig,
}

impl ChannelPool {
    /// Open every channel on `modem`.
    pub fn open<M: Modem>(modem: M, config: PoolConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(PoolError::InvalidConfig("pool_size must be at least 1"));
        }

        let listeners = Arc::new(UrcListeners::default());
        let sink_target = Arc::clone(&listeners);
        let sink: UrcSink = Arc::new(move |line: &str| sink_target.dispatch(line));

        let open = |slot: ChannelSlot, urc: Option<UrcSink>| {
            modem
                .open_channel(slot, urc)
                .map(|conduit| Channel {
                    slot,
                    conduit: Mutex::new(conduit),
                })
                .map_err(|source| PoolError::Open {
                    channel: slot.to_string(),
                    source,
                })
        };

        let channels = (0..config.pool_size)
            .map(|index| open(ChannelSlot::Pooled(index), None))
            .collect::<Result<Vec<_>>>()?;
        let unsolicited = open(ChannelSlot::Unsolicited, Some(sink))?;

        debug!(pool_size = config.pool_size, "AT channel pool opened");

        Ok(Self {
            state: Mutex::new(PoolState {
                owners: vec![None; channels.len()],
                ..PoolState::default()
            }),
            channels,
            unsolicited,
            listeners,
            config,
        })
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of general-purpose channels.
    pub fn pool_size(&self) -> usize {
        self.channels.len()
    }

    /// Channels currently free.
    pub fn available(&self) -> usize {
        lock(&self.state)
            .owners
            .iter()
            .filter(|owner| owner.is_none())
            .count()
    }

    /// Callers currently blocked in `acquire`.
    pub fn waiting(&self) -> usize {
        lock(&self.state).waiters.len()
    }

    /// Take exclusive ownership of a pooled channel.
    ///
    /// Blocks up to `timeout`. The channel returns to the pool when the guard
    /// is dropped or passed to [`ChannelPool::release`].
    pub fn acquire(&self, timeout: Duration) -> Result<PooledChannel<'_>> {
        let started = Instant::now();
        let deadline = started + timeout;

        let mut state = lock(&self.state);
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        if state.waiters.is_empty() {
            if let Some(index) = state.owners.iter().position(Option::is_none) {
                state.owners[index] = Some(ticket);
                trace!(channel = %self.channels[index].slot, ticket, "acquired");
                return Ok(PooledChannel::new(self, index, ticket));
            }
        }

        let wake = Arc::new(Condvar::new());
        state.waiters.push_back(Waiter {
            ticket,
            wake: Arc::clone(&wake),
        });

        loop {
            if let Some(index) = state.granted.remove(&ticket) {
                trace!(channel = %self.channels[index].slot, ticket, waited = ?started.elapsed(), "acquired after wait");
                return Ok(PooledChannel::new(self, index, ticket));
            }

            let now = Instant::now();
            if now >= deadline {
                state.waiters.retain(|waiter| waiter.ticket != ticket);
                let waited = started.elapsed();
                debug!(ticket, ?waited, "no AT channel available");
                return Err(PoolError::PoolExhausted { waited });
            }

            state = wake
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Return a channel to the pool.
    pub fn release(&self, channel: PooledChannel<'_>) -> Result<()> {
        if !ptr::eq(channel.pool, self) {
            error!(channel = %channel.slot(), "release into a pool that does not own the channel");
            return Err(PoolError::NotOwned {
                channel: channel.slot().to_string(),
            });
        }
        channel.release()
    }

    fn release_slot(&self, index: usize, ticket: u64) -> Result<()> {
        let slot = ChannelSlot::Pooled(index);
        let mut state = lock(&self.state);

        if state.owners.get(index).copied().flatten() != Some(ticket) {
            drop(state);
            error!(channel = %slot, ticket, "release by a caller that does not own the channel");
            return Err(PoolError::NotOwned {
                channel: slot.to_string(),
            });
        }

        match state.waiters.pop_front() {
            Some(waiter) => {
                state.owners[index] = Some(waiter.ticket);
                state.granted.insert(waiter.ticket, index);
                waiter.wake.notify_one();
                trace!(channel = %slot, from = ticket, to = waiter.ticket, "handed off");
            }
            None => {
                state.owners[index] = None;
                trace!(channel = %slot, ticket, "released");
            }
        }
        Ok(())
    }

    /// Send `cmd` followed by `\r` on a pooled channel.
    ///
    /// Returns `Ok(None)` when the conduit fails; only acquisition fails.
    pub fn send_once(&self, cmd: &str) -> Result<Option<String>> {
        self.send_raw(&format!("{cmd}\r"))
    }

    /// Send `cmd` exactly as given on a pooled channel.
    pub fn send_raw(&self, cmd: &str) -> Result<Option<String>> {
        let channel = self.acquire(self.config.acquire_timeout)?;
        Ok(channel.send_raw(cmd))
    }

    /// Send `cmd` until the response contains the acknowledgment marker.
    ///
    /// A failed attempt `i` (zero-based) waits `i * retry_step` before the
    /// next one, so the first retry is immediate.
    pub fn send_until_acknowledged(&self, cmd: &str, max_attempts: u32) -> Result<bool> {
        for attempt in 0..max_attempts {
            if let Some(response) = self.send_once(cmd)? {
                if response.contains(self.config.ack_marker.as_str()) {
                    return Ok(true);
                }
            }

            if attempt + 1 < max_attempts {
                let pause = self.config.retry_step * attempt;
                debug!(cmd, attempt, ?pause, "not acknowledged, retrying");
                if !pause.is_zero() {
                    thread::sleep(pause);
                }
            }
        }

        warn!(cmd, max_attempts, "AT command never acknowledged");
        Ok(false)
    }

    /// Send `cmd` + `\r` and wait for a response delivered asynchronously.
    pub fn send_long(&self, cmd: &str) -> Result<Option<String>> {
        self.send_long_raw(&format!("{cmd}\r"))
    }

    /// Raw variant of [`ChannelPool::send_long`].
    pub fn send_long_raw(&self, cmd: &str) -> Result<Option<String>> {
        let channel = self.acquire(self.config.acquire_timeout)?;
        Ok(channel.send_long_raw(cmd))
    }

    /// Send `cmd` + `\r` on the unsolicited channel.
    ///
    /// Used to enable URCs, which the modem reports on the channel that
    /// configured them.
    pub fn send_to_unsolicited(&self, cmd: &str) -> Option<String> {
        self.unsolicited.send_raw(&format!("{cmd}\r"))
    }

    /// Raw variant of [`ChannelPool::send_to_unsolicited`].
    pub fn send_to_unsolicited_raw(&self, cmd: &str) -> Option<String> {
        self.unsolicited.send_raw(cmd)
    }

    /// Send `cmd` + `\r` to the unsolicited channel and every pooled channel.
    ///
    /// For settings each AT parser keeps on its own, such as echo mode.
    /// Returns the response of the last pooled channel.
    pub fn send_all(&self, cmd: &str) -> Result<Option<String>> {
        let cmd = format!("{cmd}\r");
        self.unsolicited.send_raw(&cmd);

        let mut held = Vec::with_capacity(self.channels.len());
        for _ in 0..self.channels.len() {
            held.push(self.acquire(self.config.acquire_timeout)?);
        }
        held.sort_by_key(|channel| channel.index);

        let mut last = None;
        for channel in &held {
            last = channel.send_raw(&cmd);
        }
        Ok(last)
    }

    /// Register an observer for unsolicited result codes.
    pub fn add_listener<L>(&self, listener: L) -> ListenerId
    where
        L: UrcListener + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    /// Remove a previously registered observer. Returns whether it existed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// Exclusive ownership of one pooled channel.
pub struct PooledChannel<'a> {
    pool: &'a ChannelPool,
    index: usize,
    ticket: u64,
    released: bool,
}

impl<'a> PooledChannel<'a> {
    fn new(pool: &'a ChannelPool, index: usize, ticket: u64) -> Self {
        Self {
            pool,
            index,
            ticket,
            released: false,
        }
    }

    /// The slot this guard owns.
    pub fn slot(&self) -> ChannelSlot {
        ChannelSlot::Pooled(self.index)
    }

    /// Send `cmd` + `\r`; `None` if the conduit failed.
    pub fn send(&self, cmd: &str) -> Option<String> {
        self.send_raw(&format!("{cmd}\r"))
    }

    /// Send `cmd` as given; `None` if the conduit failed.
    pub fn send_raw(&self, cmd: &str) -> Option<String> {
        self.pool.channels[self.index].send_raw(cmd)
    }

    /// Send `cmd` + `\r` and wait for its asynchronous response.
    pub fn send_long(&self, cmd: &str) -> Option<String> {
        self.send_long_raw(&format!("{cmd}\r"))
    }

    /// Raw variant of [`PooledChannel::send_long`].
    pub fn send_long_raw(&self, cmd: &str) -> Option<String> {
        self.pool.channels[self.index]
            .send_long_raw(cmd, self.pool.config.long_response_timeout)
    }

    /// Return the channel to the pool now.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.pool.release_slot(self.index, self.ticket)
    }
}

impl Drop for PooledChannel<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.pool.release_slot(self.index, self.ticket);
        }
    }
}

impl std::fmt::Debug for PooledChannel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledChannel")
            .field("slot", &self.slot())
            .field("ticket", &self.ticket)
            .finish()
    }
}
