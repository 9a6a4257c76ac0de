use std::time::Duration;

use m2mlink_frame::FrameConfig;
use m2mlink_transport::Endpoint;

/// Default minimum spacing between connection attempts.
pub const DEFAULT_MIN_ATTEMPT_INTERVAL: Duration = Duration::from_secs(10);

/// Default pause when an attempt is rejected as too soon.
pub const DEFAULT_TOO_SOON_PAUSE: Duration = Duration::from_secs(1);

/// Default number of consecutive failures between radio re-attaches.
pub const DEFAULT_REATTACH_EVERY: u32 = 3;

/// Default time the radio stays off during a re-attach.
pub const DEFAULT_RADIO_OFF_PAUSE: Duration = Duration::from_secs(5);

/// Default settle time after the radio comes back on.
pub const DEFAULT_RADIO_ON_PAUSE: Duration = Duration::from_secs(15);

/// Default receive poll interval; bounds how long shutdown waits on a read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on a single socket write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pacing of connection attempts and forced radio re-attach.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts closer together than this are rejected.
    pub min_attempt_interval: Duration,
    /// How long a rejected attempt blocks the caller.
    pub too_soon_pause: Duration,
    /// Re-attach before the next attempt after this many consecutive
    /// failures (and every multiple of it). `0` disables re-attach.
    pub reattach_every: u32,
    /// Radio off time during a re-attach.
    pub radio_off_pause: Duration,
    /// Settle time after switching the radio back on.
    pub radio_on_pause: Duration,
}

impl ReconnectPolicy {
    /// Whether a re-attach is due before the next attempt.
    pub fn reattach_due(&self, failed_attempts: u32) -> bool {
        self.reattach_every > 0 && failed_attempts > 0 && failed_attempts % self.reattach_every == 0
    }

    /// Time left before another attempt is allowed.
    pub fn remaining_wait(&self, since_last_attempt: Duration) -> Option<Duration> {
        self.min_attempt_interval
            .checked_sub(since_last_attempt)
            .filter(|remaining| !remaining.is_zero())
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_attempt_interval: DEFAULT_MIN_ATTEMPT_INTERVAL,
            too_soon_pause: DEFAULT_TOO_SOON_PAUSE,
            reattach_every: DEFAULT_REATTACH_EVERY,
            radio_off_pause: DEFAULT_RADIO_OFF_PAUSE,
            radio_on_pause: DEFAULT_RADIO_ON_PAUSE,
        }
    }
}

/// Everything a [`crate::Connection`] needs to reach its server.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Servers, tried in order on every attempt.
    pub endpoints: Vec<Endpoint>,
    /// Identifier sent in the ident frame.
    pub client_id: String,
    /// Frame layout and socket timeouts.
    pub frame: FrameConfig,
    /// Attempt pacing.
    pub policy: ReconnectPolicy,
}

impl ConnectionConfig {
    pub fn new(endpoints: Vec<Endpoint>, client_id: impl Into<String>) -> Self {
        Self {
            endpoints,
            client_id: client_id.into(),
            frame: FrameConfig {
                read_timeout: Some(DEFAULT_READ_TIMEOUT),
                write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
                ..FrameConfig::default()
            },
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reattach_every_third_failure() {
        let policy = ReconnectPolicy::default();
        let due: Vec<u32> = (0..10).filter(|n| policy.reattach_due(*n)).collect();
        assert_eq!(due, vec![3, 6, 9]);
    }

    #[test]
    fn reattach_can_be_disabled() {
        let policy = ReconnectPolicy {
            reattach_every: 0,
            ..ReconnectPolicy::default()
        };
        assert!((0..10).all(|n| !policy.reattach_due(n)));
    }

    #[test]
    fn remaining_wait() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.remaining_wait(Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );
        assert_eq!(policy.remaining_wait(Duration::from_secs(10)), None);
        assert_eq!(policy.remaining_wait(Duration::from_secs(60)), None);
    }

    #[test]
    fn default_config_polls_reads() {
        let config = ConnectionConfig::new(vec![Endpoint::new("127.0.0.1", 3010)], "dev1");
        assert_eq!(config.frame.read_timeout, Some(DEFAULT_READ_TIMEOUT));
        assert_eq!(config.policy.reattach_every, 3);
    }
}
