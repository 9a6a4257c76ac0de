use std::sync::Arc;

use tracing::info;

use crate::error::{PoolError, Result};
use crate::pool::ChannelPool;

/// Switches the cellular radio on and off.
///
/// Turning the radio off and on again forces the module to re-register and
/// re-attach to the packet network.
pub trait RadioControl: Send + Sync {
    fn set_radio_enabled(&self, enabled: bool) -> Result<()>;
}

impl<R: RadioControl + ?Sized> RadioControl for Arc<R> {
    fn set_radio_enabled(&self, enabled: bool) -> Result<()> {
        (**self).set_radio_enabled(enabled)
    }
}

/// Full functionality.
pub const CFUN_ON: &str = "AT+CFUN=1";

/// Airplane mode: RF off, SIM and AT interface still available.
pub const CFUN_OFF: &str = "AT+CFUN=4";

impl RadioControl for ChannelPool {
    fn set_radio_enabled(&self, enabled: bool) -> Result<()> {
        let (cmd, action) = if enabled {
            (CFUN_ON, "on")
        } else {
            (CFUN_OFF, "off")
        };

        if self.send_until_acknowledged(cmd, self.config().max_attempts)? {
            info!(action, "radio switched");
            Ok(())
        } else {
            Err(PoolError::RadioNotAcknowledged { action })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fake::FakeModem;
    use crate::modem::ChannelSlot;
    use crate::pool::PoolConfig;

    #[test]
    fn radio_commands() {
        let modem = FakeModem::ok();
        let pool = ChannelPool::open(modem.clone(), PoolConfig::default()).unwrap();

        pool.set_radio_enabled(false).unwrap();
        pool.set_radio_enabled(true).unwrap();

        assert_eq!(
            modem.commands(),
            vec![
                (ChannelSlot::Pooled(0), "AT+CFUN=4\r".to_string()),
                (ChannelSlot::Pooled(0), "AT+CFUN=1\r".to_string()),
            ]
        );
    }

    #[test]
    fn unacknowledged_radio_command_is_an_error() {
        let modem = FakeModem::new(|_, _| Ok("+CME ERROR: 3".to_string()));
        let config = PoolConfig {
            max_attempts: 2,
            retry_step: Duration::from_millis(1),
            ..PoolConfig::default()
        };
        let pool = Arc::new(ChannelPool::open(modem.clone(), config).unwrap());
        let radio: Arc<dyn RadioControl> = pool;

        let err = radio.set_radio_enabled(true).unwrap_err();
        assert!(matches!(err, PoolError::RadioNotAcknowledged { action: "on" }));
        assert_eq!(modem.commands().len(), 2);
    }
}
