//! AT command channel pool.
//!
//! A cellular module exposes a few independent AT command interpreters.
//! [`ChannelPool`] shares a fixed number of them among any number of
//! threads, one owner per channel at a time, and keeps one more channel
//! aside for unsolicited result codes (URCs).
//!
//! ```no_run
//! use m2mlink_at::{ChannelPool, PoolConfig, SerialConfig, SerialModem};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let devices = "/dev/ttyACM0,/dev/ttyACM1,/dev/ttyACM2";
//! let modem = SerialModem::from_list(devices, SerialConfig::default())?;
//! let pool = ChannelPool::open(&modem, PoolConfig::default())?;
//!
//! pool.send_to_unsolicited("AT+CREG=1");
//! pool.add_listener(|urc: &str| println!("urc: {urc}"));
//!
//! if pool.send_until_acknowledged("AT+CGATT=1", 10)? {
//!     println!("{:?}", pool.send_once("AT+CSQ")?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod modem;
pub mod pool;
pub mod radio;
pub mod serial;
pub mod urc;

#[cfg(test)]
mod fake;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use error::{PoolError, Result};
pub use modem::{ChannelSlot, Conduit, Modem, ResponseListener, UrcSink};
pub use pool::{
    ChannelPool, PoolConfig, PooledChannel, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POOL_SIZE, DEFAULT_RETRY_STEP,
};
pub use radio::{RadioControl, CFUN_OFF, CFUN_ON};
pub use serial::{
    is_final_result, SerialConduit, SerialConfig, SerialModem, DEFAULT_RESPONSE_TIMEOUT,
};
pub use urc::{ListenerId, UrcListener};

// Every critical section leaves its state consistent, so a poisoned lock is
// still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
