//! In-memory modem for unit tests.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::modem::{ChannelSlot, Conduit, Modem, ResponseListener, UrcSink};

/// Response text that makes a long send drop its listener uncalled.
pub(crate) const DROP_LISTENER: &str = "<drop>";

/// Response text that makes a long send hold its listener for a while.
pub(crate) const HOLD_LISTENER: &str = "<hold>";

type Responder = Arc<dyn Fn(ChannelSlot, &str) -> io::Result<String> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct FakeModem {
    responder: Responder,
    log: Arc<Mutex<Vec<(ChannelSlot, String)>>>,
    urc: Arc<Mutex<Option<UrcSink>>>,
    fail_open: Option<ChannelSlot>,
}

impl FakeModem {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(ChannelSlot, &str) -> io::Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            log: Arc::new(Mutex::new(Vec::new())),
            urc: Arc::new(Mutex::new(None)),
            fail_open: None,
        }
    }

    pub(crate) fn ok() -> Self {
        Self::new(|_, _| Ok("OK".to_string()))
    }

    pub(crate) fn failing_open(mut self, slot: ChannelSlot) -> Self {
        self.fail_open = Some(slot);
        self
    }

    pub(crate) fn commands(&self) -> Vec<(ChannelSlot, String)> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn emit_urc(&self, line: &str) {
        let sink = self.urc.lock().unwrap().clone().expect("no URC sink registered");
        sink(line);
    }
}

impl Modem for FakeModem {
    fn open_channel(&self, slot: ChannelSlot, urc: Option<UrcSink>) -> io::Result<Box<dyn Conduit>> {
        if self.fail_open == Some(slot) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such port"));
        }
        if let Some(sink) = urc {
            *self.urc.lock().unwrap() = Some(sink);
        }
        Ok(Box::new(FakeConduit {
            slot,
            responder: Arc::clone(&self.responder),
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeConduit {
    slot: ChannelSlot,
    responder: Responder,
    log: Arc<Mutex<Vec<(ChannelSlot, String)>>>,
}

impl Conduit for FakeConduit {
    fn send(&mut self, cmd: &str) -> io::Result<String> {
        self.log.lock().unwrap().push((self.slot, cmd.to_string()));
        (self.responder)(self.slot, cmd)
    }

    fn send_with_listener(&mut self, cmd: &str, listener: ResponseListener) -> io::Result<()> {
        self.log.lock().unwrap().push((self.slot, cmd.to_string()));
        let response = (self.responder)(self.slot, cmd)?;
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            match response.as_str() {
                DROP_LISTENER => drop(listener),
                HOLD_LISTENER => {
                    thread::sleep(Duration::from_millis(500));
                    drop(listener);
                }
                _ => listener(Some(response)),
            }
        });
        Ok(())
    }
}
