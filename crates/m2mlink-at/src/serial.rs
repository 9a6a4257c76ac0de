//! Line-oriented AT conduit over a byte stream.
//!
//! Each conduit owns one reader thread that splits the stream into lines.
//! While a command is pending its lines are collected until a final result
//! code; lines arriving with no command pending are unsolicited.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::lock;
use crate::modem::{ChannelSlot, Conduit, Modem, ResponseListener, UrcSink};

/// Default bound on a synchronous command.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

const FINAL_CODES: &[&str] = &[
    "OK",
    "ERROR",
    "NO CARRIER",
    "BUSY",
    "NO ANSWER",
    "NO DIALTONE",
    "CONNECT",
];

const FINAL_PREFIXES: &[&str] = &["+CME ERROR:", "+CMS ERROR:", "CONNECT "];

/// Serial conduit configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Bound on `Conduit::send` waiting for a final result code.
    pub response_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// Whether `line` terminates a command response.
pub fn is_final_result(line: &str) -> bool {
    FINAL_CODES.contains(&line) || FINAL_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

struct Pending {
    echo: String,
    echo_checked: bool,
    lines: Vec<String>,
    respond: ResponseListener,
}

struct Shared {
    slot: ChannelSlot,
    pending: Mutex<Option<Pending>>,
    closed: AtomicBool,
    urc: Option<UrcSink>,
}

/// AT conduit over any `Read`/`Write` pair.
pub struct SerialConduit<W> {
    writer: W,
    shared: Arc<Shared>,
    config: SerialConfig,
}

impl<W: Write + Send> SerialConduit<W> {
    /// Start the reader thread and return the conduit.
    pub fn spawn<R>(
        slot: ChannelSlot,
        reader: R,
        writer: W,
        urc: Option<UrcSink>,
        config: SerialConfig,
    ) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let shared = Arc::new(Shared {
            slot,
            pending: Mutex::new(None),
            closed: AtomicBool::new(false),
            urc,
        });

        let reader_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("m2mlink-{}", slot.to_string().to_lowercase()))
            .spawn(move || read_loop(reader, &reader_shared))?;

        Ok(Self {
            writer,
            shared,
            config,
        })
    }

    /// Whether the reader thread has seen the stream end.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn begin(&mut self, cmd: &str, respond: ResponseListener) -> io::Result<()> {
        let slot = self.shared.slot;
        if self.is_closed() {
            return Err(io::Error::new(
                ErrorKind::BrokenPipe,
                format!("{slot} is closed"),
            ));
        }

        {
            let mut pending = lock(&self.shared.pending);
            if pending.is_some() {
                return Err(io::Error::other(format!(
                    "{slot} already has a command in flight"
                )));
            }
            *pending = Some(Pending {
                echo: cmd.trim_end().to_string(),
                echo_checked: false,
                lines: Vec::new(),
                respond,
            });
        }

        let written = self
            .writer
            .write_all(cmd.as_bytes())
            .and_then(|()| self.writer.flush());
        if let Err(err) = written {
            lock(&self.shared.pending).take();
            return Err(err);
        }
        trace!(channel = %slot, bytes = cmd.len(), "command written");
        Ok(())
    }
}

impl<W: Write + Send> Conduit for SerialConduit<W> {
    fn send(&mut self, cmd: &str) -> io::Result<String> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.begin(
            cmd,
            Box::new(move |response: Option<String>| {
                let _ = tx.send(response);
            }),
        )?;

        let slot = self.shared.slot;
        match rx.recv_timeout(self.config.response_timeout) {
            Ok(Some(response)) => Ok(response),
            Ok(None) | Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("{slot} closed before a final result code"),
            )),
            Err(RecvTimeoutError::Timeout) => {
                lock(&self.shared.pending).take();
                Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!(
                        "{slot} gave no final result code within {:?}",
                        self.config.response_timeout
                    ),
                ))
            }
        }
    }

    fn send_with_listener(&mut self, cmd: &str, listener: ResponseListener) -> io::Result<()> {
        self.begin(cmd, listener)
    }
}

fn read_loop<R: Read>(reader: R, shared: &Shared) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                handle_line(shared, text.trim_matches(|c| c == '\r' || c == '\n'));
                line.clear();
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(err) => {
                warn!(channel = %shared.slot, error = %err, "AT port read failed");
                break;
            }
        }
    }

    shared.closed.store(true, Ordering::Release);
    if let Some(pending) = lock(&shared.pending).take() {
        (pending.respond)(None);
    }
    debug!(channel = %shared.slot, "AT port reader stopped");
}

fn handle_line(shared: &Shared, line: &str) {
    if line.is_empty() {
        return;
    }

    let mut pending = lock(&shared.pending);
    let Some(command) = pending.as_mut() else {
        drop(pending);
        match &shared.urc {
            Some(sink) => sink(line),
            None => debug!(channel = %shared.slot, line, "unsolicited line discarded"),
        }
        return;
    };

    if !command.echo_checked {
        command.echo_checked = true;
        if line == command.echo {
            return;
        }
    }
    command.lines.push(line.to_string());

    if is_final_result(line) {
        if let Some(done) = pending.take() {
            drop(pending);
            (done.respond)(Some(done.lines.join("\r\n")));
        }
    }
}

/// A modem exposing one AT interface per device node.
#[derive(Debug, Clone)]
pub struct SerialModem {
    pooled: Vec<PathBuf>,
    unsolicited: PathBuf,
    config: SerialConfig,
}

impl SerialModem {
    pub fn new(pooled: Vec<PathBuf>, unsolicited: PathBuf, config: SerialConfig) -> Self {
        Self {
            pooled,
            unsolicited,
            config,
        }
    }

    /// Parse `dev,dev,...,urc_dev`: the last device serves unsolicited codes.
    pub fn from_list(devices: &str, config: SerialConfig) -> io::Result<Self> {
        let mut paths: Vec<PathBuf> = devices
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(PathBuf::from)
            .collect();

        if paths.len() < 2 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "need at least one pooled device and one URC device",
            ));
        }
        let unsolicited = paths.pop().unwrap_or_default();
        Ok(Self::new(paths, unsolicited, config))
    }

    /// Number of pooled devices; use it as the pool size.
    pub fn pooled_count(&self) -> usize {
        self.pooled.len()
    }

    fn device(&self, slot: ChannelSlot) -> io::Result<&Path> {
        match slot {
            ChannelSlot::Pooled(index) => self.pooled.get(index).map(PathBuf::as_path).ok_or_else(|| {
                io::Error::new(ErrorKind::NotFound, format!("no device configured for {slot}"))
            }),
            ChannelSlot::Unsolicited => Ok(self.unsolicited.as_path()),
        }
    }
}

impl Modem for SerialModem {
    fn open_channel(&self, slot: ChannelSlot, urc: Option<UrcSink>) -> io::Result<Box<dyn Conduit>> {
        let path = self.device(slot)?;
        let port = OpenOptions::new().read(true).write(true).open(path)?;
        let reader = port.try_clone()?;
        debug!(channel = %slot, device = %path.display(), "AT port opened");
        Ok(Box::new(SerialConduit::spawn(
            slot,
            reader,
            port,
            urc,
            self.config.clone(),
        )?))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    use super::*;
    use crate::pool::{ChannelPool, PoolConfig};

    /// Answers each `\r`-terminated command with echo plus `reply(cmd)`.
    fn fake_port<F>(stream: UnixStream, reply: F) -> thread::JoinHandle<()>
    where
        F: Fn(&str) -> Option<String> + Send + 'static,
    {
        thread::spawn(move || {
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut cmd = Vec::new();
            while reader.read_until(b'\r', &mut cmd).unwrap_or(0) > 0 {
                let text = String::from_utf8_lossy(&cmd).trim().to_string();
                cmd.clear();
                if let Some(body) = reply(&text) {
                    let out = format!("{text}\r\r\n{body}");
                    if writer.write_all(out.as_bytes()).is_err() {
                        break;
                    }
                }
            }
        })
    }

    fn conduit(
        reply: impl Fn(&str) -> Option<String> + Send + 'static,
        urc: Option<UrcSink>,
        config: SerialConfig,
    ) -> (SerialConduit<UnixStream>, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let control = theirs.try_clone().unwrap();
        fake_port(theirs, reply);
        let reader = ours.try_clone().unwrap();
        let conduit =
            SerialConduit::spawn(ChannelSlot::Pooled(0), reader, ours, urc, config).unwrap();
        (conduit, control)
    }

    #[test]
    fn final_result_codes() {
        for line in ["OK", "ERROR", "+CME ERROR: 10", "+CMS ERROR: 500", "NO CARRIER", "CONNECT", "CONNECT 9600"] {
            assert!(is_final_result(line), "{line}");
        }
        for line in ["+CSQ: 20,99", "OKAY", "RING", "AT+CSQ", ""] {
            assert!(!is_final_result(line), "{line}");
        }
    }

    #[test]
    fn send_collects_lines_until_final_code() {
        let (mut conduit, _port) = conduit(
            |_| Some("+CSQ: 20,99\r\n\r\nOK\r\n".to_string()),
            None,
            SerialConfig::default(),
        );

        let response = conduit.send("AT+CSQ\r").unwrap();
        assert_eq!(response, "+CSQ: 20,99\r\nOK");
    }

    #[test]
    fn error_codes_complete_the_response() {
        let (mut conduit, _port) = conduit(
            |_| Some("+CME ERROR: 10\r\n".to_string()),
            None,
            SerialConfig::default(),
        );
        assert_eq!(conduit.send("AT+CPIN?\r").unwrap(), "+CME ERROR: 10");
    }

    #[test]
    fn unanswered_command_times_out_and_frees_the_conduit() {
        let (mut conduit, _port) = conduit(
            |cmd| (cmd != "AT+SILENT").then(|| "OK\r\n".to_string()),
            None,
            SerialConfig {
                response_timeout: Duration::from_millis(80),
            },
        );

        let started = Instant::now();
        let err = conduit.send("AT+SILENT\r").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(80));

        assert_eq!(conduit.send("AT\r").unwrap(), "OK");
    }

    #[test]
    fn unsolicited_lines_reach_the_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: UrcSink = Arc::new(move |line: &str| sink_seen.lock().unwrap().push(line.to_string()));

        let (mut conduit, mut port) = conduit(|_| Some("OK\r\n".to_string()), Some(sink), SerialConfig::default());
        port.write_all(b"\r\n+CREG: 1\r\nRING\r\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*seen.lock().unwrap(), vec!["+CREG: 1", "RING"]);
        assert_eq!(conduit.send("AT\r").unwrap(), "OK");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn listener_gets_response_once() {
        let (mut conduit, _port) = conduit(
            |_| Some("^SJNET: 1\r\nOK\r\n".to_string()),
            None,
            SerialConfig::default(),
        );
        let (tx, rx) = mpsc::channel();
        conduit
            .send_with_listener("AT^SJNET\r", Box::new(move |response: Option<String>| tx.send(response).unwrap()))
            .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap().as_deref(),
            Some("^SJNET: 1\r\nOK")
        );
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn second_command_while_pending_is_rejected() {
        let (mut conduit, _port) = conduit(|_| None, None, SerialConfig::default());
        conduit
            .send_with_listener("AT+COPS=?\r", Box::new(|_: Option<String>| {}))
            .unwrap();
        let err = conduit.send("AT\r").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn stream_close_wakes_pending_listener() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let reader = ours.try_clone().unwrap();
        let mut conduit = SerialConduit::spawn(
            ChannelSlot::Unsolicited,
            reader,
            ours,
            None,
            SerialConfig::default(),
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        conduit
            .send_with_listener("AT\r", Box::new(move |response: Option<String>| tx.send(response).unwrap()))
            .unwrap();
        drop(theirs);

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), None);
        let deadline = Instant::now() + Duration::from_secs(2);
        while !conduit.is_closed() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(conduit.send("AT\r").unwrap_err().kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn device_list_parsing() {
        let modem = SerialModem::from_list("/dev/ttyACM0, /dev/ttyACM1,/dev/ttyACM2", SerialConfig::default()).unwrap();
        assert_eq!(modem.pooled_count(), 2);
        assert_eq!(modem.device(ChannelSlot::Unsolicited).unwrap(), Path::new("/dev/ttyACM2"));
        assert_eq!(modem.device(ChannelSlot::Pooled(1)).unwrap(), Path::new("/dev/ttyACM1"));
        assert_eq!(
            modem.device(ChannelSlot::Pooled(2)).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(SerialModem::from_list("/dev/ttyACM0", SerialConfig::default()).is_err());
    }

    #[test]
    fn missing_device_fails_to_open() {
        let modem = SerialModem::new(
            vec![PathBuf::from("/nonexistent/m2mlink-at0")],
            PathBuf::from("/nonexistent/m2mlink-urc"),
            SerialConfig::default(),
        );
        assert!(modem.open_channel(ChannelSlot::Pooled(0), None).is_err());
    }

    struct PairModem {
        ports: Mutex<Vec<UnixStream>>,
    }

    impl Modem for PairModem {
        fn open_channel(&self, slot: ChannelSlot, urc: Option<UrcSink>) -> io::Result<Box<dyn Conduit>> {
            let (ours, theirs) = UnixStream::pair()?;
            self.ports.lock().unwrap().push(theirs.try_clone()?);
            fake_port(theirs, move |cmd| Some(format!("{slot} {cmd}\r\nOK\r\n")));
            let reader = ours.try_clone()?;
            Ok(Box::new(SerialConduit::spawn(slot, reader, ours, urc, SerialConfig::default())?))
        }
    }

    #[test]
    fn pool_over_serial_conduits() {
        let modem = PairModem {
            ports: Mutex::new(Vec::new()),
        };
        let pool = ChannelPool::open(&modem, PoolConfig::default()).unwrap();

        assert_eq!(
            pool.send_once("AT+CGATT?").unwrap().as_deref(),
            Some("AT1 AT+CGATT?\r\nOK")
        );
        assert!(pool.send_until_acknowledged("AT+CFUN=1", 1).unwrap());
        assert_eq!(
            pool.send_to_unsolicited("AT+CREG=1").as_deref(),
            Some("ATURC AT+CREG=1\r\nOK")
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pool.add_listener(move |line: &str| sink.lock().unwrap().push(line.to_string()));

        let urc_port = modem.ports.lock().unwrap().last().unwrap().try_clone().unwrap();
        (&urc_port).write_all(b"+CREG: 5\r\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*seen.lock().unwrap(), vec!["+CREG: 5"]);
    }
}
