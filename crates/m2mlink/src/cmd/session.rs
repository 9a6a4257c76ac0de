use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use m2mlink_at::{RadioControl, SerialConfig, DEFAULT_ACQUIRE_TIMEOUT};
use m2mlink_frame::{Frame, FrameConfig};
use m2mlink_net::{Connection, ConnectionConfig, ProtocolLayer, ReconnectPolicy};
use m2mlink_transport::{Endpoint, TcpDialer};
use tracing::info;

use crate::cmd::at::open_pool;
use crate::cmd::{parse_duration, parse_frame_type, SessionArgs};
use crate::exit::{net_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

enum SessionEvent {
    Frame(Frame),
    Disconnected,
}

/// Hands inbound frames to the printing thread.
struct Forwarder {
    events: mpsc::Sender<SessionEvent>,
}

impl ProtocolLayer for Forwarder {
    fn on_frame(&self, frame: &Frame) {
        let _ = self.events.send(SessionEvent::Frame(frame.clone()));
    }

    fn on_disconnected(&self) {
        let _ = self.events.send(SessionEvent::Disconnected);
    }
}

pub fn run(args: SessionArgs, format: OutputFormat) -> CliResult<i32> {
    let config = connection_config(&args)?;
    let outbound = args
        .send
        .iter()
        .map(String::as_str)
        .map(parse_send_arg)
        .collect::<CliResult<Vec<_>>>()?;
    let dialer = TcpDialer::new().with_connect_timeout(parse_duration(&args.connect_timeout)?);

    let (events, inbound) = mpsc::channel();
    let mut connection = Connection::new(config, dialer, Forwarder { events })
        .map_err(|err| net_error("session setup failed", err))?;

    if let Some(devices) = &args.modem {
        let pool = open_pool(devices, SerialConfig::default(), DEFAULT_ACQUIRE_TIMEOUT)?;
        pool.add_listener(|urc: &str| info!(urc, "unsolicited result code"));
        let radio: Arc<dyn RadioControl> = Arc::new(pool);
        connection = connection.with_radio_control(radio);
    }

    for (frame_type, payload) in &outbound {
        connection
            .send(*frame_type, payload)
            .map_err(|err| net_error("queueing frame failed", err))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    connection
        .start()
        .map_err(|err| net_error("session start failed", err))?;
    info!(client_id = %connection.config().client_id, queued = outbound.len(), "session started");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match inbound.recv_timeout(POLL_INTERVAL) {
            Ok(SessionEvent::Frame(frame)) => {
                print_frame(&frame, "server", format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Ok(SessionEvent::Disconnected) => {
                info!(pending = connection.pending(), "session disconnected, reconnecting");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    connection.shutdown();
    let stats = connection.stats();
    info!(
        received = printed,
        pending = stats.pending,
        failed_attempts = stats.failed_attempts,
        "session stopped"
    );
    Ok(SUCCESS)
}

fn connection_config(args: &SessionArgs) -> CliResult<ConnectionConfig> {
    let endpoints = Endpoint::parse_list(&args.servers)
        .map_err(|err| transport_error("invalid servers", err))?;

    let base = ConnectionConfig::new(endpoints, args.client_id.clone());
    let frame = FrameConfig {
        layout: args.layout.layout()?,
        ..base.frame.clone()
    };
    let policy = ReconnectPolicy {
        min_attempt_interval: parse_duration(&args.min_attempt_interval)?,
        reattach_every: args.reattach_every,
        ..ReconnectPolicy::default()
    };
    Ok(base.with_frame_config(frame).with_policy(policy))
}

/// `TYPE:TEXT`, e.g. `0x21:hello`.
fn parse_send_arg(arg: &str) -> CliResult<(u8, Vec<u8>)> {
    let (frame_type, text) = arg
        .split_once(':')
        .ok_or_else(|| CliError::new(USAGE, format!("expected TYPE:TEXT, got {arg}")))?;
    let frame_type = parse_frame_type(frame_type).map_err(|err| CliError::new(USAGE, err))?;
    Ok((frame_type, text.as_bytes().to_vec()))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
