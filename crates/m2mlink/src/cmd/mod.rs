use std::time::Duration;

use clap::{Args, Subcommand};
use m2mlink_frame::{FrameLayout, DEFAULT_ONE_BYTE_SIZED_MAX, DEFAULT_SPECIALIZED_MAX};

use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod at;
pub mod decode;
pub mod encode;
pub mod session;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode one frame and print its wire image.
    Encode(EncodeArgs),
    /// Decode frames from a hex string.
    Decode(DecodeArgs),
    /// Run a reconnecting session and print received frames.
    Session(SessionArgs),
    /// Issue one AT command through the channel pool.
    At(AtArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Session(args) => session::run(args, format),
        Command::At(args) => at::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Type-byte thresholds shared by every framing command.
#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Types below this value are specialized (two-byte) frames.
    #[arg(long, value_parser = parse_frame_type, default_value_t = DEFAULT_SPECIALIZED_MAX, env = "M2MLINK_SPECIALIZED_MAX")]
    pub specialized_max: u8,
    /// Types below this value carry a one-byte length.
    #[arg(long, value_parser = parse_frame_type, default_value_t = DEFAULT_ONE_BYTE_SIZED_MAX, env = "M2MLINK_ONE_BYTE_SIZED_MAX")]
    pub one_byte_sized_max: u8,
}

impl LayoutArgs {
    pub fn layout(&self) -> CliResult<FrameLayout> {
        FrameLayout::new(self.specialized_max, self.one_byte_sized_max)
            .map_err(|err| frame_error("invalid layout", err))
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Frame type byte (decimal or 0x-prefixed hex).
    #[arg(long = "type", value_parser = parse_frame_type)]
    pub frame_type: u8,
    /// Text payload.
    #[arg(long, conflicts_with = "hex", required_unless_present = "hex")]
    pub data: Option<String>,
    /// Hex payload.
    #[arg(long, conflicts_with = "data")]
    pub hex: Option<String>,
    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire bytes as hex; whitespace is ignored.
    pub hex: String,
    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Servers as host:port, comma-separated, tried in order.
    #[arg(long, env = "M2MLINK_SERVERS")]
    pub servers: String,
    /// Client identifier sent in the ident frame.
    #[arg(long, env = "M2MLINK_CLIENT_ID")]
    pub client_id: String,
    /// Frame to queue before starting, as TYPE:TEXT (repeatable).
    #[arg(long, value_name = "TYPE:TEXT")]
    pub send: Vec<String>,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Modem devices (pooled channels then the URC channel) for radio re-attach.
    #[arg(long, value_name = "DEV,DEV,DEV", env = "M2MLINK_MODEM")]
    pub modem: Option<String>,
    /// TCP connect timeout (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s", env = "M2MLINK_CONNECT_TIMEOUT")]
    pub connect_timeout: String,
    /// Minimum time between connection attempts.
    #[arg(long, default_value = "10s", env = "M2MLINK_MIN_ATTEMPT_INTERVAL")]
    pub min_attempt_interval: String,
    /// Re-attach the radio after this many consecutive failures (0 disables).
    #[arg(long, default_value_t = m2mlink_net::DEFAULT_REATTACH_EVERY, env = "M2MLINK_REATTACH_EVERY")]
    pub reattach_every: u32,
    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Args, Debug)]
pub struct AtArgs {
    /// Modem devices, comma-separated; the last one carries URCs.
    #[arg(long, value_name = "DEV,DEV,DEV", env = "M2MLINK_MODEM")]
    pub modem: String,
    /// Command to send, e.g. AT+CSQ.
    pub command: String,
    /// Wait for a deferred response.
    #[arg(long, conflicts_with_all = ["until_ok", "unsolicited", "all"])]
    pub long: bool,
    /// Repeat until the response contains the acknowledgement marker.
    #[arg(long, conflicts_with_all = ["long", "unsolicited", "all"])]
    pub until_ok: bool,
    /// Send on the dedicated URC channel instead of a pooled one.
    #[arg(long, conflicts_with_all = ["long", "until_ok", "all"])]
    pub unsolicited: bool,
    /// Send on every channel, URC channel included.
    #[arg(long, conflicts_with_all = ["long", "until_ok", "unsolicited"])]
    pub all: bool,
    /// Attempts for --until-ok.
    #[arg(long, default_value_t = m2mlink_at::DEFAULT_MAX_ATTEMPTS)]
    pub attempts: u32,
    /// How long to wait for a free channel (e.g. 10s).
    #[arg(long, default_value = "10s", env = "M2MLINK_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: String,
    /// How long to wait for a command's final result code (e.g. 30s).
    #[arg(long, default_value = "30s", env = "M2MLINK_RESPONSE_TIMEOUT")]
    pub response_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Accepts `33`, `0x21` or `0X21`.
pub fn parse_frame_type(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid frame type: {input} (expected 0-255)"))
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            "hex input must have an even number of digits",
        ));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = String::from_utf8_lossy(pair);
            if !pair.iter().all(u8::is_ascii_hexdigit) {
                return Err(CliError::new(
                    DATA_INVALID,
                    format!("invalid hex byte: {text}"),
                ));
            }
            u8::from_str_radix(&text, 16)
                .map_err(|_| CliError::new(DATA_INVALID, format!("invalid hex byte: {text}")))
        })
        .collect()
}

/// Accepts `500ms`, `30s`, `2m`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input:?}")))?;
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        other => {
            return Err(CliError::new(
                USAGE,
                format!("unsupported duration unit {other:?} (use ms, s or m)"),
            ))
        }
    };

    if duration.is_zero() {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_types_accept_decimal_and_hex() {
        assert_eq!(parse_frame_type("33"), Ok(0x21));
        assert_eq!(parse_frame_type("0x41"), Ok(0x41));
        assert_eq!(parse_frame_type("0XfF"), Ok(0xff));
        assert!(parse_frame_type("256").is_err());
        assert!(parse_frame_type("0xzz").is_err());
    }

    #[test]
    fn hex_ignores_whitespace() {
        assert_eq!(parse_hex("21 02\n6f6b").unwrap(), vec![0x21, 0x02, 0x6f, 0x6b]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn hex_rejects_bad_input() {
        assert_eq!(parse_hex("abc").unwrap_err().code, DATA_INVALID);
        assert_eq!(parse_hex("zz").unwrap_err().code, DATA_INVALID);
    }

    #[test]
    fn durations_accept_policy_units() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration(" 10 ").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn durations_reject_zero_and_unknown_units() {
        for input in ["0s", "0ms", "", "s", "5h", "1.5s", "-3"] {
            let err = parse_duration(input).unwrap_err();
            assert_eq!(err.code, USAGE, "{input}");
        }
    }
}
