use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use m2mlink_frame::{type_name, Frame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    frame_type: u8,
    type_name: &'a str,
    class: String,
    payload_size: usize,
    payload: String,
    wire: String,
    source: &'a str,
    timestamp: String,
}

impl<'a> FrameOutput<'a> {
    fn new(frame: &'a Frame, source: &'a str) -> Self {
        Self {
            frame_type: frame.frame_type(),
            type_name: type_name(frame.frame_type()),
            class: format!("{:?}", frame.class()),
            payload_size: frame.payload().len(),
            payload: payload_preview(frame.payload()),
            wire: to_hex(frame.wire()),
            source,
            timestamp: now_unix_seconds(),
        }
    }
}

/// Print one frame. `Raw` writes the complete wire image.
pub fn print_frame(frame: &Frame, source: &str, format: OutputFormat) {
    let out = FrameOutput::new(frame, source);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "NAME", "SIZE", "SOURCE", "PAYLOAD"])
                .add_row(vec![
                    format!("0x{:02x}", out.frame_type),
                    out.type_name.to_string(),
                    out.payload_size.to_string(),
                    out.source.to_string(),
                    out.payload.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type=0x{:02x} ({}) class={} size={} source={} payload={} wire={}",
                out.frame_type,
                out.type_name,
                out.class,
                out.payload_size,
                out.source,
                out.payload,
                out.wire
            );
        }
        OutputFormat::Raw => print_raw(frame.wire()),
    }
}

#[derive(Serialize)]
struct AtOutput<'a> {
    command: &'a str,
    mode: &'a str,
    response: Option<&'a str>,
    acknowledged: Option<bool>,
}

/// Print the outcome of one AT command.
pub fn print_at_response(
    command: &str,
    mode: &str,
    response: Option<&str>,
    acknowledged: Option<bool>,
    format: OutputFormat,
) {
    let out = AtOutput {
        command,
        mode,
        response,
        acknowledged,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "MODE", "RESPONSE"])
                .add_row(vec![
                    command.to_string(),
                    mode.to_string(),
                    describe_response(response, acknowledged),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={command} mode={mode} response={}",
                describe_response(response, acknowledged)
            );
        }
        OutputFormat::Raw => {
            if let Some(response) = response {
                print_raw(response.as_bytes());
            }
        }
    }
}

fn describe_response(response: Option<&str>, acknowledged: Option<bool>) -> String {
    match (response, acknowledged) {
        (_, Some(true)) => "acknowledged".to_string(),
        (_, Some(false)) => "not acknowledged".to_string(),
        (Some(text), None) => text.replace("\r\n", " | "),
        (None, None) => "<no response>".to_string(),
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use m2mlink_frame::{FrameLayout, DATA};

    use super::*;

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(to_hex(&[0x00, 0x0a, 0xff]), "000aff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn binary_payloads_are_summarized() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0x01, 0x02]), "<binary 2 bytes>");
        assert_eq!(payload_preview(&[0xff, 0xfe, 0xfd]), "<binary 3 bytes>");
    }

    #[test]
    fn frame_output_carries_wire_image() {
        let frame = Frame::new(&FrameLayout::default(), DATA, b"ok").unwrap();
        let out = FrameOutput::new(&frame, "stdin");
        assert_eq!(out.type_name, "DATA");
        assert_eq!(out.payload_size, 2);
        assert_eq!(out.wire, "21026f6b");
    }

    #[test]
    fn acknowledgement_wins_over_text() {
        assert_eq!(describe_response(Some("OK"), Some(true)), "acknowledged");
        assert_eq!(describe_response(Some("A\r\nOK"), None), "A | OK");
        assert_eq!(describe_response(None, None), "<no response>");
    }
}
