use bytes::BytesMut;
use m2mlink_frame::{decode_frame, Frame, FrameLayout};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let layout = args.layout.layout()?;
    let wire = parse_hex(&args.hex)?;

    let (frames, trailing) = split_frames(&wire, &layout);
    for frame in &frames {
        print_frame(frame, "decode", format);
    }

    if trailing > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("incomplete frame: {trailing} trailing bytes"),
        ));
    }
    if frames.is_empty() {
        return Err(CliError::new(DATA_INVALID, "no frames in input"));
    }
    Ok(SUCCESS)
}

/// Decode every complete frame; returns them with the count of leftover bytes.
fn split_frames(wire: &[u8], layout: &FrameLayout) -> (Vec<Frame>, usize) {
    let mut buf = BytesMut::from(wire);
    let mut frames = Vec::new();
    while let Some(frame) = decode_frame(&mut buf, layout) {
        frames.push(frame);
    }
    (frames, buf.len())
}
