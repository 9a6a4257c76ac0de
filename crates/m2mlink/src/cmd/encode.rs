use m2mlink_frame::{Frame, IDENT};

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let layout = args.layout.layout()?;
    let payload = resolve_payload(&args)?;

    let frame = if args.frame_type == IDENT {
        let client_id = String::from_utf8(payload).map_err(|_| {
            CliError::new(DATA_INVALID, "ident payload must be a UTF-8 client id")
        })?;
        Frame::ident(&client_id)
    } else {
        Frame::new(&layout, args.frame_type, &payload)
    }
    .map_err(|err| frame_error("encode failed", err))?;
    print_frame(&frame, "encode", format);

    Ok(SUCCESS)
}

fn resolve_payload(args: &EncodeArgs) -> CliResult<Vec<u8>> {
    match (&args.data, &args.hex) {
        (Some(text), _) => Ok(text.as_bytes().to_vec()),
        (None, Some(hex)) => parse_hex(hex),
        (None, None) => Ok(Vec::new()),
    }
}
