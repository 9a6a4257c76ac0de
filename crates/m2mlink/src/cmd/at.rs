use std::time::Duration;

use m2mlink_at::{ChannelPool, PoolConfig, SerialConfig, SerialModem};
use tracing::info;

use crate::cmd::{parse_duration, AtArgs};
use crate::exit::{io_error, pool_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_at_response, OutputFormat};

pub fn run(args: AtArgs, format: OutputFormat) -> CliResult<i32> {
    let serial = SerialConfig {
        response_timeout: parse_duration(&args.response_timeout)?,
    };
    let pool = open_pool(&args.modem, serial, parse_duration(&args.acquire_timeout)?)?;
    let _urc_logger = pool.add_listener(|urc: &str| info!(urc, "unsolicited result code"));

    let command = args.command.trim();
    if args.until_ok {
        let acknowledged = pool
            .send_until_acknowledged(command, args.attempts)
            .map_err(|err| pool_error("AT command failed", err))?;
        print_at_response(command, "until-ok", None, Some(acknowledged), format);
        return Ok(if acknowledged { SUCCESS } else { FAILURE });
    }

    let (mode, response) = if args.long {
        ("long", pool.send_long(command))
    } else if args.unsolicited {
        ("unsolicited", Ok(pool.send_to_unsolicited(command)))
    } else if args.all {
        ("all", pool.send_all(command))
    } else {
        ("once", pool.send_once(command))
    };
    let response = response.map_err(|err| pool_error("AT command failed", err))?;

    print_at_response(command, mode, response.as_deref(), None, format);
    Ok(if response.is_some() { SUCCESS } else { FAILURE })
}

/// Open a pool over `dev,dev,...,urc_dev`, one pooled channel per device.
pub fn open_pool(
    devices: &str,
    serial: SerialConfig,
    acquire_timeout: Duration,
) -> CliResult<ChannelPool> {
    let modem = SerialModem::from_list(devices, serial)
        .map_err(|err| io_error("invalid modem devices", err))?;

    let config = PoolConfig {
        pool_size: modem.pooled_count(),
        acquire_timeout,
        ..PoolConfig::default()
    };
    ChannelPool::open(modem, config).map_err(|err| pool_error("modem open failed", err))
}
