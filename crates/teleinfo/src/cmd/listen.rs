use std::fs::File;
use std::io::{BufReader, Read};

use teleinfo_frame::FrameReader;
use tracing::{debug, info, warn};

use crate::cmd::{open_device_reader, ListenArgs};
use crate::exit::{io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let (source, stream): (String, Box<dyn Read + Send>) = match (&args.replay, &args.device) {
        (Some(path), _) => {
            let file = File::open(path)
                .map_err(|err| io_error(&format!("failed to open {}", path.display()), err))?;
            (path.display().to_string(), Box::new(BufReader::new(file)))
        }
        (None, Some(path)) => (
            path.display().to_string(),
            open_device_reader(path, args.baud)?,
        ),
        (None, None) => {
            let message = "either --device or --replay is required";
            return Err(CliError::new(USAGE, message));
        }
    };

    info!(%source, "listening for frames");
    let mut reader = FrameReader::new(stream);
    let mut printed = 0usize;
    let mut dropped = 0usize;

    loop {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }

        match reader.read_frame() {
            Ok(frame) => {
                print_frame(&frame, &source, format);
                printed = printed.saturating_add(1);
            }
            Err(_) if reader.is_exhausted() => {
                debug!("end of stream");
                break;
            }
            Err(err) => {
                dropped = dropped.saturating_add(1);
                if err.is_field_error() {
                    warn!(%err, "dropping frame");
                } else {
                    warn!(%err, "error reading teleinfo frame");
                }
            }
        }
    }

    info!(printed, dropped, "listen finished");
    Ok(SUCCESS)
}
