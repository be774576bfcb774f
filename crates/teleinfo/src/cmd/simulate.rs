use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::thread;

use teleinfo_frame::{Frame, FrameWriter};
use tracing::{debug, info};

use crate::cmd::{parse_duration, SimulateArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};

const ADCO: &str = "021728123456";
const HCHC_START: u64 = 2_815_708;
const HCHP_START: u64 = 5_289_047;

pub fn run(args: SimulateArgs) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let mut writer = FrameWriter::new(open_output(&args.output, args.baud)?);

    for index in 0..args.count {
        if index > 0 && !interval.is_zero() {
            thread::sleep(interval);
        }
        let frame = meter_snapshot(index);
        writer
            .write_frame(&frame)
            .map_err(|err| frame_error("failed to write frame", err))?;
        writer
            .flush()
            .map_err(|err| frame_error("failed to flush output", err))?;
        debug!(index, fields = frame.len(), "frame written");
    }

    info!(frames = args.count, output = %args.output.display(), "simulation finished");
    Ok(SUCCESS)
}

/// Fields of a single-phase meter on the off-peak/peak option during off-peak
/// hours, index counters advancing with `index`.
///
/// Like a real meter, some snapshots carry a field whose checksum is a space; the
/// decoder drops those frames.
fn meter_snapshot(index: u64) -> Frame {
    let papp = 490 + (index % 10) * 10;
    let mut frame = Frame::new();
    frame.insert("ADCO", ADCO);
    frame.insert("OPTARIF", "HC..");
    frame.insert("ISOUSC", "45");
    frame.insert("HCHC", format!("{:09}", HCHC_START + index));
    frame.insert("HCHP", format!("{:09}", HCHP_START + index));
    frame.insert("PTEC", "HC..");
    frame.insert("IINST", format!("{:03}", papp / 230));
    frame.insert("IMAX", "090");
    frame.insert("PAPP", format!("{papp:05}"));
    frame.insert("HHPHC", "A");
    frame.insert("MOTDETAT", "000000");
    frame
}

#[cfg(unix)]
fn open_output(path: &Path, baud: u32) -> CliResult<Box<dyn Write>> {
    use std::os::unix::fs::FileTypeExt;

    let is_device = std::fs::metadata(path)
        .map(|meta| meta.file_type().is_char_device())
        .unwrap_or(false);
    if is_device {
        return Ok(Box::new(super::open_device(path, baud)?));
    }
    create_file(path)
}

#[cfg(not(unix))]
fn open_output(path: &Path, _baud: u32) -> CliResult<Box<dyn Write>> {
    create_file(path)
}

fn create_file(path: &Path) -> CliResult<Box<dyn Write>> {
    let file = File::create(path)
        .map_err(|err| io_error(&format!("failed to create {}", path.display()), err))?;
    Ok(Box::new(file))
}

#[cfg(test)]
mod tests {
    use teleinfo_frame::{checksum, FrameError, FrameReader};

    use super::*;

    #[test]
    fn snapshots_decode_and_advance() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(&meter_snapshot(0)).unwrap();
        writer.write_frame(&meter_snapshot(1)).unwrap();

        let mut reader = FrameReader::new(std::io::Cursor::new(writer.into_inner()));
        let first = reader.read_frame().unwrap();
        let second = reader.read_frame().unwrap();

        assert_eq!(first.len(), 11);
        assert_eq!(first.get("HCHC"), Some("002815708"));
        assert_eq!(second.get("HCHC"), Some("002815709"));
        assert_eq!(first.get("PTEC"), Some("HC.."));
        assert_eq!(second.get("PAPP"), Some("00500"));
    }

    #[test]
    fn snapshot_with_space_checksum_is_dropped() {
        let snapshot = meter_snapshot(4);
        assert_eq!(snapshot.get("HCHC"), Some("002815712"));
        assert_eq!(checksum(b"HCHC", b"002815712"), b' ');

        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(&snapshot).unwrap();
        writer.write_frame(&meter_snapshot(5)).unwrap();

        let mut reader = FrameReader::new(std::io::Cursor::new(writer.into_inner()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::MalformedField { .. }));
        assert_eq!(reader.read_frame().unwrap().get("HCHC"), Some("002815713"));
    }
}
