use std::io::Read;

use teleinfo_frame::{FrameError, FrameReader};
use tracing::{debug, warn};

use crate::channel::FrameSender;
use crate::shutdown::ShutdownToken;

/// Why the reader loop returned.
#[derive(Debug)]
pub enum ReaderExit {
    /// The shutdown token was triggered.
    Shutdown,
    /// The publisher side of the handoff channel is gone.
    ChannelClosed,
    /// `max_consecutive_errors` decode failures in a row.
    TooManyErrors { errors: u32, last: FrameError },
}

/// Decode frames from `reader` and hand them to `tx` until told to stop.
///
/// A frame that fails to decode is logged and dropped, and the next call
/// resynchronizes on the following STX. There is no backoff. With
/// `max_consecutive_errors` unset the loop only ends on shutdown or when the
/// channel closes; otherwise it also ends after that many failures in a row.
pub fn run_reader<R: Read>(
    reader: &mut FrameReader<R>,
    tx: &FrameSender,
    shutdown: &ShutdownToken,
    max_consecutive_errors: Option<u32>,
) -> ReaderExit {
    let mut consecutive = 0u32;

    loop {
        if shutdown.is_triggered() {
            return ReaderExit::Shutdown;
        }

        match reader.read_frame() {
            Ok(frame) => {
                consecutive = 0;
                debug!(fields = frame.len(), "frame decoded");
                if tx.send(frame).is_err() {
                    return ReaderExit::ChannelClosed;
                }
            }
            Err(err) => {
                consecutive = consecutive.saturating_add(1);
                warn!(%err, consecutive, "error reading teleinfo frame");
                if let Some(limit) = max_consecutive_errors {
                    if consecutive >= limit {
                        return ReaderExit::TooManyErrors {
                            errors: consecutive,
                            last: err,
                        };
                    }
                }
            }
        }
    }
}
