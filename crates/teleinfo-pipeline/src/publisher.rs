use teleinfo_bus::Publish;
use teleinfo_frame::Frame;
use tracing::{debug, warn};

use crate::channel::FrameReceiver;
use crate::shutdown::ShutdownToken;

/// Topic prefix under which every field is published.
pub const DEFAULT_TOPIC_PREFIX: &str = "teleinfo";

/// Counters reported when the publisher loop returns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Frames received from the channel.
    pub frames: u64,
    /// Fields handed to the bus.
    pub published: u64,
    /// Fields the bus refused.
    pub failed: u64,
}

/// Topic for field `name`: `<prefix>/<name>`.
pub fn topic_for(prefix: &str, name: &str) -> String {
    format!("{prefix}/{name}")
}

/// Drain frames from `rx` and publish one message per field.
///
/// Fields are published in frame order. A failed publish is logged and the loop
/// moves on to the next field. Returns when the channel is closed, or when the
/// shutdown token is seen after a receive (the frame in hand is then dropped).
pub fn run_publisher<P: Publish + ?Sized>(
    rx: &FrameReceiver,
    publisher: &P,
    topic_prefix: &str,
    shutdown: &ShutdownToken,
) -> PublishStats {
    let mut stats = PublishStats::default();

    while let Some(frame) = rx.recv() {
        if shutdown.is_triggered() {
            debug!("shutdown requested, dropping in-flight frame");
            break;
        }
        publish_frame(&frame, publisher, topic_prefix, &mut stats);
    }

    stats
}

fn publish_frame<P: Publish + ?Sized>(
    frame: &Frame,
    publisher: &P,
    topic_prefix: &str,
    stats: &mut PublishStats,
) {
    stats.frames += 1;
    for (name, value) in frame.iter() {
        let topic = topic_for(topic_prefix, name);
        match publisher.publish(&topic, value) {
            Ok(()) => stats.published += 1,
            Err(err) => {
                stats.failed += 1;
                warn!(%topic, %err, "publish failed");
            }
        }
    }
}
