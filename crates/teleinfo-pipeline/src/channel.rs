//! Handoff channel between the reader and the publisher.

use std::sync::mpsc::{self, Receiver, SendError, Sender, SyncSender};

use teleinfo_frame::Frame;

/// Create the handoff channel.
///
/// `None` gives an unbounded queue: the reader never waits, and a stalled publisher
/// lets frames pile up in memory. `Some(n)` bounds the queue to `n` frames and makes
/// the reader wait when it is full (`Some(0)` is a rendezvous: every send waits for
/// the matching receive).
pub fn handoff(capacity: Option<usize>) -> (FrameSender, FrameReceiver) {
    let (sender, inner) = match capacity {
        None => {
            let (tx, rx) = mpsc::channel();
            (SenderKind::Unbounded(tx), rx)
        }
        Some(bound) => {
            let (tx, rx) = mpsc::sync_channel(bound);
            (SenderKind::Bounded(tx), rx)
        }
    };
    (FrameSender { inner: sender }, FrameReceiver { inner })
}

enum SenderKind {
    Unbounded(Sender<Frame>),
    Bounded(SyncSender<Frame>),
}

/// Producer side, owned by the reader thread.
pub struct FrameSender {
    inner: SenderKind,
}

impl FrameSender {
    /// Hand a frame over. Fails, returning the frame, once the receiver is gone.
    pub fn send(&self, frame: Frame) -> Result<(), SendError<Frame>> {
        match &self.inner {
            SenderKind::Unbounded(tx) => tx.send(frame),
            SenderKind::Bounded(tx) => tx.send(frame),
        }
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self.inner, SenderKind::Bounded(_))
    }
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender")
            .field("bounded", &self.is_bounded())
            .finish()
    }
}

/// Consumer side, owned by the publisher thread.
#[derive(Debug)]
pub struct FrameReceiver {
    inner: Receiver<Frame>,
}

impl FrameReceiver {
    /// Wait for the next frame. `None` once the sender is dropped and the queue drained.
    pub fn recv(&self) -> Option<Frame> {
        self.inner.recv().ok()
    }
}
