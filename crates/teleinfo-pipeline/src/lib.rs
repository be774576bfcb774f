//! Reader/publisher pipeline.
//!
//! Two threads joined by one FIFO handoff channel: the reader decodes frames from
//! the byte stream and sends them, the publisher receives them and publishes one
//! message per field. Nothing else is shared between them.

pub mod channel;
pub mod error;
pub mod pipeline;
pub mod publisher;
pub mod reader;
pub mod shutdown;

pub use channel::{handoff, FrameReceiver, FrameSender};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineConfig, PipelineHandle, PipelineReport};
pub use publisher::{run_publisher, topic_for, PublishStats, DEFAULT_TOPIC_PREFIX};
pub use reader::{run_reader, ReaderExit};
pub use shutdown::ShutdownToken;

#[cfg(test)]
mod testing;
