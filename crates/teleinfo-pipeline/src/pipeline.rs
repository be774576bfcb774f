use std::io::Read;
use std::thread::{self, JoinHandle};

use teleinfo_bus::Publish;
use teleinfo_frame::FrameReader;
use tracing::info;

use crate::channel::handoff;
use crate::error::{PipelineError, Result};
use crate::publisher::{run_publisher, PublishStats, DEFAULT_TOPIC_PREFIX};
use crate::reader::{run_reader, ReaderExit};
use crate::shutdown::ShutdownToken;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Prefix of every published topic. Default: `teleinfo`.
    pub topic_prefix: String,
    /// Handoff queue bound; `None` is unbounded. Default: `None`.
    pub queue_capacity: Option<usize>,
    /// Stop reading after this many decode failures in a row; `None` retries forever.
    /// Default: `None`.
    pub max_consecutive_errors: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            queue_capacity: None,
            max_consecutive_errors: None,
        }
    }
}

/// Everything the two pipeline threads need, owned in one place.
///
/// The byte stream goes to the reader thread, the publisher to the publisher
/// thread; the handoff channel between them is created by [`Pipeline::spawn`].
pub struct Pipeline<R, P> {
    reader: FrameReader<R>,
    publisher: P,
    config: PipelineConfig,
    shutdown: ShutdownToken,
}

impl<R, P> Pipeline<R, P>
where
    R: Read + Send + 'static,
    P: Publish + 'static,
{
    pub fn new(reader: FrameReader<R>, publisher: P) -> Self {
        Self {
            reader,
            publisher,
            config: PipelineConfig::default(),
            shutdown: ShutdownToken::new(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown(mut self, shutdown: ShutdownToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Start the publisher thread, then the reader thread.
    pub fn spawn(self) -> Result<PipelineHandle> {
        let Pipeline {
            mut reader,
            publisher,
            config,
            shutdown,
        } = self;
        let (tx, rx) = handoff(config.queue_capacity);

        let publisher_shutdown = shutdown.clone();
        let topic_prefix = config.topic_prefix;
        let publisher_thread = thread::Builder::new()
            .name("teleinfo-publisher".to_string())
            .spawn(move || {
                let stats = run_publisher(&rx, &publisher, &topic_prefix, &publisher_shutdown);
                info!(
                    frames = stats.frames,
                    published = stats.published,
                    failed = stats.failed,
                    "publisher loop stopped"
                );
                stats
            })
            .map_err(|source| PipelineError::Spawn {
                role: "publisher",
                source,
            })?;

        let reader_shutdown = shutdown.clone();
        let max_consecutive_errors = config.max_consecutive_errors;
        let reader_thread = thread::Builder::new()
            .name("teleinfo-reader".to_string())
            .spawn(move || {
                let exit = run_reader(&mut reader, &tx, &reader_shutdown, max_consecutive_errors);
                info!(?exit, "reader loop stopped");
                exit
            })
            .map_err(|source| PipelineError::Spawn {
                role: "reader",
                source,
            })?;

        info!(
            queue_capacity = ?config.queue_capacity,
            max_consecutive_errors = ?max_consecutive_errors,
            "pipeline started"
        );

        Ok(PipelineHandle {
            reader: reader_thread,
            publisher: publisher_thread,
            shutdown,
        })
    }
}

/// How each pipeline thread ended.
#[derive(Debug)]
pub struct PipelineReport {
    pub reader: ReaderExit,
    pub publisher: PublishStats,
}

/// Handle on the running reader and publisher threads.
#[derive(Debug)]
pub struct PipelineHandle {
    reader: JoinHandle<ReaderExit>,
    publisher: JoinHandle<PublishStats>,
    shutdown: ShutdownToken,
}

impl PipelineHandle {
    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.shutdown
    }

    /// Ask both loops to stop at their next check. Does not wait.
    pub fn request_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Whether both threads have returned.
    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.publisher.is_finished()
    }

    /// Wait for both threads.
    ///
    /// Blocks for as long as the reader is blocked on its byte stream.
    pub fn join(self) -> Result<PipelineReport> {
        let reader = self
            .reader
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("reader"))?;
        let publisher = self
            .publisher
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("publisher"))?;
        Ok(PipelineReport { reader, publisher })
    }
}
