/// Errors that can occur while starting or joining the pipeline threads.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The OS refused to start a pipeline thread.
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: &'static str,
        source: std::io::Error,
    },

    /// A pipeline thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
