use std::any::Any;
use thiserror::Error;

/// Result type for station pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The OS refused to start a worker thread
    #[error("Failed to spawn thread for {worker}: {source}")]
    Spawn {
        worker: String,
        #[source]
        source: std::io::Error,
    },

    /// A station, merge routine or overflow callback panicked
    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: String, message: String },
}

impl PipelineError {
    /// Build a `WorkerPanicked` error from a thread join payload
    pub(crate) fn panicked(worker: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        PipelineError::WorkerPanicked {
            worker: worker.into(),
            message,
        }
    }
}
