use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// The failure side of a job result.
///
/// Errors returned by a job function and panics raised inside it both end up
/// here; neither is ever propagated to the worker that ran the job.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),

    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Build a `Panicked` error from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        JobError::Panicked(panic_message(payload.as_ref()))
    }

    /// The underlying error when the job function returned one.
    pub fn as_anyhow(&self) -> Option<&anyhow::Error> {
        match self {
            JobError::Failed(err) => Some(err),
            JobError::Panicked(_) => None,
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Failed(Arc::new(err))
    }
}

/// Text of a `catch_unwind` payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// `success(value) | failure(error)` for a finished job.
pub type JobResult<T> = Result<T, JobError>;
