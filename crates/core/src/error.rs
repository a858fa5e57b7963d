//! Error types shared across the pipeline crates.

use thiserror::Error;

/// Problems with the loaded statistical models.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("mixture model has no components")]
    Empty,

    #[error("{what}: expected {expected} values, found {found}")]
    Shape {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("covariance of mixture {0} is not positive definite")]
    NotPositiveDefinite(usize),

    #[error("invalid statistic: {0}")]
    InvalidStatistic(String),
}

/// Failures inside an analysis or synthesis stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("invalid stage configuration: {0}")]
    InvalidConfig(String),

    #[error("feature shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors raised by capture and playback devices.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("audio device stream failed: {0}")]
    Stream(String),

    #[error("audio device closed")]
    Closed,
}

/// Queue operations that could not complete.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue '{0}' is disconnected")]
    Disconnected(&'static str),
}

/// Top-level pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("failed to spawn worker '{name}': {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("worker '{0}' panicked")]
    WorkerPanicked(&'static str),

    #[error("worker '{name}' exited while the pipeline was running: {reason}")]
    WorkerExited { name: &'static str, reason: String },

    #[error("pipeline is {0:?}; expected Idle")]
    NotIdle(crate::pipeline::PipelineState),
}
