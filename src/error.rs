//! Error types for face-queue.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// A submission payload that cannot be searched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No image provided")]
    Missing,

    #[error("Image is not valid base64: {0}")]
    Malformed(String),

    #[error("Unsupported image type (expected JPEG or PNG)")]
    UnsupportedFormat,
}

/// Failures talking to the recognition service.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Request to recognition service failed: {0}")]
    Request(String),

    #[error("Recognition service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unparsable response from recognition service: {0}")]
    InvalidResponse(String),

    #[error("Recognition service timed out after {0:?}")]
    Timeout(Duration),
}

/// Rejected queue control requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid index {index}: queue holds {len} pending job(s)")]
    InvalidIndex { index: usize, len: usize },
}

/// Job lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} already in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },

    #[error("Job {id} faulted: {reason}")]
    Fault { id: Uuid, reason: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
