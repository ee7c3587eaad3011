//! Error types for session construction, configuration and transcription.

use thiserror::Error;

/// Errors surfaced by the session layer.
///
/// Cancellation is deliberately not represented here: a stopped run completes
/// normally with whatever segments the engine produced before it honored the
/// stop signal.
#[derive(Debug, Error)]
pub enum WhisperError {
    /// The model source could not be parsed. Fatal: no session is produced.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// A native string field or segment text was not valid UTF-8.
    ///
    /// For segment text this is recovered locally (the segment is skipped);
    /// for required fields such as the language code it propagates.
    #[error("native string is not valid text: {0}")]
    Decode(String),

    /// `transcribe` was called while a previous run's completion had not yet
    /// been delivered. Rejected synchronously, never queued.
    #[error("a transcription is already in flight on this session")]
    AlreadyRunning,

    /// The sample buffer was rejected before reaching the engine.
    #[error("invalid input samples: {0}")]
    InvalidInput(String),

    /// A string value destined for a native field contained an interior NUL.
    #[error("string value contains an interior NUL byte")]
    InteriorNul(#[from] std::ffi::NulError),

    /// The notification thread went away before the completion was delivered.
    #[error("session shut down before the completion was delivered")]
    SessionClosed,

    /// The background worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Worker(#[from] std::io::Error),
}
