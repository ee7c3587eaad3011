//! # whisper-session
//!
//! A thread-safe session layer over whisper.cpp style speech-to-text engines.
//! The engine itself is an opaque collaborator behind the [`Backend`] trait;
//! this crate owns the boundary around it:
//!
//! - **Safe parameter mirroring**: [`FullParams`] wraps the engine's
//!   fixed-layout parameter structure and owns every heap string it injects
//!   into it, with named getter/setter pairs for each tuning knob.
//! - **Callback bridging**: native callbacks fired from engine threads are
//!   converted into ordered [`WhisperDelegate`] notifications, all delivered
//!   on one notification thread per session.
//! - **Background execution**: [`WhisperSession::transcribe`] runs the
//!   blocking native call on a worker thread and delivers exactly one
//!   completion per run; [`WhisperSession::transcribe_blocking`] is a thin
//!   awaitable adapter over it.
//! - **Cooperative cancellation**: [`WhisperSession::stop`] flips a flag the
//!   engine polls; an interrupted run completes normally with the segments
//!   produced so far.
//!
//! ## Features
//!
//! The real engine is gated behind a cargo feature:
//!
//! ```toml
//! [dependencies]
//! whisper-session = { version = "0.1", features = ["whisper"] }
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use whisper_session::{FullParams, SamplingStrategy, Segment, WhisperSession};
//!
//! struct Printer;
//!
//! impl whisper_session::WhisperDelegate for Printer {
//!     fn on_new_segments(&mut self, segments: &[Segment], start_index: usize) {
//!         for (i, segment) in segments.iter().enumerate() {
//!             println!("#{}: {}", start_index + i, segment.text);
//!         }
//!     }
//! }
//!
//! let mut params = FullParams::new(SamplingStrategy::default());
//! params.set_language("en")?;
//!
//! let session = WhisperSession::from_file("models/ggml-base.en.bin".as_ref(), params, Printer)?;
//! let segments = session.transcribe_blocking(samples)?;
//! # Ok::<(), whisper_session::WhisperError>(())
//! ```
//!
//! ## Audio requirements
//!
//! Runs consume mono `f32` samples at the engine's fixed expected sample rate
//! (16 kHz for whisper.cpp). Capturing or decoding audio into that shape is
//! out of scope for this crate.

pub mod backend;
mod bridge;
pub mod error;
pub mod params;
pub mod session;
pub mod sys;

pub use backend::{Backend, RawSegment};
pub use error::WhisperError;
pub use params::{FullParams, SamplingStrategy};
pub use session::WhisperSession;

#[cfg(feature = "whisper")]
pub use backend::whisper::WhisperBackend;

/// One timestamped unit of recognized text.
///
/// Times are in milliseconds from the start of the audio (the engine reports
/// hundredths of a second; the bridge scales by ten).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
}

/// Observer for a session's notifications.
///
/// All methods are invoked on the session's single notification thread, in
/// order, and default to no-ops. Exactly one of `on_complete`/`on_error`
/// fires per accepted transcription.
pub trait WhisperDelegate: Send {
    /// Advisory decode progress in `0.0..=1.0`.
    fn on_progress(&mut self, _progress: f64) {}

    /// A batch of newly committed segments; `start_index` is the index of
    /// the first one in the full transcript.
    fn on_new_segments(&mut self, _segments: &[Segment], _start_index: usize) {}

    /// The run finished; `segments` is the full final list.
    fn on_complete(&mut self, _segments: &[Segment]) {}

    /// The run failed before reaching the engine.
    fn on_error(&mut self, _error: &WhisperError) {}
}

/// For callers that only need the return value of a blocking transcription.
impl WhisperDelegate for () {}
