//! The seam between the session layer and a concrete inference engine.
//!
//! Engines are opaque: they load a model, run blocking inference over a
//! sample buffer and expose the committed segments by index. Incremental
//! results, progress and cancellation flow exclusively through the callback
//! pointers installed in [`sys::RawParams`](crate::sys::RawParams), which an
//! engine is expected to honor the way the native library does.

#[cfg(feature = "whisper")]
pub mod whisper;

/// One committed segment as read back from the engine, text still undecoded.
///
/// `t0`/`t1` are in hundredths of a second.
#[derive(Debug, Clone)]
pub struct RawSegment {
    pub t0: i64,
    pub t1: i64,
    pub text: Vec<u8>,
}

/// A loaded inference engine.
///
/// `run` blocks the calling thread for the full duration of inference and is
/// not reentrant; the session layer guarantees at most one run at a time per
/// engine. By contract the engine reports no error from a run: a cancelled or
/// failed run simply yields fewer (possibly zero) segments.
pub trait Backend: Send {
    /// Run inference and return the number of committed segments.
    fn run(&mut self, params: &crate::sys::RawParams, samples: &[f32]) -> u32;

    /// Read one committed segment by index from the last run.
    fn segment(&self, index: u32) -> Option<RawSegment>;
}
