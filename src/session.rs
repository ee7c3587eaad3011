//! Session orchestration: background execution, cancellation, completion.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use crate::backend::Backend;
use crate::bridge::{self, CompletionFn, Event, KeepAlive, Shared};
use crate::error::WhisperError;
use crate::params::FullParams;
use crate::{Segment, WhisperDelegate};

/// A transcription session over one loaded engine.
///
/// The session owns the engine handle and its parameter set for its whole
/// lifetime. At most one transcription is in flight at a time; a second
/// `transcribe` call is rejected with [`WhisperError::AlreadyRunning`] until
/// the previous run's completion has been delivered. Inference runs on a
/// background worker thread, and every delegate or completion callback is
/// invoked on the session's single notifier thread, in order.
///
/// ```ignore
/// use whisper_session::{FullParams, SamplingStrategy, WhisperSession};
///
/// let params = FullParams::new(SamplingStrategy::default());
/// let session = WhisperSession::from_file("models/ggml-base.en.bin".as_ref(), params, ())?;
/// let segments = session.transcribe_blocking(samples)?;
/// for segment in &segments {
///     println!("[{} ms - {} ms] {}", segment.start_ms, segment.end_ms, segment.text);
/// }
/// # Ok::<(), whisper_session::WhisperError>(())
/// ```
pub struct WhisperSession<B: Backend> {
    engine: Arc<Mutex<B>>,
    params: Arc<Mutex<FullParams>>,
    shared: Arc<Shared>,
    _keep_alive: KeepAlive,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn validate_samples(samples: &[f32]) -> Result<(), WhisperError> {
    if samples.is_empty() {
        return Err(WhisperError::InvalidInput("empty sample buffer".into()));
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(WhisperError::InvalidInput(
            "sample buffer contains non-finite values".into(),
        ));
    }
    Ok(())
}

impl<B: Backend + 'static> WhisperSession<B> {
    /// Wrap a loaded engine, wiring the callback bridge into `params` and
    /// spawning the notifier thread that will drive `delegate`.
    pub fn new<D>(engine: B, mut params: FullParams, delegate: D) -> Result<Self, WhisperError>
    where
        D: WhisperDelegate + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::new(tx));
        let keep_alive = bridge::install(&mut params, &shared);

        let weak = Arc::downgrade(&shared);
        thread::Builder::new()
            .name("whisper-notify".into())
            .spawn(move || bridge::notifier_loop(rx, weak, Box::new(delegate)))?;

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            params: Arc::new(Mutex::new(params)),
            shared,
            _keep_alive: keep_alive,
        })
    }

    /// Transcribe `samples`, delivering the result through `on_complete`.
    ///
    /// Returns immediately after dispatching the run to a worker thread.
    /// Exactly one terminal notification is delivered per accepted call:
    /// either `on_complete(Ok(segments))` (also `delegate.on_complete`) or,
    /// for failures injected by this layer, `on_complete(Err(..))` (also
    /// `delegate.on_error`). A run interrupted by [`stop`](Self::stop)
    /// completes normally with the segments produced so far.
    pub fn transcribe<F>(&self, samples: Vec<f32>, on_complete: F) -> Result<(), WhisperError>
    where
        F: FnOnce(Result<Vec<Segment>, WhisperError>) + Send + 'static,
    {
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(WhisperError::AlreadyRunning);
        }
        let on_complete: CompletionFn = Box::new(on_complete);

        if let Err(err) = validate_samples(&samples) {
            // Surfaced through the notification path so the caller sees
            // exactly one terminal event, never a truncated success.
            self.shared.send(Event::Finished {
                outcome: Err(err),
                on_complete: Some(on_complete),
            });
            return Ok(());
        }

        self.shared.running.store(true, Ordering::SeqCst);

        let engine = Arc::clone(&self.engine);
        let params = Arc::clone(&self.params);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("whisper-run".into())
            .spawn(move || {
                let started = Instant::now();
                let segments = {
                    let mut engine = lock(&engine);
                    let params = lock(&params);
                    let count = engine.run(params.as_raw(), &samples);
                    log::debug!(
                        "inference produced {} segments in {:?}",
                        count,
                        started.elapsed()
                    );

                    let mut segments = Vec::with_capacity(count as usize);
                    for index in 0..count {
                        match engine.segment(index) {
                            Some(raw) => match bridge::decode_segment(&raw) {
                                Some(segment) => segments.push(segment),
                                None => {
                                    log::warn!("skipping segment {index}: text is not valid UTF-8")
                                }
                            },
                            None => log::warn!("segment {index} missing from engine readback"),
                        }
                    }
                    segments
                };
                shared.running.store(false, Ordering::SeqCst);
                shared.send(Event::Finished {
                    outcome: Ok(segments),
                    on_complete: Some(on_complete),
                });
            });

        if let Err(err) = spawned {
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.in_flight.store(false, Ordering::SeqCst);
            return Err(WhisperError::Worker(err));
        }
        Ok(())
    }

    /// Blocking adapter over [`transcribe`](Self::transcribe): waits for the
    /// single completion and returns its segment list.
    pub fn transcribe_blocking(&self, samples: Vec<f32>) -> Result<Vec<Segment>, WhisperError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.transcribe(samples, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        rx.recv().map_err(|_| WhisperError::SessionClosed)?
    }

    /// Request cancellation of the in-flight run.
    ///
    /// Non-blocking and best-effort: the engine observes the request on its
    /// next cancellation poll, so termination latency is unbounded. A no-op
    /// when nothing is running.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Whether a run is currently executing inside the engine.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Access the parameter set. Blocks while a run holds it.
    pub fn with_params<R>(&self, f: impl FnOnce(&mut FullParams) -> R) -> R {
        f(&mut lock(&self.params))
    }
}

impl<B: Backend> Drop for WhisperSession<B> {
    fn drop(&mut self) {
        log::debug!("dropping whisper session");
    }
}

#[cfg(feature = "whisper")]
impl WhisperSession<crate::backend::whisper::WhisperBackend> {
    /// Load a model from a GGML file and wrap it in a session.
    pub fn from_file<D>(
        model_path: &std::path::Path,
        params: FullParams,
        delegate: D,
    ) -> Result<Self, WhisperError>
    where
        D: WhisperDelegate + 'static,
    {
        let engine = crate::backend::whisper::WhisperBackend::from_file(model_path)?;
        Self::new(engine, params, delegate)
    }

    /// Load a model from an in-memory GGML buffer and wrap it in a session.
    pub fn from_buffer<D>(
        buffer: &[u8],
        params: FullParams,
        delegate: D,
    ) -> Result<Self, WhisperError>
    where
        D: WhisperDelegate + 'static,
    {
        let engine = crate::backend::whisper::WhisperBackend::from_buffer(buffer)?;
        Self::new(engine, params, delegate)
    }
}
