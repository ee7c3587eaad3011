//! Bridges native engine callbacks into ordered delegate notifications.
//!
//! Native callbacks fire on whatever thread the engine runs inference on.
//! The trampolines in this module only touch [`Shared`] (atomics and a
//! channel send); every delegate and completion call is made by one dedicated
//! notifier thread per session consuming the channel in order, so observers
//! see strictly ordered notifications on a single context.
//!
//! The engine reaches [`Shared`] through an opaque user-data pointer. That
//! pointer is backed by [`KeepAlive`], an explicit strong reference created
//! at wiring time: as long as the token (or a worker's own `Arc`) is alive,
//! the pointer stays valid, and dropping the token releases exactly one
//! reference.

use std::ffi::CStr;
use std::os::raw::{c_int, c_void};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};

use crate::backend::RawSegment;
use crate::error::WhisperError;
use crate::params::FullParams;
use crate::sys;
use crate::{Segment, WhisperDelegate};

pub(crate) type CompletionFn = Box<dyn FnOnce(Result<Vec<Segment>, WhisperError>) + Send>;

pub(crate) enum Event {
    Progress(f64),
    NewSegments {
        start_index: usize,
        segments: Vec<Segment>,
    },
    Finished {
        outcome: Result<Vec<Segment>, WhisperError>,
        on_complete: Option<CompletionFn>,
    },
}

/// Per-session state reachable from native callbacks.
pub(crate) struct Shared {
    /// Cooperative cancellation flag polled by the encoder-begin callback.
    pub(crate) running: AtomicBool,
    /// Guards the session against overlapping runs; cleared by the notifier
    /// thread once a run's completion has been delivered.
    pub(crate) in_flight: AtomicBool,
    tx: Sender<Event>,
}

impl Shared {
    pub(crate) fn new(tx: Sender<Event>) -> Self {
        Self {
            running: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            tx,
        }
    }

    pub(crate) fn send(&self, event: Event) {
        // The notifier going away early only happens on teardown; events are
        // dropped then.
        let _ = self.tx.send(event);
    }
}

/// One strong reference to [`Shared`], held for as long as native callbacks
/// may fire into it.
pub(crate) struct KeepAlive {
    ptr: *const Shared,
}

// The pointer is an `Arc::into_raw` of a Send + Sync value.
unsafe impl Send for KeepAlive {}

impl KeepAlive {
    fn user_data(&self) -> *mut c_void {
        self.ptr as *mut c_void
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        // Reclaim the reference taken by `install`.
        unsafe { drop(Arc::from_raw(self.ptr)) };
    }
}

/// Wire all three trampolines into `params`, sharing one keep-alive token.
///
/// Replacing a previously returned token drops the old reference only after
/// the slots point at the new one, so at most one outstanding token exists
/// per session at any time.
pub(crate) fn install(params: &mut FullParams, shared: &Arc<Shared>) -> KeepAlive {
    let token = KeepAlive {
        ptr: Arc::into_raw(Arc::clone(shared)),
    };
    let raw = params.raw_mut();
    raw.new_segment_callback = Some(new_segment_trampoline);
    raw.new_segment_callback_user_data = token.user_data();
    raw.progress_callback = Some(progress_trampoline);
    raw.progress_callback_user_data = token.user_data();
    raw.encoder_begin_callback = Some(encoder_begin_trampoline);
    raw.encoder_begin_callback_user_data = token.user_data();
    token
}

/// Decode one raw segment, converting hundredths of a second to
/// milliseconds. `None` if the text is not valid UTF-8.
pub(crate) fn decode_segment(raw: &RawSegment) -> Option<Segment> {
    let text = std::str::from_utf8(&raw.text).ok()?;
    Some(Segment {
        start_ms: raw.t0 * 10,
        end_ms: raw.t1 * 10,
        text: text.to_owned(),
    })
}

unsafe extern "C" fn new_segment_trampoline(
    segments: *const sys::RawSegmentData,
    n_total: c_int,
    n_new: c_int,
    user_data: *mut c_void,
) {
    if user_data.is_null() || segments.is_null() || n_new <= 0 || n_new > n_total {
        return;
    }
    let shared = &*(user_data as *const Shared);
    let batch = std::slice::from_raw_parts(segments, n_new as usize);
    let start_index = (n_total - n_new) as usize;

    let mut decoded = Vec::with_capacity(batch.len());
    for data in batch {
        if data.text.is_null() {
            continue;
        }
        let raw = RawSegment {
            t0: data.t0,
            t1: data.t1,
            text: CStr::from_ptr(data.text).to_bytes().to_vec(),
        };
        match decode_segment(&raw) {
            Some(segment) => decoded.push(segment),
            None => log::warn!("skipping new segment with invalid UTF-8 text"),
        }
    }
    shared.send(Event::NewSegments {
        start_index,
        segments: decoded,
    });
}

unsafe extern "C" fn progress_trampoline(progress: c_int, user_data: *mut c_void) {
    if user_data.is_null() {
        return;
    }
    let shared = &*(user_data as *const Shared);
    shared.send(Event::Progress(f64::from(progress) / 100.0));
}

unsafe extern "C" fn encoder_begin_trampoline(user_data: *mut c_void) -> bool {
    if user_data.is_null() {
        return false;
    }
    let shared = &*(user_data as *const Shared);
    shared.running.load(Ordering::SeqCst)
}

/// Runs on the per-session notifier thread until every sender is gone.
pub(crate) fn notifier_loop(
    rx: Receiver<Event>,
    shared: Weak<Shared>,
    mut delegate: Box<dyn WhisperDelegate>,
) {
    while let Ok(event) = rx.recv() {
        match event {
            Event::Progress(progress) => delegate.on_progress(progress),
            Event::NewSegments {
                start_index,
                segments,
            } => delegate.on_new_segments(&segments, start_index),
            Event::Finished {
                outcome,
                on_complete,
            } => {
                match &outcome {
                    Ok(segments) => delegate.on_complete(segments),
                    Err(err) => delegate.on_error(err),
                }
                // The next transcribe call becomes admissible once the
                // delegate has observed this run's completion.
                if let Some(shared) = shared.upgrade() {
                    shared.in_flight.store(false, Ordering::SeqCst);
                }
                if let Some(callback) = on_complete {
                    callback(outcome);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SamplingStrategy;
    use std::ffi::CString;

    fn wired_params() -> (FullParams, Arc<Shared>, Receiver<Event>, KeepAlive) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::new(tx));
        let mut params = FullParams::new(SamplingStrategy::default());
        let token = install(&mut params, &shared);
        (params, shared, rx, token)
    }

    fn fire_new_segments(params: &FullParams, entries: &[(i64, i64, &[u8])], n_total: c_int) {
        let texts: Vec<CString> = entries
            .iter()
            .map(|(_, _, t)| CString::new(t.to_vec()).unwrap())
            .collect();
        let batch: Vec<sys::RawSegmentData> = entries
            .iter()
            .zip(&texts)
            .map(|((t0, t1, _), text)| sys::RawSegmentData {
                t0: *t0,
                t1: *t1,
                text: text.as_ptr(),
            })
            .collect();
        let raw = params.as_raw();
        let callback = raw.new_segment_callback.unwrap();
        unsafe {
            callback(
                batch.as_ptr(),
                n_total,
                batch.len() as c_int,
                raw.new_segment_callback_user_data,
            )
        };
    }

    #[test]
    fn keep_alive_holds_exactly_one_reference() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::new(tx));
        assert_eq!(Arc::strong_count(&shared), 1);

        let mut params = FullParams::default();
        let token = install(&mut params, &shared);
        assert_eq!(Arc::strong_count(&shared), 2);

        // Re-wiring replaces the token; the old reference is released.
        let token2 = install(&mut params, &shared);
        drop(token);
        assert_eq!(Arc::strong_count(&shared), 2);

        drop(token2);
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn new_segment_batch_is_decoded_and_scaled() {
        let (params, _shared, rx, _token) = wired_params();
        fire_new_segments(&params, &[(12, 34, b"hello"), (34, 56, b" world")], 5);

        match rx.try_recv().unwrap() {
            Event::NewSegments {
                start_index,
                segments,
            } => {
                assert_eq!(start_index, 3);
                assert_eq!(segments.len(), 2);
                assert_eq!(segments[0].start_ms, 120);
                assert_eq!(segments[0].end_ms, 340);
                assert_eq!(segments[0].text, "hello");
                assert_eq!(segments[1].text, " world");
            }
            _ => panic!("expected a new-segments event"),
        }
    }

    #[test]
    fn invalid_utf8_segment_is_skipped_not_fatal() {
        let (params, _shared, rx, _token) = wired_params();
        fire_new_segments(
            &params,
            &[(0, 10, b"ok"), (10, 20, &[0xff, 0xfe]), (20, 30, b"fine")],
            3,
        );

        match rx.try_recv().unwrap() {
            Event::NewSegments { segments, .. } => {
                let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
                assert_eq!(texts, ["ok", "fine"]);
            }
            _ => panic!("expected a new-segments event"),
        }
    }

    #[test]
    fn progress_is_reported_as_fraction() {
        let (params, _shared, rx, _token) = wired_params();
        let raw = params.as_raw();
        let callback = raw.progress_callback.unwrap();
        unsafe { callback(50, raw.progress_callback_user_data) };

        match rx.try_recv().unwrap() {
            Event::Progress(p) => assert!((p - 0.5).abs() < 1e-9),
            _ => panic!("expected a progress event"),
        }
    }

    #[test]
    fn encoder_begin_mirrors_running_flag() {
        let (params, shared, _rx, _token) = wired_params();
        let raw = params.as_raw();
        let callback = raw.encoder_begin_callback.unwrap();

        shared.running.store(true, Ordering::SeqCst);
        assert!(unsafe { callback(raw.encoder_begin_callback_user_data) });

        shared.running.store(false, Ordering::SeqCst);
        assert!(!unsafe { callback(raw.encoder_begin_callback_user_data) });
    }

    #[test]
    fn sessions_do_not_cross_deliver() {
        let (params_a, _shared_a, rx_a, _token_a) = wired_params();
        let (_params_b, _shared_b, rx_b, _token_b) = wired_params();

        fire_new_segments(&params_a, &[(0, 1, b"a")], 1);

        assert!(matches!(
            rx_a.try_recv().unwrap(),
            Event::NewSegments { .. }
        ));
        assert!(rx_b.try_recv().is_err());
    }
}
