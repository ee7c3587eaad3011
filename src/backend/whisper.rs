//! whisper.cpp engine backed by the `whisper-rs` crate.
//!
//! Translates the session layer's raw parameter structure onto
//! `whisper_rs::FullParams` for each run and forwards the library's progress,
//! segment and abort callbacks into the function pointers installed by the
//! callback bridge.

use std::ffi::{CStr, CString};
use std::os::raw::{c_int, c_void};
use std::path::Path;

use whisper_rs::{
    FullParams, SamplingStrategy, SegmentCallbackData, WhisperContext, WhisperContextParameters,
    WhisperState,
};

use super::{Backend, RawSegment};
use crate::error::WhisperError;
use crate::sys;

/// A loaded whisper.cpp model.
pub struct WhisperBackend {
    _context: WhisperContext,
    state: WhisperState,
}

impl WhisperBackend {
    /// Load a GGML model file. Fails fatally on an unreadable or corrupt
    /// model source.
    pub fn from_file(model_path: &Path) -> Result<Self, WhisperError> {
        let path = model_path.to_str().ok_or_else(|| {
            WhisperError::ModelLoad(format!("model path is not valid UTF-8: {model_path:?}"))
        })?;
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| WhisperError::ModelLoad(e.to_string()))?;
        let state = context
            .create_state()
            .map_err(|e| WhisperError::ModelLoad(e.to_string()))?;
        log::info!("Loaded whisper model from {:?}", model_path);
        Ok(Self {
            _context: context,
            state,
        })
    }

    /// Load a GGML model from an in-memory buffer.
    pub fn from_buffer(buffer: &[u8]) -> Result<Self, WhisperError> {
        let context =
            WhisperContext::new_from_buffer_with_params(buffer, WhisperContextParameters::default())
                .map_err(|e| WhisperError::ModelLoad(e.to_string()))?;
        let state = context
            .create_state()
            .map_err(|e| WhisperError::ModelLoad(e.to_string()))?;
        log::info!("Loaded whisper model from a {} byte buffer", buffer.len());
        Ok(Self {
            _context: context,
            state,
        })
    }

    fn translate_params<'a>(&self, raw: &'a sys::RawParams) -> FullParams<'a, 'a> {
        let strategy = if raw.strategy == sys::SAMPLING_BEAM_SEARCH {
            SamplingStrategy::BeamSearch {
                beam_size: raw.beam_size,
                patience: raw.beam_patience,
            }
        } else {
            SamplingStrategy::Greedy {
                best_of: raw.greedy_best_of,
            }
        };
        let mut params = FullParams::new(strategy);
        params.set_n_threads(raw.n_threads);
        params.set_translate(raw.translate);
        params.set_no_context(raw.no_context);
        params.set_single_segment(raw.single_segment);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_progress(raw.print_progress);
        params.set_print_timestamps(raw.print_timestamps);
        params.set_token_timestamps(raw.token_timestamps);
        params.set_max_len(raw.max_len);
        params.set_max_tokens(raw.max_tokens);
        params.set_temperature(raw.temperature);
        params.set_no_speech_thold(raw.no_speech_thold);
        params.set_suppress_blank(raw.suppress_blank);

        let language = if raw.language.is_null() {
            None
        } else {
            unsafe { CStr::from_ptr(raw.language) }.to_str().ok()
        };
        params.set_language(language);

        if let Some(progress_cb) = raw.progress_callback {
            let user_data = raw.progress_callback_user_data as usize;
            params.set_progress_callback_safe(move |progress: i32| unsafe {
                progress_cb(progress as c_int, user_data as *mut c_void)
            });
        }

        if let Some(encoder_cb) = raw.encoder_begin_callback {
            let user_data = raw.encoder_begin_callback_user_data as usize;
            // whisper-rs asks "should we abort"; the installed callback
            // answers "may we continue".
            params.set_abort_callback_safe(move || unsafe {
                !encoder_cb(user_data as *mut c_void)
            });
        }

        if let Some(segment_cb) = raw.new_segment_callback {
            let user_data = raw.new_segment_callback_user_data as usize;
            params.set_segment_callback_safe(move |data: SegmentCallbackData| {
                let text = match CString::new(data.text) {
                    Ok(text) => text,
                    Err(_) => return,
                };
                let entry = sys::RawSegmentData {
                    t0: data.start_timestamp,
                    t1: data.end_timestamp,
                    text: text.as_ptr(),
                };
                unsafe { segment_cb(&entry, data.segment + 1, 1, user_data as *mut c_void) };
            });
        }

        params
    }
}

impl Backend for WhisperBackend {
    fn run(&mut self, raw: &sys::RawParams, samples: &[f32]) -> u32 {
        let params = self.translate_params(raw);
        if let Err(err) = self.state.full(params, samples) {
            // The session layer treats a run as infallible; an aborted or
            // failed run is reported through its (possibly empty) segments.
            log::error!("whisper inference failed: {err}");
        }
        self.state.full_n_segments().unwrap_or(0).max(0) as u32
    }

    fn segment(&self, index: u32) -> Option<RawSegment> {
        let index = index as c_int;
        let t0 = self.state.full_get_segment_t0(index).ok()?;
        let t1 = self.state.full_get_segment_t1(index).ok()?;
        let text = self.state.full_get_segment_text(index).ok()?;
        Some(RawSegment {
            t0,
            t1,
            text: text.into_bytes(),
        })
    }
}
