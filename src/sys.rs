//! C-ABI declarations for the native engine boundary.
//!
//! The engine consumes a fixed-layout parameter structure and reports results
//! through three function pointers installed into it. Everything here mirrors
//! that contract one to one; ownership of the string and user-data pointers
//! lives in the safe wrappers ([`crate::params::FullParams`] and the callback
//! bridge), never in this module.

use std::os::raw::{c_char, c_int, c_void};
use std::ptr;

/// Greedy (single-pass) decoding.
pub const SAMPLING_GREEDY: c_int = 0;
/// Beam-search decoding.
pub const SAMPLING_BEAM_SEARCH: c_int = 1;

/// One segment as handed over by the engine inside a new-segment callback.
///
/// `t0`/`t1` are in hundredths of a second; `text` points at a NUL-terminated
/// buffer owned by the engine and valid only for the duration of the call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawSegmentData {
    pub t0: i64,
    pub t1: i64,
    pub text: *const c_char,
}

/// Invoked whenever the engine commits newly decoded segments.
///
/// `segments` points at the batch of `n_new` entries; `n_total` is the total
/// segment count after the batch was appended.
pub type NewSegmentCallback = unsafe extern "C" fn(
    segments: *const RawSegmentData,
    n_total: c_int,
    n_new: c_int,
    user_data: *mut c_void,
);

/// Invoked with the engine's decode progress as an integer percentage.
pub type ProgressCallback = unsafe extern "C" fn(progress: c_int, user_data: *mut c_void);

/// Polled before each encoder pass; returning `false` aborts the run.
pub type EncoderBeginCallback = unsafe extern "C" fn(user_data: *mut c_void) -> bool;

/// The engine's parameter structure.
///
/// Plain value fields are copied by the engine when a run starts. The
/// `language` pointer and the user-data slots are read for the whole duration
/// of the run and must stay valid until it returns.
#[repr(C)]
pub struct RawParams {
    pub strategy: c_int,
    pub n_threads: c_int,
    pub translate: bool,
    pub no_context: bool,
    pub single_segment: bool,
    pub print_progress: bool,
    pub print_timestamps: bool,
    pub token_timestamps: bool,
    pub max_len: c_int,
    pub max_tokens: c_int,
    pub temperature: f32,
    pub no_speech_thold: f32,
    pub suppress_blank: bool,
    pub language: *const c_char,

    pub greedy_best_of: c_int,
    pub beam_size: c_int,
    pub beam_patience: f32,

    pub new_segment_callback: Option<NewSegmentCallback>,
    pub new_segment_callback_user_data: *mut c_void,
    pub progress_callback: Option<ProgressCallback>,
    pub progress_callback_user_data: *mut c_void,
    pub encoder_begin_callback: Option<EncoderBeginCallback>,
    pub encoder_begin_callback_user_data: *mut c_void,
}

impl Default for RawParams {
    fn default() -> Self {
        Self {
            strategy: SAMPLING_GREEDY,
            n_threads: 0,
            translate: false,
            no_context: true,
            single_segment: false,
            print_progress: false,
            print_timestamps: false,
            token_timestamps: false,
            max_len: 0,
            max_tokens: 0,
            temperature: 0.0,
            no_speech_thold: 0.6,
            suppress_blank: true,
            language: ptr::null(),
            greedy_best_of: 1,
            beam_size: 5,
            beam_patience: -1.0,
            new_segment_callback: None,
            new_segment_callback_user_data: ptr::null_mut(),
            progress_callback: None,
            progress_callback_user_data: ptr::null_mut(),
            encoder_begin_callback: None,
            encoder_begin_callback_user_data: ptr::null_mut(),
        }
    }
}
