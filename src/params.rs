//! Inference parameters and their native mirror.
//!
//! [`FullParams`] wraps the engine's fixed-layout [`sys::RawParams`] and keeps
//! every heap string it injects into that structure owned on the Rust side.
//! Plain value fields are exposed through generated getter/setter pairs, so
//! each native tuning knob is reachable without any reflection.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use crate::error::WhisperError;
use crate::sys;

/// Language installed by [`FullParams::new`]; lets the engine autodetect.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Decoding strategy, chosen once at construction.
///
/// Greedy is the low-latency single-pass option; beam search trades latency
/// for accuracy.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    /// Greedy decoding evaluating `best_of` candidate tokens per step.
    Greedy { best_of: i32 },
    /// Beam search with `beam_size` parallel beams.
    BeamSearch { beam_size: i32, patience: f32 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Greedy { best_of: 1 }
    }
}

/// Number of inference threads: available parallelism minus two for the rest
/// of the process, clamped to `[1, 8]`.
fn default_threads() -> c_int {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    cores.saturating_sub(2).clamp(1, 8) as c_int
}

/// Owns the allocation behind one `*const c_char` field of the native struct.
///
/// Replacement installs the new buffer into the native slot before the old
/// allocation is dropped, so the field never points at freed memory. At most
/// one allocation is owned at a time and dropping the owner frees it.
#[derive(Default)]
struct OwnedCStr {
    owned: Option<CString>,
}

impl OwnedCStr {
    fn install(&mut self, value: &str, slot: &mut *const c_char) -> Result<(), WhisperError> {
        let fresh = CString::new(value)?;
        *slot = fresh.as_ptr();
        // Dropping the previous buffer only happens here, after the slot
        // already points at the new one.
        self.owned = Some(fresh);
        Ok(())
    }
}

/// Safe wrapper around the engine's parameter structure.
pub struct FullParams {
    raw: sys::RawParams,
    owned_language: OwnedCStr,
}

// `raw.language` points into the CString held by `owned_language`, which
// moves with the struct; the user-data slots hold Arc-backed pointers managed
// by the callback bridge. Nothing in `raw` is tied to the current thread.
unsafe impl Send for FullParams {}

macro_rules! field_accessors {
    ($($(#[$meta:meta])* $getter:ident / $setter:ident: $field:ident as $ty:ty;)*) => {
        $(
            $(#[$meta])*
            #[inline]
            pub fn $getter(&self) -> $ty {
                self.raw.$field
            }

            $(#[$meta])*
            #[inline]
            pub fn $setter(&mut self, value: $ty) {
                self.raw.$field = value;
            }
        )*
    };
}

impl FullParams {
    /// Create a parameter set with defaults: the given sampling strategy, a
    /// thread count derived from the host, no forced segment splitting and
    /// language autodetection.
    pub fn new(strategy: SamplingStrategy) -> Self {
        let mut raw = sys::RawParams::default();
        match strategy {
            SamplingStrategy::Greedy { best_of } => {
                raw.strategy = sys::SAMPLING_GREEDY;
                raw.greedy_best_of = best_of;
            }
            SamplingStrategy::BeamSearch { beam_size, patience } => {
                raw.strategy = sys::SAMPLING_BEAM_SEARCH;
                raw.beam_size = beam_size;
                raw.beam_patience = patience;
            }
        }
        raw.n_threads = default_threads();

        let mut params = Self {
            raw,
            owned_language: OwnedCStr::default(),
        };
        params
            .set_language(DEFAULT_LANGUAGE)
            .expect("default language is a valid C string");
        params
    }

    /// The strategy selected at construction.
    pub fn strategy(&self) -> SamplingStrategy {
        if self.raw.strategy == sys::SAMPLING_BEAM_SEARCH {
            SamplingStrategy::BeamSearch {
                beam_size: self.raw.beam_size,
                patience: self.raw.beam_patience,
            }
        } else {
            SamplingStrategy::Greedy {
                best_of: self.raw.greedy_best_of,
            }
        }
    }

    /// Read the language code back from the native field.
    pub fn language(&self) -> Result<String, WhisperError> {
        let ptr = self.raw.language;
        if ptr.is_null() {
            return Err(WhisperError::Decode("language field is unset".into()));
        }
        let text = unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map_err(|e| WhisperError::Decode(e.to_string()))?;
        Ok(text.to_owned())
    }

    /// Set the language code (e.g. `"en"`, `"de"`, `"auto"`).
    ///
    /// The previous backing buffer is released only after the new one has
    /// been installed. Fails on interior NUL bytes without touching the
    /// native field.
    pub fn set_language(&mut self, language: &str) -> Result<(), WhisperError> {
        self.owned_language.install(language, &mut self.raw.language)
    }

    field_accessors! {
        /// Number of threads handed to the engine.
        n_threads / set_n_threads: n_threads as c_int;
        /// Translate the transcription to English (multilingual models only).
        translate / set_translate: translate as bool;
        /// Do not carry decoder context across chunks.
        no_context / set_no_context: no_context as bool;
        /// Force the whole audio into a single segment.
        single_segment / set_single_segment: single_segment as bool;
        /// Let the engine print progress to stderr.
        print_progress / set_print_progress: print_progress as bool;
        /// Let the engine print timestamps alongside realtime output.
        print_timestamps / set_print_timestamps: print_timestamps as bool;
        /// Compute per-token timestamps.
        token_timestamps / set_token_timestamps: token_timestamps as bool;
        /// Maximum segment length in characters (0 = engine default).
        max_len / set_max_len: max_len as c_int;
        /// Maximum tokens per segment (0 = no limit).
        max_tokens / set_max_tokens: max_tokens as c_int;
        /// Initial decoding temperature.
        temperature / set_temperature: temperature as f32;
        /// No-speech probability threshold.
        no_speech_thold / set_no_speech_thold: no_speech_thold as f32;
        /// Suppress blank outputs at the start of a segment.
        suppress_blank / set_suppress_blank: suppress_blank as bool;
    }

    /// The native structure handed to the engine.
    pub fn as_raw(&self) -> &sys::RawParams {
        &self.raw
    }

    pub(crate) fn raw_mut(&mut self) -> &mut sys::RawParams {
        &mut self.raw
    }
}

impl Default for FullParams {
    fn default() -> Self {
        Self::new(SamplingStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let params = FullParams::new(SamplingStrategy::default());
        assert!((1..=8).contains(&params.n_threads()));
        assert_eq!(params.language().unwrap(), DEFAULT_LANGUAGE);
        assert_eq!(params.strategy(), SamplingStrategy::Greedy { best_of: 1 });
        assert_eq!(params.max_len(), 0);
        assert!(!params.translate());
    }

    #[test]
    fn beam_search_strategy_is_recorded() {
        let params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: 3,
            patience: -1.0,
        });
        assert_eq!(params.as_raw().strategy, sys::SAMPLING_BEAM_SEARCH);
        assert_eq!(
            params.strategy(),
            SamplingStrategy::BeamSearch {
                beam_size: 3,
                patience: -1.0
            }
        );
    }

    #[test]
    fn language_replacement_keeps_field_and_owner_in_sync() {
        let mut params = FullParams::default();
        for lang in ["en", "de", "fr", "auto", "en"] {
            params.set_language(lang).unwrap();
            assert_eq!(params.language().unwrap(), lang);
            // The native field must point at the buffer owned by the wrapper.
            let owned_ptr = params.owned_language.owned.as_ref().unwrap().as_ptr();
            assert_eq!(params.as_raw().language, owned_ptr);
        }
    }

    #[test]
    fn interior_nul_is_rejected_without_clobbering() {
        let mut params = FullParams::default();
        params.set_language("en").unwrap();
        let err = params.set_language("e\0n").unwrap_err();
        assert!(matches!(err, WhisperError::InteriorNul(_)));
        assert_eq!(params.language().unwrap(), "en");
    }

    #[test]
    fn value_fields_pass_through() {
        let mut params = FullParams::default();
        params.set_max_len(60);
        params.set_translate(true);
        params.set_no_speech_thold(0.3);
        assert_eq!(params.max_len(), 60);
        assert!(params.translate());
        assert_eq!(params.as_raw().max_len, 60);
        assert!((params.no_speech_thold() - 0.3).abs() < f32::EPSILON);
    }
}
