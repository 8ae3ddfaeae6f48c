//! Safe wrapper around libchromaprint
//!
//! Only the calls needed to turn PCM into a compressed fingerprint string are
//! bound. The context frees itself on drop.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use thiserror::Error;

mod sys {
    use super::*;

    pub type ChromaprintContextPtr = *mut c_void;

    /// Default algorithm, the one AcoustID indexes
    pub const CHROMAPRINT_ALGORITHM_TEST2: c_int = 1;

    #[link(name = "chromaprint")]
    extern "C" {
        pub fn chromaprint_new(algorithm: c_int) -> ChromaprintContextPtr;
        pub fn chromaprint_free(ctx: ChromaprintContextPtr);
        pub fn chromaprint_start(
            ctx: ChromaprintContextPtr,
            sample_rate: c_int,
            num_channels: c_int,
        ) -> c_int;
        pub fn chromaprint_feed(ctx: ChromaprintContextPtr, data: *const i16, size: c_int)
            -> c_int;
        pub fn chromaprint_finish(ctx: ChromaprintContextPtr) -> c_int;
        pub fn chromaprint_get_fingerprint(
            ctx: ChromaprintContextPtr,
            fingerprint: *mut *mut c_char,
        ) -> c_int;
        pub fn chromaprint_dealloc(ptr: *mut c_void);
        pub fn chromaprint_get_version() -> *const c_char;
    }
}

/// libchromaprint call failures
#[derive(Debug, Error)]
pub enum ChromaprintError {
    #[error("Failed to create Chromaprint context")]
    ContextCreationFailed,

    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("chromaprint_{0} failed")]
    CallFailed(&'static str),

    #[error("Too many samples for one feed call")]
    InputTooLarge,
}

/// Owned Chromaprint context
///
/// Not thread-safe; create one per fingerprint.
pub struct ChromaprintContext {
    ctx: sys::ChromaprintContextPtr,
}

impl ChromaprintContext {
    pub fn new() -> Result<Self, ChromaprintError> {
        let ctx = unsafe { sys::chromaprint_new(sys::CHROMAPRINT_ALGORITHM_TEST2) };
        if ctx.is_null() {
            return Err(ChromaprintError::ContextCreationFailed);
        }
        Ok(Self { ctx })
    }

    /// Fingerprint mono f32 samples
    pub fn fingerprint(&mut self, samples: &[f32], sample_rate: u32) -> Result<String, ChromaprintError> {
        if !(8000..=192_000).contains(&sample_rate) {
            return Err(ChromaprintError::InvalidSampleRate(sample_rate));
        }
        let pcm = convert_f32_to_i16(samples);
        let len = c_int::try_from(pcm.len()).map_err(|_| ChromaprintError::InputTooLarge)?;

        unsafe {
            check(sys::chromaprint_start(self.ctx, sample_rate as c_int, 1), "start")?;
            check(sys::chromaprint_feed(self.ctx, pcm.as_ptr(), len), "feed")?;
            check(sys::chromaprint_finish(self.ctx), "finish")?;

            let mut raw: *mut c_char = std::ptr::null_mut();
            check(
                sys::chromaprint_get_fingerprint(self.ctx, &mut raw),
                "get_fingerprint",
            )?;
            if raw.is_null() {
                return Err(ChromaprintError::CallFailed("get_fingerprint"));
            }
            let fingerprint = CStr::from_ptr(raw).to_string_lossy().into_owned();
            sys::chromaprint_dealloc(raw as *mut c_void);
            Ok(fingerprint)
        }
    }
}

impl Drop for ChromaprintContext {
    fn drop(&mut self) {
        unsafe { sys::chromaprint_free(self.ctx) }
    }
}

fn check(result: c_int, call: &'static str) -> Result<(), ChromaprintError> {
    if result == 0 {
        Err(ChromaprintError::CallFailed(call))
    } else {
        Ok(())
    }
}

/// Scale [-1.0, 1.0] floats to i16 PCM, clamping overflow
fn convert_f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Linked library version, e.g. "1.5.1"
pub fn version() -> String {
    unsafe {
        CStr::from_ptr(sys::chromaprint_get_version())
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(seconds: f32, sample_rate: u32) -> Vec<f32> {
        (0..(sample_rate as f32 * seconds) as usize)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_conversion_clamps() {
        assert_eq!(convert_f32_to_i16(&[0.0, 1.0, -1.0, 1.5, -1.5]), vec![0, 32767, -32767, 32767, -32768]);
    }

    #[test]
    fn test_invalid_sample_rate() {
        let mut ctx = ChromaprintContext::new().unwrap();
        assert!(matches!(
            ctx.fingerprint(&[0.0; 100], 4000),
            Err(ChromaprintError::InvalidSampleRate(4000))
        ));
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let samples = sine(5.0, 11025);
        let first = ChromaprintContext::new().unwrap().fingerprint(&samples, 11025).unwrap();
        let second = ChromaprintContext::new().unwrap().fingerprint(&samples, 11025).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_version() {
        assert!(version().contains('.'));
    }
}
