//! On-disk cache of files converted to the driver format.
//!
//! A converted copy lives next to its original as
//! `<stem>_<rate>_<bits>.<ext>`. The original path is always supplied by the
//! caller; it is never recovered from a converted file name.

use std::path::{Path, PathBuf};

use sm_ir::{BitsPerSample, PcmBuffer};

use crate::convert::resample_linear;
use crate::wav_format::{probe_wav, write_wav};
use crate::ConversionError;

/// Whether a conversion reused an existing file or wrote a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
    Reused,
    Written,
}

/// Path of the converted copy of `original` for the given target format.
pub fn converted_path(original: &Path, sample_rate: u32, bits: BitsPerSample) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{}_{}_{}", stem, sample_rate, bits.bits());
    if let Some(ext) = original.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    original.with_file_name(name)
}

/// Make sure a converted copy of `original` exists and return its path.
///
/// `decoded` must be the decoded content of `original`. An existing cache file
/// is reused when its header matches the request; a mismatching one is an
/// error because something other than this cache wrote it.
pub fn convert_cached(
    original: &Path,
    decoded: &PcmBuffer,
    sample_rate: u32,
    bits: BitsPerSample,
) -> Result<(PathBuf, CacheOutcome), ConversionError> {
    let path = converted_path(original, sample_rate, bits);

    if path.is_file() {
        let found = probe_wav(&path)?;
        if !found.matches(sample_rate, bits) {
            return Err(ConversionError::CacheMismatch {
                path,
                expected_rate: sample_rate,
                expected_bits: bits.bits(),
                found,
            });
        }
        log::info!("reusing converted file {}", path.display());
        return Ok((path, CacheOutcome::Reused));
    }

    let resampled = resample_linear(decoded, sample_rate);
    write_wav(&path, &resampled, bits)?;
    log::info!(
        "converted {} to {} Hz {} at {}",
        original.display(),
        sample_rate,
        bits,
        path.display()
    );
    Ok((path, CacheOutcome::Written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_wav;

    #[test]
    fn converted_name_appends_rate_and_bits() {
        let p = converted_path(Path::new("/audio/room_a.wav"), 48000, BitsPerSample::Bits32);
        assert_eq!(p, PathBuf::from("/audio/room_a_48000_32.wav"));
    }

    #[test]
    fn converted_name_without_extension() {
        let p = converted_path(Path::new("take"), 44100, BitsPerSample::Bits16);
        assert_eq!(p, PathBuf::from("take_44100_16"));
    }

    #[test]
    fn writes_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("tone.wav");
        let pcm = PcmBuffer::from_interleaved(&[0.5; 800], 1, 8000);
        write_wav(&original, &pcm, BitsPerSample::Bits16).unwrap();

        let (path, outcome) = convert_cached(&original, &pcm, 16000, BitsPerSample::Bits32).unwrap();
        assert_eq!(outcome, CacheOutcome::Written);
        let (converted, format) = read_wav(&path).unwrap();
        assert_eq!(format.sample_rate, 16000);
        assert_eq!(format.bits_per_sample, 32);
        assert_eq!(converted.frames(), 1600);

        let (again, outcome) = convert_cached(&original, &pcm, 16000, BitsPerSample::Bits32).unwrap();
        assert_eq!(again, path);
        assert_eq!(outcome, CacheOutcome::Reused);
    }

    #[test]
    fn mismatched_cache_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("tone.wav");
        let pcm = PcmBuffer::from_interleaved(&[0.0; 80], 1, 8000);
        write_wav(&original, &pcm, BitsPerSample::Bits16).unwrap();

        // Squat on the cache name with the wrong width.
        let squatter = converted_path(&original, 48000, BitsPerSample::Bits32);
        write_wav(&squatter, &resample_linear(&pcm, 48000), BitsPerSample::Bits16).unwrap();

        let err = convert_cached(&original, &pcm, 48000, BitsPerSample::Bits32).unwrap_err();
        assert!(matches!(err, ConversionError::CacheMismatch { found, .. } if found.bits_per_sample == 16));
    }
}
