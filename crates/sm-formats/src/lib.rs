//! File decode and format conversion for spatialmux.
//!
//! Decodes WAV files into [`PcmBuffer`](sm_ir::PcmBuffer)s, converts them to
//! the driver's target sample rate and bit depth, and keeps converted copies
//! on disk next to the original so a file is only converted once.

mod cache;
mod convert;
mod wav_format;

use std::path::PathBuf;

use sm_ir::FormatInfo;
use thiserror::Error;

pub use cache::{convert_cached, converted_path, CacheOutcome};
pub use convert::{downmix_to_mono, from_i16, quantize_16, resample_linear, to_i16};
pub use wav_format::{probe_wav, read_wav, write_wav};

/// Error opening or decoding an audio file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no audio file path specified")]
    NoPathSpecified,

    #[error("audio file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

/// Error converting decoded audio to the target format.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("unsupported bits per sample: {0} (use 16 or 32)")]
    UnsupportedBitDepth(u16),

    #[error("mono conversion needs 1 or 2 channels, got {0}")]
    UnsupportedChannelCount(u16),

    #[error(
        "converted file {} is {found}, expected {expected_rate} Hz {expected_bits}-bit",
        path.display()
    )]
    CacheMismatch {
        path: PathBuf,
        expected_rate: u32,
        expected_bits: u16,
        found: FormatInfo,
    },

    #[error("no decoded audio to convert")]
    NotLoaded,

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}
