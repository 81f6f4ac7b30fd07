//! WAV encoding and decoding for PCM audio.

use std::path::Path;

use sm_ir::{BitsPerSample, FormatInfo, PcmBuffer};

use crate::convert::to_i16;
use crate::{ConversionError, LoadError};

// --- Reading ---

fn check_path(path: &Path) -> Result<(), LoadError> {
    if path.as_os_str().is_empty() {
        return Err(LoadError::NoPathSpecified);
    }
    if !path.is_file() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }
    Ok(())
}

fn decode_err(path: &Path) -> impl Fn(hound::Error) -> LoadError + '_ {
    move |source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

/// Read only the header of a WAV file.
pub fn probe_wav(path: &Path) -> Result<FormatInfo, LoadError> {
    check_path(path)?;
    let reader = hound::WavReader::open(path).map_err(decode_err(path))?;
    let spec = reader.spec();
    Ok(FormatInfo::new(
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
    ))
}

/// Decode a whole WAV file into a planar buffer, normalised to `[-1.0, 1.0]`.
pub fn read_wav(path: &Path) -> Result<(PcmBuffer, FormatInfo), LoadError> {
    check_path(path)?;
    let mut reader = hound::WavReader::open(path).map_err(decode_err(path))?;
    let spec = reader.spec();
    let format = FormatInfo::new(spec.sample_rate, spec.channels, spec.bits_per_sample);

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_err(path))?,
        hound::SampleFormat::Int => {
            let full_scale = (1u32 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(decode_err(path))?
        }
    };

    let pcm = PcmBuffer::from_interleaved(&samples, spec.channels, spec.sample_rate);
    log::debug!(
        "decoded {} ({}, {:.3}s)",
        path.display(),
        format,
        pcm.duration_seconds()
    );
    Ok((pcm, format))
}

// --- Writing ---

/// Write a planar buffer as an interleaved WAV file.
///
/// 16-bit output is signed integer PCM; 32-bit output is IEEE float.
pub fn write_wav(path: &Path, pcm: &PcmBuffer, bits: BitsPerSample) -> Result<(), ConversionError> {
    let write_err = |source| ConversionError::Write {
        path: path.to_path_buf(),
        source,
    };

    let spec = hound::WavSpec {
        channels: pcm.channels(),
        sample_rate: pcm.sample_rate(),
        bits_per_sample: bits.bits(),
        sample_format: match bits {
            BitsPerSample::Bits16 => hound::SampleFormat::Int,
            BitsPerSample::Bits32 => hound::SampleFormat::Float,
        },
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(write_err)?;
    for i in 0..pcm.frames() {
        for ch in 0..pcm.channels() {
            let s = pcm.sample(ch, i);
            let written = match bits {
                BitsPerSample::Bits16 => writer.write_sample(to_i16(s)),
                BitsPerSample::Bits32 => writer.write_sample(s),
            };
            written.map_err(write_err)?;
        }
    }
    writer.finalize().map_err(write_err)
}
