//! Sample-level conversions: resampling, downmix, 16-bit quantisation.

use sm_ir::PcmBuffer;

use crate::ConversionError;

/// Convert a normalised sample to 16-bit, clamping out-of-range input.
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Convert a 16-bit sample to the normalised range.
pub fn from_i16(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Snap a sample to the nearest 16-bit step.
pub fn quantize_16(sample: f32) -> f32 {
    from_i16(to_i16(sample))
}

/// Resample every channel to `target_rate` with linear interpolation.
///
/// The last source frame is held rather than blended towards zero so the
/// tail does not click.
pub fn resample_linear(pcm: &PcmBuffer, target_rate: u32) -> PcmBuffer {
    let source_rate = pcm.sample_rate();
    if source_rate == target_rate {
        return pcm.clone();
    }
    if pcm.is_empty() || source_rate == 0 || target_rate == 0 {
        return PcmBuffer::new(pcm.channels(), 0, target_rate);
    }

    let frames = pcm.frames();
    let out_frames = ((frames as u64 * target_rate as u64 + source_rate as u64 - 1)
        / source_rate as u64) as usize;
    let step = source_rate as f64 / target_rate as f64;

    let planes = (0..pcm.channels())
        .map(|ch| {
            let src = pcm.channel(ch);
            (0..out_frames)
                .map(|i| {
                    let pos = i as f64 * step;
                    let idx = pos as usize;
                    let frac = (pos - idx as f64) as f32;
                    let a = src.get(idx).copied().unwrap_or(src[frames - 1]);
                    let b = src.get(idx + 1).copied().unwrap_or(a);
                    a + (b - a) * frac
                })
                .collect()
        })
        .collect();

    PcmBuffer::from_planes(planes, target_rate)
}

/// Average a stereo buffer down to one channel. Mono input passes through.
pub fn downmix_to_mono(pcm: &PcmBuffer) -> Result<PcmBuffer, ConversionError> {
    match pcm.channels() {
        1 => Ok(pcm.clone()),
        2 => {
            let left = pcm.channel(0);
            let right = pcm.channel(1);
            let mono = left
                .iter()
                .zip(right)
                .map(|(&l, &r)| (l + r) * 0.5)
                .collect();
            Ok(PcmBuffer::from_planes(vec![mono], pcm.sample_rate()))
        }
        other => Err(ConversionError::UnsupportedChannelCount(other)),
    }
}
