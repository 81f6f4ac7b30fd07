//! Pull-based reader over one source's converted audio.

use std::sync::Arc;
use std::time::Duration;

use sm_formats::quantize_16;
use sm_ir::{BitsPerSample, FormatInfo, PcmBuffer};

/// Read cursor plus volume stage over a shared decoded buffer.
///
/// Cloning is cheap: the audio data is shared, only the cursor is copied.
/// The routed signal is the buffer's first channel; sources are normally
/// downmixed to mono before they get here.
#[derive(Clone, Debug)]
pub struct SourceStream {
    pcm: Arc<PcmBuffer>,
    /// Next frame to read
    frame: usize,
    /// Linear gain, 0.0 to 1.0
    volume: f32,
    bits: BitsPerSample,
}

impl SourceStream {
    pub fn new(pcm: Arc<PcmBuffer>, volume: f32, bits: BitsPerSample) -> Self {
        Self {
            pcm,
            frame: 0,
            volume,
            bits,
        }
    }

    pub fn format(&self) -> FormatInfo {
        FormatInfo::new(self.pcm.sample_rate(), self.pcm.channels(), self.bits.bits())
    }

    pub fn bits(&self) -> BitsPerSample {
        self.bits
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    /// Move the cursor to `offset`, clamped to the end of the data.
    pub fn seek(&mut self, offset: Duration) {
        let frame = (offset.as_secs_f64() * self.pcm.sample_rate() as f64).round() as usize;
        self.frame = frame.min(self.pcm.frames());
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn position_seconds(&self) -> f64 {
        if self.pcm.sample_rate() == 0 {
            return 0.0;
        }
        self.frame as f64 / self.pcm.sample_rate() as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.pcm.duration_seconds()
    }

    pub fn remaining_seconds(&self) -> f64 {
        (self.duration_seconds() - self.position_seconds()).max(0.0)
    }

    pub fn is_finished(&self) -> bool {
        self.frame >= self.pcm.frames()
    }

    /// Next routed sample after the volume stage; silence once exhausted.
    pub fn next_sample(&mut self) -> f32 {
        let s = self.pcm.sample(0, self.frame) * self.volume;
        if self.frame < self.pcm.frames() {
            self.frame += 1;
        }
        match self.bits {
            BitsPerSample::Bits16 => quantize_16(s),
            BitsPerSample::Bits32 => s,
        }
    }
}
