//! Decoded PCM container with planar layout.

/// Decoded f32 audio in planar layout.
///
/// Data is stored as `channels` contiguous planes of `frames` samples each.
/// `data[ch * frames + frame]` gives the sample for channel `ch` at `frame`.
/// Samples are normalised to `[-1.0, 1.0]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PcmBuffer {
    data: Vec<f32>,
    channels: u16,
    frames: usize,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Create a new silent buffer with the given dimensions.
    pub fn new(channels: u16, frames: usize, sample_rate: u32) -> Self {
        Self {
            data: vec![0.0; channels as usize * frames],
            channels,
            frames,
            sample_rate,
        }
    }

    /// Deinterleave `samples` (frame-major) into planar storage.
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Self {
        let chs = channels.max(1) as usize;
        let frames = samples.len() / chs;
        let mut buf = Self::new(chs as u16, frames, sample_rate);
        for (i, frame) in samples.chunks_exact(chs).enumerate() {
            for (ch, &s) in frame.iter().enumerate() {
                buf.data[ch * frames + i] = s;
            }
        }
        buf
    }

    /// Build from one plane per channel. Planes are truncated to the shortest.
    pub fn from_planes(planes: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
        let channels = planes.len() as u16;
        let mut data = Vec::with_capacity(planes.len() * frames);
        for plane in planes {
            data.extend_from_slice(&plane[..frames]);
        }
        Self {
            data,
            channels,
            frames,
            sample_rate,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Length in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }

    /// Read-only access to one channel's sample data.
    pub fn channel(&self, ch: u16) -> &[f32] {
        let start = ch as usize * self.frames;
        &self.data[start..start + self.frames]
    }

    /// Sample at `frame` on `ch`, or silence past the end.
    pub fn sample(&self, ch: u16, frame: usize) -> f32 {
        if ch >= self.channels || frame >= self.frames {
            return 0.0;
        }
        self.data[ch as usize * self.frames + frame]
    }
}
