//! Mix-graph construction and the multiplexed output stream.

use slotmap::SlotMap;
use sm_formats::to_i16;
use sm_ir::{BitsPerSample, FormatInfo, SourceKey};

use crate::registry::TrackRegistry;
use crate::source::SampleSource;
use crate::stream::SourceStream;
use crate::MixError;

/// What feeds one output channel.
#[derive(Clone, Debug)]
pub enum Lane {
    /// Generated silence in the given format
    Silence { format: FormatInfo },
    /// A playing source's stream
    Source { key: SourceKey, stream: SourceStream },
}

impl Lane {
    fn next_sample(&mut self) -> f32 {
        match self {
            Lane::Silence { .. } => 0.0,
            Lane::Source { stream, .. } => stream.next_sample(),
        }
    }

    pub fn is_silence(&self) -> bool {
        matches!(self, Lane::Silence { .. })
    }

    pub fn source(&self) -> Option<SourceKey> {
        match self {
            Lane::Silence { .. } => None,
            Lane::Source { key, .. } => Some(*key),
        }
    }
}

/// One interleaved stream with a fixed number of output channels.
///
/// Lane `i` feeds output channel `i + 1` and nothing else. A graph is built
/// once, handed to the driver and replaced wholesale on the next rebuild.
#[derive(Clone, Debug)]
pub struct MixGraph {
    lanes: Vec<Lane>,
    sample_rate: u32,
    bits: BitsPerSample,
}

impl MixGraph {
    /// Number of output channels.
    pub fn channels(&self) -> u16 {
        self.lanes.len() as u16
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    /// Lane feeding 1-based output `channel`.
    pub fn lane(&self, channel: u16) -> Option<&Lane> {
        channel
            .checked_sub(1)
            .and_then(|i| self.lanes.get(i as usize))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits(&self) -> BitsPerSample {
        self.bits
    }

    pub fn format(&self) -> FormatInfo {
        FormatInfo::new(self.sample_rate, self.channels(), self.bits.bits())
    }

    /// Fill `out` with whole interleaved frames and return the frame count.
    ///
    /// Any trailing partial frame in `out` is zeroed.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        self.read_into(out, 0.0, |s| s)
    }

    /// Same as [`read`](Self::read) but as 16-bit integers.
    pub fn read_i16(&mut self, out: &mut [i16]) -> usize {
        self.read_into(out, 0, to_i16)
    }

    /// Interleave lanes into `out`, converting each sample with `convert`.
    ///
    /// Does not allocate; safe to call from the driver callback.
    pub fn read_into<T: Copy>(
        &mut self,
        out: &mut [T],
        silence: T,
        convert: impl Fn(f32) -> T,
    ) -> usize {
        let channels = self.lanes.len();
        if channels == 0 {
            out.fill(silence);
            return 0;
        }
        let mut frames = 0;
        for frame in out.chunks_mut(channels) {
            if frame.len() < channels {
                frame.fill(silence);
                break;
            }
            for (sample, lane) in frame.iter_mut().zip(self.lanes.iter_mut()) {
                *sample = convert(lane.next_sample());
            }
            frames += 1;
        }
        frames
    }

    /// Pull `frames` interleaved frames.
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.lanes.len()];
        self.read(&mut out);
        out
    }
}

/// Builds a [`MixGraph`] from the routing table.
pub struct MixGraphBuilder<'a> {
    registry: &'a TrackRegistry,
    sources: &'a SlotMap<SourceKey, SampleSource>,
}

impl<'a> MixGraphBuilder<'a> {
    pub fn new(registry: &'a TrackRegistry, sources: &'a SlotMap<SourceKey, SampleSource>) -> Self {
        Self { registry, sources }
    }

    /// Build one lane per channel from 1 to the highest assigned channel.
    ///
    /// Returns `Ok(None)` when nothing is routed. Unassigned channels and
    /// sources that are not playing get silence, so the layout never shifts
    /// when a source pauses. A playing source without a stream is an error.
    pub fn build(&self) -> Result<Option<MixGraph>, MixError> {
        self.registry.check_invariants(self.sources)?;

        let width = self.registry.channel_count();
        if width == 0 {
            return Ok(None);
        }

        let target = FormatInfo::new(self.registry.sample_rate(), 1, self.registry.bits().bits());
        let mut lanes = Vec::with_capacity(width as usize);

        for channel in 1..=width {
            let lane = match self.registry.get(channel) {
                None => Lane::Silence { format: target },
                Some(key) => {
                    let source = &self.sources[key];
                    if source.status().is_playing() {
                        let stream = source
                            .stream()
                            .cloned()
                            .ok_or(MixError::UnreadySource { channel })?;
                        Lane::Source { key, stream }
                    } else {
                        Lane::Silence {
                            format: source.format().unwrap_or(target),
                        }
                    }
                }
            };
            lanes.push(lane);
        }

        let playing = lanes.iter().filter(|l| !l.is_silence()).count();
        log::debug!("built mix graph: {} channels, {} playing", width, playing);

        Ok(Some(MixGraph {
            lanes,
            sample_rate: self.registry.sample_rate(),
            bits: self.registry.bits(),
        }))
    }
}
