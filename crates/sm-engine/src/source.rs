//! A decoded audio file bound to one output channel.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sm_formats::{convert_cached, downmix_to_mono, read_wav, ConversionError, LoadError};
use sm_ir::{BitsPerSample, FormatInfo, PcmBuffer, PlaybackStatus};

use crate::clock::PlaybackClock;
use crate::registry::RegistryId;
use crate::stream::SourceStream;

/// Zero-argument observer invoked after a successful transition.
pub type Callback = Box<dyn FnMut()>;

/// User-visible transport events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    Play,
    Pause,
    Stop,
}

#[derive(Default)]
struct Callbacks {
    on_play: Vec<Callback>,
    on_pause: Vec<Callback>,
    on_stop: Vec<Callback>,
}

impl Callbacks {
    fn list_mut(&mut self, event: SourceEvent) -> &mut Vec<Callback> {
        match event {
            SourceEvent::Play => &mut self.on_play,
            SourceEvent::Pause => &mut self.on_pause,
            SourceEvent::Stop => &mut self.on_stop,
        }
    }
}

/// Status and clock captured before a transition, for rollback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportSnapshot {
    pub status: PlaybackStatus,
    pub clock: PlaybackClock,
}

/// One audio file routed to one output channel.
pub struct SampleSource {
    /// File currently streamed; the converted copy once a format is applied
    path: PathBuf,
    /// File as originally loaded, before any conversion
    original_path: Option<PathBuf>,
    /// Decoded content of `original_path`
    decoded: Option<Arc<PcmBuffer>>,
    /// Format of `original_path` as stored on disk
    native_format: Option<FormatInfo>,
    /// Format of `stream`
    format: Option<FormatInfo>,
    stream: Option<SourceStream>,
    /// 1-based output channel; zero or negative is unassigned
    channel: i32,
    status: PlaybackStatus,
    clock: PlaybackClock,
    volume: f32,
    looping: bool,
    registry: Option<RegistryId>,
    callbacks: Callbacks,
}

impl SampleSource {
    pub fn new(path: impl Into<PathBuf>, channel: i32) -> Self {
        Self {
            path: path.into(),
            original_path: None,
            decoded: None,
            native_format: None,
            format: None,
            stream: None,
            channel,
            status: PlaybackStatus::Stopped,
            clock: PlaybackClock::new(),
            volume: 1.0,
            looping: false,
            registry: None,
            callbacks: Callbacks::default(),
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.set_volume(volume);
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    // --- Loading and conversion ---

    /// Decode `path` and make it the source's audio.
    ///
    /// The decoded stream keeps the file's own format until
    /// [`apply_format`](Self::apply_format) is called.
    pub fn load(&mut self, path: impl Into<PathBuf>) -> Result<FormatInfo, LoadError> {
        let path = path.into();
        let (pcm, format) = read_wav(&path)?;
        let bits = BitsPerSample::from_bits(format.bits_per_sample).unwrap_or_default();
        let pcm = Arc::new(pcm);

        self.path = path.clone();
        self.original_path = Some(path);
        self.stream = Some(self.fresh_stream(pcm.clone(), bits));
        self.decoded = Some(pcm);
        self.native_format = Some(format);
        self.format = Some(format);
        Ok(format)
    }

    /// Convert to the driver format and install the volume stage.
    ///
    /// A rate or width mismatch goes through the on-disk conversion cache.
    /// With `convert_to_mono`, stereo is averaged to one channel; anything
    /// other than one or two channels is rejected.
    pub fn apply_format(
        &mut self,
        sample_rate: u32,
        bits_per_sample: u16,
        convert_to_mono: bool,
    ) -> Result<(), ConversionError> {
        let bits = BitsPerSample::from_bits(bits_per_sample)
            .ok_or(ConversionError::UnsupportedBitDepth(bits_per_sample))?;
        let decoded = self.decoded.clone().ok_or(ConversionError::NotLoaded)?;
        let native = self.native_format.ok_or(ConversionError::NotLoaded)?;
        let original = self
            .original_path
            .clone()
            .ok_or(ConversionError::NotLoaded)?;

        let (path, mut pcm) = if native.matches(sample_rate, bits) {
            (original, (*decoded).clone())
        } else {
            let (converted, _) = convert_cached(&original, &decoded, sample_rate, bits)?;
            let (pcm, _) = read_wav(&converted)?;
            (converted, pcm)
        };

        if convert_to_mono {
            pcm = downmix_to_mono(&pcm)?;
        }

        let pcm = Arc::new(pcm);
        self.format = Some(FormatInfo::new(sample_rate, pcm.channels(), bits.bits()));
        self.stream = Some(self.fresh_stream(pcm, bits));
        self.path = path;
        Ok(())
    }

    fn fresh_stream(&self, pcm: Arc<PcmBuffer>, bits: BitsPerSample) -> SourceStream {
        let mut stream = SourceStream::new(pcm, self.volume, bits);
        stream.seek(self.clock.elapsed());
        stream
    }

    /// Drop the decoded audio and stream.
    pub fn release(&mut self) {
        self.stream = None;
        self.decoded = None;
        self.native_format = None;
        self.format = None;
    }

    // --- Position ---

    /// Position the stream and the clock at `offset_seconds`.
    ///
    /// Negative or NaN offsets seek to the start; offsets past the end, or
    /// too large to represent, seek to the end.
    pub fn seek(&mut self, offset_seconds: f64) {
        let mut offset =
            Duration::try_from_secs_f64(offset_seconds.max(0.0)).unwrap_or(Duration::MAX);
        if let Some(end) = self
            .stream
            .as_ref()
            .and_then(|s| Duration::try_from_secs_f64(s.duration_seconds()).ok())
        {
            offset = offset.min(end);
        }
        self.clock.set_elapsed(offset);
        if let Some(stream) = &mut self.stream {
            stream.seek(offset);
        }
    }

    /// Re-seek the stream to the clock's elapsed time and return that offset.
    pub fn sync_to_clock(&mut self) -> Duration {
        let offset = self.clock.elapsed();
        if let Some(stream) = &mut self.stream {
            stream.seek(offset);
        }
        offset
    }

    /// Total length in seconds, `NaN` until loaded.
    pub fn duration_seconds(&self) -> f64 {
        self.stream
            .as_ref()
            .map_or(f64::NAN, SourceStream::duration_seconds)
    }

    /// Elapsed playback time according to the clock.
    pub fn position_seconds(&self) -> f64 {
        self.clock.elapsed_seconds()
    }

    pub fn remaining_seconds(&self) -> f64 {
        (self.duration_seconds() - self.position_seconds()).max(0.0)
    }

    pub fn advance_clock(&mut self, dt: Duration) {
        self.clock.advance(dt);
    }

    /// Playing and the clock has reached the end of the audio.
    pub fn reached_end(&self) -> bool {
        self.status.is_playing() && self.position_seconds() >= self.duration_seconds()
    }

    // --- Transport state ---

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            status: self.status,
            clock: self.clock,
        }
    }

    pub fn restore(&mut self, snapshot: TransportSnapshot) {
        self.status = snapshot.status;
        self.clock = snapshot.clock;
    }

    /// Start or resume the clock and mark as playing.
    pub fn mark_playing(&mut self) {
        self.clock.start();
        self.status = PlaybackStatus::Playing;
    }

    pub fn mark_paused(&mut self) {
        self.clock.pause();
        self.status = PlaybackStatus::Paused;
    }

    pub fn mark_stopped(&mut self) {
        self.clock.reset();
        self.status = PlaybackStatus::Stopped;
    }

    /// Loop restart: zero the clock and keep playing.
    pub fn mark_restarted(&mut self) {
        self.clock.restart();
        self.status = PlaybackStatus::Playing;
    }

    // --- Callbacks ---

    pub fn on_play(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_play.push(Box::new(callback));
    }

    pub fn on_pause(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_pause.push(Box::new(callback));
    }

    pub fn on_stop(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_stop.push(Box::new(callback));
    }

    /// Invoke every callback registered for `event`, in registration order.
    pub fn emit(&mut self, event: SourceEvent) {
        for callback in self.callbacks.list_mut(event).iter_mut() {
            callback();
        }
    }

    // --- Accessors ---

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    pub fn original_path(&self) -> Option<&Path> {
        self.original_path.as_deref()
    }

    pub fn format(&self) -> Option<FormatInfo> {
        self.format
    }

    pub fn stream(&self) -> Option<&SourceStream> {
        self.stream.as_ref()
    }

    /// True once a stream exists in exactly the requested format.
    pub fn is_ready_for(&self, sample_rate: u32, bits: BitsPerSample) -> bool {
        self.stream.is_some() && self.format.is_some_and(|f| f.matches(sample_rate, bits))
    }

    pub fn channel(&self) -> i32 {
        self.channel
    }

    pub fn set_channel(&mut self, channel: i32) {
        self.channel = channel;
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the gain. Values outside `0.0..=1.0` are rejected and logged.
    pub fn set_volume(&mut self, volume: f32) -> bool {
        if !(0.0..=1.0).contains(&volume) {
            log::error!(
                "volume {} for {} is outside 0.0..=1.0, keeping {}",
                volume,
                self.path.display(),
                self.volume
            );
            return false;
        }
        self.volume = volume;
        if let Some(stream) = &mut self.stream {
            stream.set_volume(volume);
        }
        true
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Registry this source is bound to, if any.
    pub fn registry(&self) -> Option<RegistryId> {
        self.registry
    }

    pub(crate) fn set_registry(&mut self, registry: Option<RegistryId>) {
        self.registry = registry;
    }
}

impl fmt::Debug for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleSource")
            .field("path", &self.path)
            .field("channel", &self.channel)
            .field("status", &self.status)
            .field("format", &self.format)
            .field("position", &self.position_seconds())
            .field("volume", &self.volume)
            .field("looping", &self.looping)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn write_wav(path: &Path, channels: u16, rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for _ in 0..channels {
                w.write_sample((i % 100) as i16 * 100).unwrap();
            }
        }
        w.finalize().unwrap();
    }

    #[test]
    fn duration_is_nan_until_loaded() {
        let source = SampleSource::new("a.wav", 1);
        assert!(source.duration_seconds().is_nan());
        assert!(!source.reached_end());
    }

    #[test]
    fn load_reports_format_and_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 2, 8000, 16000);

        let mut source = SampleSource::new("", 1);
        let format = source.load(&path).unwrap();
        assert_eq!(format, FormatInfo::new(8000, 2, 16));
        assert!((source.duration_seconds() - 2.0).abs() < 1e-9);
        assert_eq!(source.original_path(), Some(path.as_path()));
    }

    #[test]
    fn load_errors() {
        let mut source = SampleSource::new("", 1);
        assert!(matches!(source.load(""), Err(LoadError::NoPathSpecified)));
        assert!(matches!(
            source.load("/definitely/not/here.wav"),
            Err(LoadError::FileNotFound(_))
        ));
    }

    #[test]
    fn apply_format_converts_through_cache_and_downmixes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.wav");
        write_wav(&path, 2, 8000, 8000);

        let mut source = SampleSource::new("", 3);
        source.load(&path).unwrap();
        source.apply_format(16000, 32, true).unwrap();

        assert_eq!(source.format(), Some(FormatInfo::new(16000, 1, 32)));
        assert_eq!(source.path(), dir.path().join("b_16000_32.wav"));
        assert_eq!(source.original_path(), Some(path.as_path()));
        assert!(source.is_ready_for(16000, BitsPerSample::Bits32));
        assert!((source.duration_seconds() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn matching_format_skips_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.wav");
        write_wav(&path, 1, 8000, 800);

        let mut source = SampleSource::new("", 1);
        source.load(&path).unwrap();
        source.apply_format(8000, 16, true).unwrap();
        assert_eq!(source.path(), path.as_path());
        assert!(!dir.path().join("c_8000_16.wav").exists());
    }

    #[test]
    fn apply_format_rejects_bad_width_and_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surround.wav");
        write_wav(&path, 6, 8000, 80);

        let mut source = SampleSource::new("", 1);
        assert!(matches!(
            source.apply_format(8000, 16, true),
            Err(ConversionError::NotLoaded)
        ));
        source.load(&path).unwrap();
        assert!(matches!(
            source.apply_format(8000, 24, true),
            Err(ConversionError::UnsupportedBitDepth(24))
        ));
        assert!(matches!(
            source.apply_format(8000, 16, true),
            Err(ConversionError::UnsupportedChannelCount(6))
        ));
    }

    #[test]
    fn seek_moves_clock_and_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.wav");
        write_wav(&path, 1, 1000, 10_000);

        let mut source = SampleSource::new("", 1);
        source.load(&path).unwrap();
        source.seek(3.5);
        assert!((source.position_seconds() - 3.5).abs() < 1e-9);
        assert!((source.remaining_seconds() - 6.5).abs() < 1e-9);
        assert_eq!(source.stream().unwrap().frame(), 3500);
    }

    #[test]
    fn seek_past_end_clamps_to_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.wav");
        write_wav(&path, 1, 1000, 2000);

        let mut source = SampleSource::new("", 1);
        source.load(&path).unwrap();
        for offset in [f64::INFINITY, 1e30, 5.0] {
            source.seek(offset);
            assert!(
                (source.position_seconds() - 2.0).abs() < 1e-9,
                "seek({}) landed at {}",
                offset,
                source.position_seconds()
            );
            assert_eq!(source.stream().unwrap().frame(), 2000);
        }

        source.seek(f64::NAN);
        assert_eq!(source.position_seconds(), 0.0);
        source.seek(-1.0);
        assert_eq!(source.position_seconds(), 0.0);
    }

    #[test]
    fn unloaded_seek_to_infinity_does_not_panic() {
        let mut source = SampleSource::new("x.wav", 1);
        source.seek(f64::INFINITY);
        assert_eq!(source.clock().elapsed(), Duration::MAX);
        source.mark_playing();
        source.advance_clock(Duration::from_secs(1));
        assert_eq!(source.clock().elapsed(), Duration::MAX);
    }

    #[test]
    fn volume_outside_range_rejected() {
        let mut source = SampleSource::new("x.wav", 1);
        assert!(source.set_volume(0.25));
        assert!(!source.set_volume(1.5));
        assert!(!source.set_volume(f32::NAN));
        assert_eq!(source.volume(), 0.25);
    }

    #[test]
    fn callbacks_fire_in_order_per_event() {
        let mut source = SampleSource::new("x.wav", 1);
        let plays = Rc::new(Cell::new(0));
        let stops = Rc::new(Cell::new(0));
        let p = plays.clone();
        source.on_play(move || p.set(p.get() + 1));
        let s = stops.clone();
        source.on_stop(move || s.set(s.get() + 1));

        source.emit(SourceEvent::Play);
        source.emit(SourceEvent::Play);
        source.emit(SourceEvent::Pause);
        assert_eq!(plays.get(), 2);
        assert_eq!(stops.get(), 0);
    }

    #[test]
    fn snapshot_restores_status_and_clock() {
        let mut source = SampleSource::new("x.wav", 1);
        let before = source.snapshot();
        source.mark_playing();
        source.advance_clock(Duration::from_secs(1));
        source.restore(before);
        assert_eq!(source.status(), PlaybackStatus::Stopped);
        assert_eq!(source.position_seconds(), 0.0);
    }
}
