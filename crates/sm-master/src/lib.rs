//! Headless controller for spatialmux.
//!
//! Owns the sources, the routing table and the driver session, and runs the
//! rebuild transaction on every transport change. Both the CLI and offline
//! rendering drive playback through [`Controller`].

mod config;
mod render;

use std::path::PathBuf;
use std::time::Duration;

use slotmap::SlotMap;
use sm_audio::{connect, AudioError, DriverHost, DriverSession};
use sm_engine::{MixGraphBuilder, TrackRegistry};
use thiserror::Error;

// Re-export common types so callers don't need the engine crates directly.
pub use config::{ConfigError, EngineConfig, SourceConfig};
pub use render::{render_offline, render_to_wav, RenderError};
pub use sm_engine::{MixError, SampleSource, SourceEvent};
pub use sm_ir::{BitsPerSample, FormatInfo, PcmBuffer, PlaybackStatus, SourceKey};

/// Failure of a transport request or rebuild.
///
/// A driver or mix error means the rebuild did not complete and audio is
/// down until the next successful transition.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unknown source")]
    UnknownSource,

    #[error("source is not routed to an output channel")]
    NotRegistered,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("driver error: {0}")]
    Driver(#[from] AudioError),

    #[error("mix error: {0}")]
    Mix(#[from] MixError),
}

/// Transport controller: one driver, one routing table, many sources.
pub struct Controller {
    host: Box<dyn DriverHost>,
    driver_name: String,
    session: Option<Box<dyn DriverSession>>,
    registry: TrackRegistry,
    sources: SlotMap<SourceKey, SampleSource>,
    /// Sources waiting to auto-play once ready, in attach order
    pending_play: Vec<SourceKey>,
}

impl Controller {
    /// Connect to the configured driver and attach every configured source.
    ///
    /// The driver is opened once to learn its channel capacity and released
    /// again; audio starts with the first transition.
    pub fn new(host: Box<dyn DriverHost>, config: &EngineConfig) -> Result<Self, TransportError> {
        let bits = config.target_bits()?;
        let session = connect(host.as_ref(), &config.driver)?;
        let capacity = session.input_channel_count();
        session.dispose();

        let mut controller = Self {
            host,
            driver_name: config.driver.clone(),
            session: None,
            registry: TrackRegistry::new(config.sample_rate, bits, capacity),
            sources: SlotMap::with_key(),
            pending_play: Vec::new(),
        };
        for source in &config.sources {
            controller.attach(source);
        }
        Ok(controller)
    }

    // --- Source management ---

    /// Create, load, convert and route a source.
    ///
    /// Always returns a key. A source that fails to load or validate is kept
    /// but never routed; the reason is logged.
    pub fn attach(&mut self, config: &SourceConfig) -> SourceKey {
        let source = SampleSource::new(&config.path, config.channel)
            .with_volume(config.volume)
            .with_looping(config.looping);
        let key = self.sources.insert(source);
        self.prepare(key);
        if config.play_on_attach {
            self.pending_play.push(key);
        }
        key
    }

    /// Stop, unroute and drop a source.
    pub fn detach(&mut self, key: SourceKey) -> Result<(), TransportError> {
        let mut source = self
            .sources
            .remove(key)
            .ok_or(TransportError::UnknownSource)?;
        self.pending_play.retain(|&k| k != key);

        let was_active = source.status() != PlaybackStatus::Stopped;
        let was_routed = self.registry.unregister(key, &mut source);
        source.mark_stopped();
        source.release();
        log::info!("detached {}", source.path().display());

        if was_active || (was_routed && self.session.is_some()) {
            self.rebuild()?;
        }
        if was_active {
            source.emit(SourceEvent::Stop);
        }
        Ok(())
    }

    /// Load the source's file, convert it to the target format and route it.
    fn prepare(&mut self, key: SourceKey) -> bool {
        let rate = self.registry.sample_rate();
        let bits = self.registry.bits();
        let Some(source) = self.sources.get_mut(key) else {
            return false;
        };

        let path = source.path().to_path_buf();
        if let Err(err) = source.load(&path) {
            log::error!("cannot load {}: {}", path.display(), err);
            return false;
        }
        if let Err(err) = source.apply_format(rate, bits.bits(), true) {
            log::error!("cannot convert {}: {}", path.display(), err);
            source.release();
            return false;
        }
        self.registry.validate_and_register(key, source)
    }

    // --- Transport ---

    /// Start or resume `key`. No-op if already playing.
    pub fn play(&mut self, key: SourceKey) -> Result<(), TransportError> {
        let source = self.sources.get(key).ok_or(TransportError::UnknownSource)?;
        if source.status() == PlaybackStatus::Playing {
            return Ok(());
        }
        if !self.registry.contains(key) {
            return Err(TransportError::NotRegistered);
        }
        self.transition(key, SampleSource::mark_playing)?;
        self.sources[key].emit(SourceEvent::Play);
        Ok(())
    }

    /// Pause `key`, keeping its position. No-op unless playing.
    pub fn pause(&mut self, key: SourceKey) -> Result<(), TransportError> {
        let source = self.sources.get(key).ok_or(TransportError::UnknownSource)?;
        if source.status() != PlaybackStatus::Playing {
            return Ok(());
        }
        self.transition(key, SampleSource::mark_paused)?;
        self.sources[key].emit(SourceEvent::Pause);
        Ok(())
    }

    /// Stop `key` and rewind it. No-op if already stopped.
    ///
    /// Also cancels a pending auto-play.
    pub fn stop(&mut self, key: SourceKey) -> Result<(), TransportError> {
        let source = self.sources.get(key).ok_or(TransportError::UnknownSource)?;
        self.pending_play.retain(|&k| k != key);
        if source.status() == PlaybackStatus::Stopped {
            return Ok(());
        }
        self.transition(key, SampleSource::mark_stopped)?;
        self.sources[key].emit(SourceEvent::Stop);
        Ok(())
    }

    /// Loop restart from zero. Fires no callbacks.
    fn restart(&mut self, key: SourceKey) -> Result<(), TransportError> {
        self.transition(key, SampleSource::mark_restarted)
    }

    /// Apply `change` to `key` and rebuild, rolling the source back on failure.
    fn transition(
        &mut self,
        key: SourceKey,
        change: impl FnOnce(&mut SampleSource),
    ) -> Result<(), TransportError> {
        let source = &mut self.sources[key];
        let before = source.snapshot();
        change(source);
        let after = source.status();

        match self.rebuild() {
            Ok(()) => {
                log::info!(
                    "{}: {} -> {}",
                    self.sources[key].path().display(),
                    before.status,
                    after
                );
                Ok(())
            }
            Err(err) => {
                let source = &mut self.sources[key];
                source.restore(before);
                log::error!(
                    "rebuild failed, {} stays {}: {}",
                    source.path().display(),
                    before.status,
                    err
                );
                Err(err)
            }
        }
    }

    /// Replace the installed graph with one built from the current table.
    ///
    /// On failure the session is left disposed.
    fn rebuild(&mut self) -> Result<(), TransportError> {
        for (_, key) in self.registry.iter() {
            if let Some(source) = self.sources.get_mut(key) {
                source.sync_to_clock();
            }
        }

        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.stop() {
                log::warn!("stopping {} failed: {}", session.name(), err);
            }
            session.dispose();
        }

        let mut session = connect(self.host.as_ref(), &self.driver_name)?;
        self.registry.set_capacity(session.input_channel_count());

        let graph = match MixGraphBuilder::new(&self.registry, &self.sources).build() {
            Ok(Some(graph)) => graph,
            Ok(None) => {
                log::debug!("no channels routed, driver left idle");
                session.dispose();
                return Ok(());
            }
            Err(err) => {
                session.dispose();
                return Err(err.into());
            }
        };

        let channels = graph.channels();
        if let Err(err) = session.init(graph).and_then(|()| session.start()) {
            session.dispose();
            return Err(err.into());
        }
        log::info!(
            "installed {}-channel mix on \"{}\"",
            channels,
            self.driver_name
        );
        self.session = Some(session);
        Ok(())
    }

    /// Advance every clock by `dt`, handle end of stream and auto-play.
    ///
    /// All sources are processed even if one transition fails; the first
    /// error is returned.
    pub fn tick(&mut self, dt: Duration) -> Result<(), TransportError> {
        for source in self.sources.values_mut() {
            source.advance_clock(dt);
        }

        let mut first_err = None;
        let finished: Vec<(SourceKey, bool)> = self
            .sources
            .iter()
            .filter(|(_, s)| s.reached_end())
            .map(|(k, s)| (k, s.looping()))
            .collect();
        for (key, looping) in finished {
            let empty = self.sources[key].duration_seconds() <= 0.0;
            if looping && empty {
                log::warn!(
                    "{} has no audio to loop, stopping",
                    self.sources[key].path().display()
                );
            }
            let result = if looping && !empty {
                log::debug!("looping {}", self.sources[key].path().display());
                self.restart(key)
            } else {
                self.stop(key)
            };
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        }

        let ready: Vec<SourceKey> = self
            .pending_play
            .iter()
            .copied()
            .filter(|&k| self.is_ready(k))
            .collect();
        for key in ready {
            self.pending_play.retain(|&k| k != key);
            if let Err(err) = self.play(key) {
                first_err.get_or_insert(err);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Routed and streaming in the target format.
    fn is_ready(&self, key: SourceKey) -> bool {
        self.registry.contains(key)
            && self.sources.get(key).is_some_and(|s| {
                s.is_ready_for(self.registry.sample_rate(), self.registry.bits())
            })
    }

    // --- Live changes ---

    /// Move `key` to another output channel.
    ///
    /// Returns whether the source is routed afterwards. An active source is
    /// stopped because the layout changed.
    pub fn set_channel(&mut self, key: SourceKey, channel: i32) -> Result<bool, TransportError> {
        let source = self
            .sources
            .get_mut(key)
            .ok_or(TransportError::UnknownSource)?;
        if source.channel() == channel && self.registry.contains(key) {
            return Ok(true);
        }
        let was_active = source.status() != PlaybackStatus::Stopped;

        source.set_channel(channel);
        let routed = self.registry.validate_and_register(key, source);
        if !routed {
            self.registry.unregister(key, source);
        }

        self.after_layout_change(key, was_active)?;
        Ok(routed)
    }

    /// Point `key` at a different file, reloading and reconverting it.
    ///
    /// Returns whether the source is routed afterwards.
    pub fn set_path(
        &mut self,
        key: SourceKey,
        path: impl Into<PathBuf>,
    ) -> Result<bool, TransportError> {
        let source = self
            .sources
            .get_mut(key)
            .ok_or(TransportError::UnknownSource)?;
        let was_active = source.status() != PlaybackStatus::Stopped;

        self.registry.unregister(key, source);
        source.release();
        source.set_path(path);
        let routed = self.prepare(key);

        self.after_layout_change(key, was_active)?;
        Ok(routed)
    }

    fn after_layout_change(&mut self, key: SourceKey, was_active: bool) -> Result<(), TransportError> {
        if was_active {
            self.stop(key)
        } else if self.session.is_some() {
            self.rebuild()
        } else {
            Ok(())
        }
    }

    /// Change the gain of `key`. Returns false if `volume` is out of range.
    ///
    /// A playing source is rebuilt so the change is heard immediately.
    pub fn set_volume(&mut self, key: SourceKey, volume: f32) -> Result<bool, TransportError> {
        let source = self
            .sources
            .get_mut(key)
            .ok_or(TransportError::UnknownSource)?;
        if !source.set_volume(volume) {
            return Ok(false);
        }
        if source.status().is_playing() {
            self.rebuild()?;
        }
        Ok(true)
    }

    pub fn set_looping(&mut self, key: SourceKey, looping: bool) -> Result<(), TransportError> {
        self.sources
            .get_mut(key)
            .ok_or(TransportError::UnknownSource)?
            .set_looping(looping);
        Ok(())
    }

    /// Register a callback fired after a successful `event` on `key`.
    pub fn subscribe(
        &mut self,
        key: SourceKey,
        event: SourceEvent,
        callback: impl FnMut() + 'static,
    ) -> Result<(), TransportError> {
        let source = self
            .sources
            .get_mut(key)
            .ok_or(TransportError::UnknownSource)?;
        match event {
            SourceEvent::Play => source.on_play(callback),
            SourceEvent::Pause => source.on_pause(callback),
            SourceEvent::Stop => source.on_stop(callback),
        }
        Ok(())
    }

    // --- Queries ---

    pub fn status(&self, key: SourceKey) -> Option<PlaybackStatus> {
        self.sources.get(key).map(SampleSource::status)
    }

    /// Elapsed playback time of `key` in seconds.
    pub fn position(&self, key: SourceKey) -> Option<f64> {
        self.sources.get(key).map(SampleSource::position_seconds)
    }

    pub fn source(&self, key: SourceKey) -> Option<&SampleSource> {
        self.sources.get(key)
    }

    pub fn sources(&self) -> impl Iterator<Item = (SourceKey, &SampleSource)> {
        self.sources.iter()
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Whether auto-play is still waiting on `key`.
    pub fn is_pending(&self, key: SourceKey) -> bool {
        self.pending_play.contains(&key)
    }

    /// True while a graph is installed and the driver is running.
    pub fn is_audio_running(&self) -> bool {
        self.session.is_some()
    }

    /// True while any source is playing or a routed source waits to auto-play.
    ///
    /// Sources that failed to load or validate stay pending until a live
    /// change routes them, but do not keep the controller active.
    pub fn is_active(&self) -> bool {
        self.pending_play.iter().any(|&k| self.registry.contains(k))
            || self.sources.values().any(|s| s.status().is_playing())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.stop();
            session.dispose();
        }
    }
}
