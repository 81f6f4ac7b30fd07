//! In-memory output driver.
//!
//! Behaves like a hardware driver but nothing pulls from it on its own: the
//! owner of an [`OfflineProbe`] plays the part of the driver callback thread
//! and renders frames on demand. Used for WAV export and for tests.

use std::sync::Arc;

use parking_lot::Mutex;
use sm_engine::MixGraph;

use crate::traits::{AudioError, DriverHost, DriverSession};

#[derive(Default)]
struct ProbeState {
    installed: Option<MixGraph>,
    running: bool,
    inits: usize,
    disposes: usize,
    fail_next_init: bool,
}

/// Handle onto the offline driver's installed stream and lifecycle counters.
#[derive(Clone, Default)]
pub struct OfflineProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl OfflineProbe {
    /// Pull `frames` interleaved frames of `channels` width.
    ///
    /// Renders silence while stopped or when nothing is installed.
    pub fn render(&self, frames: usize, channels: u16) -> Vec<f32> {
        let mut out = vec![0.0; frames * channels as usize];
        let mut state = self.state.lock();
        if !state.running {
            return out;
        }
        if let Some(graph) = state.installed.as_mut() {
            if graph.channels() == channels {
                graph.read(&mut out);
            } else {
                let mut wide = graph.render_frames(frames);
                wide.resize(frames * graph.channels() as usize, 0.0);
                let src_chs = graph.channels() as usize;
                for (dst, src) in out.chunks_mut(channels as usize).zip(wide.chunks(src_chs)) {
                    for (d, s) in dst.iter_mut().zip(src) {
                        *d = *s;
                    }
                }
            }
        }
        out
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Channel count of the installed graph, if any.
    pub fn installed_channels(&self) -> Option<u16> {
        self.state.lock().installed.as_ref().map(MixGraph::channels)
    }

    /// Inspect the installed graph.
    pub fn with_installed<R>(&self, f: impl FnOnce(&MixGraph) -> R) -> Option<R> {
        self.state.lock().installed.as_ref().map(f)
    }

    /// Number of graphs installed so far, i.e. completed rebuilds.
    pub fn init_count(&self) -> usize {
        self.state.lock().inits
    }

    pub fn dispose_count(&self) -> usize {
        self.state.lock().disposes
    }

    /// Make the next `init` fail with a stream error.
    pub fn fail_next_init(&self) {
        self.state.lock().fail_next_init = true;
    }
}

/// Host exposing a fixed set of virtual drivers.
#[derive(Clone, Default)]
pub struct OfflineHost {
    drivers: Vec<(String, u16)>,
    probe: OfflineProbe,
}

impl OfflineHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a virtual driver with `channels` inputs.
    pub fn with_driver(mut self, name: &str, channels: u16) -> Self {
        self.drivers.push((name.to_string(), channels));
        self
    }

    /// Probe shared by every session this host opens.
    pub fn probe(&self) -> OfflineProbe {
        self.probe.clone()
    }
}

impl DriverHost for OfflineHost {
    fn driver_names(&self) -> Vec<String> {
        self.drivers.iter().map(|(n, _)| n.clone()).collect()
    }

    fn open(&self, name: &str) -> Result<Box<dyn DriverSession>, AudioError> {
        let &(_, channels) = self
            .drivers
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| AudioError::DriverNotFound(name.to_string()))?;
        Ok(Box::new(OfflineSession {
            name: name.to_string(),
            channels,
            probe: self.probe.clone(),
        }))
    }
}

/// Session on a virtual driver.
pub struct OfflineSession {
    name: String,
    channels: u16,
    probe: OfflineProbe,
}

impl DriverSession for OfflineSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_channel_count(&self) -> u16 {
        self.channels
    }

    fn init(&mut self, graph: MixGraph) -> Result<(), AudioError> {
        let mut state = self.probe.state.lock();
        state.running = false;
        if std::mem::take(&mut state.fail_next_init) {
            state.installed = None;
            return Err(AudioError::StreamCreate("injected init failure".into()));
        }
        if graph.channels() > self.channels {
            return Err(AudioError::StreamCreate(format!(
                "{} channels requested, driver has {}",
                graph.channels(),
                self.channels
            )));
        }
        state.installed = Some(graph);
        state.inits += 1;
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        let mut state = self.probe.state.lock();
        if state.installed.is_none() {
            return Err(AudioError::NotInitialized);
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.probe.state.lock().running = false;
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        let mut state = self.probe.state.lock();
        state.running = false;
        state.installed = None;
        state.disposes += 1;
    }
}
