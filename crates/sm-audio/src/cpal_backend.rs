//! CPAL-based output driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use sm_engine::MixGraph;

use crate::traits::{AudioError, DriverHost, DriverSession};

/// Output devices of the platform's default host, addressed by name.
pub struct CpalHost {
    host: cpal::Host,
}

impl CpalHost {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverHost for CpalHost {
    fn driver_names(&self) -> Vec<String> {
        match self.host.output_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                log::warn!("failed to enumerate output devices: {}", e);
                Vec::new()
            }
        }
    }

    fn open(&self, name: &str) -> Result<Box<dyn DriverSession>, AudioError> {
        let device = self
            .host
            .output_devices()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| AudioError::DriverNotFound(name.to_string()))?;

        let default = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        // Widest layout the device offers; multi-channel interfaces often
        // default to stereo.
        let capacity = device
            .supported_output_configs()
            .ok()
            .and_then(|configs| configs.map(|c| c.channels()).max())
            .unwrap_or_else(|| default.channels());

        Ok(Box::new(CpalSession {
            name: name.to_string(),
            device,
            sample_format: default.sample_format(),
            capacity,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// One open CPAL output device.
pub struct CpalSession {
    name: String,
    device: Device,
    sample_format: SampleFormat,
    capacity: u16,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl CpalSession {
    fn build_stream(&self, graph: MixGraph) -> Result<Stream, AudioError> {
        let config = StreamConfig {
            channels: graph.channels(),
            sample_rate: cpal::SampleRate(graph.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };
        let running = self.running.clone();
        let mut graph = graph;
        let on_error = |err: cpal::StreamError| log::error!("audio stream error: {}", err);

        let stream = match self.sample_format {
            SampleFormat::F32 => self.device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    graph.read(data);
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => self.device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0);
                        return;
                    }
                    graph.read_i16(data);
                },
                on_error,
                None,
            ),
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        };

        stream.map_err(|e| AudioError::StreamCreate(e.to_string()))
    }
}

impl DriverSession for CpalSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_channel_count(&self) -> u16 {
        self.capacity
    }

    fn init(&mut self, graph: MixGraph) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        self.stream = None;
        let channels = graph.channels();
        let stream = self.build_stream(graph)?;
        // Some hosts start streams on creation; hold it until start().
        let _ = stream.pause();
        self.stream = Some(stream);
        log::debug!("initialised \"{}\" with {} channels", self.name, channels);
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_ref().ok_or(AudioError::NotInitialized)?;
        self.running.store(true, Ordering::Relaxed);
        stream
            .play()
            .map_err(|e| AudioError::Playback(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn dispose(mut self: Box<Self>) {
        self.running.store(false, Ordering::Relaxed);
        self.stream = None;
        log::debug!("disposed \"{}\"", self.name);
    }
}
