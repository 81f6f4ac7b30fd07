//! Offline rendering through the in-memory driver.

use std::path::Path;
use std::time::Duration;

use sm_audio::OfflineHost;
use sm_formats::{write_wav, ConversionError};
use sm_ir::PcmBuffer;

use crate::{Controller, EngineConfig, TransportError};

/// Ticks per second while rendering, matching a 100 Hz host loop.
const TICK_RATE: usize = 100;

/// Run `config` for `seconds` against a virtual driver and capture the mix.
///
/// The virtual driver gets exactly as many channels as the highest
/// configured channel. Transport is driven by the same tick as live
/// playback, so auto-play, looping and end-of-stream behave identically.
pub fn render_offline(config: &EngineConfig, seconds: f64) -> Result<PcmBuffer, TransportError> {
    let host = OfflineHost::new().with_driver(&config.driver, config.max_channel());
    let probe = host.probe();
    let mut controller = Controller::new(Box::new(host), config)?;

    let rate = config.sample_rate;
    let width = controller.registry().channel_count();
    let block = (rate as usize / TICK_RATE).max(1);
    let total = (seconds.max(0.0) * rate as f64).round() as usize;

    let mut samples = Vec::with_capacity(total * width as usize);
    controller.tick(Duration::ZERO)?;
    let mut rendered = 0;
    while rendered < total {
        let frames = block.min(total - rendered);
        samples.extend(probe.render(frames, width));
        rendered += frames;
        controller.tick(Duration::from_secs_f64(frames as f64 / rate as f64))?;
    }

    log::info!(
        "rendered {} frames x {} channels at {} Hz",
        rendered,
        width,
        rate
    );
    Ok(PcmBuffer::from_interleaved(&samples, width, rate))
}

/// Render and write the multiplexed stream as a WAV file.
pub fn render_to_wav(
    config: &EngineConfig,
    seconds: f64,
    path: &Path,
) -> Result<PcmBuffer, RenderError> {
    let bits = config.target_bits().map_err(TransportError::from)?;
    let pcm = render_offline(config, seconds)?;
    write_wav(path, &pcm, bits)?;
    Ok(pcm)
}

/// Failure of [`render_to_wav`].
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Write(#[from] ConversionError),
}
