//! Engine configuration, loaded from YAML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sm_ir::BitsPerSample;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported bits per sample: {0} (expected 16 or 32)")]
    UnsupportedBitDepth(u16),

    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_bits_per_sample() -> u16 {
    32
}

fn default_volume() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Driver and target format plus the sources to attach.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Name of the output driver to connect to
    pub driver: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One file routed to one output channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    /// 1-based output channel
    pub channel: i32,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub looping: bool,
    /// Start playing as soon as the source is ready
    #[serde(default = "default_true")]
    pub play_on_attach: bool,
}

impl EngineConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            sample_rate: default_sample_rate(),
            bits_per_sample: default_bits_per_sample(),
            sources: Vec::new(),
        }
    }

    pub fn with_format(mut self, sample_rate: u32, bits_per_sample: u16) -> Self {
        self.sample_rate = sample_rate;
        self.bits_per_sample = bits_per_sample;
        self
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }

    /// Read a YAML file. Relative source paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&text, base).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse YAML text, resolving relative source paths against `base`.
    pub fn parse(text: &str, base: &Path) -> Result<Self, serde_yaml::Error> {
        let mut config: EngineConfig = serde_yaml::from_str(text)?;
        for source in &mut config.sources {
            if !source.path.as_os_str().is_empty() && source.path.is_relative() {
                source.path = base.join(&source.path);
            }
        }
        Ok(config)
    }

    /// Validated target bit depth.
    pub fn target_bits(&self) -> Result<BitsPerSample, ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        BitsPerSample::from_bits(self.bits_per_sample)
            .ok_or(ConfigError::UnsupportedBitDepth(self.bits_per_sample))
    }

    /// Highest channel any configured source asks for.
    pub fn max_channel(&self) -> u16 {
        self.sources
            .iter()
            .map(|s| s.channel.clamp(0, u16::MAX as i32) as u16)
            .max()
            .unwrap_or(0)
    }
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>, channel: i32) -> Self {
        Self {
            path: path.into(),
            channel,
            volume: default_volume(),
            looping: false,
            play_on_attach: true,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_play_on_attach(mut self, play_on_attach: bool) -> Self {
        self.play_on_attach = play_on_attach;
        self
    }
}
