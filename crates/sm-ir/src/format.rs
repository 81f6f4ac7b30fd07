//! PCM format description.

use core::fmt;

/// Sample width accepted by the output driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BitsPerSample {
    /// 16-bit signed integer
    Bits16,
    /// 32-bit IEEE float
    #[default]
    Bits32,
}

impl BitsPerSample {
    /// Width in bits.
    pub const fn bits(self) -> u16 {
        match self {
            BitsPerSample::Bits16 => 16,
            BitsPerSample::Bits32 => 32,
        }
    }

    /// Parse a raw bit width. Only 16 and 32 are supported.
    pub const fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(BitsPerSample::Bits16),
            32 => Some(BitsPerSample::Bits32),
            _ => None,
        }
    }
}

impl fmt::Display for BitsPerSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Format of a decoded or converted stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormatInfo {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample as stored in the file
    pub bits_per_sample: u16,
}

impl FormatInfo {
    pub const fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Bytes per interleaved frame.
    pub const fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub const fn average_bytes_per_second(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// True if rate and width both match the requested target.
    pub fn matches(&self, sample_rate: u32, bits: BitsPerSample) -> bool {
        self.sample_rate == sample_rate && self.bits_per_sample == bits.bits()
    }
}

impl fmt::Display for FormatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}
