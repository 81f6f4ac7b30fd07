//! Core types for the spatialmux routing engine.
//!
//! This crate defines the plain data shared by every layer: the format
//! description that decoders emit and the driver consumes, the decoded PCM
//! container, and the per-source playback status.

mod format;
mod pcm;
mod status;

pub use format::{BitsPerSample, FormatInfo};
pub use pcm::PcmBuffer;
pub use status::PlaybackStatus;

slotmap::new_key_type! {
    /// Key for referencing a sample source in the controller's source arena.
    pub struct SourceKey;
}
