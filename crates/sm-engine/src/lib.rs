//! Routing engine for spatialmux.
//!
//! Owns everything between decoded files and the driver: per-source streams
//! and clocks, the channel routing table, and construction of the
//! multiplexed stream handed to the output driver.

mod clock;
mod mixer;
mod registry;
mod source;
mod stream;

use thiserror::Error;

pub use clock::PlaybackClock;
pub use mixer::{Lane, MixGraph, MixGraphBuilder};
pub use registry::{RegistryId, TrackRegistry};
pub use source::{Callback, SampleSource, SourceEvent, TransportSnapshot};
pub use stream::SourceStream;

/// Error building a mix graph from the routing table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixError {
    #[error("source on channel {channel} is playing but its stream is not loaded")]
    UnreadySource { channel: u16 },

    #[error("{registered} sources registered but the driver only has {capacity} channels")]
    CapacityExceeded { registered: usize, capacity: u16 },

    #[error("channel {channel} is assigned to more than one source")]
    DuplicateChannel { channel: u16 },

    #[error("slot {slot} holds a source assigned to channel {source_channel}")]
    ChannelMismatch { slot: u16, source_channel: i32 },

    #[error("routing table references a source that no longer exists (channel {channel})")]
    MissingSource { channel: u16 },
}
