//! Output driver backends for spatialmux.
//!
//! The engine treats a driver as an opaque sink: it is opened by name,
//! reports how many channels it accepts, and plays exactly one installed
//! [`MixGraph`](sm_engine::MixGraph) at a time.

mod cpal_backend;
mod offline;
mod traits;

pub use cpal_backend::{CpalHost, CpalSession};
pub use offline::{OfflineHost, OfflineProbe, OfflineSession};
pub use traits::{connect, AudioError, DriverHost, DriverSession};
