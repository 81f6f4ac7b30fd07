//! Driver traits and error types.

use sm_engine::MixGraph;
use thiserror::Error;

/// Error type for driver operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("no driver name specified")]
    NoDriverName,

    #[error("driver not found: {0}")]
    DriverNotFound(String),

    #[error("device init error: {0}")]
    DeviceInit(String),

    #[error("stream create error: {0}")]
    StreamCreate(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("no stream installed on the driver")]
    NotInitialized,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Enumerates and opens drivers.
pub trait DriverHost {
    /// Names of every driver that can be opened.
    fn driver_names(&self) -> Vec<String>;

    /// Open the driver called `name`.
    fn open(&self, name: &str) -> Result<Box<dyn DriverSession>, AudioError>;
}

/// An open connection to one output driver.
///
/// Lifecycle: `init` installs a graph, `start`/`stop` gate playback, and
/// `dispose` releases the driver. The graph is only swapped while stopped.
pub trait DriverSession {
    fn name(&self) -> &str;

    /// Number of channels the driver accepts.
    fn input_channel_count(&self) -> u16;

    /// Install `graph` as the stream the driver pulls from.
    fn init(&mut self, graph: MixGraph) -> Result<(), AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    fn dispose(self: Box<Self>);
}

/// Resolve `name` against the host's driver list and open it.
pub fn connect(host: &dyn DriverHost, name: &str) -> Result<Box<dyn DriverSession>, AudioError> {
    if name.is_empty() {
        return Err(AudioError::NoDriverName);
    }
    if !host.driver_names().iter().any(|n| n == name) {
        return Err(AudioError::DriverNotFound(name.to_string()));
    }
    let session = host.open(name)?;
    log::info!(
        "connected to driver \"{}\" ({} channels)",
        name,
        session.input_channel_count()
    );
    Ok(session)
}
