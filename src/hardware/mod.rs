//! The hardware module contains simplified API's
//! for opening the byte stream to a diagnostic adapter

#[cfg(feature = "serial")]
pub mod serial;
pub mod simulation;

use crate::{channel::Transport, DiagServerResult};

/// Hardware API result
pub type HardwareResult<T> = std::result::Result<T, HardwareError>;

/// Opens a [Transport] to an adapter.
///
/// The connection manager calls this once per connection attempt, and owns the
/// returned transport until the connection is closed.
pub trait TransportOpener: Send + std::fmt::Debug {
    /// Opens the transport
    fn open(&mut self) -> DiagServerResult<Box<dyn Transport>>;
}

#[derive(Debug, thiserror::Error)]
/// Represents error that can be returned by Hardware API
pub enum HardwareError {
    /// Low level driver error
    #[error("Hardware API Error. Description: {desc}")]
    APIError {
        /// API Error description
        desc: String,
    },
    /// Hardware not found
    #[error("Device '{0}' not found")]
    DeviceNotFound(String),
    /// Port settings were rejected by the device
    #[error("Invalid port settings: {0}")]
    InvalidSettings(String),
}
