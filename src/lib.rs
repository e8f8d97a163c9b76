#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    //unstable_features,
    //unused_imports,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate for talking OBD2 to ELM327 style diagnostic adapters over a serial link,
//! and for decoding the binary payloads hidden inside their ASCII responses.
//!
//! ## Protocol engine
//!
//! ELM327 adapters speak a line based ASCII protocol. Every command is terminated with `\r\n`,
//! every response is terminated with `\r`, and the adapter emits a `>` prompt once it is ready
//! to accept the next command. The [channel] module handles this framing, and the [connection]
//! module performs the startup handshake (`ATZ`, `ATE0`, `ATSP0`, `0100`) with bounded retries
//! should the adapter report `BUS ERROR` whilst initializing the vehicle bus.
//!
//! ## Decoding
//!
//! The [dtc] module contains pure functions for decoding
//! * Diagnostic trouble codes (DTCs) returned by OBD2 services 03 and 07
//! * Readiness monitor status returned by service 01 PID 01
//!
//! These functions have no dependency on any hardware, and can be used on their own.
//!
//! ## Sessions
//!
//! [obd2::DiagnosticSession] ties everything together, and provides functions for reading and clearing
//! DTCs, reading monitor status and reading sensors provided by a caller supplied sensor catalog.
//!
//! ## Hardware support
//!
//! With the `serial` feature (enabled by default), any serial port supported by the `serialport` crate
//! can be used. [hardware::simulation] provides a simulated adapter for testing without a vehicle.

use std::sync::Arc;

use connection::ConnectionState;
use hardware::HardwareError;

pub mod channel;
pub mod connection;
pub mod dtc;
pub mod hardware;
pub mod helpers;
pub mod obd2;
pub mod timing;

pub use connection::{ConnectionManager, ConnectionOptions};
pub use dtc::{
    decode_monitor_status, decode_trouble_code_block, DtcCategory, DtcOrigin, MonitorStatusReport,
    TroubleCode, TroubleCodeRecord,
};
pub use obd2::{interpret, DiagnosticSession, NormalizedResponse, Sensor, SensorReading};
pub use timing::{CancelToken, Sleeper, ThreadSleeper};

/// Diagnostic server result
pub type DiagServerResult<T> = Result<T, DiagError>;

#[derive(Clone, Debug, thiserror::Error)]
/// Diagnostic server error
pub enum DiagError {
    /// Reading or writing the underlying byte stream failed
    #[error("Transport error")]
    Transport(
        #[from]
        #[source]
        Arc<std::io::Error>,
    ),
    /// Adapter response was too short to contain anything meaningful
    #[error("Invalid response from adapter: '{0}'")]
    InvalidResponse(String),
    /// A decoder was given a payload of the wrong width, or with non hex characters
    #[error("Malformed payload '{payload}', expected {expected} hex characters")]
    MalformedPayload {
        /// Payload that failed to decode
        payload: String,
        /// Number of hex characters the decoder required
        expected: usize,
    },
    /// The adapter kept reporting `BUS ERROR` during the handshake
    #[error("Bus initialization failed after {attempts} attempt(s)")]
    BusInitialization {
        /// Number of handshake attempts made
        attempts: u32,
    },
    /// The operation was aborted through a [CancelToken]
    #[error("Operation cancelled")]
    Cancelled,
    /// The adapter reported that there is no data for the request
    #[error("Adapter did not return any data for the request")]
    EmptyResponse,
    /// Operation requires a connected adapter
    #[error("Adapter is not connected (state: {0})")]
    NotConnected(ConnectionState),
    /// Device hardware error
    #[error("Diagnostic adapter hardware error")]
    HardwareError(
        #[from]
        #[source]
        Arc<HardwareError>,
    ),
}

impl From<std::io::Error> for DiagError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

impl From<HardwareError> for DiagError {
    fn from(err: HardwareError) -> Self {
        Self::HardwareError(Arc::new(err))
    }
}

/// Events emitted by the protocol engine. These are purely informational,
/// and handling them never changes the outcome of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Connection state changed
    StateChange {
        /// Old state
        old: ConnectionState,
        /// New state
        new: ConnectionState,
    },
    /// Adapter identified itself in response to a reset
    DeviceIdentified(String),
    /// Handshake attempt failed because the adapter could not initialize the vehicle bus
    HandshakeRetry {
        /// Attempt number which failed, starting from 1
        attempt: u32,
        /// Response from the adapter
        response: String,
    },
    /// Command sent to the adapter
    Request(String),
    /// Response frame read from the adapter
    Response(String),
    /// A fatal error occurred, and the connection was torn down
    CriticalError {
        /// Error description
        desc: String,
    },
}

/// Handler for [ServerEvent]s. This can be used to display protocol traffic
/// in an application without the protocol engine knowing anything about it
pub trait ServerEventHandler: Send {
    /// Called every time an event is emitted
    fn on_event(&mut self, e: ServerEvent);
}

/// Event handler which discards every event
#[derive(Debug, Copy, Clone, Default)]
pub struct VoidHandler;

impl ServerEventHandler for VoidHandler {
    fn on_event(&mut self, _e: ServerEvent) {}
}

/// Event handler which forwards every event to the [log] facade
#[derive(Debug, Copy, Clone, Default)]
pub struct LogHandler;

impl ServerEventHandler for LogHandler {
    fn on_event(&mut self, e: ServerEvent) {
        match e {
            ServerEvent::StateChange { old, new } => log::info!("Connection state {old} -> {new}"),
            ServerEvent::DeviceIdentified(id) => log::info!("Adapter identified as '{id}'"),
            ServerEvent::HandshakeRetry { attempt, response } => {
                log::warn!("Handshake attempt {attempt} failed: {response}")
            }
            ServerEvent::Request(r) => log::info!("Out -> {r}"),
            ServerEvent::Response(r) => log::info!("In <- {r}"),
            ServerEvent::CriticalError { desc } => log::error!("Critical error: {desc}"),
        }
    }
}

impl<T: ServerEventHandler + ?Sized> ServerEventHandler for Box<T> {
    fn on_event(&mut self, e: ServerEvent) {
        (**self).on_event(e)
    }
}
