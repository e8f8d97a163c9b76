//! Module for OBD2 over ELM327 style adapters

mod response;
mod sensor;
mod session;

// Exports
pub use response::*;
pub use sensor::*;
pub use session::*;

/// ASCII commands understood by the adapter
pub mod command {
    /// Reset the adapter
    pub const RESET: &str = "ATZ";
    /// Disable command echo
    pub const ECHO_OFF: &str = "ATE0";
    /// Select the vehicle protocol automatically
    pub const AUTO_PROTOCOL: &str = "ATSP0";
    /// Service 01 PID 00 - Supported PIDs 01-20. Used to probe the vehicle bus
    pub const PROBE: &str = "0100";
    /// Service 01 PID 01 - Monitor status since DTCs cleared
    pub const MONITOR_STATUS: &str = "0101";
    /// Service 03 - Read stored DTCs
    pub const READ_STORED_DTC: &str = "03";
    /// Service 04 - Clear DTCs and freeze frame data
    pub const CLEAR_DTC: &str = "04";
    /// Service 07 - Read DTCs detected during the current or last drive cycle (Freeze frame)
    pub const READ_FREEZE_DTC: &str = "07";

    /// Probe response when the adapter could not initialize the vehicle bus
    pub const BUS_ERROR: &str = "BUS ERROR";
    /// Status line sent ahead of the first response while the adapter searches for the vehicle protocol
    pub const SEARCHING: &str = "SEARCHING...";
    /// Response prefix when there is no freeze frame data
    pub const FREEZE_NO_DATA: &str = "NO DATA";
}
