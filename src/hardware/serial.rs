//! Serial port transport, for USB and Bluetooth ELM327 adapters
//!
//! The port is always opened with 8 data bits, no parity and 1 stop bit.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    io::{ErrorKind, Read, Write},
    time::Duration,
};

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use crate::{channel::Transport, DiagServerResult};

use super::{HardwareError, HardwareResult, TransportOpener};

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialSettings {
    /// Port name, EG: `/dev/ttyUSB0` or `COM3`
    pub port_name: String,
    /// Baud rate
    pub baud: u32,
    /// Timeout for a single read from the port
    pub timeout_ms: u64,
}

impl SerialSettings {
    /// Creates settings for a port with the default baud rate and timeout
    pub fn new(port_name: &str) -> Self {
        Self {
            port_name: port_name.to_string(),
            ..Default::default()
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud: 9600,
            timeout_ms: 2000,
        }
    }
}

impl TransportOpener for SerialSettings {
    fn open(&mut self) -> DiagServerResult<Box<dyn Transport>> {
        log::debug!(
            "Opening serial port {} at {} baud (8N1, timeout {}ms)",
            self.port_name,
            self.baud,
            self.timeout_ms
        );
        let port = serialport::new(self.port_name.as_str(), self.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(self.timeout_ms))
            .open()
            .map_err(|e| convert_serial_error(&self.port_name, e))?;
        Ok(Box::new(SerialTransport { port }))
    }
}

/// Opened serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl Debug for SerialTransport {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "SerialTransport {}", self.port.name().unwrap_or_default())
    }
}

impl Transport for SerialTransport {
    fn write_bytes(&mut self, buffer: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buffer)?;
        self.port.flush()
    }

    fn read_byte(&mut self) -> std::io::Result<u8> {
        let mut buf = [0u8; 1];
        loop {
            match self.port.read(&mut buf) {
                Ok(1) => return Ok(buf[0]),
                Ok(_) => {
                    return Err(std::io::Error::new(
                        ErrorKind::TimedOut,
                        "No data received from serial port",
                    ));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn clear_rx_buffer(&mut self) -> std::io::Result<()> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }

    fn clear_tx_buffer(&mut self) -> std::io::Result<()> {
        Ok(self.port.clear(ClearBuffer::Output)?)
    }
}

/// Lists the names of all serial ports present on the system
pub fn list_ports() -> HardwareResult<Vec<String>> {
    Ok(serialport::available_ports()
        .map_err(|e| HardwareError::APIError {
            desc: e.description,
        })?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

fn convert_serial_error(port_name: &str, error: serialport::Error) -> HardwareError {
    match error.kind {
        serialport::ErrorKind::NoDevice => HardwareError::DeviceNotFound(port_name.to_string()),
        serialport::ErrorKind::InvalidInput => HardwareError::InvalidSettings(error.description),
        _ => HardwareError::APIError {
            desc: error.description,
        },
    }
}
