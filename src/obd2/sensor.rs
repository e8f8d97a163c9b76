//! Sensor catalog interface
//!
//! This crate does not ship a PID catalog. Applications describe the sensors they
//! want to read by implementing [Sensor], and pass them to
//! [super::DiagnosticSession::read_sensor].

use crate::DiagServerResult;

/// A sensor which can be read with a single command
pub trait Sensor {
    /// Decoded value type
    type Value;

    /// Human readable name of the sensor
    fn name(&self) -> &str;

    /// Unit of the decoded value. Empty if the value has no unit
    fn unit(&self) -> &str;

    /// Command to send to the adapter, EG: `010C`
    fn command(&self) -> &str;

    /// Decodes the normalized payload (Hex, echo removed) of a response
    fn decode(&self, payload: &str) -> DiagServerResult<Self::Value>;
}

/// Result of reading a sensor
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading<T> {
    /// Decoded sensor value
    Value(T),
    /// Vehicle has no data for this sensor
    NoData,
}

impl<T> SensorReading<T> {
    /// Returns the value, if there was one
    pub fn value(self) -> Option<T> {
        match self {
            SensorReading::Value(v) => Some(v),
            SensorReading::NoData => None,
        }
    }
}

/// A named sensor reading, together with its unit
#[derive(Debug, Clone, PartialEq)]
pub struct NamedReading<T> {
    /// Name of the sensor
    pub name: String,
    /// Reading
    pub reading: SensorReading<T>,
    /// Unit of the reading
    pub unit: String,
}
