//! Readiness monitor status (Service 01, PID 01)

use crate::{helpers::fixed_width_nibbles, DiagServerResult};

/// Number of hex characters in a monitor status payload (4 bytes, A-D)
pub const MONITOR_STATUS_WIDTH: usize = 8;

/// Names of the continuous monitors, in the order they are reported
pub const CONTINUOUS_MONITORS: [&str; 3] = ["Misfire", "Fuel system", "Components"];

/// Names of the once per drive cycle monitors (Spark ignition), in the order they are reported
pub const ONCE_ONLY_MONITORS: [&str; 7] = [
    "Catalyst",
    "Heated catalyst",
    "Evaporative system",
    "Secondary air system",
    "A/C refrigerant",
    "Oxygen sensor",
    "Oxygen sensor heater",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Interpretation of a raw 2 bit monitor state.
///
/// The low bit of the raw value is the 'supported' bit, the high bit is the 'incomplete' bit.
pub enum MonitorState {
    /// Monitor is not supported by the vehicle
    #[strum(to_string = "Unsupported")]
    Unsupported,
    /// Monitor is supported, and has completed
    #[strum(to_string = "Supported - Completed")]
    Complete,
    /// Monitor is not supported, but still reported as incomplete
    #[strum(to_string = "Unsupported")]
    UnsupportedIncomplete,
    /// Monitor is supported, but has not completed yet
    #[strum(to_string = "Supported - Incompleted")]
    Incomplete,
}

impl From<u8> for MonitorState {
    fn from(raw: u8) -> Self {
        match raw & 0b11 {
            0 => Self::Unsupported,
            1 => Self::Complete,
            2 => Self::UnsupportedIncomplete,
            _ => Self::Incomplete,
        }
    }
}

/// Decoded readiness monitor status
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorStatusReport {
    /// Number of stored DTCs (0-127)
    pub code_count: u8,
    /// Malfunction indicator lamp (Check engine light) is on
    pub mil_on: bool,
    /// Raw 2 bit state (0-3) of each continuous monitor. See [CONTINUOUS_MONITORS]
    pub continuous_monitors: [u8; 3],
    /// Raw 2 bit state (0-3) of each once only monitor. See [ONCE_ONLY_MONITORS]
    pub once_only_monitors: [u8; 7],
    /// Bit 7 of byte D (EGR system). This does not follow the paired bit layout
    /// of the other monitors
    pub egr_monitor_extra_bit: u8,
}

impl MonitorStatusReport {
    /// Continuous monitor states, labelled
    pub fn continuous_states(&self) -> [MonitorState; 3] {
        self.continuous_monitors.map(MonitorState::from)
    }

    /// Once only monitor states, labelled
    pub fn once_only_states(&self) -> [MonitorState; 7] {
        self.once_only_monitors.map(MonitorState::from)
    }

    /// MIL state as shown on a report
    pub fn mil_text(&self) -> &'static str {
        if self.mil_on { "On" } else { "Off" }
    }

    /// Every monitor with its name and labelled state. Continuous monitors come first
    pub fn tests(&self) -> Vec<MonitorTest> {
        let continuous = CONTINUOUS_MONITORS.into_iter().zip(self.continuous_states());
        let once_only = ONCE_ONLY_MONITORS.into_iter().zip(self.once_only_states());
        continuous
            .chain(once_only)
            .map(|(name, state)| MonitorTest { name, state })
            .collect()
    }
}

/// A single named readiness monitor
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MonitorTest {
    /// Monitor name
    pub name: &'static str,
    /// Monitor state
    pub state: MonitorState,
}

/// Decodes a monitor status payload (Exactly 4 bytes, 8 hex characters).
///
/// * Byte A - Bit 7 is the MIL, bits 0-6 are the number of stored DTCs
/// * Byte B - Continuous monitor `i` is bit `i` plus 2x bit `3+i`
/// * Bytes C and D - Once only monitor `i` is bit `i` of C plus 2x bit `i` of D
/// * Bit 7 of byte D - EGR system flag
pub fn decode_monitor_status(payload: &str) -> DiagServerResult<MonitorStatusReport> {
    let nibbles = fixed_width_nibbles(payload, MONITOR_STATUS_WIDTH)?;
    let byte = |idx: usize| (nibbles[idx * 2] << 4) | nibbles[idx * 2 + 1];
    let (a, b, c, d) = (byte(0), byte(1), byte(2), byte(3));

    let mut continuous_monitors = [0u8; 3];
    for (i, state) in continuous_monitors.iter_mut().enumerate() {
        *state = ((b >> i) & 0x01) + (((b >> (3 + i)) & 0x01) << 1);
    }
    let mut once_only_monitors = [0u8; 7];
    for (i, state) in once_only_monitors.iter_mut().enumerate() {
        *state = ((c >> i) & 0x01) + (((d >> i) & 0x01) << 1);
    }

    Ok(MonitorStatusReport {
        code_count: a & 0x7F,
        mil_on: a & 0x80 != 0,
        continuous_monitors,
        once_only_monitors,
        egr_monitor_extra_bit: (d >> 7) & 0x01,
    })
}
