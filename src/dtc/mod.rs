//! Module for OBD2 Diagnostic trouble code data
//!
//! Everything in this module is a pure function over fixed width ASCII hex payloads,
//! as found in adapter responses once the echoed service ID has been removed.
//! Nothing here touches hardware.

use std::{fmt::Display, str::FromStr};

use crate::{helpers::fixed_width_nibbles, DiagError, DiagServerResult};

mod monitor;

pub use monitor::*;

/// Number of hex characters making up a single DTC in a service 03/07 response
pub const DTC_FIELD_WIDTH: usize = 4;
/// Number of DTCs contained in a single service 03/07 response
pub const DTCS_PER_BLOCK: usize = 3;

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// System a DTC belongs to. This is encoded in the top 2 bits of the DTC word
pub enum DtcCategory {
    /// Engine and transmission
    #[strum(to_string = "P")]
    Powertrain,
    /// Chassis
    #[strum(to_string = "C")]
    Chassis,
    /// Body
    #[strum(to_string = "B")]
    Body,
    /// Vehicle network
    #[strum(to_string = "U")]
    Network,
}

impl DtcCategory {
    /// Converts the 2 category bits (0-3) into a category.
    /// Only the lowest 2 bits of `bits` are considered
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Powertrain,
            0b01 => Self::Chassis,
            0b10 => Self::Body,
            _ => Self::Network,
        }
    }

    /// Returns the 2 category bits (0-3) of this category
    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

/// A single OBD2 diagnostic trouble code, such as `P0133`
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TroubleCode {
    /// System the DTC belongs to
    pub category: DtcCategory,
    /// Second character of the DTC (0-3)
    pub subtype: u8,
    /// Last 3 characters of the DTC, as their raw 12 bit value.
    /// These are displayed digit for digit, and are never converted to decimal
    pub body: u16,
}

impl TroubleCode {
    /// Creates a DTC from its parts. Returns [None] if `subtype` is greater than 3,
    /// or `body` does not fit into 12 bits
    pub fn new(category: DtcCategory, subtype: u8, body: u16) -> Option<Self> {
        if subtype > 0b11 || body > 0x0FFF {
            return None;
        }
        Some(Self {
            category,
            subtype,
            body,
        })
    }

    /// Decodes a DTC from its 16 bit representation
    pub fn from_word(word: u16) -> Self {
        Self {
            category: DtcCategory::from_bits(((word & 0xC000) >> 14) as u8),
            subtype: ((word & 0x3000) >> 12) as u8,
            body: word & 0x0FFF,
        }
    }

    /// Encodes the DTC back into its 16 bit representation
    pub fn to_word(&self) -> u16 {
        (self.category.bits() as u16) << 14
            | ((self.subtype & 0b11) as u16) << 12
            | (self.body & 0x0FFF)
    }
}

impl Display for TroubleCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{:03X}", self.category, self.subtype, self.body)
    }
}

impl FromStr for TroubleCode {
    type Err = DiagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DiagError::MalformedPayload {
            payload: s.to_string(),
            expected: 5,
        };
        if s.len() != 5 || !s.is_ascii() {
            return Err(malformed());
        }
        let category = DtcCategory::from_str(&s[0..1]).map_err(|_| malformed())?;
        let nibbles = fixed_width_nibbles(&s[1..], DTC_FIELD_WIDTH)?;
        let body = nibbles[1..]
            .iter()
            .fold(0u16, |acc, n| (acc << 4) | *n as u16);
        Self::new(category, nibbles[0], body).ok_or_else(malformed)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Where a DTC was read from
pub enum DtcOrigin {
    /// Stored DTC (Service 03)
    Active,
    /// DTC which triggered the freeze frame (Service 07)
    Passive,
}

/// DTC tagged with where it was read from
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TroubleCodeRecord {
    /// The DTC
    pub code: TroubleCode,
    /// Where the DTC was read from
    pub origin: DtcOrigin,
}

/// Decodes one service 03/07 response block of 3 DTCs.
///
/// The payload must contain at least 12 hex characters (3 fields of 4). A field
/// of `0000` is padding, and ends the block. No DTCs after it are returned.
pub fn decode_trouble_code_block(payload: &str) -> DiagServerResult<Vec<TroubleCode>> {
    let nibbles = fixed_width_nibbles(payload, DTC_FIELD_WIDTH * DTCS_PER_BLOCK)?;
    let mut codes = Vec::with_capacity(DTCS_PER_BLOCK);
    for field in nibbles.chunks_exact(DTC_FIELD_WIDTH) {
        let word = field.iter().fold(0u16, |acc, n| (acc << 4) | *n as u16);
        if word == 0 {
            break;
        }
        codes.push(TroubleCode::from_word(word));
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_full_block() {
        let codes = decode_trouble_code_block("01334123C300").unwrap();
        let names: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["P0133", "C0123", "U0300"]);
    }

    #[test]
    fn decode_stops_at_fill() {
        let codes = decode_trouble_code_block("013300000171").unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].to_string(), "P0133");

        assert!(decode_trouble_code_block("000001330133").unwrap().is_empty());
    }

    #[test]
    fn decode_categories_by_bit_pattern() {
        // 0x8 -> 0b10 top bits (Body), 0xB -> 0b10 with subtype 3
        let codes = decode_trouble_code_block("8001B2344567").unwrap();
        assert_eq!(codes[0].category, DtcCategory::Body);
        assert_eq!(codes[0].subtype, 0);
        assert_eq!(codes[1].category, DtcCategory::Body);
        assert_eq!(codes[1].subtype, 3);
        assert_eq!(codes[1].to_string(), "B3234");
        assert_eq!(codes[2].category, DtcCategory::Chassis);
        assert_eq!(codes[2].to_string(), "C0567");
    }

    #[test]
    fn body_is_passed_through_as_hex() {
        let codes = decode_trouble_code_block("0ABF00000000").unwrap();
        assert_eq!(codes[0].body, 0xABF);
        assert_eq!(codes[0].to_string(), "P0ABF");
    }

    #[test]
    fn decode_rejects_short_or_invalid() {
        assert!(matches!(
            decode_trouble_code_block("01334123C3"),
            Err(DiagError::MalformedPayload { expected: 12, .. })
        ));
        assert!(decode_trouble_code_block("0133412XC300").is_err());
    }

    #[test]
    fn word_round_trip() {
        for bits in 0..4u8 {
            for subtype in 0..4u8 {
                for body in 0..=0x0FFFu16 {
                    let code = TroubleCode::new(DtcCategory::from_bits(bits), subtype, body).unwrap();
                    let decoded = TroubleCode::from_word(code.to_word());
                    assert_eq!(decoded, code);
                    assert_eq!(decoded.category.bits(), bits);
                }
            }
        }
    }

    #[test]
    fn parse_from_string() {
        let code: TroubleCode = "U3FA0".parse().unwrap();
        assert_eq!(code.category, DtcCategory::Network);
        assert_eq!(code.subtype, 3);
        assert_eq!(code.body, 0xFA0);
        assert_eq!(code.to_word(), 0xFFA0);
        assert!("P4000".parse::<TroubleCode>().is_err());
        assert!("X0133".parse::<TroubleCode>().is_err());
        assert!("P013".parse::<TroubleCode>().is_err());
    }

    #[test]
    fn new_validates_ranges() {
        assert!(TroubleCode::new(DtcCategory::Powertrain, 4, 0).is_none());
        assert!(TroubleCode::new(DtcCategory::Powertrain, 0, 0x1000).is_none());
    }
}
