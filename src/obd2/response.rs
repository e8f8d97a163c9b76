//! Normalization of raw adapter responses

use crate::{DiagError, DiagServerResult};

/// Shortest raw response that can hold meaningful data
pub const MIN_RESPONSE_LEN: usize = 7;
/// Length of the echoed service and PID (2 bytes) at the start of a service 01 response
pub const PID_ECHO_LEN: usize = 4;
/// Length of the echoed service (1 byte) at the start of a service 03/07 response
pub const SERVICE_ECHO_LEN: usize = 2;

const NO_DATA: &str = "NODATA";

/// A normalized adapter response
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NormalizedResponse {
    /// Adapter reported that there is no data for the request
    NoData,
    /// Hex payload, with spaces and the echoed service/PID removed
    Payload(String),
}

/// Normalizes a raw service 01 response, such as `41 0C 1A F8`, into its payload (`1AF8`).
///
/// Only the first line of the response is considered, and all spaces are removed.
/// Responses shorter than [MIN_RESPONSE_LEN] are rejected with [DiagError::InvalidResponse]
pub fn interpret(raw: &str) -> DiagServerResult<NormalizedResponse> {
    interpret_with_echo(raw, PID_ECHO_LEN)
}

/// Same as [interpret], but strips `echo_len` characters from the start of the payload
/// rather than the 4 characters of a service 01 response
pub fn interpret_with_echo(raw: &str, echo_len: usize) -> DiagServerResult<NormalizedResponse> {
    if raw.len() < MIN_RESPONSE_LEN {
        return Err(DiagError::InvalidResponse(raw.to_string()));
    }
    let first_line = raw.split('\r').next().unwrap_or_default();
    let cleaned: String = first_line.chars().filter(|c| *c != ' ').collect();
    if cleaned.starts_with(NO_DATA) {
        return Ok(NormalizedResponse::NoData);
    }
    Ok(NormalizedResponse::Payload(cleaned.chars().skip(echo_len).collect()))
}
