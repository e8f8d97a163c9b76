//! When parsing adapter response data from ASCII hex strings,
//! some functions in here can be useful with data transformation

use crate::{DiagError, DiagServerResult};

/// Converts a single ASCII hex character into its value
pub fn hex_to_nibble(hex: u8) -> Option<u8> {
    match hex {
        b'0'..=b'9' => Some(hex - b'0'),
        b'a'..=b'f' => Some(hex - b'a' + 10),
        b'A'..=b'F' => Some(hex - b'A' + 10),
        _ => None,
    }
}

/// Checks that `payload` holds at least `width` characters, all of which are hex digits,
/// and returns the first `width` characters as nibble values
pub(crate) fn fixed_width_nibbles(payload: &str, width: usize) -> DiagServerResult<Vec<u8>> {
    let malformed = || DiagError::MalformedPayload {
        payload: payload.to_string(),
        expected: width,
    };
    if payload.len() < width {
        return Err(malformed());
    }
    payload
        .bytes()
        .take(width)
        .map(|c| hex_to_nibble(c).ok_or_else(malformed))
        .collect()
}

/// Decodes an ASCII hex string (without separators) into bytes.
/// A trailing odd character is rejected
pub fn decode_hex_bytes(payload: &str) -> DiagServerResult<Vec<u8>> {
    let width = payload.len() & !1;
    if width != payload.len() {
        return Err(DiagError::MalformedPayload {
            payload: payload.to_string(),
            expected: payload.len() + 1,
        });
    }
    Ok(fixed_width_nibbles(payload, width)?
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

/// Function to decode a PID support bitmap from the adapter.
/// Most significant bit of the first byte represents the first PID
pub fn decode_pid_support(x: &[u8]) -> Vec<bool> {
    let mut resp: Vec<bool> = Vec::with_capacity(x.len() * 8);
    for b in x {
        let mut mask: u8 = 0b10000000;
        for _ in 0..8 {
            resp.push(b & mask != 0x00);
            mask >>= 1;
        }
    }
    resp
}
