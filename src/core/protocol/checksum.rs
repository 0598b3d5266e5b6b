//! Frame checksum
//!
//! The controllers protect each frame with the 8-bit sum of every byte
//! preceding the checksum field, sent as three zero-padded decimal digits.

/// Width of the checksum field in characters
pub const CHECKSUM_WIDTH: usize = 3;

/// Simple 8-bit sum
pub fn sum8_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Checksum as it appears on the wire
pub fn format_checksum(checksum: u8) -> String {
    format!("{:03}", checksum)
}

/// Append the wire checksum for `body` to `body`
pub fn stamp(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + CHECKSUM_WIDTH);
    out.push_str(body);
    out.push_str(&format_checksum(sum8_checksum(body.as_bytes())));
    out
}

/// Verify a transmitted checksum field against `body`
///
/// The field must be exactly three ASCII digits; anything else fails.
pub fn verify(body: &[u8], field: &str) -> bool {
    if field.len() != CHECKSUM_WIDTH || !field.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    field
        .parse::<u16>()
        .map(|transmitted| transmitted == u16::from(sum8_checksum(body)))
        .unwrap_or(false)
}
