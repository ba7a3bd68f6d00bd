//! Decoded KLV element values.

use std::collections::BTreeMap;

use serde::Serialize;

/// Decoded elements of one local set, keyed by field name.
pub type FieldMap = BTreeMap<&'static str, KlvValue>;

/// A decoded KLV element value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KlvValue {
    /// Unsigned integer (u8 through u64).
    Unsigned(u64),
    /// Integer-encoded floating point value, already mapped onto its range.
    Float(f64),
    /// Text element.
    Text(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Nested local set.
    Set(FieldMap),
}

impl KlvValue {
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            KlvValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            KlvValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            KlvValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Read a big-endian unsigned integer of 1 to 8 bytes.
pub(crate) fn read_unsigned(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Read a big-endian two's complement integer of 1 to 8 bytes.
pub(crate) fn read_signed(bytes: &[u8]) -> i64 {
    let bits = bytes.len() as u32 * 8;
    let raw = read_unsigned(bytes);
    if bits >= 64 {
        raw as i64
    } else {
        let shift = 64 - bits;
        ((raw << shift) as i64) >> shift
    }
}

/// Map a signed raw value of `width` bytes from `[MIN + 1, MAX]` onto
/// `[low, high]`. The raw `MIN` value marks "out of range" and yields `None`.
pub(crate) fn scale_signed(raw: i64, width: usize, low: f64, high: f64) -> Option<f64> {
    let bits = width as u32 * 8;
    let max = if bits >= 64 { i64::MAX } else { (1i64 << (bits - 1)) - 1 };
    let min = -max - 1;
    if raw == min {
        return None;
    }
    let span = (max as f64) * 2.0;
    Some(low + (raw as f64 + max as f64) * (high - low) / span)
}

/// Map an unsigned raw value of `width` bytes from `[0, MAX]` onto `[low, high]`.
pub(crate) fn scale_unsigned(raw: u64, width: usize, low: f64, high: f64) -> f64 {
    let bits = width as u32 * 8;
    let max = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    low + raw as f64 * (high - low) / max as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_signed_sign_extends() {
        assert_eq!(read_signed(&[0xFF, 0xFE]), -2);
        assert_eq!(read_signed(&[0x01, 0x6E]), 366);
        assert_eq!(read_signed(&[0x80, 0x00, 0x00, 0x00]), i32::MIN as i64);
    }

    #[test]
    fn test_scale_signed_range() {
        assert_eq!(scale_signed(i32::MAX as i64, 4, -90.0, 90.0), Some(90.0));
        assert_eq!(scale_signed(i32::MIN as i64 + 1, 4, -90.0, 90.0), Some(-90.0));
        assert_eq!(scale_signed(0, 4, -90.0, 90.0), Some(0.0));
        assert_eq!(scale_signed(i32::MIN as i64, 4, -90.0, 90.0), None);
    }

    #[test]
    fn test_scale_unsigned_range() {
        assert_eq!(scale_unsigned(0, 2, -900.0, 19000.0), -900.0);
        assert_eq!(scale_unsigned(0xFFFF, 2, -900.0, 19000.0), 19000.0);
    }
}
