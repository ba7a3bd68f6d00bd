//! BER length field decoding.

use crate::error::KlvError;

/// Decode the BER length at `offset`.
///
/// Returns the length value and the number of bytes the length field
/// occupies. Short form is a single byte below 0x80; long form is `0x80 | n`
/// followed by `n` big-endian bytes.
pub fn read_length(data: &[u8], offset: usize) -> Result<(usize, usize), KlvError> {
    let first = *data.get(offset).ok_or(KlvError::InvalidLength(offset))?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 || count > std::mem::size_of::<usize>() {
        return Err(KlvError::InvalidLength(offset));
    }
    let bytes = data
        .get(offset + 1..offset + 1 + count)
        .ok_or(KlvError::InvalidLength(offset))?;

    let length = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((length, 1 + count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form() {
        assert_eq!(read_length(&[0x04], 0).unwrap(), (4, 1));
        assert_eq!(read_length(&[0xFF, 0x7F], 1).unwrap(), (127, 1));
    }

    #[test]
    fn test_long_form() {
        assert_eq!(read_length(&[0x81, 0xC8], 0).unwrap(), (200, 2));
        assert_eq!(read_length(&[0x82, 0x00, 0xED], 0).unwrap(), (237, 3));
    }

    #[test]
    fn test_invalid_lengths() {
        assert_eq!(read_length(&[], 0), Err(KlvError::InvalidLength(0)));
        assert_eq!(read_length(&[0x80], 0), Err(KlvError::InvalidLength(0)));
        assert_eq!(read_length(&[0x00, 0x82, 0x01], 1), Err(KlvError::InvalidLength(1)));
    }
}
