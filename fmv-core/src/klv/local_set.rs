//! Local set parsing and the packet checksum.

use log::trace;

use super::ber;
use super::context::{field, FieldDecoder, KlvContext, LocalSetContext};
use super::value::{FieldMap, KlvValue};
use crate::error::KlvError;

/// Decode a KLV byte sequence with `context`.
///
/// Outer universal-key triplets are scanned until the context's key is found.
/// The matching local set is decoded and its checksum element verified.
pub fn decode_klv(data: &[u8], context: &KlvContext) -> Result<FieldMap, KlvError> {
    let mut offset = 0;

    while offset + context.universal_key.len() <= data.len() {
        let key_start = offset;
        let key_end = offset + context.universal_key.len();
        let (length, length_size) = ber::read_length(data, key_end)?;
        let value_start = key_end + length_size;
        let Some(value_end) = value_start.checked_add(length).filter(|&end| end <= data.len()) else {
            return Err(KlvError::TruncatedSet {
                expected: length,
                actual: data.len().saturating_sub(value_start),
            });
        };

        if data[key_start..key_end] == context.universal_key {
            let packet = &data[key_start..value_end];
            let fields = parse_local_set(&data[value_start..value_end], &context.local_set)?;
            verify_checksum(packet, &fields)?;
            return Ok(fields);
        }

        trace!("Skipping KLV triplet with unknown key at offset {}", key_start);
        offset = value_end;
    }

    Err(KlvError::MissingLocalSet)
}

/// Decode one local set level. Unknown tags are skipped.
pub fn parse_local_set(data: &[u8], context: &LocalSetContext) -> Result<FieldMap, KlvError> {
    let mut fields = FieldMap::new();
    let mut offset = 0;

    while offset < data.len() {
        let tag = data[offset];
        let (length, length_size) = ber::read_length(data, offset + 1)?;
        let start = offset + 1 + length_size;
        let Some(end) = start.checked_add(length).filter(|&end| end <= data.len()) else {
            return Err(KlvError::Truncated {
                tag,
                expected: length,
                actual: data.len().saturating_sub(start),
            });
        };
        let value = &data[start..end];
        offset = end;

        let Some(spec) = context.get(tag) else {
            trace!("Skipping unknown tag {} ({} bytes)", tag, length);
            continue;
        };

        let decoded = match &spec.decoder {
            FieldDecoder::LocalSet(nested) => Some(KlvValue::Set(parse_local_set(value, nested)?)),
            decoder => decoder.decode_scalar(spec.name, value),
        };
        if let Some(decoded) = decoded {
            fields.insert(spec.name, decoded);
        }
    }

    Ok(fields)
}

/// Running 16-bit sum over all bytes but the last two, with bytes at even
/// offsets shifted into the high octet.
pub fn checksum(packet: &[u8]) -> u16 {
    let covered = packet.len().saturating_sub(2);
    packet[..covered]
        .iter()
        .enumerate()
        .fold(0u16, |sum, (i, &b)| {
            let term = if i % 2 == 0 { (b as u16) << 8 } else { b as u16 };
            sum.wrapping_add(term)
        })
}

fn verify_checksum(packet: &[u8], fields: &FieldMap) -> Result<(), KlvError> {
    let expected = fields
        .get(field::CHECKSUM)
        .and_then(KlvValue::as_unsigned)
        .ok_or(KlvError::MissingChecksum)? as u16;
    let actual = checksum(packet);
    if expected != actual {
        return Err(KlvError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klv::context::UAS_DATALINK_KEY;

    fn klv(local_set: &[u8]) -> Vec<u8> {
        let mut out = UAS_DATALINK_KEY.to_vec();
        out.push(local_set.len() as u8);
        out.extend_from_slice(local_set);
        out
    }

    #[test]
    fn test_checksum_of_minimal_packet() {
        let packet = klv(&[0x01, 0x02, 0x4C, 0x51]);
        assert_eq!(checksum(&packet), 0x4C51);
    }

    #[test]
    fn test_decode_minimal_packet() {
        let fields = decode_klv(&klv(&[0x01, 0x02, 0x4C, 0x51]), &KlvContext::uas_datalink()).unwrap();
        assert_eq!(fields.get(field::CHECKSUM), Some(&KlvValue::Unsigned(0x4C51)));
    }

    #[test]
    fn test_checksum_mismatch() {
        let err = decode_klv(&klv(&[0x01, 0x02, 0x4C, 0x52]), &KlvContext::uas_datalink()).unwrap_err();
        assert_eq!(
            err,
            KlvError::ChecksumMismatch {
                expected: 0x4C52,
                actual: 0x4C51
            }
        );
    }

    #[test]
    fn test_missing_checksum() {
        let err = decode_klv(&klv(&[0x03, 0x01, 0x41]), &KlvContext::uas_datalink()).unwrap_err();
        assert_eq!(err, KlvError::MissingChecksum);
    }

    #[test]
    fn test_missing_local_set() {
        let mut other = vec![0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01];
        other.extend_from_slice(&[0x00; 8]);
        other.extend_from_slice(&[0x02, 0xAA, 0xBB]);

        let context = KlvContext::uas_datalink();
        assert_eq!(decode_klv(&other, &context), Err(KlvError::MissingLocalSet));
        assert_eq!(decode_klv(&[0x06, 0x0E], &context), Err(KlvError::MissingLocalSet));
    }

    #[test]
    fn test_truncated_element() {
        let err = parse_local_set(&[0x03, 0x05, 0x41], &KlvContext::uas_datalink().local_set).unwrap_err();
        assert_eq!(
            err,
            KlvError::Truncated {
                tag: 3,
                expected: 5,
                actual: 1
            }
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_set_length() {
        let mut data = UAS_DATALINK_KEY.to_vec();
        data.push(0x88);
        data.extend_from_slice(&[0xFF; 8]);
        let err = decode_klv(&data, &KlvContext::uas_datalink()).unwrap_err();
        assert_eq!(
            err,
            KlvError::TruncatedSet {
                expected: usize::MAX,
                actual: 0
            }
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_element_length() {
        let mut data = vec![0x02, 0x88];
        data.extend_from_slice(&[0xFF; 8]);
        let err = parse_local_set(&data, &KlvContext::uas_datalink().local_set).unwrap_err();
        assert_eq!(
            err,
            KlvError::Truncated {
                tag: 2,
                expected: usize::MAX,
                actual: 0
            }
        );
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let context = KlvContext::uas_datalink();
        let fields = parse_local_set(&[0x05, 0x02, 0x5A, 0xB6, 0x03, 0x01, 0x41], &context.local_set).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get(field::MISSION_ID), Some(&KlvValue::Text("A".to_string())));
    }

    #[test]
    fn test_nested_security_set() {
        let context = KlvContext::uas_datalink();
        let data = [0x30, 0x06, 0x01, 0x01, 0x03, 0x03, 0x01, 0x55];
        let fields = parse_local_set(&data, &context.local_set).unwrap();

        let Some(KlvValue::Set(security)) = fields.get(field::SECURITY_LOCAL_SET) else {
            panic!("security set missing");
        };
        assert_eq!(security.get(field::SECURITY_CLASSIFICATION), Some(&KlvValue::Unsigned(3)));
        assert_eq!(security.get(field::CLASSIFYING_COUNTRY), Some(&KlvValue::Text("U".to_string())));
    }
}
