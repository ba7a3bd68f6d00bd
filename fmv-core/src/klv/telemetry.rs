//! Telemetry access units carried in PES packets.

use log::trace;

use super::context::KlvContext;
use super::local_set::decode_klv;
use super::value::FieldMap;
use crate::error::KlvError;
use crate::ts::{stream_id, PesHeader};

/// Timestamp of units that carry no presentation timestamp.
pub const ASYNC_TIMESTAMP: i64 = -1;

/// Size of the metadata access unit cell header of synchronous units.
pub const METADATA_CELL_HEADER_SIZE: usize = 5;

/// A decoded, checksum-verified telemetry unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryUnit {
    /// Decoded elements of the UAS Datalink local set.
    pub fields: FieldMap,
    /// Presentation timestamp in 90 kHz units, or [`ASYNC_TIMESTAMP`].
    pub timestamp: i64,
}

impl TelemetryUnit {
    pub fn is_synchronous(&self) -> bool {
        self.timestamp >= 0
    }
}

/// Decode one reassembled telemetry PES packet.
///
/// Returns `Ok(None)` when the unit is too short to hold a universal key,
/// which is expected at the start and end of a stream.
pub fn decode_telemetry(pes: &[u8], context: &KlvContext) -> Result<Option<TelemetryUnit>, KlvError> {
    let header = PesHeader::parse(pes).map_err(KlvError::InvalidPes)?;
    let payload = header.payload(pes);

    let (klv, timestamp) = match header.stream_id {
        stream_id::METADATA => {
            if payload.len() <= METADATA_CELL_HEADER_SIZE {
                trace!("Synchronous unit too short ({} bytes)", payload.len());
                return Ok(None);
            }
            let cell_length = u16::from_be_bytes([payload[3], payload[4]]) as usize;
            let end = payload.len().min(METADATA_CELL_HEADER_SIZE + cell_length);
            let timestamp = header.pts.map(|pts| pts as i64).unwrap_or(ASYNC_TIMESTAMP);
            (&payload[METADATA_CELL_HEADER_SIZE..end], timestamp)
        }
        _ => (payload, ASYNC_TIMESTAMP),
    };

    if klv.len() < context.universal_key.len() {
        trace!("Telemetry payload shorter than a universal key ({} bytes)", klv.len());
        return Ok(None);
    }

    let fields = decode_klv(klv, context)?;
    Ok(Some(TelemetryUnit { fields, timestamp }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::klv::context::{field, UAS_DATALINK_KEY};
    use crate::klv::value::KlvValue;
    use proptest::prelude::*;

    /// Synchronous unit with PTS 3326777800 and a checksum-only local set.
    pub const SYNC_UNIT: [u8; 40] = [
        0x00, 0x00, 0x01, 0xFC, 0x00, 0x22, 0x85, 0x80, 0x05, 0x27, 0x19, 0x2B, 0x33, 0x91, // PES
        0x01, 0x01, 0x01, 0x00, 0x15, // cell header
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x0B, 0x01, 0x01, 0x0E, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00,
        0x00, 0x04, 0x01, 0x02, 0x4C, 0x51,
    ];

    pub const ASYNC_UNIT: [u8; 30] = [
        0x00, 0x00, 0x01, 0xBD, 0x00, 0x18, 0x85, 0x00, 0x00, // PES
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x0B, 0x01, 0x01, 0x0E, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00,
        0x00, 0x04, 0x01, 0x02, 0x4C, 0x51,
    ];

    #[test]
    fn test_synchronous_unit() {
        let unit = decode_telemetry(&SYNC_UNIT, &KlvContext::uas_datalink())
            .unwrap()
            .unwrap();
        assert_eq!(unit.timestamp, 3_326_777_800);
        assert!(unit.is_synchronous());
        assert_eq!(unit.fields.get(field::CHECKSUM), Some(&KlvValue::Unsigned(19537)));
    }

    #[test]
    fn test_asynchronous_unit() {
        let unit = decode_telemetry(&ASYNC_UNIT, &KlvContext::uas_datalink())
            .unwrap()
            .unwrap();
        assert_eq!(unit.timestamp, ASYNC_TIMESTAMP);
        assert!(!unit.is_synchronous());
        assert_eq!(unit.fields.get(field::CHECKSUM), Some(&KlvValue::Unsigned(19537)));
    }

    #[test]
    fn test_altered_checksum_is_rejected() {
        let mut data = SYNC_UNIT;
        data[39] = 0x52;
        let err = decode_telemetry(&data, &KlvContext::uas_datalink()).unwrap_err();
        assert!(matches!(err, KlvError::ChecksumMismatch { expected: 0x4C52, .. }));
    }

    #[test]
    fn test_short_synchronous_unit_is_not_decoded() {
        let data = [
            0x00, 0x00, 0x01, 0xFC, 0x00, 0x0C, 0x85, 0x80, 0x05, 0x27, 0x19, 0x2B, 0x33, 0x91,
            0x01, 0x01, 0x01, 0x00,
        ];
        assert_eq!(decode_telemetry(&data, &KlvContext::uas_datalink()), Ok(None));
    }

    #[test]
    fn test_cell_length_bounds_klv() {
        let mut data = SYNC_UNIT.to_vec();
        data.extend_from_slice(&[0xFF, 0xFF]); // trailing bytes outside the cell
        data[5] = 0x24;
        let unit = decode_telemetry(&data, &KlvContext::uas_datalink()).unwrap();
        assert!(unit.is_some());
    }

    #[test]
    fn test_payload_shorter_than_key_is_not_decoded() {
        let data = [0x00, 0x00, 0x01, 0xBD, 0x00, 0x00, 0x80, 0x00, 0x00, 0x06, 0x0E, 0x2B, 0x34];
        assert_eq!(decode_telemetry(&data, &KlvContext::uas_datalink()), Ok(None));
    }

    proptest! {
        #[test]
        fn prop_arbitrary_local_set_never_panics(body in proptest::collection::vec(any::<u8>(), 0..300)) {
            let mut data = vec![0x00, 0x00, 0x01, 0xBD, 0x00, 0x00, 0x80, 0x00, 0x00];
            data.extend_from_slice(&UAS_DATALINK_KEY);
            data.extend_from_slice(&body);
            let _ = decode_telemetry(&data, &KlvContext::uas_datalink());
        }
    }

    #[test]
    fn test_invalid_pes() {
        let err = decode_telemetry(&[0x47, 0x00, 0x00], &KlvContext::uas_datalink()).unwrap_err();
        assert!(matches!(err, KlvError::InvalidPes(_)));
    }
}
