//! Field tables for KLV decoding.
//!
//! A [`KlvContext`] is built once and passed by reference into the decoder.
//! It maps local set tags to field names and value decoders.

use std::collections::HashMap;

use log::debug;

use super::value::{read_signed, read_unsigned, scale_signed, scale_unsigned, KlvValue};

/// Universal key of the UAS Datalink local set.
pub const UAS_DATALINK_KEY: [u8; 16] = [
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x0B, 0x01, 0x01, 0x0E, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00, 0x00,
];

/// Field names produced by [`KlvContext::uas_datalink`].
pub mod field {
    pub const CHECKSUM: &str = "checksum";
    pub const TIMESTAMP: &str = "timestamp";
    pub const MISSION_ID: &str = "mission id";
    pub const PLATFORM_TAIL_NUMBER: &str = "platform tail number";
    pub const PLATFORM_DESIGNATION: &str = "platform designation";
    pub const IMAGE_SOURCE_SENSOR: &str = "image source sensor";
    pub const IMAGE_COORDINATE_SYSTEM: &str = "image coordinate system";
    pub const SENSOR_LATITUDE: &str = "sensor latitude";
    pub const SENSOR_LONGITUDE: &str = "sensor longitude";
    pub const SENSOR_TRUE_ALTITUDE: &str = "sensor true altitude";
    pub const SLANT_RANGE: &str = "slant range";
    pub const TARGET_WIDTH: &str = "target width";
    pub const FRAME_CENTER_LATITUDE: &str = "frame center latitude";
    pub const FRAME_CENTER_LONGITUDE: &str = "frame center longitude";
    pub const FRAME_CENTER_ELEVATION: &str = "frame center elevation";
    pub const OFFSET_CORNER_LATITUDE_1: &str = "offset corner latitude 1";
    pub const OFFSET_CORNER_LONGITUDE_1: &str = "offset corner longitude 1";
    pub const OFFSET_CORNER_LATITUDE_2: &str = "offset corner latitude 2";
    pub const OFFSET_CORNER_LONGITUDE_2: &str = "offset corner longitude 2";
    pub const OFFSET_CORNER_LATITUDE_3: &str = "offset corner latitude 3";
    pub const OFFSET_CORNER_LONGITUDE_3: &str = "offset corner longitude 3";
    pub const OFFSET_CORNER_LATITUDE_4: &str = "offset corner latitude 4";
    pub const OFFSET_CORNER_LONGITUDE_4: &str = "offset corner longitude 4";
    pub const TARGET_LOCATION_LATITUDE: &str = "target location latitude";
    pub const TARGET_LOCATION_LONGITUDE: &str = "target location longitude";
    pub const TARGET_LOCATION_ELEVATION: &str = "target location elevation";
    pub const SECURITY_LOCAL_SET: &str = "security local set";
    pub const GROUND_RANGE: &str = "ground range";
    pub const PLATFORM_CALL_SIGN: &str = "platform call sign";
    pub const EVENT_START_TIME: &str = "event start time";
    pub const OPERATIONAL_MODE: &str = "operational mode";
    pub const CORNER_LATITUDE_1: &str = "corner latitude 1";
    pub const CORNER_LONGITUDE_1: &str = "corner longitude 1";
    pub const CORNER_LATITUDE_2: &str = "corner latitude 2";
    pub const CORNER_LONGITUDE_2: &str = "corner longitude 2";
    pub const CORNER_LATITUDE_3: &str = "corner latitude 3";
    pub const CORNER_LONGITUDE_3: &str = "corner longitude 3";
    pub const CORNER_LATITUDE_4: &str = "corner latitude 4";
    pub const CORNER_LONGITUDE_4: &str = "corner longitude 4";

    // Security local set
    pub const SECURITY_CLASSIFICATION: &str = "security classification";
    pub const CLASSIFYING_COUNTRY_CODING_METHOD: &str = "classifying country coding method";
    pub const CLASSIFYING_COUNTRY: &str = "classifying country";
    pub const SCI_SHI_INFORMATION: &str = "sci/shi information";
    pub const CAVEATS: &str = "caveats";
    pub const RELEASING_INSTRUCTIONS: &str = "releasing instructions";
    pub const OBJECT_COUNTRY_CODING_METHOD: &str = "object country coding method";
    pub const OBJECT_COUNTRY_CODES: &str = "object country codes";
}

/// How the value bytes of one element are decoded.
#[derive(Debug, Clone)]
pub enum FieldDecoder {
    /// Big-endian unsigned integer of exactly `width` bytes.
    Unsigned { width: usize },
    /// Text.
    Text,
    /// Raw bytes.
    Bytes,
    /// Signed integer of `width` bytes mapped onto `[low, high]`.
    ScaledSigned { width: usize, low: f64, high: f64 },
    /// Unsigned integer of `width` bytes mapped onto `[low, high]`.
    ScaledUnsigned { width: usize, low: f64, high: f64 },
    /// Nested local set.
    LocalSet(LocalSetContext),
}

/// A named entry in a local set table.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub decoder: FieldDecoder,
}

/// Tag table for one local set level.
#[derive(Debug, Clone, Default)]
pub struct LocalSetContext {
    fields: HashMap<u8, FieldSpec>,
}

impl LocalSetContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tag`. A later registration replaces an earlier one.
    pub fn with(mut self, tag: u8, name: &'static str, decoder: FieldDecoder) -> Self {
        self.fields.insert(tag, FieldSpec { name, decoder });
        self
    }

    pub fn get(&self, tag: u8) -> Option<&FieldSpec> {
        self.fields.get(&tag)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Top-level decode context: the universal key of the local set to look for
/// and its tag table.
#[derive(Debug, Clone)]
pub struct KlvContext {
    pub universal_key: [u8; 16],
    pub local_set: LocalSetContext,
}

impl KlvContext {
    /// Field table of the UAS Datalink local set with its nested security
    /// local set.
    pub fn uas_datalink() -> Self {
        use field::*;
        use FieldDecoder::*;

        let lat = || ScaledSigned { width: 4, low: -90.0, high: 90.0 };
        let lon = || ScaledSigned { width: 4, low: -180.0, high: 180.0 };
        let offset = || ScaledSigned { width: 2, low: -0.075, high: 0.075 };
        let altitude = || ScaledUnsigned { width: 2, low: -900.0, high: 19000.0 };
        let range = || ScaledUnsigned { width: 4, low: 0.0, high: 5_000_000.0 };

        let security = LocalSetContext::new()
            .with(1, SECURITY_CLASSIFICATION, Unsigned { width: 1 })
            .with(2, CLASSIFYING_COUNTRY_CODING_METHOD, Unsigned { width: 1 })
            .with(3, CLASSIFYING_COUNTRY, Text)
            .with(4, SCI_SHI_INFORMATION, Text)
            .with(5, CAVEATS, Text)
            .with(6, RELEASING_INSTRUCTIONS, Text)
            .with(12, OBJECT_COUNTRY_CODING_METHOD, Unsigned { width: 1 })
            .with(13, OBJECT_COUNTRY_CODES, Bytes);

        let local_set = LocalSetContext::new()
            .with(1, CHECKSUM, Unsigned { width: 2 })
            .with(2, TIMESTAMP, Unsigned { width: 8 })
            .with(3, MISSION_ID, Text)
            .with(4, PLATFORM_TAIL_NUMBER, Text)
            .with(10, PLATFORM_DESIGNATION, Text)
            .with(11, IMAGE_SOURCE_SENSOR, Text)
            .with(12, IMAGE_COORDINATE_SYSTEM, Text)
            .with(13, SENSOR_LATITUDE, lat())
            .with(14, SENSOR_LONGITUDE, lon())
            .with(15, SENSOR_TRUE_ALTITUDE, altitude())
            .with(21, SLANT_RANGE, range())
            .with(22, TARGET_WIDTH, ScaledUnsigned { width: 2, low: 0.0, high: 10_000.0 })
            .with(23, FRAME_CENTER_LATITUDE, lat())
            .with(24, FRAME_CENTER_LONGITUDE, lon())
            .with(25, FRAME_CENTER_ELEVATION, altitude())
            .with(26, OFFSET_CORNER_LATITUDE_1, offset())
            .with(27, OFFSET_CORNER_LONGITUDE_1, offset())
            .with(28, OFFSET_CORNER_LATITUDE_2, offset())
            .with(29, OFFSET_CORNER_LONGITUDE_2, offset())
            .with(30, OFFSET_CORNER_LATITUDE_3, offset())
            .with(31, OFFSET_CORNER_LONGITUDE_3, offset())
            .with(32, OFFSET_CORNER_LATITUDE_4, offset())
            .with(33, OFFSET_CORNER_LONGITUDE_4, offset())
            .with(40, TARGET_LOCATION_LATITUDE, lat())
            .with(41, TARGET_LOCATION_LONGITUDE, lon())
            .with(42, TARGET_LOCATION_ELEVATION, altitude())
            .with(48, SECURITY_LOCAL_SET, LocalSet(security))
            .with(57, GROUND_RANGE, range())
            .with(59, PLATFORM_CALL_SIGN, Text)
            .with(72, EVENT_START_TIME, Unsigned { width: 8 })
            .with(77, OPERATIONAL_MODE, Unsigned { width: 1 })
            .with(82, CORNER_LATITUDE_1, lat())
            .with(83, CORNER_LONGITUDE_1, lon())
            .with(84, CORNER_LATITUDE_2, lat())
            .with(85, CORNER_LONGITUDE_2, lon())
            .with(86, CORNER_LATITUDE_3, lat())
            .with(87, CORNER_LONGITUDE_3, lon())
            .with(88, CORNER_LATITUDE_4, lat())
            .with(89, CORNER_LONGITUDE_4, lon());

        Self {
            universal_key: UAS_DATALINK_KEY,
            local_set,
        }
    }
}

impl FieldDecoder {
    /// Decode a scalar value. Nested sets are decoded by the local set
    /// parser and yield `None` here, as do values of unexpected width and
    /// out-of-range markers.
    pub(crate) fn decode_scalar(&self, name: &str, bytes: &[u8]) -> Option<KlvValue> {
        let width_ok = |width: usize| {
            if bytes.len() == width {
                true
            } else {
                debug!("Skipping {}: expected {} bytes, got {}", name, width, bytes.len());
                false
            }
        };

        match *self {
            FieldDecoder::Unsigned { width } => {
                width_ok(width).then(|| KlvValue::Unsigned(read_unsigned(bytes)))
            }
            FieldDecoder::Text => Some(KlvValue::Text(String::from_utf8_lossy(bytes).into_owned())),
            FieldDecoder::Bytes => Some(KlvValue::Bytes(bytes.to_vec())),
            FieldDecoder::ScaledSigned { width, low, high } => {
                if !width_ok(width) {
                    return None;
                }
                let scaled = scale_signed(read_signed(bytes), width, low, high);
                if scaled.is_none() {
                    debug!("Skipping {}: out of range marker", name);
                }
                scaled.map(KlvValue::Float)
            }
            FieldDecoder::ScaledUnsigned { width, low, high } => width_ok(width)
                .then(|| KlvValue::Float(scale_unsigned(read_unsigned(bytes), width, low, high))),
            FieldDecoder::LocalSet(_) => None,
        }
    }
}
