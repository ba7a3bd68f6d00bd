//! Multi-valued attribute map produced by the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use geo::Geometry;
use serde::ser::Serializer;
use serde::Serialize;

use super::geometry::to_wkt;
use crate::klv::KlvValue;

/// Attribute names written by the default handlers and processors.
pub mod name {
    pub const TEMPORAL_START: &str = "datetime.start";
    pub const TEMPORAL_END: &str = "datetime.end";
    pub const CREATED: &str = "created";
    pub const LOCATION: &str = "location";
    pub const MISSION_ID: &str = "isr.mission-id";
    pub const PLATFORM_ID: &str = "isr.platform-id";
    pub const PLATFORM_NAME: &str = "isr.platform-name";
    pub const SENSOR_ID: &str = "isr.sensor-id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const EVENT_START_TIME: &str = "event-start-time";
    pub const PLATFORM_CALL_SIGN: &str = "platform-call-sign";
    pub const OPERATIONAL_MODE: &str = "operational-mode";
    pub const CORNER: &str = "corner-location";
    pub const OFFSET_CORNER: &str = "offset-corner-location";
    pub const FRAME_CENTER: &str = "media.frame-center";
    pub const TARGET_LOCATION: &str = "target-location";
    pub const SENSOR: &str = "sensor";
    pub const CHECKSUM: &str = "klv-packet-checksum";
    pub const CRS_NAME: &str = "location.crs-name";
    pub const ALTITUDE: &str = "location.altitude-meters";
    pub const COUNTRY_CODE: &str = "location.country-code";
    pub const TARGET_WIDTH: &str = "target-width-meters";
    pub const FRAME_CENTER_ELEVATION: &str = "frame-center-elevation";
    pub const TARGET_LOCATION_ELEVATION: &str = "target-location-elevation";
    pub const GROUND_RANGE: &str = "ground-range";
    pub const SLANT_RANGE: &str = "slant-range";
    pub const SECURITY_CLASSIFICATION: &str = "security.classification";
    pub const SECURITY_CLASSIFICATION_CODE: &str = "security.classification-code";
    pub const CLASSIFICATION_SYSTEM: &str = "security.classification-system";
    pub const CLASSIFYING_COUNTRY_CODING_METHOD: &str = "classifying-country-coding-method";
    pub const OBJECT_COUNTRY_CODING_METHOD: &str = "object-country-coding-method";
    pub const CODEWORDS: &str = "security.codewords";
    pub const DISSEMINATION_CONTROLS: &str = "security.dissemination-controls";
    pub const RELEASABILITY: &str = "security.releasability";
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Date(DateTime<Utc>),
    Geometry(Geometry<f64>),
}

impl AttributeValue {
    /// Convert a scalar KLV value. Nested sets have no attribute form.
    pub fn from_klv(value: &KlvValue) -> Option<Self> {
        match value {
            KlvValue::Unsigned(v) => Some(AttributeValue::Integer(*v as i64)),
            KlvValue::Float(v) => Some(AttributeValue::Float(*v)),
            KlvValue::Text(v) => Some(AttributeValue::Text(v.clone())),
            KlvValue::Bytes(v) => Some(AttributeValue::Text(String::from_utf8_lossy(v).into_owned())),
            KlvValue::Set(_) => None,
        }
    }

    /// Interpret a microsecond count since the Unix epoch as a date.
    pub fn date_from_micros(micros: i64) -> Option<Self> {
        let secs = micros.div_euclid(1_000_000);
        let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
        Utc.timestamp_opt(secs, nanos).single().map(AttributeValue::Date)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            AttributeValue::Date(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry<f64>> {
        match self {
            AttributeValue::Geometry(v) => Some(v),
            _ => None,
        }
    }

    /// Blank text is treated as absent by the collecting processors.
    pub(crate) fn is_blank(&self) -> bool {
        matches!(self, AttributeValue::Text(v) if v.trim().is_empty())
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::Text(v) => serializer.serialize_str(v),
            AttributeValue::Integer(v) => serializer.serialize_i64(*v),
            AttributeValue::Float(v) => serializer.serialize_f64(*v),
            AttributeValue::Date(v) => {
                serializer.serialize_str(&v.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            AttributeValue::Geometry(v) => serializer.serialize_str(&to_wkt(v)),
        }
    }
}

/// String-keyed, multi-valued attribute map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, Vec<AttributeValue>>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of `name`. Empty value lists remove the attribute.
    pub fn set(&mut self, name: &str, values: Vec<AttributeValue>) {
        if values.is_empty() {
            self.0.remove(name);
        } else {
            self.0.insert(name.to_string(), values);
        }
    }

    pub fn set_single(&mut self, name: &str, value: AttributeValue) {
        self.0.insert(name.to_string(), vec![value]);
    }

    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn first(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name).and_then(|values| values.first())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Geometry};

    #[test]
    fn test_date_from_micros() {
        let AttributeValue::Date(date) = AttributeValue::date_from_micros(1_377_596_488_285_000).unwrap() else {
            panic!("not a date");
        };
        assert_eq!(date.to_rfc3339_opts(SecondsFormat::Millis, true), "2013-08-27T09:41:28.285Z");
    }

    #[test]
    fn test_set_empty_removes() {
        let mut map = AttributeMap::new();
        map.set_single("a", AttributeValue::Integer(1));
        assert!(map.contains("a"));
        map.set("a", Vec::new());
        assert!(!map.contains("a"));
    }

    #[test]
    fn test_serialize_as_json() {
        let mut map = AttributeMap::new();
        map.set(
            name::MISSION_ID,
            vec![AttributeValue::Text("M1".into()), AttributeValue::Text("M2".into())],
        );
        map.set_single(
            name::FRAME_CENTER,
            AttributeValue::Geometry(Geometry::Point(point!(x: 1.5, y: -2.0))),
        );
        map.set_single(name::CHECKSUM, AttributeValue::Integer(46989));

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            json,
            r#"{"isr.mission-id":["M1","M2"],"klv-packet-checksum":[46989],"media.frame-center":["POINT (1.5 -2)"]}"#
        );
    }
}
