//! Per-field accumulators.

use std::collections::HashMap;

use geo::{Geometry, LineString, Point, Polygon};
use log::{trace, warn};

use super::attribute::{name, AttributeValue};
use super::geometry::subsample_indices;
use crate::klv::{field, KlvValue};

/// Folds decoded elements of one or more fields into a single attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldHandler {
    /// Every observed value, in order.
    List {
        attribute: &'static str,
        values: Vec<AttributeValue>,
    },
    /// Only the most recent value.
    Latest {
        attribute: &'static str,
        value: Option<AttributeValue>,
    },
    /// Observed values without duplicates, in first-seen order.
    Distinct {
        attribute: &'static str,
        values: Vec<AttributeValue>,
    },
    /// Microsecond timestamps as dates.
    Dates {
        attribute: &'static str,
        values: Vec<AttributeValue>,
    },
    /// Four corner points as one polygon per sample.
    GeoBox(GeoBox),
    /// Latitude/longitude pairs as one point per sample.
    LatLon(LatLon),
}

/// Samples of eight corner fields.
///
/// The polygon is stored as geometry, not text, so its corners keep full
/// `f64` precision; in the sidecar they are written in shortest round-trip
/// form by [`to_wkt`](super::geometry::to_wkt), never padded or rounded to
/// a fixed number of decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoBox {
    attribute: &'static str,
    /// `[lat1, lon1, lat2, lon2, lat3, lon3, lat4, lon4]`
    fields: [&'static str; 8],
    samples: [Vec<f64>; 8],
}

/// Samples of one latitude and one longitude field.
#[derive(Debug, Clone, PartialEq)]
pub struct LatLon {
    attribute: &'static str,
    latitude: &'static str,
    longitude: &'static str,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
}

impl FieldHandler {
    pub fn list(attribute: &'static str) -> Self {
        FieldHandler::List {
            attribute,
            values: Vec::new(),
        }
    }

    pub fn latest(attribute: &'static str) -> Self {
        FieldHandler::Latest {
            attribute,
            value: None,
        }
    }

    pub fn distinct(attribute: &'static str) -> Self {
        FieldHandler::Distinct {
            attribute,
            values: Vec::new(),
        }
    }

    pub fn dates(attribute: &'static str) -> Self {
        FieldHandler::Dates {
            attribute,
            values: Vec::new(),
        }
    }

    /// `fields` lists the corner fields as `[lat1, lon1, ..., lat4, lon4]`.
    pub fn geo_box(attribute: &'static str, fields: [&'static str; 8]) -> Self {
        FieldHandler::GeoBox(GeoBox {
            attribute,
            fields,
            samples: Default::default(),
        })
    }

    pub fn lat_lon(attribute: &'static str, latitude: &'static str, longitude: &'static str) -> Self {
        FieldHandler::LatLon(LatLon {
            attribute,
            latitude,
            longitude,
            latitudes: Vec::new(),
            longitudes: Vec::new(),
        })
    }

    /// Name of the attribute this handler materializes.
    pub fn attribute_name(&self) -> &'static str {
        match self {
            FieldHandler::List { attribute, .. }
            | FieldHandler::Latest { attribute, .. }
            | FieldHandler::Distinct { attribute, .. }
            | FieldHandler::Dates { attribute, .. } => attribute,
            FieldHandler::GeoBox(g) => g.attribute,
            FieldHandler::LatLon(l) => l.attribute,
        }
    }

    /// Fold one decoded element of `field` into the handler.
    pub fn accept(&mut self, field: &str, value: &KlvValue) {
        match self {
            FieldHandler::List { values, .. } => values.extend(AttributeValue::from_klv(value)),
            FieldHandler::Latest { value: latest, .. } => {
                if let Some(v) = AttributeValue::from_klv(value) {
                    *latest = Some(v);
                }
            }
            FieldHandler::Distinct { values, .. } => {
                if let Some(v) = AttributeValue::from_klv(value) {
                    if !values.contains(&v) {
                        values.push(v);
                    }
                }
            }
            FieldHandler::Dates { values, .. } => match value.as_unsigned() {
                Some(micros) => values.extend(AttributeValue::date_from_micros(micros as i64)),
                None => warn!("Non-integer value passed to date handler for {}", field),
            },
            FieldHandler::GeoBox(_) | FieldHandler::LatLon(_) => match value.as_float() {
                Some(v) => self.accept_float(field, v),
                None => warn!("Non-coordinate value passed to geometry handler for {}", field),
            },
        }
    }

    /// Fold a coordinate value into a geometry handler. Other handlers and
    /// unknown fields ignore it.
    pub fn accept_float(&mut self, field: &str, value: f64) {
        match self {
            FieldHandler::GeoBox(g) => {
                if let Some(i) = g.fields.iter().position(|f| *f == field) {
                    g.samples[i].push(value);
                }
            }
            FieldHandler::LatLon(l) => {
                if field == l.latitude {
                    l.latitudes.push(value);
                } else if field == l.longitude {
                    l.longitudes.push(value);
                }
            }
            _ => trace!("Ignoring coordinate for {} on a scalar handler", field),
        }
    }

    pub fn reset(&mut self) {
        match self {
            FieldHandler::List { values, .. }
            | FieldHandler::Distinct { values, .. }
            | FieldHandler::Dates { values, .. } => values.clear(),
            FieldHandler::Latest { value, .. } => *value = None,
            FieldHandler::GeoBox(g) => g.samples.iter_mut().for_each(Vec::clear),
            FieldHandler::LatLon(l) => {
                l.latitudes.clear();
                l.longitudes.clear();
            }
        }
    }

    /// The accumulated attribute values, `None` when nothing was collected.
    pub fn materialize(&self) -> Option<Vec<AttributeValue>> {
        self.materialize_subsampled(0)
    }

    /// Like [`materialize`](Self::materialize), with geometry handlers keeping
    /// at most `count` samples (`0` keeps all).
    pub fn materialize_subsampled(&self, count: usize) -> Option<Vec<AttributeValue>> {
        let values = match self {
            FieldHandler::List { values, .. }
            | FieldHandler::Distinct { values, .. }
            | FieldHandler::Dates { values, .. } => values.clone(),
            FieldHandler::Latest { value, .. } => value.iter().cloned().collect(),
            FieldHandler::GeoBox(g) => g
                .polygons(count)
                .into_iter()
                .map(|p| AttributeValue::Geometry(Geometry::Polygon(p)))
                .collect(),
            FieldHandler::LatLon(l) => l
                .points(count)
                .into_iter()
                .map(|p| AttributeValue::Geometry(Geometry::Point(p)))
                .collect(),
        };
        (!values.is_empty()).then_some(values)
    }
}

impl GeoBox {
    /// Closed polygons `p1, p2, p3, p4, p1` for each complete sample.
    pub fn polygons(&self, count: usize) -> Vec<Polygon<f64>> {
        let complete = self.samples.iter().map(Vec::len).min().unwrap_or(0);
        subsample_indices(complete, count)
            .map(|i| {
                let s = |k: usize| self.samples[k][i];
                let ring: LineString<f64> = vec![
                    (s(1), s(0)),
                    (s(3), s(2)),
                    (s(5), s(4)),
                    (s(7), s(6)),
                    (s(1), s(0)),
                ]
                .into();
                Polygon::new(ring, Vec::new())
            })
            .collect()
    }
}

impl LatLon {
    /// One `(lon, lat)` point per aligned sample pair.
    pub fn points(&self, count: usize) -> Vec<Point<f64>> {
        let complete = self.latitudes.len().min(self.longitudes.len());
        subsample_indices(complete, count)
            .map(|i| Point::new(self.longitudes[i], self.latitudes[i]))
            .collect()
    }
}

/// Handlers keyed by field name. One handler may serve several fields.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    handlers: Vec<FieldHandler>,
    by_field: HashMap<&'static str, usize>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every name in `fields`.
    pub fn with(mut self, fields: &[&'static str], handler: FieldHandler) -> Self {
        let index = self.handlers.len();
        self.handlers.push(handler);
        for field in fields {
            self.by_field.insert(field, index);
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldHandler> {
        self.by_field.get(field).map(|&i| &self.handlers[i])
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut FieldHandler> {
        let index = *self.by_field.get(field)?;
        self.handlers.get_mut(index)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.by_field.contains_key(field)
    }

    /// Whether all `fields` are served by one handler.
    pub fn share_handler(&self, fields: &[&str]) -> bool {
        let mut indices = fields.iter().map(|f| self.by_field.get(f));
        match indices.next() {
            Some(Some(first)) => indices.all(|i| i == Some(first)),
            _ => false,
        }
    }

    /// Each registered handler once, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldHandler> {
        self.handlers.iter()
    }

    /// Dispatch one element; `false` when no handler serves `field`.
    pub fn accept(&mut self, field: &str, value: &KlvValue) -> bool {
        match self.get_mut(field) {
            Some(handler) => {
                handler.accept(field, value);
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.handlers.iter_mut().for_each(FieldHandler::reset);
    }
}

const CORNER_FIELDS: [&str; 8] = [
    field::CORNER_LATITUDE_1,
    field::CORNER_LONGITUDE_1,
    field::CORNER_LATITUDE_2,
    field::CORNER_LONGITUDE_2,
    field::CORNER_LATITUDE_3,
    field::CORNER_LONGITUDE_3,
    field::CORNER_LATITUDE_4,
    field::CORNER_LONGITUDE_4,
];

const OFFSET_CORNER_FIELDS: [&str; 8] = [
    field::OFFSET_CORNER_LATITUDE_1,
    field::OFFSET_CORNER_LONGITUDE_1,
    field::OFFSET_CORNER_LATITUDE_2,
    field::OFFSET_CORNER_LONGITUDE_2,
    field::OFFSET_CORNER_LATITUDE_3,
    field::OFFSET_CORNER_LONGITUDE_3,
    field::OFFSET_CORNER_LATITUDE_4,
    field::OFFSET_CORNER_LONGITUDE_4,
];

/// Corner fields as `[lat1, lon1, ..., lat4, lon4]`.
pub fn corner_fields() -> [&'static str; 8] {
    CORNER_FIELDS
}

/// Offset corner fields, in the same order as [`corner_fields`].
pub fn offset_corner_fields() -> [&'static str; 8] {
    OFFSET_CORNER_FIELDS
}

/// The handler set for UAS Datalink telemetry.
pub fn default_handlers() -> HandlerSet {
    let list = |fields: &[&'static str], attribute| (fields.to_vec(), FieldHandler::list(attribute));

    let mut set = HandlerSet::new();
    for (fields, handler) in [
        list(&[field::MISSION_ID], name::MISSION_ID),
        list(&[field::PLATFORM_TAIL_NUMBER], name::PLATFORM_ID),
        list(&[field::PLATFORM_DESIGNATION], name::PLATFORM_NAME),
        list(&[field::PLATFORM_CALL_SIGN], name::PLATFORM_CALL_SIGN),
        list(&[field::OPERATIONAL_MODE], name::OPERATIONAL_MODE),
        list(&[field::IMAGE_SOURCE_SENSOR], name::SENSOR_ID),
        list(&[field::CHECKSUM], name::CHECKSUM),
        list(&[field::TARGET_WIDTH], name::TARGET_WIDTH),
        list(&[field::FRAME_CENTER_ELEVATION], name::FRAME_CENTER_ELEVATION),
        list(&[field::SENSOR_TRUE_ALTITUDE], name::ALTITUDE),
        list(&[field::GROUND_RANGE], name::GROUND_RANGE),
        list(&[field::SLANT_RANGE], name::SLANT_RANGE),
        list(&[field::TARGET_LOCATION_ELEVATION], name::TARGET_LOCATION_ELEVATION),
        list(&[field::SECURITY_CLASSIFICATION], name::SECURITY_CLASSIFICATION_CODE),
        list(&[field::CLASSIFYING_COUNTRY_CODING_METHOD], name::CLASSIFYING_COUNTRY_CODING_METHOD),
        list(&[field::OBJECT_COUNTRY_CODING_METHOD], name::OBJECT_COUNTRY_CODING_METHOD),
        list(&[field::SCI_SHI_INFORMATION], name::CODEWORDS),
        list(&[field::CAVEATS], name::DISSEMINATION_CONTROLS),
        list(&[field::RELEASING_INSTRUCTIONS], name::RELEASABILITY),
        (vec![field::CLASSIFYING_COUNTRY], FieldHandler::distinct(name::CLASSIFICATION_SYSTEM)),
        (vec![field::IMAGE_COORDINATE_SYSTEM], FieldHandler::distinct(name::CRS_NAME)),
        (vec![field::OBJECT_COUNTRY_CODES], FieldHandler::latest(name::COUNTRY_CODE)),
        (vec![field::TIMESTAMP], FieldHandler::dates(name::TIMESTAMP)),
        (vec![field::EVENT_START_TIME], FieldHandler::dates(name::EVENT_START_TIME)),
        (CORNER_FIELDS.to_vec(), FieldHandler::geo_box(name::CORNER, CORNER_FIELDS)),
        (
            OFFSET_CORNER_FIELDS.to_vec(),
            FieldHandler::geo_box(name::OFFSET_CORNER, OFFSET_CORNER_FIELDS),
        ),
        (
            vec![field::FRAME_CENTER_LATITUDE, field::FRAME_CENTER_LONGITUDE],
            FieldHandler::lat_lon(name::FRAME_CENTER, field::FRAME_CENTER_LATITUDE, field::FRAME_CENTER_LONGITUDE),
        ),
        (
            vec![field::TARGET_LOCATION_LATITUDE, field::TARGET_LOCATION_LONGITUDE],
            FieldHandler::lat_lon(
                name::TARGET_LOCATION,
                field::TARGET_LOCATION_LATITUDE,
                field::TARGET_LOCATION_LONGITUDE,
            ),
        ),
        (
            vec![field::SENSOR_LATITUDE, field::SENSOR_LONGITUDE],
            FieldHandler::lat_lon(name::SENSOR, field::SENSOR_LATITUDE, field::SENSOR_LONGITUDE),
        ),
    ] {
        set = set.with(&fields, handler);
    }
    set
}
