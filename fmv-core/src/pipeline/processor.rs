//! Processors derive attributes from the populated handlers at the end of a
//! window.

use geo::{Geometry, Point};
use log::debug;

use super::attribute::{name, AttributeMap, AttributeValue};
use super::geometry::{self, GeometryOperator, OperatorContext};
use super::handler::{FieldHandler, HandlerSet};
use super::window::WindowConfig;
use crate::klv::field;

/// Smallest accepted subsample count for the geometry processors.
pub const MIN_SUBSAMPLE_COUNT: usize = 1;

/// Derives one or more attributes from the handler set.
#[derive(Debug, Clone, PartialEq)]
pub enum Processor {
    /// Copy every handler's materialized attribute as is.
    CopyPresent,
    /// Distinct non-blank values of one field.
    Distinct {
        field: &'static str,
        attribute: &'static str,
    },
    /// Distinct non-blank values across several fields.
    Union {
        fields: Vec<&'static str>,
        attribute: &'static str,
    },
    /// First and last date of a field as temporal start/end and creation date.
    SetDates { field: &'static str },
    /// Average sensor altitude.
    SensorAltitude,
    FrameCenter(FrameCenterProcessor),
    Location(LocationProcessor),
    SecurityClassification(SecurityClassificationProcessor),
    /// Run each processor in order.
    List(Vec<Processor>),
}

/// Configuration hook reaching processors nested anywhere in a
/// [`Processor`] tree.
pub trait ProcessorVisitor {
    fn visit_frame_center(&mut self, _processor: &mut FrameCenterProcessor) {}

    fn visit_location(&mut self, _processor: &mut LocationProcessor) {}

    fn visit_security_classification(&mut self, _processor: &mut SecurityClassificationProcessor) {}
}

impl Processor {
    pub fn process(&self, handlers: &HandlerSet, config: &WindowConfig, attributes: &mut AttributeMap) {
        match self {
            Processor::CopyPresent => {
                for handler in handlers.iter() {
                    if let Some(values) = handler.materialize() {
                        attributes.set(handler.attribute_name(), values);
                    }
                }
            }
            Processor::Distinct { field, attribute } => {
                let values = handlers
                    .get(field)
                    .and_then(FieldHandler::materialize)
                    .unwrap_or_default();
                let values = distinct_non_blank(values);
                if !values.is_empty() {
                    attributes.set(attribute, values);
                }
            }
            Processor::Union { fields, attribute } => {
                let values = fields
                    .iter()
                    .filter_map(|f| handlers.get(f))
                    .filter_map(FieldHandler::materialize)
                    .flatten()
                    .collect();
                let values = distinct_non_blank(values);
                if !values.is_empty() {
                    attributes.set(attribute, values);
                }
            }
            Processor::SetDates { field } => {
                let dates: Vec<_> = handlers
                    .get(field)
                    .and_then(FieldHandler::materialize)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|v| v.as_date().is_some())
                    .collect();
                if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
                    attributes.set_single(name::TEMPORAL_START, first.clone());
                    attributes.set_single(name::TEMPORAL_END, last.clone());
                    attributes.set_single(name::CREATED, first.clone());
                }
            }
            Processor::SensorAltitude => {
                let altitudes: Vec<f64> = handlers
                    .get(field::SENSOR_TRUE_ALTITUDE)
                    .and_then(FieldHandler::materialize)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(AttributeValue::as_float)
                    .collect();
                if !altitudes.is_empty() {
                    let average = altitudes.iter().sum::<f64>() / altitudes.len() as f64;
                    attributes.set_single(name::ALTITUDE, AttributeValue::Float(average));
                }
            }
            Processor::FrameCenter(p) => p.process(handlers, config, attributes),
            Processor::Location(p) => p.process(handlers, config, attributes),
            Processor::SecurityClassification(p) => p.process(handlers, attributes),
            Processor::List(processors) => {
                for processor in processors {
                    processor.process(handlers, config, attributes);
                }
            }
        }
    }

    /// Dispatch `visitor` to this processor and everything nested in it.
    pub fn accept<V: ProcessorVisitor + ?Sized>(&mut self, visitor: &mut V) {
        match self {
            Processor::FrameCenter(p) => visitor.visit_frame_center(p),
            Processor::Location(p) => visitor.visit_location(p),
            Processor::SecurityClassification(p) => visitor.visit_security_classification(p),
            Processor::List(processors) => {
                for processor in processors {
                    processor.accept(visitor);
                }
            }
            _ => {}
        }
    }
}

fn distinct_non_blank(values: Vec<AttributeValue>) -> Vec<AttributeValue> {
    let mut out: Vec<AttributeValue> = Vec::with_capacity(values.len());
    for value in values {
        if !value.is_blank() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn subsample_count(config: &WindowConfig) -> Option<usize> {
    match config.subsample_count() {
        Some(count) if count >= MIN_SUBSAMPLE_COUNT => Some(count),
        _ => {
            debug!(
                "Subsample count missing or below {}, skipping geometry processing",
                MIN_SUBSAMPLE_COUNT
            );
            None
        }
    }
}

fn points(values: &[AttributeValue]) -> Vec<Point<f64>> {
    values
        .iter()
        .filter_map(|v| match v.as_geometry() {
            Some(Geometry::Point(p)) => Some(*p),
            _ => None,
        })
        .collect()
}

/// Frame center points as a line geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCenterProcessor {
    pub operator: GeometryOperator,
    pub distance_tolerance: Option<f64>,
}

impl Default for FrameCenterProcessor {
    fn default() -> Self {
        Self {
            operator: GeometryOperator::Chain(vec![
                GeometryOperator::SubsampleLine,
                GeometryOperator::Simplify,
                GeometryOperator::Normalize,
            ]),
            distance_tolerance: None,
        }
    }
}

impl FrameCenterProcessor {
    fn process(&self, handlers: &HandlerSet, config: &WindowConfig, attributes: &mut AttributeMap) {
        let Some(count) = subsample_count(config) else {
            return;
        };
        if !handlers.share_handler(&[field::FRAME_CENTER_LATITUDE, field::FRAME_CENTER_LONGITUDE]) {
            return;
        }
        let Some(values) = handlers
            .get(field::FRAME_CENTER_LATITUDE)
            .and_then(|h| h.materialize_subsampled(count))
        else {
            return;
        };

        if let Some(line) = geometry::points_to_line(&points(&values)) {
            let context = OperatorContext {
                subsample_count: count,
                distance_tolerance: self.distance_tolerance,
            };
            let line = self.operator.apply(line, &context);
            attributes.set_single(name::FRAME_CENTER, AttributeValue::Geometry(line));
        }
    }
}

/// Footprint of the window: union of the corner polygons, or the frame
/// center line when no corner data is usable.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationProcessor {
    pub pre_union: GeometryOperator,
    pub post_union: GeometryOperator,
    pub distance_tolerance: Option<f64>,
}

impl Default for LocationProcessor {
    fn default() -> Self {
        Self {
            pre_union: GeometryOperator::Identity,
            post_union: GeometryOperator::Chain(vec![GeometryOperator::Simplify, GeometryOperator::Normalize]),
            distance_tolerance: None,
        }
    }
}

impl LocationProcessor {
    fn process(&self, handlers: &HandlerSet, config: &WindowConfig, attributes: &mut AttributeMap) {
        let Some(count) = subsample_count(config) else {
            return;
        };
        let context = OperatorContext {
            subsample_count: count,
            distance_tolerance: self.distance_tolerance,
        };

        let location = self
            .from_corners(handlers, count, &context)
            .or_else(|| self.from_frame_center(handlers, count, &context));
        if let Some(location) = location {
            attributes.set_single(name::LOCATION, AttributeValue::Geometry(location));
        }
    }

    fn find<'a>(
        handlers: &'a HandlerSet,
        attribute: &str,
        matches: fn(&FieldHandler) -> bool,
    ) -> Option<&'a FieldHandler> {
        handlers
            .iter()
            .find(|h| matches(h) && h.attribute_name() == attribute)
    }

    fn from_corners(&self, handlers: &HandlerSet, count: usize, context: &OperatorContext) -> Option<Geometry<f64>> {
        let handler = Self::find(handlers, name::CORNER, |h| matches!(h, FieldHandler::GeoBox(_)))?;
        let polygons = handler
            .materialize_subsampled(count)?
            .into_iter()
            .filter_map(|v| match v {
                AttributeValue::Geometry(g) => Some(self.pre_union.apply(g, context)),
                _ => None,
            })
            .filter_map(|g| geometry::polygons_of(&g))
            .flatten()
            .collect();
        let union = geometry::union_polygons(polygons)?;
        let location = geometry::repair(self.post_union.apply(union, context));
        if location.is_none() {
            debug!("Corner union is not a valid footprint");
        }
        location
    }

    fn from_frame_center(
        &self,
        handlers: &HandlerSet,
        count: usize,
        context: &OperatorContext,
    ) -> Option<Geometry<f64>> {
        let handler = Self::find(handlers, name::FRAME_CENTER, |h| matches!(h, FieldHandler::LatLon(_)))?;
        let values = handler.materialize_subsampled(count)?;
        let line = geometry::points_to_line(&points(&values))?;
        let operator = GeometryOperator::Chain(vec![self.pre_union.clone(), self.post_union.clone()]);
        Some(operator.apply(line, context))
    }
}

/// Maps security classification codes to names. When several codes were
/// seen, the one listed last in the table wins.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityClassificationProcessor {
    /// `(code, classification)` from least to most restrictive.
    pub table: Vec<(u8, String)>,
}

impl Default for SecurityClassificationProcessor {
    fn default() -> Self {
        let table = ["UNCLASSIFIED", "RESTRICTED", "CONFIDENTIAL", "SECRET", "TOP SECRET"]
            .iter()
            .zip(1u8..)
            .map(|(name, code)| (code, name.to_string()))
            .collect();
        Self { table }
    }
}

impl SecurityClassificationProcessor {
    /// Replace the name of `code`, or append it as the most restrictive entry.
    pub fn set_classification(&mut self, code: u8, classification: &str) {
        match self.table.iter_mut().find(|(c, _)| *c == code) {
            Some(entry) => entry.1 = classification.to_string(),
            None => self.table.push((code, classification.to_string())),
        }
    }

    fn process(&self, handlers: &HandlerSet, attributes: &mut AttributeMap) {
        let Some(values) = handlers
            .get(field::SECURITY_CLASSIFICATION)
            .and_then(FieldHandler::materialize)
        else {
            return;
        };
        let most_restrictive = values
            .iter()
            .filter_map(AttributeValue::as_integer)
            .filter_map(|code| {
                let position = self.table.iter().position(|(c, _)| i64::from(*c) == code);
                if position.is_none() {
                    debug!("Unmapped security classification code {}", code);
                }
                position
            })
            .max();
        if let Some(position) = most_restrictive {
            let classification = self.table[position].1.clone();
            attributes.set_single(name::SECURITY_CLASSIFICATION, AttributeValue::Text(classification));
        }
    }
}

/// Sets the simplification tolerance of every geometry processor.
#[derive(Debug, Clone, Copy)]
pub struct SetDistanceTolerance(pub f64);

impl ProcessorVisitor for SetDistanceTolerance {
    fn visit_frame_center(&mut self, processor: &mut FrameCenterProcessor) {
        processor.distance_tolerance = Some(self.0);
    }

    fn visit_location(&mut self, processor: &mut LocationProcessor) {
        processor.distance_tolerance = Some(self.0);
    }
}

/// Adds or renames one entry of the classification table.
#[derive(Debug, Clone)]
pub struct SetSecurityClassification {
    pub code: u8,
    pub classification: String,
}

impl ProcessorVisitor for SetSecurityClassification {
    fn visit_security_classification(&mut self, processor: &mut SecurityClassificationProcessor) {
        processor.set_classification(self.code, &self.classification);
    }
}

/// The processor chain for UAS Datalink telemetry.
pub fn default_processors() -> Processor {
    Processor::List(vec![
        Processor::CopyPresent,
        Processor::Distinct {
            field: field::MISSION_ID,
            attribute: name::MISSION_ID,
        },
        Processor::Distinct {
            field: field::PLATFORM_DESIGNATION,
            attribute: name::PLATFORM_NAME,
        },
        Processor::Distinct {
            field: field::IMAGE_SOURCE_SENSOR,
            attribute: name::SENSOR_ID,
        },
        Processor::Union {
            fields: vec![field::PLATFORM_TAIL_NUMBER, field::PLATFORM_CALL_SIGN],
            attribute: name::PLATFORM_ID,
        },
        Processor::SetDates { field: field::TIMESTAMP },
        Processor::SensorAltitude,
        Processor::FrameCenter(FrameCenterProcessor::default()),
        Processor::Location(LocationProcessor::default()),
        Processor::SecurityClassification(SecurityClassificationProcessor::default()),
    ])
}
