//! Field extraction: decoded telemetry units are folded into per-field
//! handlers, and at the end of a window processors turn the handlers into
//! an [`AttributeMap`].
//!
//! # Usage
//! ```ignore
//! use fmv_core::pipeline::{Pipeline, WindowConfig};
//!
//! let mut pipeline = Pipeline::uas_datalink();
//! for unit in units {
//!     pipeline.process(&unit);
//! }
//! let attributes = pipeline.finish(&WindowConfig::default());
//! println!("{}", serde_json::to_string(&attributes)?);
//! ```

mod attribute;
pub mod geometry;
mod handler;
mod post;
mod processor;
mod window;

use log::{debug, trace};

pub use attribute::{name, AttributeMap, AttributeValue};
pub use handler::{corner_fields, default_handlers, offset_corner_fields, FieldHandler, GeoBox, HandlerSet, LatLon};
pub use post::{OffsetCenterPostProcessor, PostProcessor};
pub use processor::{
    default_processors, FrameCenterProcessor, LocationProcessor, Processor, ProcessorVisitor,
    SecurityClassificationProcessor, SetDistanceTolerance, SetSecurityClassification, MIN_SUBSAMPLE_COUNT,
};
pub use window::{WindowConfig, DEFAULT_SUBSAMPLE_COUNT, SUBSAMPLE_COUNT};

use crate::klv::{FieldMap, KlvValue, TelemetryUnit};

/// Handlers, processors and post-processors for one telemetry stream.
pub struct Pipeline {
    handlers: HandlerSet,
    processor: Processor,
    post_processors: Vec<Box<dyn PostProcessor>>,
    units: usize,
}

impl Pipeline {
    pub fn new(handlers: HandlerSet, processor: Processor) -> Self {
        Self {
            handlers,
            processor,
            post_processors: Vec::new(),
            units: 0,
        }
    }

    /// Default handlers and processors plus offset corner derivation.
    pub fn uas_datalink() -> Self {
        Self::new(default_handlers(), default_processors()).with_post_processor(OffsetCenterPostProcessor)
    }

    pub fn with_post_processor(mut self, post_processor: impl PostProcessor + 'static) -> Self {
        self.post_processors.push(Box::new(post_processor));
        self
    }

    /// Fold one decoded unit into the handlers.
    pub fn process(&mut self, unit: &TelemetryUnit) {
        self.accept_all(&unit.fields);
        for post_processor in &self.post_processors {
            post_processor.post_process(&unit.fields, &mut self.handlers);
        }
        self.units += 1;
    }

    fn accept_all(&mut self, fields: &FieldMap) {
        for (field, value) in fields {
            match value {
                KlvValue::Set(nested) => self.accept_all(nested),
                value => {
                    if !self.handlers.accept(field, value) {
                        trace!("No handler for field {}", field);
                    }
                }
            }
        }
    }

    /// Run the processors over everything seen since the last call and
    /// start a new window.
    pub fn finish(&mut self, config: &WindowConfig) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        self.processor.process(&self.handlers, config, &mut attributes);
        debug!(
            "Window closed: {} units, {} attributes",
            self.units,
            attributes.len()
        );
        self.handlers.reset();
        self.units = 0;
        attributes
    }

    /// Apply a configuration visitor to every processor.
    pub fn configure(&mut self, visitor: &mut dyn ProcessorVisitor) {
        self.processor.accept(visitor);
    }

    /// Units processed in the current window.
    pub fn units(&self) -> usize {
        self.units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klv::{field, ASYNC_TIMESTAMP};
    use super::geometry::to_wkt;

    fn unit(entries: &[(&'static str, KlvValue)]) -> TelemetryUnit {
        TelemetryUnit {
            fields: entries.iter().cloned().collect(),
            timestamp: ASYNC_TIMESTAMP,
        }
    }

    #[test]
    fn test_window_attributes() {
        let mut security = FieldMap::new();
        security.insert(field::SECURITY_CLASSIFICATION, KlvValue::Unsigned(3));

        let mut pipeline = Pipeline::uas_datalink();
        pipeline.process(&unit(&[
            (field::MISSION_ID, KlvValue::Text("M1".into())),
            (field::TIMESTAMP, KlvValue::Unsigned(1_377_596_488_285_000)),
            (field::FRAME_CENTER_LATITUDE, KlvValue::Float(10.0)),
            (field::FRAME_CENTER_LONGITUDE, KlvValue::Float(20.0)),
            (field::SECURITY_LOCAL_SET, KlvValue::Set(security)),
        ]));
        pipeline.process(&unit(&[
            (field::FRAME_CENTER_LATITUDE, KlvValue::Float(5.0)),
            (field::FRAME_CENTER_LONGITUDE, KlvValue::Float(1.0)),
        ]));
        assert_eq!(pipeline.units(), 2);

        let attributes = pipeline.finish(&WindowConfig::default());
        let wkt = |n: &str| attributes.first(n).and_then(AttributeValue::as_geometry).map(to_wkt);
        assert_eq!(wkt(name::FRAME_CENTER).as_deref(), Some("LINESTRING (1 5, 20 10)"));
        assert_eq!(wkt(name::LOCATION).as_deref(), Some("LINESTRING (1 5, 20 10)"));
        assert_eq!(
            attributes.first(name::SECURITY_CLASSIFICATION).and_then(AttributeValue::as_text),
            Some("CONFIDENTIAL")
        );
        assert_eq!(
            attributes.first(name::MISSION_ID).and_then(AttributeValue::as_text),
            Some("M1")
        );
        assert!(attributes.contains(name::TEMPORAL_START));

        assert_eq!(pipeline.units(), 0);
        assert!(pipeline.finish(&WindowConfig::default()).is_empty());
    }

    #[test]
    fn test_offset_corners_feed_location() {
        let mut entries = vec![
            (field::FRAME_CENTER_LATITUDE, KlvValue::Float(1.0)),
            (field::FRAME_CENTER_LONGITUDE, KlvValue::Float(1.0)),
        ];
        let offsets = [-1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0, -1.0];
        entries.extend(offset_corner_fields().into_iter().zip(offsets.map(KlvValue::Float)));

        let mut pipeline = Pipeline::uas_datalink();
        pipeline.process(&unit(&entries));
        let attributes = pipeline.finish(&WindowConfig::default());

        let location = attributes.first(name::LOCATION).and_then(AttributeValue::as_geometry).unwrap();
        assert_eq!(to_wkt(location), "POLYGON ((0 0, 0 2, 2 2, 2 0, 0 0))");
    }

    #[test]
    fn test_configure_reaches_processors() {
        let mut pipeline = Pipeline::uas_datalink();
        pipeline.configure(&mut SetSecurityClassification {
            code: 3,
            classification: "NATO CONFIDENTIAL".into(),
        });

        let mut security = FieldMap::new();
        security.insert(field::SECURITY_CLASSIFICATION, KlvValue::Unsigned(3));
        pipeline.process(&unit(&[(field::SECURITY_LOCAL_SET, KlvValue::Set(security))]));

        let attributes = pipeline.finish(&WindowConfig::default());
        assert_eq!(
            attributes.first(name::SECURITY_CLASSIFICATION).and_then(AttributeValue::as_text),
            Some("NATO CONFIDENTIAL")
        );
    }
}
