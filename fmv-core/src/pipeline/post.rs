//! Post-processors see every field of one decoded unit at once.

use log::trace;

use super::handler::{corner_fields, offset_corner_fields, FieldHandler, HandlerSet};
use crate::klv::{field, FieldMap, KlvValue};

/// Runs after the handlers consumed a decoded unit.
pub trait PostProcessor: Send {
    fn post_process(&self, fields: &FieldMap, handlers: &mut HandlerSet);
}

/// Derives corner points from the frame center and the offset corners.
///
/// Applies to every unit that carries the frame center and all eight offset
/// corners, and only when the corner fields are handled by a geo box. The
/// derived corners are added as one more sample next to any absolute corners
/// the unit carried.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetCenterPostProcessor;

impl PostProcessor for OffsetCenterPostProcessor {
    fn post_process(&self, fields: &FieldMap, handlers: &mut HandlerSet) {
        let corners = corner_fields();
        if !corners.iter().all(|f| handlers.contains(f)) {
            return;
        }

        let float = |name: &str| fields.get(name).and_then(KlvValue::as_float);
        let (Some(center_lat), Some(center_lon)) = (
            float(field::FRAME_CENTER_LATITUDE),
            float(field::FRAME_CENTER_LONGITUDE),
        ) else {
            return;
        };
        let offsets = offset_corner_fields().map(float);
        if offsets.iter().any(Option::is_none) {
            return;
        }

        // corner fields alternate latitude and longitude
        for (i, (corner, offset)) in corners.iter().zip(offsets).enumerate() {
            let Some(offset) = offset else {
                continue;
            };
            let Some(handler) = handlers.get_mut(corner) else {
                continue;
            };
            if !matches!(handler, FieldHandler::GeoBox(_)) {
                continue;
            }
            let center = if i % 2 == 0 { center_lat } else { center_lon };
            trace!("{} from offset {} + center {}", corner, offset, center);
            handler.accept_float(corner, offset + center);
        }
    }
}
