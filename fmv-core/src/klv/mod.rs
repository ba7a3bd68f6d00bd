//! KLV telemetry decoding (UAS Datalink local set).
//!
//! # Usage
//! ```ignore
//! use fmv_core::klv::{decode_telemetry, KlvContext};
//!
//! let context = KlvContext::uas_datalink();
//! if let Some(unit) = decode_telemetry(&unit.data, &context)? {
//!     println!("{} fields at {}", unit.fields.len(), unit.timestamp);
//! }
//! ```

pub mod ber;
mod context;
mod local_set;
mod telemetry;
mod value;

pub use context::{field, FieldDecoder, FieldSpec, KlvContext, LocalSetContext, UAS_DATALINK_KEY};
pub use local_set::{checksum, decode_klv, parse_local_set};
pub use telemetry::{decode_telemetry, TelemetryUnit, ASYNC_TIMESTAMP, METADATA_CELL_HEADER_SIZE};
pub use value::{FieldMap, KlvValue};
