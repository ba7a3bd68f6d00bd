//! Core of the full-motion video ingest service.
//!
//! This crate turns an MPEG-TS byte stream carrying compressed video and
//! STANAG 4609 telemetry into frame-aligned output files plus a
//! multi-valued attribute map describing each file.
//!
//! # Data Flow
//!
//! ```text
//! datagrams -> DatagramReassembler -> Demuxer -+-> video units -> classify -> PacketBuffer -> temp file
//!                                              |
//!                                              +-> KLV units -> decode_telemetry -> Pipeline -> AttributeMap
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use fmv_core::buffer::{BufferConfig, PacketBuffer, RolloverCondition};
//! use fmv_core::pipeline::{Pipeline, WindowConfig};
//!
//! let buffer = PacketBuffer::new(BufferConfig::default());
//! let condition = RolloverCondition::megabyte_count(10)
//!     .unwrap()
//!     .or(RolloverCondition::ElapsedTime(Duration::from_secs(60)));
//!
//! // Nothing written yet, so nothing is handed off.
//! assert!(buffer.rotate(&condition).unwrap().is_none());
//!
//! let mut pipeline = Pipeline::uas_datalink();
//! assert!(pipeline.finish(&WindowConfig::default()).is_empty());
//! ```

pub mod buffer;
pub mod error;
pub mod frame;
pub mod klv;
pub mod pipeline;
pub mod ts;

pub use error::{BufferError, ClassifyError, DemuxError, KlvError};
