//! Error types for stream demultiplexing, frame classification, buffering
//! and telemetry decoding.

use thiserror::Error;

/// Errors raised while demultiplexing a transport stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    /// A packet could not be parsed.
    #[error("Invalid packet: {0}")]
    InvalidPacket(&'static str),

    /// A program table section could not be parsed.
    #[error("Invalid table on PID 0x{pid:04X}: {reason}")]
    InvalidTable { pid: u16, reason: &'static str },

    /// The program association table lists no programs. The stream cannot
    /// be read any further and the session must be restarted.
    #[error("Program association table contains no programs")]
    EmptyProgramList,
}

impl DemuxError {
    /// Returns true if the stream session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DemuxError::EmptyProgramList)
    }
}

/// Errors raised while classifying a video access unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// The unit does not start with a PES header.
    #[error("Invalid PES header: {0}")]
    InvalidPes(&'static str),

    /// A picture header ended before the coding type could be read.
    #[error("Truncated picture header at offset {0}")]
    TruncatedPicture(usize),
}

/// Errors raised while decoding a KLV telemetry unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KlvError {
    /// The PES header of the telemetry unit is malformed.
    #[error("Invalid PES header: {0}")]
    InvalidPes(&'static str),

    /// A BER encoded length could not be read.
    #[error("Invalid BER length at offset {0}")]
    InvalidLength(usize),

    /// An element claims more bytes than remain in its set.
    #[error("Truncated element: tag {tag} needs {expected} bytes, got {actual}")]
    Truncated { tag: u8, expected: usize, actual: usize },

    /// A universal set claims more bytes than the packet holds.
    #[error("Truncated set: needs {expected} bytes, got {actual}")]
    TruncatedSet { expected: usize, actual: usize },

    /// The payload does not carry the UAS Datalink local set.
    #[error("UAS Datalink local set not found")]
    MissingLocalSet,

    /// The local set carries no checksum element.
    #[error("Checksum element not found")]
    MissingChecksum,

    /// The checksum element does not match the packet bytes.
    #[error("Checksum mismatch: expected 0x{expected:04X}, computed 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },
}

/// Errors raised by the frame boundary buffer.
#[derive(Error, Debug)]
pub enum BufferError {
    /// The temp sink could not be created or written.
    #[error("Temp file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A rollover threshold is out of range.
    #[error("Invalid rollover threshold: {0}")]
    InvalidThreshold(String),
}
