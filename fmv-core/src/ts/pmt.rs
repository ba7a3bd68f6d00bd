//! PMT (Program Map Table) parsing.
//!
//! The PMT lists the elementary streams of one program together with
//! their stream types.

use super::psi::PsiSection;
use super::table_id;

/// Stream type constants.
pub mod stream_type {
    /// MPEG-2 Video.
    pub const MPEG2_VIDEO: u8 = 0x02;
    /// MPEG-2 PES Private Data (asynchronous KLV in most muxers).
    pub const PES_PRIVATE_DATA: u8 = 0x06;
    /// Metadata carried in PES packets (synchronous KLV).
    pub const METADATA_PES: u8 = 0x15;
    /// MPEG-4 Video (H.264/AVC).
    pub const H264_VIDEO: u8 = 0x1B;
}

/// Video codec of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// MPEG-2 video.
    Mpeg2,
}

/// What an elementary stream carries, as far as ingest is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Compressed video.
    Video(VideoCodec),
    /// KLV telemetry.
    Telemetry,
    /// Anything else (audio, data, ...).
    Other,
}

impl StreamKind {
    /// Map a PMT stream type to its kind.
    pub fn from_stream_type(stream_type: u8) -> Self {
        match stream_type {
            stream_type::H264_VIDEO => StreamKind::Video(VideoCodec::H264),
            stream_type::MPEG2_VIDEO => StreamKind::Video(VideoCodec::Mpeg2),
            stream_type::METADATA_PES | stream_type::PES_PRIVATE_DATA => StreamKind::Telemetry,
            _ => StreamKind::Other,
        }
    }
}

/// A single elementary stream entry in the PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    /// Stream type.
    pub stream_type: u8,
    /// Elementary PID.
    pub elementary_pid: u16,
}

impl PmtStream {
    /// The ingest-level kind of this stream.
    pub fn kind(&self) -> StreamKind {
        StreamKind::from_stream_type(self.stream_type)
    }
}

/// Parsed PMT (Program Map Table).
#[derive(Debug, Clone, Default)]
pub struct PmtTable {
    /// Program number (service ID).
    pub program_number: u16,
    /// Version number.
    pub version_number: u8,
    /// Elementary streams.
    pub streams: Vec<PmtStream>,
}

impl PmtTable {
    /// Parse a PMT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::PMT {
            return Err("Not a PMT section");
        }

        let data = section.data;
        if data.len() < 4 {
            return Err("PMT data too short");
        }

        // data[0..2] holds the PCR PID
        let program_info_length = ((data[2] as usize & 0x0F) << 8) | data[3] as usize;

        if data.len() < 4 + program_info_length {
            return Err("Invalid program info length");
        }

        let mut pmt = PmtTable {
            program_number: section.header.table_id_extension,
            version_number: section.header.version_number,
            streams: Vec::new(),
        };

        // Elementary stream loop: type(1) pid(2) es_info_length(2) descriptors
        let mut offset = 4 + program_info_length;
        while offset + 5 <= data.len() {
            let stream_type = data[offset];
            let elementary_pid = ((data[offset + 1] as u16 & 0x1F) << 8) | data[offset + 2] as u16;
            let es_info_length =
                ((data[offset + 3] as usize & 0x0F) << 8) | data[offset + 4] as usize;

            offset += 5 + es_info_length;
            if offset > data.len() {
                break;
            }

            pmt.streams.push(PmtStream {
                stream_type,
                elementary_pid,
            });
        }

        Ok(pmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::psi::build_section;

    #[test]
    fn test_parse_pmt() {
        let raw = build_section(
            table_id::PMT,
            0x0101,
            1,
            &[
                // PCR PID = 0x0100 (with reserved bits)
                0xE1, 0x00,
                // Program info length = 0
                0xF0, 0x00,
                // Stream 1: H.264, PID=0x0100, ES info length=0
                0x1B, 0xE1, 0x00, 0xF0, 0x00,
                // Stream 2: KLV metadata, PID=0x0102, ES info length=3
                0x15, 0xE1, 0x02, 0xF0, 0x03, 0x26, 0x01, 0xFF,
                // Stream 3: AAC audio, PID=0x0110
                0x0F, 0xE1, 0x10, 0xF0, 0x00,
            ],
        );
        let section = PsiSection::parse(&raw).unwrap();

        let pmt = PmtTable::parse(&section).unwrap();

        assert_eq!(pmt.program_number, 0x0101);
        assert_eq!(pmt.streams.len(), 3);

        assert_eq!(pmt.streams[0].elementary_pid, 0x0100);
        assert_eq!(pmt.streams[0].kind(), StreamKind::Video(VideoCodec::H264));
        assert_eq!(pmt.streams[1].elementary_pid, 0x0102);
        assert_eq!(pmt.streams[1].kind(), StreamKind::Telemetry);
        assert_eq!(pmt.streams[2].kind(), StreamKind::Other);
    }

    #[test]
    fn test_stream_kinds() {
        assert_eq!(
            StreamKind::from_stream_type(stream_type::MPEG2_VIDEO),
            StreamKind::Video(VideoCodec::Mpeg2)
        );
        assert_eq!(
            StreamKind::from_stream_type(stream_type::PES_PRIVATE_DATA),
            StreamKind::Telemetry
        );
        assert_eq!(StreamKind::from_stream_type(0x03), StreamKind::Other);
    }

    #[test]
    fn test_truncated_descriptor_loop_stops() {
        let raw = build_section(
            table_id::PMT,
            1,
            0,
            &[0xE1, 0x00, 0xF0, 0x00, 0x1B, 0xE1, 0x00, 0xF0, 0x09, 0x00],
        );
        let section = PsiSection::parse(&raw).unwrap();

        let pmt = PmtTable::parse(&section).unwrap();
        assert!(pmt.streams.is_empty());
    }
}
