//! MPEG-TS demultiplexing.
//!
//! Parsing of 188-byte transport packets, the PAT/PMT program tables, PES
//! headers, and per-PID reassembly of elementary stream units.
//!
//! # Usage
//! ```ignore
//! use fmv_core::ts::{DatagramReassembler, Demuxer};
//!
//! let mut reassembler = DatagramReassembler::new();
//! let mut demux = Demuxer::default();
//! for packet in reassembler.push(&datagram) {
//!     for unit in demux.read(&packet)? {
//!         println!("PID 0x{:04X}: {} bytes", unit.pid, unit.data.len());
//!     }
//! }
//! ```

mod demux;
mod packet;
mod pat;
mod pes;
mod pmt;
mod psi;
mod reassembly;

pub use demux::{DemuxConfig, Demuxer, ElementaryUnit};
pub use packet::{AdaptationField, TsHeader, TsPacket, SYNC_BYTE, TS_PACKET_SIZE};
pub use pat::{PatEntry, PatTable};
pub use pes::{read_timestamp, stream_id, PesHeader, PES_FIXED_HEADER_SIZE, PES_START_CODE};
pub use pmt::{stream_type, PmtStream, PmtTable, StreamKind, VideoCodec};
pub use psi::{build_section, crc32_mpeg2, PsiHeader, PsiSection};
pub use reassembly::DatagramReassembler;

/// Well-known PIDs in MPEG-TS.
pub mod pid {
    /// Program Association Table PID.
    pub const PAT: u16 = 0x0000;
}

/// Table IDs for PSI tables.
pub mod table_id {
    /// Program Association Section.
    pub const PAT: u8 = 0x00;
    /// Program Map Section.
    pub const PMT: u8 = 0x02;
}
