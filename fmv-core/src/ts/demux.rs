//! Transport stream demultiplexer.
//!
//! Tracks the program tables of a single transport stream and reassembles
//! PES payload units per PID. Completed units are returned from
//! [`Demuxer::read`] rather than pushed through a callback.

use std::collections::{HashMap, HashSet};

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};

use super::packet::TsPacket;
use super::pat::PatTable;
use super::pmt::{PmtTable, StreamKind};
use super::psi::PsiSection;
use super::pid;
use crate::error::DemuxError;

/// Configuration for the demultiplexer.
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// Drop PAT/PMT sections whose CRC32 does not match.
    pub verify_crc: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self { verify_crc: true }
    }
}

/// A fully reassembled PES packet for one PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryUnit {
    /// PID the unit was carried on.
    pub pid: u16,
    /// PMT stream type of the PID.
    pub stream_type: u8,
    /// Raw PES bytes, header included.
    pub data: Bytes,
}

impl ElementaryUnit {
    /// The ingest-level kind of the stream this unit belongs to.
    pub fn kind(&self) -> StreamKind {
        StreamKind::from_stream_type(self.stream_type)
    }
}

/// Demultiplexer state for one stream session.
#[derive(Debug, Default)]
pub struct Demuxer {
    config: DemuxConfig,
    /// PMT PIDs announced by the latest PAT.
    pmt_pids: HashSet<u16>,
    /// Elementary PID -> stream type, from every PMT seen.
    streams: HashMap<u16, u8>,
    /// In-progress PES accumulation per PID.
    pending: HashMap<u16, BytesMut>,
    /// Last continuity counter per elementary PID.
    continuity: HashMap<u16, u8>,
    /// Packets lost to continuity gaps or flagged transport errors.
    lost_packets: u64,
}

impl Demuxer {
    /// Create a demultiplexer with the given configuration.
    pub fn new(config: DemuxConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Feed one 188-byte packet.
    ///
    /// Returns the units completed by this packet (at most one, since a unit
    /// completes only when the next unit on the same PID starts).
    pub fn read(&mut self, raw: &[u8]) -> Result<Vec<ElementaryUnit>, DemuxError> {
        let packet = TsPacket::parse(raw).map_err(DemuxError::InvalidPacket)?;
        let header = packet.header;

        if header.transport_error {
            self.lost_packets += 1;
            debug!("PID 0x{:04X}: dropping packet with transport error", header.pid);
            return Ok(Vec::new());
        }

        if header.pid == pid::PAT && header.payload_unit_start {
            self.read_pat(&packet)?;
            return Ok(Vec::new());
        }

        if self.pmt_pids.contains(&header.pid) && header.payload_unit_start {
            self.read_pmt(&packet)?;
            return Ok(Vec::new());
        }

        match self.stream_type(header.pid) {
            Some(stream_type) if packet.carries_payload() => {
                if !self.check_continuity(&packet) {
                    return Ok(Vec::new());
                }
                Ok(self.accumulate(header.pid, stream_type, &packet).into_iter().collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Emit every in-progress accumulation as a unit. Used at session end.
    pub fn flush(&mut self) -> Vec<ElementaryUnit> {
        let mut pids: Vec<u16> = self.pending.keys().copied().collect();
        pids.sort_unstable();
        pids.into_iter()
            .filter_map(|pid| {
                let data = self.pending.remove(&pid)?;
                let stream_type = *self.streams.get(&pid)?;
                Some(ElementaryUnit {
                    pid,
                    stream_type,
                    data: data.freeze(),
                })
            })
            .collect()
    }

    /// Stream type registered for an elementary PID.
    pub fn stream_type(&self, pid: u16) -> Option<u8> {
        self.streams.get(&pid).copied()
    }

    /// Whether a PAT has been seen.
    pub fn has_program_table(&self) -> bool {
        !self.pmt_pids.is_empty()
    }

    /// Packets dropped for continuity gaps or transport errors so far.
    pub fn lost_packets(&self) -> u64 {
        self.lost_packets
    }

    /// Forget all tables and accumulations.
    pub fn reset(&mut self) {
        self.pmt_pids.clear();
        self.streams.clear();
        self.pending.clear();
        self.continuity.clear();
    }

    /// Track the continuity counter of a payload-carrying packet. Returns
    /// false when the packet must not be accumulated: a repeated counter is
    /// a duplicate, and a gap discards the unit in progress, which is
    /// missing bytes.
    fn check_continuity(&mut self, packet: &TsPacket) -> bool {
        let pid = packet.header.pid;
        let counter = packet.header.continuity_counter;
        let discontinuity = packet.adaptation_field.is_some_and(|af| af.discontinuity);

        let Some(last) = self.continuity.insert(pid, counter) else {
            return true;
        };
        if discontinuity {
            return true;
        }
        if counter == last {
            trace!("PID 0x{:04X}: duplicate packet (cc {})", pid, counter);
            return false;
        }

        let expected = (last + 1) & 0x0F;
        if counter != expected {
            let lost = (counter.wrapping_sub(expected) & 0x0F) as u64;
            self.lost_packets += lost;
            debug!(
                "PID 0x{:04X}: continuity gap, expected cc {} got {} ({} packet(s) lost)",
                pid, expected, counter, lost
            );
            if let Some(partial) = self.pending.remove(&pid) {
                debug!("PID 0x{:04X}: discarding partial unit of {} bytes", pid, partial.len());
            }
        }
        true
    }

    fn section<'a>(&self, pid: u16, packet: &TsPacket<'a>) -> Result<Option<PsiSection<'a>>, DemuxError> {
        let Some(psi) = packet.psi_payload() else {
            return Err(DemuxError::InvalidTable {
                pid,
                reason: "Missing section payload",
            });
        };
        let section =
            PsiSection::parse(psi).map_err(|reason| DemuxError::InvalidTable { pid, reason })?;

        if self.config.verify_crc && !section.verify_crc(psi) {
            warn!("Dropping table section with bad CRC on PID 0x{:04X}", pid);
            return Ok(None);
        }
        Ok(Some(section))
    }

    fn read_pat(&mut self, packet: &TsPacket) -> Result<(), DemuxError> {
        let Some(section) = self.section(pid::PAT, packet)? else {
            return Ok(());
        };
        let pat = PatTable::parse(&section).map_err(|reason| DemuxError::InvalidTable {
            pid: pid::PAT,
            reason,
        })?;

        if pat.programs.is_empty() {
            return Err(DemuxError::EmptyProgramList);
        }

        self.pmt_pids = pat.pmt_pids().collect();
        debug!(
            "PAT v{}: {} program(s), PMT PIDs {:?}",
            pat.version_number,
            pat.programs.len(),
            self.pmt_pids
        );
        Ok(())
    }

    fn read_pmt(&mut self, packet: &TsPacket) -> Result<(), DemuxError> {
        let pmt_pid = packet.header.pid;
        let Some(section) = self.section(pmt_pid, packet)? else {
            return Ok(());
        };
        let pmt = PmtTable::parse(&section).map_err(|reason| DemuxError::InvalidTable {
            pid: pmt_pid,
            reason,
        })?;

        for stream in &pmt.streams {
            let previous = self.streams.insert(stream.elementary_pid, stream.stream_type);
            if previous != Some(stream.stream_type) {
                debug!(
                    "PMT program {}: PID 0x{:04X} stream type 0x{:02X} ({:?})",
                    pmt.program_number,
                    stream.elementary_pid,
                    stream.stream_type,
                    stream.kind()
                );
            }
        }
        Ok(())
    }

    fn accumulate(&mut self, pid: u16, stream_type: u8, packet: &TsPacket) -> Option<ElementaryUnit> {
        if packet.header.payload_unit_start {
            let previous = self
                .pending
                .insert(pid, BytesMut::from(packet.payload));
            return previous.map(|data| {
                trace!("PID 0x{:04X}: completed unit of {} bytes", pid, data.len());
                ElementaryUnit {
                    pid,
                    stream_type,
                    data: data.freeze(),
                }
            });
        }

        match self.pending.get_mut(&pid) {
            Some(buffer) => buffer.extend_from_slice(packet.payload),
            None => trace!("PID 0x{:04X}: dropping payload before first unit start", pid),
        }
        None
    }
}
