//! Reassembly of transport packets from network datagrams.
//!
//! Datagram boundaries need not line up with packet boundaries. The
//! reassembler carries partial packets across datagrams and resynchronises
//! on the sync byte when the stream is joined mid-packet or bytes are lost.

use bytes::{Bytes, BytesMut};
use log::trace;

use super::packet::{SYNC_BYTE, TS_PACKET_SIZE};

/// Turns a sequence of datagrams into whole 188-byte packets.
#[derive(Debug, Default)]
pub struct DatagramReassembler {
    buffer: BytesMut,
    skipped_bytes: u64,
}

impl DatagramReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a datagram and return every packet it completes, in order.
    pub fn push(&mut self, datagram: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(datagram);

        let mut packets = Vec::with_capacity(self.buffer.len() / TS_PACKET_SIZE);
        loop {
            match self.buffer.iter().position(|&b| b == SYNC_BYTE) {
                Some(0) => {}
                Some(skip) => {
                    trace!("Skipping {} bytes to next sync byte", skip);
                    self.skipped_bytes += skip as u64;
                    let _ = self.buffer.split_to(skip);
                }
                None => {
                    self.skipped_bytes += self.buffer.len() as u64;
                    self.buffer.clear();
                    break;
                }
            }

            if self.buffer.len() < TS_PACKET_SIZE {
                break;
            }
            packets.push(self.buffer.split_to(TS_PACKET_SIZE).freeze());
        }
        packets
    }

    /// Bytes held back waiting for the rest of a packet.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes discarded while searching for a sync byte.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Drop any partial packet.
    pub fn flush(&mut self) {
        self.buffer.clear();
    }
}
