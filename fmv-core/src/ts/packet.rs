//! MPEG-TS packet parsing.
//!
//! This module handles parsing of 188-byte MPEG Transport Stream packets.

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// Parsed TS packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload unit start indicator.
    pub payload_unit_start: bool,
    /// Packet Identifier (13 bits).
    pub pid: u16,
    /// Adaptation field control (2 bits).
    pub adaptation_field_control: u8,
    /// Continuity counter (4 bits).
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Parse the 4-byte header. The caller guarantees `data.len() >= 4`.
    fn read(data: &[u8]) -> Self {
        Self {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            pid: ((data[1] as u16 & 0x1F) << 8) | data[2] as u16,
            adaptation_field_control: (data[3] >> 4) & 0x03,
            continuity_counter: data[3] & 0x0F,
        }
    }

    /// Check if packet has adaptation field.
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0x02 != 0
    }

    /// Check if packet has payload.
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }
}

/// The adaptation field flags this crate cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdaptationField {
    /// Discontinuity indicator: the continuity counter may jump.
    pub discontinuity: bool,
}

/// A parsed TS packet borrowing its payload from the raw bytes.
#[derive(Debug, Clone)]
pub struct TsPacket<'a> {
    /// Packet header.
    pub header: TsHeader,
    /// Adaptation field (if present).
    pub adaptation_field: Option<AdaptationField>,
    /// Payload data (empty when the packet carries none).
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Parse a TS packet from raw bytes.
    ///
    /// `data` must hold at least 188 bytes starting with the sync byte.
    pub fn parse(data: &'a [u8]) -> Result<Self, &'static str> {
        if data.len() < TS_PACKET_SIZE {
            return Err("Packet too short");
        }

        if data[0] != SYNC_BYTE {
            return Err("Invalid sync byte");
        }

        let header = TsHeader::read(data);

        let mut offset = 4;
        let adaptation_field = if header.has_adaptation_field() {
            let af_length = data[4] as usize;
            offset = 5 + af_length;

            Some(AdaptationField {
                discontinuity: af_length > 0 && data[5] & 0x80 != 0,
            })
        } else {
            None
        };

        let payload = if header.has_payload() && offset < TS_PACKET_SIZE {
            &data[offset..TS_PACKET_SIZE]
        } else {
            &[]
        };

        Ok(TsPacket {
            header,
            adaptation_field,
            payload,
        })
    }

    /// True when the packet carries payload bytes.
    pub fn carries_payload(&self) -> bool {
        self.header.has_payload() && !self.payload.is_empty()
    }

    /// Get the payload of a table-carrying packet with the pointer field
    /// skipped. Only valid on packets that start a payload unit.
    pub fn psi_payload(&self) -> Option<&'a [u8]> {
        if !self.carries_payload() {
            return None;
        }

        if self.header.payload_unit_start {
            let pointer = self.payload[0] as usize;
            if pointer + 1 < self.payload.len() {
                Some(&self.payload[pointer + 1..])
            } else {
                None
            }
        } else {
            Some(self.payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_null_packet() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x1F; // PID high bits
        packet[2] = 0xFF; // PID low bits (NULL = 0x1FFF)
        packet[3] = 0x10; // payload only

        let parsed = TsPacket::parse(&packet).unwrap();
        assert_eq!(parsed.header.pid, 0x1FFF);
        assert!(!parsed.header.transport_error);
        assert!(parsed.header.has_payload());
        assert!(!parsed.header.has_adaptation_field());
        assert_eq!(parsed.payload.len(), 184);
    }

    #[test]
    fn test_payload_after_adaptation_field() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x41; // payload_unit_start, PID high = 0x01
        packet[2] = 0x00;
        packet[3] = 0x30; // adaptation field + payload
        packet[4] = 7; // af length
        packet[5] = 0x80; // discontinuity
        packet[12] = 0xAB; // first payload byte

        let parsed = TsPacket::parse(&packet).unwrap();
        assert_eq!(parsed.header.pid, 0x0100);
        assert!(parsed.header.payload_unit_start);
        assert!(parsed.adaptation_field.unwrap().discontinuity);
        assert_eq!(parsed.payload.len(), 188 - 12);
        assert_eq!(parsed.payload[0], 0xAB);
    }

    #[test]
    fn test_adaptation_only_has_no_payload() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[3] = 0x20;
        packet[4] = 183;

        let parsed = TsPacket::parse(&packet).unwrap();
        assert!(!parsed.carries_payload());
        assert!(parsed.psi_payload().is_none());
    }

    #[test]
    fn test_psi_payload_skips_pointer_field() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x40;
        packet[3] = 0x10;
        packet[4] = 2; // pointer field
        packet[7] = 0x02; // table id after two filler bytes

        let parsed = TsPacket::parse(&packet).unwrap();
        let psi = parsed.psi_payload().unwrap();
        assert_eq!(psi[0], 0x02);
        assert_eq!(psi.len(), 184 - 3);
    }

    #[test]
    fn test_invalid_sync_byte() {
        let packet = [0u8; 188];
        assert!(TsPacket::parse(&packet).is_err());
        assert!(TsPacket::parse(&[SYNC_BYTE; 10]).is_err());
    }
}
