//! PES (Packetized Elementary Stream) header parsing.

/// PES start code prefix.
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Size of the fixed part of a PES header that carries optional fields.
pub const PES_FIXED_HEADER_SIZE: usize = 9;

/// Stream ID constants.
pub mod stream_id {
    /// Private stream 1, used for asynchronous KLV.
    pub const PRIVATE_STREAM_1: u8 = 0xBD;
    /// Metadata stream, used for synchronous KLV.
    pub const METADATA: u8 = 0xFC;
}

/// Parsed PES header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    /// Stream ID.
    pub stream_id: u8,
    /// PES packet length (bytes following the length field, 0 = unbounded).
    pub packet_length: u16,
    /// Length of the optional header fields after the fixed 9 bytes.
    pub header_data_length: u8,
    /// Presentation timestamp in 90 kHz units.
    pub pts: Option<u64>,
}

impl PesHeader {
    /// Parse the PES header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() < PES_FIXED_HEADER_SIZE {
            return Err("PES header too short");
        }
        if data[..3] != PES_START_CODE {
            return Err("Missing PES start code");
        }

        let stream_id = data[3];
        let packet_length = u16::from_be_bytes([data[4], data[5]]);
        let header_data_length = data[8];

        let pts = if data[7] & 0x80 != 0 {
            if data.len() < 14 {
                return Err("PES header too short for PTS");
            }
            Some(read_timestamp(&data[9..14]))
        } else {
            None
        };

        Ok(Self {
            stream_id,
            packet_length,
            header_data_length,
            pts,
        })
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        PES_FIXED_HEADER_SIZE + self.header_data_length as usize
    }

    /// The payload of the PES packet `data` this header was parsed from.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = self.payload_offset();
        let end = if self.packet_length == 0 {
            data.len()
        } else {
            (6 + self.packet_length as usize).min(data.len())
        };
        if start >= end {
            &[]
        } else {
            &data[start..end]
        }
    }
}

/// Decode a 33-bit timestamp from its 5-byte marker-bit encoding.
pub fn read_timestamp(b: &[u8]) -> u64 {
    (((b[0] as u64 >> 1) & 0x07) << 30)
        | ((((b[1] as u64) << 8 | b[2] as u64) >> 1) << 15)
        | (((b[3] as u64) << 8 | b[4] as u64) >> 1)
}
