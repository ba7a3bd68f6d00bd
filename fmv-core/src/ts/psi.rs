//! PSI (Program Specific Information) section parsing.
//!
//! Common section header parsing and CRC validation for PAT/PMT.

/// PSI section header (common to all PSI tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiHeader {
    /// Table ID.
    pub table_id: u8,
    /// Section syntax indicator.
    pub section_syntax_indicator: bool,
    /// Section length (12 bits).
    pub section_length: u16,
    /// Table ID extension (transport stream id for PAT, program number for PMT).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next_indicator: bool,
}

/// A parsed PSI section.
#[derive(Debug, Clone)]
pub struct PsiSection<'a> {
    /// Section header.
    pub header: PsiHeader,
    /// Section data (after header, before CRC).
    pub data: &'a [u8],
    /// CRC32 value.
    pub crc32: u32,
}

impl<'a> PsiSection<'a> {
    /// Parse a PSI section starting at the table_id byte.
    pub fn parse(data: &'a [u8]) -> Result<Self, &'static str> {
        if data.len() < 3 {
            return Err("Section too short for header");
        }

        let table_id = data[0];
        let section_syntax_indicator = data[1] & 0x80 != 0;
        let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;

        if section_length < 5 {
            return Err("Section length too small");
        }

        let total_length = 3 + section_length as usize;
        if data.len() < total_length {
            return Err("Incomplete section data");
        }

        let header = if section_syntax_indicator {
            if total_length < 12 {
                return Err("Section too short for extended header");
            }

            PsiHeader {
                table_id,
                section_syntax_indicator,
                section_length,
                table_id_extension: ((data[3] as u16) << 8) | data[4] as u16,
                version_number: (data[5] >> 1) & 0x1F,
                current_next_indicator: data[5] & 0x01 != 0,
            }
        } else {
            PsiHeader {
                table_id,
                section_syntax_indicator,
                section_length,
                table_id_extension: 0,
                version_number: 0,
                current_next_indicator: true,
            }
        };

        let data_start = if section_syntax_indicator { 8 } else { 3 };
        let data_end = total_length - 4;

        if data_end < data_start {
            return Err("No data in section");
        }

        let crc32 = u32::from_be_bytes([
            data[data_end],
            data[data_end + 1],
            data[data_end + 2],
            data[data_end + 3],
        ]);

        Ok(PsiSection {
            header,
            data: &data[data_start..data_end],
            crc32,
        })
    }

    /// Verify the CRC32 of the section against the raw bytes it was parsed from.
    pub fn verify_crc(&self, full_data: &[u8]) -> bool {
        let total_length = self.total_length();
        if full_data.len() < total_length {
            return false;
        }

        crc32_mpeg2(&full_data[..total_length - 4]) == self.crc32
    }

    /// Get the total section length including header and CRC.
    pub fn total_length(&self) -> usize {
        3 + self.header.section_length as usize
    }
}

/// Calculate CRC32 for MPEG-2 (polynomial 0x04C11DB7).
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    static CRC_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if crc & 0x80000000 != 0 {
                    crc = (crc << 1) ^ 0x04C11DB7;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFFFFFFu32;
    for &byte in data {
        let index = ((crc >> 24) ^ byte as u32) as usize;
        crc = (crc << 8) ^ CRC_TABLE[index];
    }
    crc
}

/// Build a complete long-form section (header, body, CRC) for the given table.
///
/// Used by tests and by tooling that synthesises program tables.
pub fn build_section(table_id: u8, table_id_extension: u16, version: u8, body: &[u8]) -> Vec<u8> {
    let section_length = (5 + body.len() + 4) as u16;
    let mut out = Vec::with_capacity(3 + section_length as usize);
    out.push(table_id);
    out.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
    out.push(section_length as u8);
    out.extend_from_slice(&table_id_extension.to_be_bytes());
    out.push(0xC1 | ((version & 0x1F) << 1));
    out.push(0x00);
    out.push(0x00);
    out.extend_from_slice(body);
    let crc = crc32_mpeg2(&out);
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32_mpeg2(&[]), 0xFFFFFFFF);
    }

    #[test]
    fn test_crc32_known_pat() {
        // PAT with one program (1 -> PID 0x1000), as emitted by common muxers.
        let section = [
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xF0, 0x00,
        ];
        assert_eq!(crc32_mpeg2(&section), 0x2AB104B2);
    }

    #[test]
    fn test_build_and_parse_section() {
        let body = [0x00, 0x01, 0xE1, 0x00];
        let raw = build_section(0x00, 0x1234, 3, &body);

        let section = PsiSection::parse(&raw).unwrap();
        assert_eq!(section.header.table_id, 0x00);
        assert_eq!(section.header.table_id_extension, 0x1234);
        assert_eq!(section.header.version_number, 3);
        assert_eq!(section.data, &body);
        assert!(section.verify_crc(&raw));
    }

    #[test]
    fn test_corrupt_crc_detected() {
        let mut raw = build_section(0x02, 1, 0, &[0xE1, 0x00, 0xF0, 0x00]);
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;

        let section = PsiSection::parse(&raw).unwrap();
        assert!(!section.verify_crc(&raw));
    }

    #[test]
    fn test_incomplete_section() {
        let raw = build_section(0x00, 1, 0, &[0x00, 0x01, 0xE1, 0x00]);
        assert!(PsiSection::parse(&raw[..raw.len() - 2]).is_err());
    }
}
