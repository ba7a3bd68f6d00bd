//! PAT (Program Association Table) parsing.
//!
//! The PAT is transmitted on PID 0x0000 and lists the PMT PID of every
//! program in the stream.

use super::psi::PsiSection;
use super::table_id;

/// A single PAT entry (program number and PMT PID).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    /// Program number (never 0, that entry is the NIT).
    pub program_number: u16,
    /// PID of the PMT for this program.
    pub pid: u16,
}

/// Parsed PAT (Program Association Table).
#[derive(Debug, Clone, Default)]
pub struct PatTable {
    /// Version number.
    pub version_number: u8,
    /// List of programs.
    pub programs: Vec<PatEntry>,
}

impl PatTable {
    /// Parse a PAT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::PAT {
            return Err("Not a PAT section");
        }

        let data = section.data;
        if data.len() % 4 != 0 {
            return Err("Invalid PAT data length");
        }

        let mut pat = PatTable {
            version_number: section.header.version_number,
            programs: Vec::with_capacity(data.len() / 4),
        };

        for chunk in data.chunks_exact(4) {
            let program_number = u16::from_be_bytes([chunk[0], chunk[1]]);
            let pid = ((chunk[2] as u16 & 0x1F) << 8) | chunk[3] as u16;

            // program 0 points at the NIT
            if program_number != 0 {
                pat.programs.push(PatEntry {
                    program_number,
                    pid,
                });
            }
        }

        Ok(pat)
    }

    /// Get all PMT PIDs.
    pub fn pmt_pids(&self) -> impl Iterator<Item = u16> + '_ {
        self.programs.iter().map(|p| p.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::psi::build_section;

    #[test]
    fn test_parse_pat() {
        let raw = build_section(
            table_id::PAT,
            0x1234,
            1,
            &[
                // Program 1: number=0x0101, PID=0x0100
                0x01, 0x01, 0xE1, 0x00,
                // Program 2: number=0x0102, PID=0x0200
                0x01, 0x02, 0xE2, 0x00,
            ],
        );
        let section = PsiSection::parse(&raw).unwrap();

        let pat = PatTable::parse(&section).unwrap();

        assert_eq!(pat.version_number, 1);
        assert_eq!(pat.programs.len(), 2);
        assert_eq!(pat.programs[0].program_number, 0x0101);
        assert_eq!(pat.programs[0].pid, 0x0100);
        assert_eq!(pat.pmt_pids().collect::<Vec<_>>(), vec![0x0100, 0x0200]);
    }

    #[test]
    fn test_pat_with_nit_only() {
        let raw = build_section(table_id::PAT, 1, 0, &[0x00, 0x00, 0xE0, 0x10]);
        let section = PsiSection::parse(&raw).unwrap();

        let pat = PatTable::parse(&section).unwrap();

        assert!(pat.programs.is_empty());
    }

    #[test]
    fn test_rejects_other_table() {
        let raw = build_section(table_id::PMT, 1, 0, &[0x00, 0x01, 0xE1, 0x00]);
        let section = PsiSection::parse(&raw).unwrap();
        assert!(PatTable::parse(&section).is_err());
    }
}
