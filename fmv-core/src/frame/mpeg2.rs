use log::trace;

use super::{start_codes, BitReader, FrameType};
use crate::error::ClassifyError;

/// Start code value of a picture header (`00 00 01 00`).
const PICTURE_START_CODE: u8 = 0x00;

/// Picture coding type of an MPEG-2 picture header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PictureType {
    Intra,
    Predicted,
    Bidirectional,
    Other(u32),
}

impl From<u32> for PictureType {
    fn from(value: u32) -> Self {
        match value {
            1 => PictureType::Intra,
            2 => PictureType::Predicted,
            3 => PictureType::Bidirectional,
            other => PictureType::Other(other),
        }
    }
}

/// An access unit is IDR when it holds pictures and all of them are intra coded.
pub(super) fn classify(payload: &[u8]) -> Result<FrameType, ClassifyError> {
    let mut pictures = 0usize;
    let mut all_intra = true;

    for offset in start_codes(payload) {
        if payload.get(offset) != Some(&PICTURE_START_CODE) {
            continue;
        }

        let mut reader = BitReader::new(&payload[offset + 1..]);
        reader
            .skip(10) // temporal_reference
            .ok_or(ClassifyError::TruncatedPicture(offset))?;
        let coding_type = reader
            .read(3)
            .map(PictureType::from)
            .ok_or(ClassifyError::TruncatedPicture(offset))?;

        trace!("MPEG-2 picture at {}: {:?}", offset, coding_type);
        pictures += 1;
        all_intra &= coding_type == PictureType::Intra;
    }

    if pictures > 0 && all_intra {
        Ok(FrameType::Idr)
    } else {
        Ok(FrameType::NonIdr)
    }
}
