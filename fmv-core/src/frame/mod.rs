//! Frame-type classification of compressed video access units.
//!
//! Only header markers are inspected: NAL unit types for H.264 and the
//! picture coding type for MPEG-2. No pixels are decoded.

mod bits;
mod h264;
mod mpeg2;

pub use bits::BitReader;

use crate::error::ClassifyError;
use crate::ts::{ElementaryUnit, PesHeader, StreamKind, VideoCodec};

/// Frame type attached to a completed frame in the packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Self-contained frame, a valid resynchronisation point.
    Idr,
    /// Frame that depends on others.
    NonIdr,
    /// Not a video frame, or the type could not be determined.
    Unknown,
}

/// Classify one reassembled PES unit.
///
/// Units from non-video streams are [`FrameType::Unknown`].
pub fn classify(unit: &ElementaryUnit) -> Result<FrameType, ClassifyError> {
    let StreamKind::Video(codec) = unit.kind() else {
        return Ok(FrameType::Unknown);
    };

    let header = PesHeader::parse(&unit.data).map_err(ClassifyError::InvalidPes)?;
    let payload = header.payload(&unit.data);

    match codec {
        VideoCodec::H264 => Ok(h264::classify(payload)),
        VideoCodec::Mpeg2 => mpeg2::classify(payload),
    }
}

/// Iterate over the offsets just past each `00 00 01` start code prefix.
pub(crate) fn start_codes(data: &[u8]) -> impl Iterator<Item = usize> + '_ {
    data.windows(3)
        .enumerate()
        .filter(|(_, w)| w[0] == 0x00 && w[1] == 0x00 && w[2] == 0x01)
        .map(|(i, _)| i + 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::stream_type;
    use bytes::Bytes;

    fn pes(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x00, 0x00];
        out.extend_from_slice(payload);
        out
    }

    fn unit(stream_type: u8, data: Vec<u8>) -> ElementaryUnit {
        ElementaryUnit {
            pid: 0x100,
            stream_type,
            data: Bytes::from(data),
        }
    }

    #[test]
    fn test_start_codes() {
        let data = [0x00, 0x00, 0x01, 0x65, 0x00, 0x00, 0x00, 0x01, 0x41];
        assert_eq!(start_codes(&data).collect::<Vec<_>>(), vec![3, 8]);
    }

    #[test]
    fn test_h264_unit() {
        let idr = unit(
            stream_type::H264_VIDEO,
            pes(&[0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x01, 0x65, 0x88]),
        );
        assert_eq!(classify(&idr).unwrap(), FrameType::Idr);

        let non_idr = unit(
            stream_type::H264_VIDEO,
            pes(&[0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x01, 0x41, 0x9A]),
        );
        assert_eq!(classify(&non_idr).unwrap(), FrameType::NonIdr);
    }

    #[test]
    fn test_non_video_unit_is_unknown() {
        let klv = unit(stream_type::METADATA_PES, vec![0xFF]);
        assert_eq!(classify(&klv).unwrap(), FrameType::Unknown);
    }

    #[test]
    fn test_video_unit_without_pes_header() {
        let broken = unit(stream_type::MPEG2_VIDEO, vec![0x47, 0x00, 0x00, 0x00]);
        assert!(matches!(classify(&broken), Err(ClassifyError::InvalidPes(_))));
    }
}
