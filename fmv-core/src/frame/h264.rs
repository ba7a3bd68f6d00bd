use super::{start_codes, FrameType};

/// NAL unit type of a coded slice of an IDR picture.
const NAL_IDR_SLICE: u8 = 5;

/// An access unit is IDR when any of its NAL units is an IDR slice.
pub(super) fn classify(payload: &[u8]) -> FrameType {
    let is_idr = start_codes(payload)
        .filter_map(|offset| payload.get(offset))
        .any(|&nal_header| nal_header & 0x1F == NAL_IDR_SLICE);

    if is_idr {
        FrameType::Idr
    } else {
        FrameType::NonIdr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idr_after_sps_pps() {
        let payload = [
            0x00, 0x00, 0x01, 0x67, 0x42, // SPS
            0x00, 0x00, 0x01, 0x68, 0xCE, // PPS
            0x00, 0x00, 0x01, 0x65, 0xB8, // IDR slice
        ];
        assert_eq!(classify(&payload), FrameType::Idr);
    }

    #[test]
    fn test_trailing_start_code_without_header() {
        assert_eq!(classify(&[0x41, 0x00, 0x00, 0x01]), FrameType::NonIdr);
        assert_eq!(classify(&[]), FrameType::NonIdr);
    }
}
