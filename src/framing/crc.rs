//! MAVLink checksum (CRC-16/MCRF4XX, a.k.a. X.25)

const CRC_INIT: u16 = 0xFFFF;

/// Fold one byte into a running checksum.
#[inline]
pub fn accumulate(byte: u8, crc: u16) -> u16 {
    let mut tmp = byte ^ (crc & 0xFF) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

/// Checksum of `bytes` without a CRC extra.
pub fn x25(bytes: &[u8]) -> u16 {
    bytes.iter().fold(CRC_INIT, |crc, &b| accumulate(b, crc))
}

/// Checksum of the frame bytes after the start marker, seeded with the
/// message's CRC extra as the final byte.
pub fn x25_checksum(bytes: &[u8], crc_extra: u8) -> u16 {
    accumulate(crc_extra, x25(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_check_value() {
        // CRC-16/MCRF4XX check value
        assert_eq!(x25(b"123456789"), 0x6F91);
    }

    #[test]
    fn crc_extra_changes_the_result() {
        let bytes = [9u8, 0, 0, 0, 1, 1, 0, 0, 0];
        assert_ne!(x25_checksum(&bytes, 50), x25_checksum(&bytes, 51));
        assert_eq!(x25_checksum(&bytes, 50), accumulate(50, x25(&bytes)));
    }

    #[test]
    fn empty_input_is_the_seed() {
        assert_eq!(x25(&[]), CRC_INIT);
    }
}
