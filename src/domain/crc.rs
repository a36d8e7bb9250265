//! Sensirion CRC-8 checksum
//!
//! The SHT40 and SDP810 transmit data as 16-bit big-endian words, each
//! followed by a CRC byte: polynomial 0x31 (x^8 + x^5 + x^4 + 1),
//! initialization 0xFF, no reflection, no final XOR. The datasheet test
//! vector is CRC(0xBEEF) = 0x92.

const POLYNOMIAL: u8 = 0x31;
const INIT: u8 = 0xFF;

/// CRC-8 over an arbitrary byte slice.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = INIT;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Validate a `[msb, lsb, crc]` word as transmitted by Sensirion sensors,
/// returning the decoded word.
pub fn check_word(bytes: [u8; 3]) -> Option<u16> {
    if crc8(&bytes[..2]) == bytes[2] {
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    } else {
        None
    }
}

/// Append the CRC of `word` to `out` after the word itself.
///
/// Used when sending 16-bit command arguments that the sensor checks.
pub fn append_crc(out: &mut Vec<u8>, word: u16) {
    let be = word.to_be_bytes();
    out.extend_from_slice(&be);
    out.push(crc8(&be));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datasheet_vector() {
        // SHT4x / SDP8xx datasheets, section "checksum calculation"
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn zero_word() {
        assert_eq!(crc8(&[0x00, 0x00]), 0x81);
    }

    #[test]
    fn check_word_accepts_valid() {
        assert_eq!(check_word([0xBE, 0xEF, 0x92]), Some(0xBEEF));
    }

    #[test]
    fn check_word_rejects_corrupt() {
        assert_eq!(check_word([0xBE, 0xEF, 0x93]), None);
        assert_eq!(check_word([0xBF, 0xEF, 0x92]), None);
    }

    #[test]
    fn append_crc_round_trips() {
        let mut buf = Vec::new();
        append_crc(&mut buf, 0xBEEF);
        assert_eq!(buf, vec![0xBE, 0xEF, 0x92]);
        assert_eq!(check_word([buf[0], buf[1], buf[2]]), Some(0xBEEF));
    }
}
