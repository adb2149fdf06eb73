//! CRC-16/MODBUS
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF. The checksum
//! travels low byte first on the wire.

use crc::{Crc, CRC_16_MODBUS};

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the MODBUS CRC16 of `data`
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Wire representation of a checksum (low byte first)
pub fn crc_bytes(crc: u16) -> [u8; 2] {
    crc.to_le_bytes()
}

/// Reassemble the checksum carried by the last two bytes of a frame.
///
/// The byte before last is the low byte; the last byte is the high byte.
/// Returns `None` when the frame is shorter than two bytes.
pub fn trailing_crc(frame: &[u8]) -> Option<u16> {
    match frame {
        [.., lo, hi] => Some((u16::from(*hi) << 8) | u16::from(*lo)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-by-bit reference used to cross-check the table driven crate
    fn crc16_bitwise(data: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;
        for &byte in data {
            crc ^= u16::from(byte);
            for _ in 0..8 {
                if crc & 0x0001 != 0 {
                    crc = (crc >> 1) ^ 0xA001;
                } else {
                    crc >>= 1;
                }
            }
        }
        crc
    }

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_known_request_vector() {
        // Read 10 holding registers from slave 1, on the wire as C5 CD
        let crc = crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(crc, 0xCDC5);
        assert_eq!(crc_bytes(crc), [0xC5, 0xCD]);
    }

    #[test]
    fn test_empty_input_is_initial_value() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_matches_bitwise_reference() {
        let samples: [&[u8]; 4] = [
            &[0x11, 0x10, 0x00, 0x64, 0x00, 0x02],
            &[0x11, 0x03, 0x04, 0x00, 0xAA, 0x00, 0xBB],
            &[0xFF; 64],
            &[0x00, 0x01, 0x80, 0x7F, 0xFE],
        ];
        for data in samples {
            assert_eq!(crc16(data), crc16_bitwise(data));
        }
    }

    #[test]
    fn test_trailing_crc_order() {
        assert_eq!(trailing_crc(&[0x11, 0x10, 0x02, 0x87]), Some(0x8702));
        assert_eq!(trailing_crc(&[0x42]), None);
    }
}
