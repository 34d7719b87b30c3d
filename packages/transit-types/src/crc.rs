//! CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final xor.

use crate::CHECKSUM_OFFSET;

pub const CRC_POLY: u16 = 0x1021;
pub const CRC_INIT: u16 = 0xFFFF;

pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
    crc16_update(CRC_INIT, data.iter().copied())
}

/// Checksum of a whole frame with the 2-byte checksum field read as zero.
/// Frames shorter than the header are hashed as-is.
pub fn frame_checksum(frame: &[u8]) -> u16 {
    let zeroed = CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2;
    crc16_update(
        CRC_INIT,
        frame
            .iter()
            .enumerate()
            .map(|(i, &b)| if zeroed.contains(&i) { 0 } else { b }),
    )
}

fn crc16_update(init: u16, bytes: impl Iterator<Item = u8>) -> u16 {
    bytes.fold(init, |mut crc, byte| {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
        }
        crc
    })
}
