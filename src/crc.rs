//! CRC-16/DNP: table-driven, reflected, init 0, final value inverted.
//!
//! The link layer protects the 8-byte header and every payload block of up to
//! 16 bytes with this checksum; it is transmitted little-endian.

/// Polynomial 0x3D65, bit-reflected.
const POLY: u16 = 0xA6BC;

static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the DNP CRC of `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    let crc = bytes.iter().fold(0u16, |crc, &b| {
        (crc >> 8) ^ TABLE[((crc ^ b as u16) & 0xff) as usize]
    });
    !crc
}

/// Check `bytes` against a CRC stored little-endian in `stored`.
pub fn check(bytes: &[u8], stored: [u8; 2]) -> bool {
    crc16(bytes) == u16::from_le_bytes(stored)
}
