//! Table-driven CRC32 engine.
//!
//! Standard reflected CRC32 (polynomial `0xEDB88320`, initial value and
//! final XOR `0xFFFFFFFF`). The 256-entry lookup table is built on first use
//! through [`OnceLock`], which makes initialization idempotent and race-free
//! no matter how many threads hit the codec concurrently.

use std::sync::OnceLock;

const POLYNOMIAL: u32 = 0xEDB8_8320;

static TABLE: OnceLock<[u32; 256]> = OnceLock::new();

fn table() -> &'static [u32; 256] {
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ POLYNOMIAL } else { crc >> 1 };
            }
            *entry = crc;
        }
        table
    })
}

/// Computes the CRC32 of `bytes`.
///
/// Deterministic and pure once the table is built.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    let table = table();
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc = (crc >> 8) ^ table[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    crc ^ 0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_check_value() {
        // The standard CRC-32 check value.
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input() {
        assert_eq!(checksum(b""), 0);
    }

    #[test]
    fn sensitive_to_any_byte() {
        let base = checksum(b"passive check result");
        assert_ne!(base, checksum(b"passive check resulT"));
        assert_ne!(base, checksum(b"Passive check result"));
    }
}
