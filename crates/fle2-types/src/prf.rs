//! Keyed pseudo-random function (HMAC-SHA-256).
//!
//! Integer inputs are encoded as 8 little-endian bytes. The two-integer form
//! feeds both encodings into one MAC, so `prf2(k, a, b)` differs from any
//! single-integer `prf_u64` output.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::PrfBlock;

type HmacSha256 = Hmac<Sha256>;

fn keyed(key: &[u8]) -> HmacSha256 {
    match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        // HMAC pads or hashes keys of any length.
        Err(_) => unreachable!("HMAC-SHA-256 accepts keys of any length"),
    }
}

fn finish(mac: HmacSha256) -> PrfBlock {
    mac.finalize().into_bytes().into()
}

/// `HMAC(key, data)`.
#[must_use]
pub fn prf(key: &[u8], data: &[u8]) -> PrfBlock {
    let mut mac = keyed(key);
    mac.update(data);
    finish(mac)
}

/// `HMAC(key, le64(value))`.
#[must_use]
pub fn prf_u64(key: &[u8], value: u64) -> PrfBlock {
    prf(key, &value.to_le_bytes())
}

/// `HMAC(key, le64(first) || le64(second))`.
#[must_use]
pub fn prf2(key: &[u8], first: u64, second: u64) -> PrfBlock {
    let mut mac = keyed(key);
    mac.update(&first.to_le_bytes());
    mac.update(&second.to_le_bytes());
    finish(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2.
    #[test]
    fn test_prf_matches_rfc4231_vector() {
        let out = prf(b"Jefe", b"what do ya want for nothing?");
        let expected: [u8; 32] = [
            0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95,
            0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9,
            0x64, 0xec, 0x38, 0x43,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_prf_u64_is_little_endian_encoding() {
        let key = [7_u8; 32];
        assert_eq!(prf_u64(&key, 0x0102), prf(&key, &[0x02, 0x01, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn test_prf2_concatenates_both_values() {
        let key = [9_u8; 32];
        let mut buf = Vec::new();
        buf.extend_from_slice(&1_u64.to_le_bytes());
        buf.extend_from_slice(&5_u64.to_le_bytes());
        assert_eq!(prf2(&key, 1, 5), prf(&key, &buf));
        assert_ne!(prf2(&key, 1, 5), prf2(&key, 5, 1));
    }

    #[test]
    fn test_prf_accepts_long_keys() {
        let key = [3_u8; 96];
        assert_ne!(prf_u64(&key, 1), prf_u64(&key[..32], 1));
    }
}
