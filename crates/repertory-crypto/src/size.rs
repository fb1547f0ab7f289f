//! Exact size mapping between plaintext and on-wire encrypted sizes
//! (spec §4.2 "Size mapping"), grounded on
//! `encrypting_reader::calculate_encrypted_size`/`calculate_decrypted_size`.

use crate::chunk::{DATA_CHUNK_SIZE, HEADER_SIZE};
use crate::kdf::KdfHeader;

fn divide_with_ceiling(value: u64, divisor: u64) -> u64 {
    value.div_ceil(divisor)
}

/// Plaintext size of a file stored as `size` encrypted bytes.
#[must_use]
pub fn decrypted_size(mut encrypted_size: u64, uses_kdf: bool) -> u64 {
    if uses_kdf {
        encrypted_size = encrypted_size.saturating_sub(KdfHeader::size() as u64);
    }
    let total_chunks = divide_with_ceiling(encrypted_size, crate::chunk::ENCRYPTED_CHUNK_SIZE as u64);
    encrypted_size - total_chunks * HEADER_SIZE as u64
}

/// On-wire encrypted size of a file whose plaintext is `size` bytes.
#[must_use]
pub fn encrypted_size(size: u64, uses_kdf: bool) -> u64 {
    let total_chunks = divide_with_ceiling(size, DATA_CHUNK_SIZE as u64);
    size + total_chunks * HEADER_SIZE as u64 + if uses_kdf { KdfHeader::size() as u64 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_has_no_chunks() {
        assert_eq!(encrypted_size(0, false), 0);
        assert_eq!(decrypted_size(0, false), 0);
    }

    #[test]
    fn exact_chunk_boundary() {
        let plain = DATA_CHUNK_SIZE as u64 * 3;
        let enc = encrypted_size(plain, false);
        assert_eq!(enc, plain + 3 * HEADER_SIZE as u64);
        assert_eq!(decrypted_size(enc, false), plain);
    }

    #[test]
    fn partial_last_chunk() {
        let plain = DATA_CHUNK_SIZE as u64 * 2 + 100;
        let enc = encrypted_size(plain, false);
        assert_eq!(enc, plain + 3 * HEADER_SIZE as u64);
        assert_eq!(decrypted_size(enc, false), plain);
    }

    #[test]
    fn kdf_header_adds_fixed_overhead() {
        let plain = 1_000_000u64;
        let without = encrypted_size(plain, false);
        let with = encrypted_size(plain, true);
        assert_eq!(with, without + KdfHeader::size() as u64);
        assert_eq!(decrypted_size(with, true), plain);
    }
}
