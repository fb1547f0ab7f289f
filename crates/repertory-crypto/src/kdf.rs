//! Key derivation (spec §4.2 "Key derivation").
//!
//! Two variants exist for backward compatibility: `Legacy` hashes the
//! passphrase directly with Blake2b-256 (no salt, so the same passphrase
//! always derives the same key — required for files encrypted before the
//! KDF header existed), and `Argon2id` derives a salted, memory-hard key and
//! persists a small header (variant tag + salt) alongside the ciphertext so
//! the salt can be recovered on read. Legacy is the default for new files
//! unless the caller opts into the KDF variant, preserving compatibility
//! with existing encrypted directories.

use argon2::Argon2;
use blake2::{digest::consts::U32, Blake2b, Digest};
use rand::RngCore;
use repertory_common::{ApiError, Result};

use crate::chunk::ChunkKey;

/// On-disk tag distinguishing the two key-derivation schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KdfVariant {
    Legacy,
    Argon2id,
}

/// Salt length used by the `Argon2id` header.
pub const SALT_SIZE: usize = 16;

/// Serialized form of [`KdfHeader`]: 1 tag byte + 16 salt bytes.
pub const KDF_HEADER_SIZE: usize = 1 + SALT_SIZE;

/// Prefixed before a `KdfVariant::Argon2id`-encrypted file's chunk stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfHeader {
    pub salt: [u8; SALT_SIZE],
}

impl KdfHeader {
    #[must_use]
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        Self { salt }
    }

    #[must_use]
    pub const fn size() -> usize {
        KDF_HEADER_SIZE
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; KDF_HEADER_SIZE] {
        let mut out = [0u8; KDF_HEADER_SIZE];
        out[0] = 1; // tag: argon2id
        out[1..].copy_from_slice(&self.salt);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < KDF_HEADER_SIZE {
            return Err(ApiError::Error("kdf header truncated".to_string()));
        }
        if bytes[0] != 1 {
            return Err(ApiError::Error("unknown kdf header tag".to_string()));
        }
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[1..KDF_HEADER_SIZE]);
        Ok(Self { salt })
    }
}

/// Blake2b with a 32-byte (256-bit) digest, matching the legacy scheme.
type Blake2b256 = Blake2b<U32>;

/// Derives a 32-byte chunk key from `password` directly (no salt).
#[must_use]
pub fn derive_legacy_key(password: &str) -> ChunkKey {
    let mut hasher = Blake2b256::new();
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    key
}

/// Derives a 32-byte chunk key from `password` and `header.salt` via Argon2id.
pub fn derive_argon2_key(password: &str, header: KdfHeader) -> Result<ChunkKey> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), &header.salt, &mut key)
        .map_err(|e| ApiError::Error(format!("argon2 key derivation failed: {e}")))?;
    Ok(key)
}

/// Derives the chunk key for either variant, generating a fresh header when
/// `Argon2id` is requested and none was supplied (new-file path).
pub fn derive_key(
    password: &str,
    variant: KdfVariant,
    header: Option<KdfHeader>,
) -> Result<(ChunkKey, Option<KdfHeader>)> {
    match variant {
        KdfVariant::Legacy => Ok((derive_legacy_key(password), None)),
        KdfVariant::Argon2id => {
            let header = header.unwrap_or_else(KdfHeader::generate);
            let key = derive_argon2_key(password, header)?;
            Ok((key, Some(header)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_key_is_deterministic() {
        let a = derive_legacy_key("hunter2");
        let b = derive_legacy_key("hunter2");
        assert_eq!(a, b);
    }

    #[test]
    fn legacy_key_differs_per_password() {
        assert_ne!(derive_legacy_key("a"), derive_legacy_key("b"));
    }

    #[test]
    fn argon2_key_depends_on_salt() {
        let header_a = KdfHeader::generate();
        let header_b = KdfHeader::generate();
        let key_a = derive_argon2_key("hunter2", header_a).unwrap();
        let key_b = derive_argon2_key("hunter2", header_b).unwrap();
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn kdf_header_round_trips() {
        let header = KdfHeader::generate();
        let bytes = header.to_bytes();
        let decoded = KdfHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, decoded);
    }
}
