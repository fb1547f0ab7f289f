//! Encrypted path-segment naming (spec §3 "Encrypted-name/path").
//!
//! Every path segment is independently encrypted with the data key, then
//! text-encoded so it survives as a single filesystem/object-key component.
//! Legacy files use hex (matching the on-disk/bucket layout already in use);
//! the Argon2id variant uses URL-safe base64 to keep encoded names shorter.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use repertory_common::{ApiError, Result};

use crate::chunk::ChunkKey;
use crate::kdf::KdfVariant;

const NAME_HEADER_SIZE: usize = 24 + 16;

fn encrypt_segment(key: &ChunkKey, segment: &str) -> Result<Vec<u8>> {
    crate::chunk::encrypt_chunk(key, segment.as_bytes())
}

fn decrypt_segment(key: &ChunkKey, encrypted: &[u8]) -> Result<String> {
    let bytes = crate::chunk::decrypt_chunk(key, encrypted)?;
    String::from_utf8(bytes).map_err(|_| ApiError::Error("decrypted name is not UTF-8".to_string()))
}

/// Encrypts and text-encodes a single path segment.
pub fn encrypt_name(key: &ChunkKey, variant: KdfVariant, segment: &str) -> Result<String> {
    let encrypted = encrypt_segment(key, segment)?;
    Ok(match variant {
        KdfVariant::Legacy => hex::encode(encrypted),
        KdfVariant::Argon2id => URL_SAFE_NO_PAD.encode(encrypted),
    })
}

/// Inverse of [`encrypt_name`].
pub fn decrypt_name(key: &ChunkKey, variant: KdfVariant, encoded: &str) -> Result<String> {
    let encrypted = match variant {
        KdfVariant::Legacy => {
            hex::decode(encoded).map_err(|_| ApiError::Error("invalid hex name".to_string()))?
        }
        KdfVariant::Argon2id => URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| ApiError::Error("invalid base64 name".to_string()))?,
    };
    if encrypted.len() <= NAME_HEADER_SIZE {
        return Err(ApiError::Error("encrypted name too short".to_string()));
    }
    decrypt_segment(key, &encrypted)
}

/// Encrypts a full `/`-separated api-path, one segment at a time, and joins
/// the encoded segments back with `/`. This is the value persisted in
/// `META_KEY` (spec §3).
pub fn encrypt_path(key: &ChunkKey, variant: KdfVariant, api_path: &str) -> Result<String> {
    api_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| encrypt_name(key, variant, segment))
        .collect::<Result<Vec<_>>>()
        .map(|segments| segments.join("/"))
}

/// Inverse of [`encrypt_path`]: decrypts a full `/`-separated encoded path
/// one segment at a time.
pub fn decrypt_path(key: &ChunkKey, variant: KdfVariant, encoded_path: &str) -> Result<String> {
    encoded_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| decrypt_name(key, variant, segment))
        .collect::<Result<Vec<_>>>()
        .map(|segments| segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_name_round_trips() {
        let key: ChunkKey = [4u8; 32];
        let encoded = encrypt_name(&key, KdfVariant::Legacy, "my-file.txt").unwrap();
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        let decoded = decrypt_name(&key, KdfVariant::Legacy, &encoded).unwrap();
        assert_eq!(decoded, "my-file.txt");
    }

    #[test]
    fn argon2_name_round_trips_with_base64() {
        let key: ChunkKey = [8u8; 32];
        let encoded = encrypt_name(&key, KdfVariant::Argon2id, "my-file.txt").unwrap();
        let decoded = decrypt_name(&key, KdfVariant::Argon2id, &encoded).unwrap();
        assert_eq!(decoded, "my-file.txt");
    }

    #[test]
    fn path_encrypts_each_segment_independently() {
        let key: ChunkKey = [2u8; 32];
        let encrypted = encrypt_path(&key, KdfVariant::Legacy, "/a/b/c.txt").unwrap();
        assert_eq!(encrypted.split('/').count(), 3);
    }

    #[test]
    fn path_round_trips() {
        let key: ChunkKey = [6u8; 32];
        let encrypted = encrypt_path(&key, KdfVariant::Legacy, "/a/b/c.txt").unwrap();
        let decrypted = decrypt_path(&key, KdfVariant::Legacy, &encrypted).unwrap();
        assert_eq!(decrypted, "a/b/c.txt");
    }
}
