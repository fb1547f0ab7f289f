//! Per-chunk AEAD framing (spec §4.2).
//!
//! Each chunk on the wire is `iv(24) || mac(16) || ciphertext`. The
//! associated data fed to the AEAD is the big-endian `u32` of that whole
//! on-wire size, binding the chunk's length into the authentication tag so a
//! truncated or extended chunk fails to decrypt rather than silently
//! returning short data.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use repertory_common::{ApiError, Result};

/// Plaintext bytes per chunk before encryption (spec §4.2).
pub const DATA_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// `XChaCha20-Poly1305` nonce (24) + tag (16).
pub const HEADER_SIZE: usize = 24 + 16;

/// Size of one chunk once encrypted.
pub const ENCRYPTED_CHUNK_SIZE: usize = DATA_CHUNK_SIZE + HEADER_SIZE;

/// 32-byte symmetric key derived by [`crate::kdf`].
pub type ChunkKey = [u8; 32];

fn cipher(key: &ChunkKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(key.into())
}

/// Encrypts one chunk, returning `iv || mac || ciphertext`. `plaintext` must
/// be at most [`DATA_CHUNK_SIZE`] bytes; the last chunk of a file is
/// typically shorter.
pub fn encrypt_chunk(key: &ChunkKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut iv);
    encrypt_chunk_with_iv(key, &iv, plaintext)
}

/// Same as [`encrypt_chunk`] but with a caller-supplied IV, used when
/// re-encrypting a chunk whose IV was persisted from a prior upload attempt.
pub fn encrypt_chunk_with_iv(key: &ChunkKey, iv: &[u8; 24], plaintext: &[u8]) -> Result<Vec<u8>> {
    let total_size = (plaintext.len() + HEADER_SIZE) as u32;
    let aad = total_size.to_be_bytes();

    let aead = cipher(key);
    let nonce = XNonce::from_slice(iv);
    let ciphertext = aead
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| ApiError::Error("chunk encryption failed".to_string()))?;

    // `aead::encrypt` appends the 16-byte tag to the ciphertext already; the
    // wire layout keeps the tag immediately after the nonce instead, so split
    // it back out.
    let (body, mac) = ciphertext.split_at(ciphertext.len() - 16);

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(mac);
    out.extend_from_slice(body);
    Ok(out)
}

/// Decrypts one on-wire chunk (`iv || mac || ciphertext`) back to plaintext.
pub fn decrypt_chunk(key: &ChunkKey, encrypted: &[u8]) -> Result<Vec<u8>> {
    if encrypted.len() <= HEADER_SIZE {
        return Err(ApiError::Error("encrypted chunk too short".to_string()));
    }

    let total_size = (encrypted.len() as u32).to_be_bytes();
    let iv = &encrypted[..24];
    let mac = &encrypted[24..HEADER_SIZE];
    let body = &encrypted[HEADER_SIZE..];

    // Reassemble into the `ciphertext || tag` shape `RustCrypto`'s AEAD trait expects.
    let mut combined = Vec::with_capacity(body.len() + mac.len());
    combined.extend_from_slice(body);
    combined.extend_from_slice(mac);

    let aead = cipher(key);
    let nonce = XNonce::from_slice(iv);
    aead.decrypt(
        nonce,
        Payload {
            msg: &combined,
            aad: &total_size,
        },
    )
    .map_err(|_| ApiError::Error("chunk decryption failed (bad key or corrupt data)".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key: ChunkKey = [7u8; 32];
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        let encrypted = encrypt_chunk(&key, plaintext).unwrap();
        assert_eq!(encrypted.len(), plaintext.len() + HEADER_SIZE);
        let decrypted = decrypt_chunk(&key, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let key: ChunkKey = [1u8; 32];
        let other: ChunkKey = [2u8; 32];
        let encrypted = encrypt_chunk(&key, b"secret").unwrap();
        assert!(decrypt_chunk(&other, &encrypted).is_err());
    }

    #[test]
    fn truncated_chunk_fails_rather_than_returning_short_data() {
        let key: ChunkKey = [3u8; 32];
        let mut encrypted = encrypt_chunk(&key, b"0123456789").unwrap();
        encrypted.truncate(encrypted.len() - 1);
        assert!(decrypt_chunk(&key, &encrypted).is_err());
    }

    #[test]
    fn deterministic_iv_reproduces_same_ciphertext() {
        let key: ChunkKey = [9u8; 32];
        let iv = [5u8; 24];
        let a = encrypt_chunk_with_iv(&key, &iv, b"payload").unwrap();
        let b = encrypt_chunk_with_iv(&key, &iv, b"payload").unwrap();
        assert_eq!(a, b);
    }
}
