//! Whole-envelope AEAD wrapping (spec §4.9's `decrypt`/`encrypt` on a full
//! message), reusing the chunk AEAD framing from [`repertory_crypto`] even
//! though an RPC message isn't split into fixed-size chunks.

use repertory_common::Result;
use repertory_crypto::chunk::ChunkKey;
use repertory_crypto::kdf::derive_legacy_key;

/// Derives the shared symmetric key from the RPC token, matching the
/// original's plain (unsalted) `encrypt_data(token, ...)` scheme — RPC
/// messages predate the per-file KDF header and don't carry one.
#[must_use]
pub fn derive_rpc_key(token: &str) -> ChunkKey {
    derive_legacy_key(token)
}

pub fn encrypt_envelope(key: &ChunkKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    repertory_crypto::chunk::encrypt_chunk(key, plaintext)
}

pub fn decrypt_envelope(key: &ChunkKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    repertory_crypto::chunk::decrypt_chunk(key, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let key = derive_rpc_key("shared-secret");
        let plaintext = b"hello rpc".to_vec();
        let ciphertext = encrypt_envelope(&key, &plaintext).unwrap();
        let decrypted = decrypt_envelope(&key, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = derive_rpc_key("token-a");
        let key_b = derive_rpc_key("token-b");
        let ciphertext = encrypt_envelope(&key_a, b"payload").unwrap();
        assert!(decrypt_envelope(&key_b, &ciphertext).is_err());
    }
}
