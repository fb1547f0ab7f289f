//! Repertory Crypto - the chunked streaming-encryption codec (spec §4.2, C3).
//!
//! Plaintext is split into fixed-size chunks, each independently encrypted
//! and authenticated with `XChaCha20-Poly1305`, so a requested byte range
//! only ever needs the ciphertext chunks it overlaps.

pub mod chunk;
pub mod encrypting_reader;
pub mod kdf;
pub mod names;
pub mod range_reader;
pub mod size;

pub use chunk::{decrypt_chunk, encrypt_chunk, ChunkKey, DATA_CHUNK_SIZE, ENCRYPTED_CHUNK_SIZE, HEADER_SIZE};
pub use encrypting_reader::EncryptingReader;
pub use kdf::{derive_key, KdfHeader, KdfVariant};
pub use names::{decrypt_name, decrypt_path, encrypt_name, encrypt_path};
pub use range_reader::{ChunkSource, EncryptedRangeReader};
pub use size::{decrypted_size, encrypted_size};
