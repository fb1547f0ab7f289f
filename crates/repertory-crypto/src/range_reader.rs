//! Random-access decrypted range reads (spec §4.2 "Range reader").
//!
//! Callers supply a [`ChunkSource`] that fetches a byte range of *ciphertext*
//! (e.g. an HTTP ranged GET through `repertory-net`, or a local file read for
//! the encrypt provider). The reader keeps at most two adjacent decrypted
//! chunks cached, matching the spec's "at most two cached ciphertext
//! chunks" invariant for C3.

use repertory_common::{ApiError, ByteRange, Result};

use crate::chunk::{decrypt_chunk, ChunkKey, DATA_CHUNK_SIZE, ENCRYPTED_CHUNK_SIZE};

/// Fetches a ciphertext byte range `[begin, end]` (inclusive) from the
/// backing store. Implemented per-provider (S3 ranged GET, Sia ranged GET,
/// local file read for the encrypt provider).
pub trait ChunkSource {
    fn fetch(&mut self, range: ByteRange) -> Result<Vec<u8>>;
}

struct CachedChunk {
    index: u64,
    plaintext: Vec<u8>,
}

/// Decrypts an arbitrary plaintext byte range by fetching only the ciphertext
/// chunks that overlap it.
pub struct EncryptedRangeReader<S: ChunkSource> {
    source: S,
    key: ChunkKey,
    total_encrypted_size: u64,
    cache: Vec<CachedChunk>,
}

impl<S: ChunkSource> EncryptedRangeReader<S> {
    #[must_use]
    pub const fn new(source: S, key: ChunkKey, total_encrypted_size: u64) -> Self {
        Self {
            source,
            key,
            total_encrypted_size,
            cache: Vec::new(),
        }
    }

    fn load_chunk(&mut self, index: u64) -> Result<&[u8]> {
        if let Some(pos) = self.cache.iter().position(|c| c.index == index) {
            // Move the hit to the back so eviction below drops the LRU entry.
            let chunk = self.cache.remove(pos);
            self.cache.push(chunk);
        } else {
            let begin = index * ENCRYPTED_CHUNK_SIZE as u64;
            let end = (begin + ENCRYPTED_CHUNK_SIZE as u64 - 1).min(self.total_encrypted_size - 1);
            let encrypted = self.source.fetch(ByteRange::new(begin, end))?;
            let plaintext = decrypt_chunk(&self.key, &encrypted)?;
            self.cache.push(CachedChunk { index, plaintext });
            while self.cache.len() > 2 {
                self.cache.remove(0);
            }
        }
        Ok(&self.cache.last().expect("just inserted").plaintext)
    }

    /// Fills `out` with up to `out.len()` decrypted bytes starting at
    /// plaintext offset `pos`, returning the number of bytes written.
    pub fn read(&mut self, out: &mut [u8], pos: u64) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut written = 0usize;
        let mut offset = pos;
        let end = pos + out.len() as u64;

        while offset < end {
            let chunk_index = offset / DATA_CHUNK_SIZE as u64;
            let chunk_offset = (offset % DATA_CHUNK_SIZE as u64) as usize;
            let plaintext = self.load_chunk(chunk_index)?;

            if chunk_offset >= plaintext.len() {
                break; // past end of file
            }

            let available = plaintext.len() - chunk_offset;
            let want = (end - offset) as usize;
            let take = available.min(want);
            if take == 0 {
                break;
            }

            out[written..written + take].copy_from_slice(&plaintext[chunk_offset..chunk_offset + take]);

            written += take;
            offset += take as u64;
        }

        if written == 0 && !out.is_empty() && pos == 0 {
            return Err(ApiError::Error("empty read range".to_string()));
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::encrypt_chunk;

    struct FakeSource {
        encrypted: Vec<u8>,
    }

    impl ChunkSource for FakeSource {
        fn fetch(&mut self, range: ByteRange) -> Result<Vec<u8>> {
            let begin = range.begin as usize;
            let end = (range.end as usize + 1).min(self.encrypted.len());
            Ok(self.encrypted[begin..end].to_vec())
        }
    }

    fn build(key: &ChunkKey, plaintext: &[u8]) -> FakeSource {
        let mut encrypted = Vec::new();
        for chunk in plaintext.chunks(DATA_CHUNK_SIZE) {
            encrypted.extend(encrypt_chunk(key, chunk).unwrap());
        }
        FakeSource { encrypted }
    }

    #[test]
    fn reads_full_small_file() {
        let key: ChunkKey = [1u8; 32];
        let plaintext = b"hello, encrypted world!".to_vec();
        let source = build(&key, &plaintext);
        let total = source.encrypted.len() as u64;
        let mut reader = EncryptedRangeReader::new(source, key, total);

        let mut out = vec![0u8; plaintext.len()];
        let n = reader.read(&mut out, 0).unwrap();
        assert_eq!(n, plaintext.len());
        assert_eq!(out, plaintext);
    }

    #[test]
    fn reads_partial_range_mid_file() {
        let key: ChunkKey = [2u8; 32];
        let plaintext: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
        let source = build(&key, &plaintext);
        let total = source.encrypted.len() as u64;
        let mut reader = EncryptedRangeReader::new(source, key, total);

        let mut out = vec![0u8; 50];
        let n = reader.read(&mut out, 100).unwrap();
        assert_eq!(n, 50);
        assert_eq!(out, plaintext[100..150]);
    }
}
