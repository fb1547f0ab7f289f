//! Streaming upload-side encryption (spec §4.2 "Encrypting reader"),
//! grounded on `encrypting_reader.cpp`.
//!
//! Wraps a local plaintext file and presents it as an encrypted byte stream
//! to the HTTP transport's PUT path, re-encrypting a chunk the first time it
//! is touched and caching it (plus its neighbor) so overlapping reads from
//! retried uploads don't re-derive the ciphertext with a different IV.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use repertory_common::{ApiError, Result};

use crate::chunk::{encrypt_chunk, encrypt_chunk_with_iv, ChunkKey, DATA_CHUNK_SIZE, ENCRYPTED_CHUNK_SIZE};

struct CachedChunk {
    index: u64,
    encrypted: Vec<u8>,
}

/// Presents a plaintext source file as an encrypted byte stream without
/// buffering the whole file in memory.
pub struct EncryptingReader {
    file: File,
    key: ChunkKey,
    file_size: u64,
    total_encrypted_size: u64,
    /// Per-chunk IVs: persisted across retries so a re-read of an
    /// already-encrypted chunk reproduces identical ciphertext.
    iv_list: Vec<[u8; 24]>,
    cache: Vec<CachedChunk>,
    read_offset: u64,
}

impl EncryptingReader {
    pub fn new(source_path: &Path, key: ChunkKey) -> Result<Self> {
        let file = File::open(source_path).map_err(ApiError::Io)?;
        let file_size = file.metadata().map_err(ApiError::Io)?.len();
        Self::with_file(file, file_size, key, None)
    }

    /// Resumes an in-progress upload with the IV list captured from the
    /// first attempt, so retried chunks re-encrypt to the same ciphertext.
    pub fn resume(source_path: &Path, key: ChunkKey, iv_list: Vec<[u8; 24]>) -> Result<Self> {
        let file = File::open(source_path).map_err(ApiError::Io)?;
        let file_size = file.metadata().map_err(ApiError::Io)?.len();
        Self::with_file(file, file_size, key, Some(iv_list))
    }

    fn with_file(
        file: File,
        file_size: u64,
        key: ChunkKey,
        iv_list: Option<Vec<[u8; 24]>>,
    ) -> Result<Self> {
        let chunk_count = file_size.div_ceil(DATA_CHUNK_SIZE as u64) as usize;
        let iv_list = iv_list.unwrap_or_else(|| vec![[0u8; 24]; chunk_count]);
        let total_encrypted_size = crate::size::encrypted_size(file_size, false);
        Ok(Self {
            file,
            key,
            file_size,
            total_encrypted_size,
            iv_list,
            cache: Vec::new(),
            read_offset: 0,
        })
    }

    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.total_encrypted_size
    }

    #[must_use]
    pub fn iv_list(&self) -> &[[u8; 24]] {
        &self.iv_list
    }

    fn encrypted_chunk(&mut self, index: u64) -> Result<&[u8]> {
        if let Some(pos) = self.cache.iter().position(|c| c.index == index) {
            let chunk = self.cache.remove(pos);
            self.cache.push(chunk);
        } else {
            let plain_begin = index * DATA_CHUNK_SIZE as u64;
            let plain_len = (self.file_size - plain_begin).min(DATA_CHUNK_SIZE as u64) as usize;

            let mut buf = vec![0u8; plain_len];
            self.file
                .seek(SeekFrom::Start(plain_begin))
                .map_err(ApiError::Io)?;
            self.file.read_exact(&mut buf).map_err(ApiError::Io)?;

            let iv_is_fresh = self.iv_list[index as usize] == [0u8; 24];
            let encrypted = if iv_is_fresh {
                let encrypted = encrypt_chunk(&self.key, &buf)?;
                self.iv_list[index as usize].copy_from_slice(&encrypted[..24]);
                encrypted
            } else {
                encrypt_chunk_with_iv(&self.key, &self.iv_list[index as usize], &buf)?
            };

            self.cache.push(CachedChunk { index, encrypted });
            while self.cache.len() > 2 {
                self.cache.remove(0);
            }
        }
        Ok(&self.cache.last().expect("just inserted").encrypted)
    }

    /// Positioned read used as the HTTP client's upload read callback.
    pub fn read_at(&mut self, out: &mut [u8], pos: u64) -> Result<usize> {
        if pos >= self.total_encrypted_size || out.is_empty() {
            return Ok(0);
        }

        let chunk_index = pos / ENCRYPTED_CHUNK_SIZE as u64;
        let chunk_offset = (pos % ENCRYPTED_CHUNK_SIZE as u64) as usize;
        let encrypted = self.encrypted_chunk(chunk_index)?;

        if chunk_offset >= encrypted.len() {
            return Ok(0);
        }

        let take = (encrypted.len() - chunk_offset).min(out.len());
        out[..take].copy_from_slice(&encrypted[chunk_offset..chunk_offset + take]);
        Ok(take)
    }
}

impl Read for EncryptingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self
            .read_at(buf, self.read_offset)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        self.read_offset += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn encrypts_whole_file_matching_calculated_size() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let payload = vec![0xABu8; DATA_CHUNK_SIZE + 1234];
        tmp.write_all(&payload).unwrap();

        let key: ChunkKey = [6u8; 32];
        let mut reader = EncryptingReader::new(tmp.path(), key).unwrap();
        assert_eq!(reader.total_size(), crate::size::encrypted_size(payload.len() as u64, false));

        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out.len() as u64, reader.total_size());
    }

    #[test]
    fn empty_file_encrypts_to_zero_bytes() {
        let tmp = tempfile::NamedTempFile::new().unwrap();

        let key: ChunkKey = [9u8; 32];
        let mut reader = EncryptingReader::new(tmp.path(), key).unwrap();
        assert_eq!(reader.total_size(), 0);

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn resumed_upload_reproduces_identical_ciphertext() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0x11u8; 100]).unwrap();

        let key: ChunkKey = [3u8; 32];
        let mut first = EncryptingReader::new(tmp.path(), key).unwrap();
        let mut buf = vec![0u8; first.total_size() as usize];
        first.read_exact(&mut buf).unwrap();
        let iv_list = first.iv_list().to_vec();

        let mut second = EncryptingReader::resume(tmp.path(), key, iv_list).unwrap();
        let mut buf2 = vec![0u8; second.total_size() as usize];
        second.read_exact(&mut buf2).unwrap();

        assert_eq!(buf, buf2);
    }
}
