//! Big-endian binary codec (spec §4.1, C1).
//!
//! Scalars are encoded big-endian; strings are UTF-8 and null-terminated in
//! the stream; `encode_top` prepends instead of appending, which is how the
//! RPC transport (`repertory-rpc`) layers outer framing (nonce, service
//! flags, result code) around an already-built inner payload without
//! re-serializing it.

use crate::error::ApiError;

/// A growable byte buffer with a monotonically advancing decode cursor.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    bytes: Vec<u8>,
    cursor: usize,
}

impl Buffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes, cursor: 0 }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends to the end of the buffer (`packet::encode`).
    pub fn encode<T: Codec>(&mut self, value: &T) {
        value.encode(&mut self.bytes);
    }

    /// Prepends to the front of the buffer (`packet::encode_top`), used to
    /// build outer framing around an already-encoded inner payload.
    pub fn encode_top<T: Codec>(&mut self, value: &T) {
        let mut prefix = Vec::new();
        value.encode(&mut prefix);
        self.bytes.splice(0..0, prefix);
    }

    /// Decodes the next value, advancing the cursor.
    pub fn decode<T: Codec>(&mut self) -> Result<T, ApiError> {
        T::decode(&self.bytes, &mut self.cursor)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }
}

/// Implemented by every big-endian-codable scalar, string, and fixed struct.
pub trait Codec: Sized {
    fn encode(&self, out: &mut Vec<u8>);
    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError>;
}

macro_rules! impl_codec_for_int {
    ($ty:ty) => {
        impl Codec for $ty {
            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }

            fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                if *cursor + WIDTH > buf.len() {
                    return Err(ApiError::BufferTooSmall);
                }
                let mut bytes = [0u8; WIDTH];
                bytes.copy_from_slice(&buf[*cursor..*cursor + WIDTH]);
                *cursor += WIDTH;
                Ok(Self::from_be_bytes(bytes))
            }
        }
    };
}

impl_codec_for_int!(u8);
impl_codec_for_int!(i8);
impl_codec_for_int!(u16);
impl_codec_for_int!(i16);
impl_codec_for_int!(u32);
impl_codec_for_int!(i32);
impl_codec_for_int!(u64);
impl_codec_for_int!(i64);

impl Codec for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
        Ok(u8::decode(buf, cursor)? != 0)
    }
}

/// UTF-8, null-terminated in the stream. Decode scans for the terminator
/// rather than reading a length prefix (matches `packet::decode(std::string&)`).
impl Codec for String {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
        out.push(0);
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
        if *cursor >= buf.len() {
            return Err(ApiError::BufferOverflow);
        }
        let start = *cursor;
        let end = buf[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .ok_or(ApiError::BufferOverflow)?;
        let s = std::str::from_utf8(&buf[start..end])
            .map_err(|_| ApiError::BadAddress)?
            .to_string();
        *cursor = end + 1;
        Ok(s)
    }
}

/// Raw byte vector, length-prefixed by a `u32` (used for RPC method arguments
/// that are not themselves a `Codec` struct, e.g. opaque blobs).
impl Codec for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        out.extend_from_slice(self);
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
        let len = u32::decode(buf, cursor)? as usize;
        if *cursor + len > buf.len() {
            return Err(ApiError::BufferOverflow);
        }
        let bytes = buf[*cursor..*cursor + len].to_vec();
        *cursor += len;
        Ok(bytes)
    }
}

/// POSIX-like `stat` (spec §4.1), encoded field by field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoteStat {
    pub st_mode: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_size: u64,
    pub st_atime: i64,
    pub st_mtime: i64,
    pub st_ctime: i64,
}

impl Codec for RemoteStat {
    fn encode(&self, out: &mut Vec<u8>) {
        self.st_mode.encode(out);
        self.st_uid.encode(out);
        self.st_gid.encode(out);
        self.st_size.encode(out);
        self.st_atime.encode(out);
        self.st_mtime.encode(out);
        self.st_ctime.encode(out);
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
        Ok(Self {
            st_mode: u32::decode(buf, cursor)?,
            st_uid: u32::decode(buf, cursor)?,
            st_gid: u32::decode(buf, cursor)?,
            st_size: u64::decode(buf, cursor)?,
            st_atime: i64::decode(buf, cursor)?,
            st_mtime: i64::decode(buf, cursor)?,
            st_ctime: i64::decode(buf, cursor)?,
        })
    }
}

/// POSIX-like `statfs` (spec §4.1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoteStatfs {
    pub f_bsize: u32,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_bavail: u64,
    pub f_files: u64,
    pub f_ffree: u64,
}

impl Codec for RemoteStatfs {
    fn encode(&self, out: &mut Vec<u8>) {
        self.f_bsize.encode(out);
        self.f_blocks.encode(out);
        self.f_bfree.encode(out);
        self.f_bavail.encode(out);
        self.f_files.encode(out);
        self.f_ffree.encode(out);
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
        Ok(Self {
            f_bsize: u32::decode(buf, cursor)?,
            f_blocks: u64::decode(buf, cursor)?,
            f_bfree: u64::decode(buf, cursor)?,
            f_bavail: u64::decode(buf, cursor)?,
            f_files: u64::decode(buf, cursor)?,
            f_ffree: u64::decode(buf, cursor)?,
        })
    }
}

/// Extended `statfs` carrying the mount source string (spec §4.1 `statfs_x`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteStatfsX {
    pub base: RemoteStatfs,
    pub mount_from: String,
}

impl Codec for RemoteStatfsX {
    fn encode(&self, out: &mut Vec<u8>) {
        self.base.encode(out);
        self.mount_from.encode(out);
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
        Ok(Self {
            base: RemoteStatfs::decode(buf, cursor)?,
            mount_from: String::decode(buf, cursor)?,
        })
    }
}

/// Windows-like `file_info` (spec §4.1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub file_attributes: u32,
    pub file_size: u64,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
}

impl Codec for RemoteFileInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        self.file_attributes.encode(out);
        self.file_size.encode(out);
        self.creation_time.encode(out);
        self.last_access_time.encode(out);
        self.last_write_time.encode(out);
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
        Ok(Self {
            file_attributes: u32::decode(buf, cursor)?,
            file_size: u64::decode(buf, cursor)?,
            creation_time: u64::decode(buf, cursor)?,
            last_access_time: u64::decode(buf, cursor)?,
            last_write_time: u64::decode(buf, cursor)?,
        })
    }
}

/// Windows-like `setattr_x` (spec §4.1), a sparse set of optional attribute
/// writes where each field is preceded by a presence flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoteSetattrX {
    pub valid: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub acctime: i64,
    pub modtime: i64,
    pub crtime: i64,
}

impl Codec for RemoteSetattrX {
    fn encode(&self, out: &mut Vec<u8>) {
        self.valid.encode(out);
        self.mode.encode(out);
        self.uid.encode(out);
        self.gid.encode(out);
        self.size.encode(out);
        self.acctime.encode(out);
        self.modtime.encode(out);
        self.crtime.encode(out);
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, ApiError> {
        Ok(Self {
            valid: u32::decode(buf, cursor)?,
            mode: u32::decode(buf, cursor)?,
            uid: u32::decode(buf, cursor)?,
            gid: u32::decode(buf, cursor)?,
            size: u64::decode(buf, cursor)?,
            acctime: i64::decode(buf, cursor)?,
            modtime: i64::decode(buf, cursor)?,
            crtime: i64::decode(buf, cursor)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Codec + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = Buffer::new();
        buf.encode(&value);
        let decoded: T = buf.decode().unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn scalar_round_trip() {
        round_trip(42u8);
        round_trip(-1i8);
        round_trip(65535u16);
        round_trip(-32768i16);
        round_trip(0xDEAD_BEEFu32);
        round_trip(-123_456_789i32);
        round_trip(0xDEAD_BEEF_CAFE_BABEu64);
        round_trip(-9_223_372_036_854_775_807i64);
        round_trip(true);
        round_trip(false);
    }

    #[test]
    fn string_is_null_terminated() {
        let mut buf = Buffer::new();
        buf.encode(&"hello".to_string());
        assert_eq!(buf.as_slice(), b"hello\0");
        let decoded: String = buf.decode().unwrap();
        assert_eq!(decoded, "hello");
    }

    #[test]
    fn multiple_values_share_one_buffer() {
        let mut buf = Buffer::new();
        buf.encode(&"method_name".to_string());
        buf.encode(&7u64);
        buf.encode(&true);

        let method: String = buf.decode().unwrap();
        let thread_id: u64 = buf.decode().unwrap();
        let flag: bool = buf.decode().unwrap();
        assert_eq!(method, "method_name");
        assert_eq!(thread_id, 7);
        assert!(flag);
    }

    #[test]
    fn encode_top_prepends_in_push_order() {
        let mut buf = Buffer::new();
        buf.encode(&"body".to_string());
        buf.encode_top(&1u32); // pushed second, ends up immediately before "body"
        buf.encode_top(&"nonce".to_string()); // pushed last, ends up first on the wire

        let nonce: String = buf.decode().unwrap();
        let flags: u32 = buf.decode().unwrap();
        let body: String = buf.decode().unwrap();
        assert_eq!(nonce, "nonce");
        assert_eq!(flags, 1);
        assert_eq!(body, "body");
    }

    #[test]
    fn decode_past_end_is_buffer_overflow() {
        let mut buf = Buffer::from_vec(vec![b'a', b'b']); // no null terminator
        let result: Result<String, ApiError> = buf.decode();
        assert!(matches!(result, Err(ApiError::BufferOverflow)));
    }

    #[test]
    fn decode_short_fixed_width_is_buffer_too_small() {
        let mut buf = Buffer::from_vec(vec![0x01, 0x02]); // u32 needs 4 bytes
        let result: Result<u32, ApiError> = buf.decode();
        assert!(matches!(result, Err(ApiError::BufferTooSmall)));
    }

    #[test]
    fn stat_round_trip() {
        round_trip(RemoteStat {
            st_mode: 0o100644,
            st_uid: 1000,
            st_gid: 1000,
            st_size: 123_456,
            st_atime: 1_700_000_000,
            st_mtime: 1_700_000_001,
            st_ctime: 1_700_000_002,
        });
    }

    #[test]
    fn statfs_x_round_trip() {
        round_trip(RemoteStatfsX {
            base: RemoteStatfs {
                f_bsize: 4096,
                f_blocks: 1_000_000,
                f_bfree: 500_000,
                f_bavail: 500_000,
                f_files: 10_000,
                f_ffree: 9_000,
            },
            mount_from: "repertory".to_string(),
        });
    }

    #[test]
    fn file_info_round_trip() {
        round_trip(RemoteFileInfo {
            file_attributes: 0x20,
            file_size: 4096,
            creation_time: 133_000_000_000_000_000,
            last_access_time: 133_000_000_000_000_001,
            last_write_time: 133_000_000_000_000_002,
        });
    }

    #[test]
    fn setattr_x_round_trip() {
        round_trip(RemoteSetattrX {
            valid: 0b0101,
            mode: 0o755,
            uid: 0,
            gid: 0,
            size: 0,
            acctime: 0,
            modtime: 0,
            crtime: 0,
        });
    }
}
