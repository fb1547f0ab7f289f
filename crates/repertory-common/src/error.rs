//! Unified error taxonomy for Repertory (spec §6/§7).
//!
//! Every fallible operation across the workspace returns `Result<T>`. Providers
//! and the metadata store never panic across their public interface.

use thiserror::Error;

/// Result type used throughout the workspace.
pub type Result<T> = std::result::Result<T, ApiError>;

/// The gateway's error enumeration. Each variant maps to a POSIX errno, a
/// Windows NTSTATUS, and (where relevant) an HTTP status / S3 error code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("access denied")]
    AccessDenied,

    #[error("bad address")]
    BadAddress,

    #[error("buffer overflow")]
    BufferOverflow,

    #[error("buffer too small")]
    BufferTooSmall,

    #[error("communication error: {0}")]
    CommError(String),

    #[error("end of directory")]
    DirectoryEndOfFiles,

    #[error("directory exists")]
    DirectoryExists,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("directory not found")]
    DirectoryNotFound,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("download stopped")]
    DownloadStopped,

    #[error("{0}")]
    Error(String),

    #[error("file in use")]
    FileInUse,

    #[error("incompatible version: {0}")]
    IncompatibleVersion(String),

    #[error("invalid handle")]
    InvalidHandle,

    #[error("invalid operation")]
    InvalidOperation,

    #[error("invalid version")]
    InvalidVersion,

    #[error("item exists")]
    ItemExists,

    #[error("item not found")]
    ItemNotFound,

    #[error("name too long")]
    NameTooLong,

    #[error("no disk space")]
    NoDiskSpace,

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("not supported")]
    NotSupported,

    #[error("os error: {0}")]
    OsError(i32),

    #[error("out of memory")]
    OutOfMemory,

    #[error("permission denied")]
    PermissionDenied,

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("upload stopped")]
    UploadStopped,

    #[error("extended attribute not found")]
    XattrNotFound,

    #[error("extended attribute exists")]
    XattrExists,

    #[error("extended attribute too big")]
    XattrTooBig,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Not-found/exists class (spec §7.1) — recoverable locally when policy allows.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ItemNotFound | Self::DirectoryNotFound | Self::XattrNotFound
        )
    }

    /// Transport class (spec §7.2) — S3/Sia read paths retry these up to
    /// `retry_read_count + 1` times; every other call site surfaces them.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommError(_) | Self::DownloadFailed(_) | Self::UploadFailed(_)
        )
    }

    /// User-cancelled class (spec §7.3).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::DownloadStopped | Self::UploadStopped)
    }

    /// POSIX errno this error maps to on Unix.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::AccessDenied | Self::PermissionDenied => libc_eacces(),
            Self::BadAddress => libc_efault(),
            Self::BufferOverflow | Self::BufferTooSmall | Self::NameTooLong => libc_enametoolong(),
            Self::DirectoryEndOfFiles => 0,
            Self::DirectoryExists | Self::ItemExists => libc_eexist(),
            Self::DirectoryNotEmpty => libc_enotempty(),
            Self::DirectoryNotFound | Self::ItemNotFound => libc_enoent(),
            Self::CommError(_) | Self::DownloadFailed(_) | Self::UploadFailed(_) => libc_eio(),
            Self::DownloadStopped | Self::UploadStopped => libc_ecanceled(),
            Self::FileInUse => libc_ebusy(),
            Self::IncompatibleVersion(_) | Self::InvalidVersion => libc_eproto(),
            Self::InvalidHandle => libc_ebadf(),
            Self::InvalidOperation | Self::NotSupported => libc_einval(),
            Self::NoDiskSpace => libc_enospc(),
            Self::NotImplemented(_) => libc_enosys(),
            Self::OsError(code) => *code,
            Self::OutOfMemory => libc_enomem(),
            Self::XattrNotFound => libc_enodata(),
            Self::XattrExists => libc_eexist(),
            Self::XattrTooBig => libc_e2big(),
            Self::Io(e) => e.raw_os_error().unwrap_or_else(libc_eio),
            Self::Error(_) => libc_eio(),
        }
    }

    /// Windows NTSTATUS this error maps to; a plain data table, compiled on
    /// every platform since it is only an integer constant, not a Windows API call.
    #[must_use]
    pub fn ntstatus(&self) -> i32 {
        const STATUS_SUCCESS: i32 = 0x0000_0000u32 as i32;
        const STATUS_ACCESS_DENIED: i32 = 0xC000_0022u32 as i32;
        const STATUS_OBJECT_NAME_NOT_FOUND: i32 = 0xC000_0034u32 as i32;
        const STATUS_OBJECT_NAME_COLLISION: i32 = 0xC000_0035u32 as i32;
        const STATUS_DIRECTORY_NOT_EMPTY: i32 = 0xC000_0101u32 as i32;
        const STATUS_IO_DEVICE_ERROR: i32 = 0xC000_0185u32 as i32;
        const STATUS_CANCELLED: i32 = 0xC000_0120u32 as i32;
        const STATUS_SHARING_VIOLATION: i32 = 0xC000_0043u32 as i32;
        const STATUS_REVISION_MISMATCH: i32 = 0xC000_0059u32 as i32;
        const STATUS_INVALID_HANDLE: i32 = 0xC000_0008u32 as i32;
        const STATUS_INVALID_PARAMETER: i32 = 0xC000_000Du32 as i32;
        const STATUS_DISK_FULL: i32 = 0xC000_007Fu32 as i32;
        const STATUS_NOT_IMPLEMENTED: i32 = 0xC000_002Du32 as i32;
        const STATUS_NO_MEMORY: i32 = 0xC000_0017u32 as i32;
        const STATUS_NO_EAS_ON_FILE: i32 = 0xC000_0052u32 as i32;
        const STATUS_EA_TOO_LARGE: i32 = 0xC000_0050u32 as i32;
        const STATUS_UNSUCCESSFUL: i32 = 0xC000_0001u32 as i32;

        match self {
            Self::AccessDenied | Self::PermissionDenied => STATUS_ACCESS_DENIED,
            Self::DirectoryNotFound | Self::ItemNotFound => STATUS_OBJECT_NAME_NOT_FOUND,
            Self::DirectoryExists | Self::ItemExists => STATUS_OBJECT_NAME_COLLISION,
            Self::DirectoryNotEmpty => STATUS_DIRECTORY_NOT_EMPTY,
            Self::CommError(_) | Self::DownloadFailed(_) | Self::UploadFailed(_) => {
                STATUS_IO_DEVICE_ERROR
            }
            Self::DownloadStopped | Self::UploadStopped => STATUS_CANCELLED,
            Self::FileInUse => STATUS_SHARING_VIOLATION,
            Self::IncompatibleVersion(_) | Self::InvalidVersion => STATUS_REVISION_MISMATCH,
            Self::InvalidHandle => STATUS_INVALID_HANDLE,
            Self::InvalidOperation | Self::NotSupported | Self::BadAddress => {
                STATUS_INVALID_PARAMETER
            }
            Self::NoDiskSpace => STATUS_DISK_FULL,
            Self::NotImplemented(_) => STATUS_NOT_IMPLEMENTED,
            Self::OutOfMemory => STATUS_NO_MEMORY,
            Self::XattrNotFound => STATUS_NO_EAS_ON_FILE,
            Self::XattrExists => STATUS_OBJECT_NAME_COLLISION,
            Self::XattrTooBig => STATUS_EA_TOO_LARGE,
            Self::BufferOverflow | Self::BufferTooSmall | Self::NameTooLong => {
                STATUS_INVALID_PARAMETER
            }
            Self::DirectoryEndOfFiles => STATUS_SUCCESS,
            Self::OsError(_) | Self::Io(_) | Self::Error(_) => STATUS_UNSUCCESSFUL,
        }
    }

    /// HTTP status an S3-facing caller should map this error to.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::AccessDenied | Self::PermissionDenied => 403,
            Self::DirectoryNotFound | Self::ItemNotFound => 404,
            Self::DirectoryExists | Self::ItemExists => 409,
            Self::NotImplemented(_) | Self::NotSupported => 501,
            Self::DownloadStopped | Self::UploadStopped => 499,
            Self::CommError(_) | Self::DownloadFailed(_) | Self::UploadFailed(_) => 503,
            _ => 500,
        }
    }

    /// S3 error-code string for the variants that can surface from the S3 provider.
    #[must_use]
    pub fn s3_error_code(&self) -> &'static str {
        match self {
            Self::AccessDenied | Self::PermissionDenied => "AccessDenied",
            Self::DirectoryNotFound | Self::ItemNotFound => "NoSuchKey",
            Self::DirectoryExists | Self::ItemExists => "BucketAlreadyOwnedByYou",
            Self::NotImplemented(_) | Self::NotSupported => "NotImplemented",
            _ => "InternalError",
        }
    }
}

const fn libc_eacces() -> i32 {
    13
}
const fn libc_efault() -> i32 {
    14
}
const fn libc_eexist() -> i32 {
    17
}
const fn libc_enotempty() -> i32 {
    39
}
const fn libc_enoent() -> i32 {
    2
}
const fn libc_eio() -> i32 {
    5
}
const fn libc_ecanceled() -> i32 {
    125
}
const fn libc_ebusy() -> i32 {
    16
}
const fn libc_eproto() -> i32 {
    71
}
const fn libc_ebadf() -> i32 {
    9
}
const fn libc_einval() -> i32 {
    22
}
const fn libc_enospc() -> i32 {
    28
}
const fn libc_enosys() -> i32 {
    38
}
const fn libc_enomem() -> i32 {
    12
}
const fn libc_enodata() -> i32 {
    61
}
const fn libc_e2big() -> i32 {
    7
}
const fn libc_enametoolong() -> i32 {
    36
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(ApiError::ItemNotFound.is_not_found());
        assert!(ApiError::DirectoryNotFound.is_not_found());
        assert!(!ApiError::AccessDenied.is_not_found());
    }

    #[test]
    fn retryable_classification() {
        assert!(ApiError::CommError("timeout".into()).is_retryable());
        assert!(!ApiError::ItemNotFound.is_retryable());
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(ApiError::ItemNotFound.errno(), 2);
        assert_eq!(ApiError::AccessDenied.errno(), 13);
        assert_eq!(ApiError::OsError(42).errno(), 42);
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ApiError::ItemNotFound.http_status_code(), 404);
        assert_eq!(ApiError::AccessDenied.http_status_code(), 403);
        assert_eq!(ApiError::Error("boom".into()).http_status_code(), 500);
    }
}
