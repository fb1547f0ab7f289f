//! Reserved metadata-map keys (spec §6).
//!
//! Values are always decimal strings or literal text; `META_DIRECTORY` and
//! `META_PINNED` are promoted to dedicated columns by the metadata store
//! (see `repertory_meta`), the rest travel in the JSON/bincode `data` blob.

pub const META_ACCESSED: &str = "META_ACCESSED";
pub const META_ATTRIBUTES: &str = "META_ATTRIBUTES";
pub const META_BACKUP: &str = "META_BACKUP";
pub const META_CHANGED: &str = "META_CHANGED";
pub const META_CREATION: &str = "META_CREATION";
pub const META_DIRECTORY: &str = "META_DIRECTORY";
pub const META_ENCRYPTION_TOKEN: &str = "META_ENCRYPTION_TOKEN";
pub const META_GID: &str = "META_GID";
pub const META_KEY: &str = "META_KEY";
pub const META_MODE: &str = "META_MODE";
pub const META_MODIFIED: &str = "META_MODIFIED";
pub const META_OSXFLAGS: &str = "META_OSXFLAGS";
pub const META_PINNED: &str = "META_PINNED";
pub const META_SIZE: &str = "META_SIZE";
pub const META_SOURCE: &str = "META_SOURCE";
pub const META_UID: &str = "META_UID";
pub const META_WRITTEN: &str = "META_WRITTEN";

/// All reserved keys that are *not* promoted to a dedicated store column.
pub const NON_COLUMN_KEYS: &[&str] = &[
    META_ACCESSED,
    META_ATTRIBUTES,
    META_BACKUP,
    META_CHANGED,
    META_CREATION,
    META_ENCRYPTION_TOKEN,
    META_GID,
    META_KEY,
    META_MODE,
    META_MODIFIED,
    META_OSXFLAGS,
    META_SIZE,
    META_UID,
    META_WRITTEN,
];

/// Boolean meta values are the literal strings `"0"`/`"1"`.
#[must_use]
pub fn bool_to_meta(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Inverse of [`bool_to_meta`]; any value other than `"1"` is false.
#[must_use]
pub fn meta_to_bool(value: &str) -> bool {
    value == "1"
}
