//! The contract every storage backend implements.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::meta::MetaInfo;
use crate::path::PathElement;

/// Kind of item a persist, move or exists call is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    File,
    Directory,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

/// Filesystem-like storage addressed by [`PathElement`]s.
///
/// Every method type-checks its path elements against the variant the
/// backend expects and fails with `TypeMismatch` before doing any I/O.
/// Implementations are `Send + Sync` and may be shared across threads.
pub trait StorageAdapter: Send + Sync {
    /// Write `bytes` as the whole value at `path`, replacing what was there.
    ///
    /// For [`StorageType::Directory`] the bytes are ignored and a directory
    /// is created, on backends that have directories.
    fn persist(&self, storage_type: StorageType, path: &PathElement, bytes: &[u8]) -> Result<()>;

    /// Overlay `bytes` onto the existing value starting at `offset`.
    ///
    /// Offset 0 truncates the value to exactly `bytes`. Otherwise existing
    /// content in the overlapped range is overwritten and the value grows
    /// on the right as needed. An offset past the end is clamped to the end.
    fn persist_at(
        &self,
        storage_type: StorageType,
        path: &PathElement,
        offset: u64,
        bytes: &[u8],
    ) -> Result<()>;

    fn delete(&self, path: &PathElement) -> Result<()>;

    /// Full contents of the value at `path`.
    fn read(&self, path: &PathElement) -> Result<Vec<u8>>;

    /// Up to `length` bytes starting at `offset`. Out-of-range requests
    /// are clamped, never rejected.
    fn read_range(&self, path: &PathElement, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Move the item at `old_path` to `new_path`.
    ///
    /// Fails with `AlreadyExists` if `new_path` is taken, leaving both
    /// untouched.
    fn move_path(
        &self,
        storage_type: StorageType,
        old_path: &PathElement,
        new_path: &PathElement,
    ) -> Result<()>;

    /// Size, kind and extension. Fails if `path` does not exist.
    fn meta_information(&self, path: &PathElement) -> Result<MetaInfo>;

    fn exists(&self, storage_type: StorageType, path: &PathElement) -> Result<bool>;

    fn is_file(&self, path: &PathElement) -> Result<bool>;

    fn is_dir(&self, path: &PathElement) -> Result<bool>;

    /// All descendants of `directory`, depth-first in pre-order, relative
    /// to the adapter root.
    fn directory_contents(&self, directory: &PathElement) -> Result<Vec<PathElement>>;

    /// Hex MD5 of the full value. Fails for directories and absent paths.
    fn checksum(&self, path: &PathElement) -> Result<String>;

    /// The root of the backend's namespace, if it has one.
    fn root_dir(&self) -> Option<PathElement>;
}

/// Result of writing `bytes` at `offset` into `existing`.
pub(crate) fn overlay_bytes(existing: &[u8], offset: u64, bytes: &[u8]) -> Vec<u8> {
    let start = clamp_offset(offset, existing.len());
    if start == 0 {
        return bytes.to_vec();
    }

    let end = start + bytes.len();
    let mut out = Vec::with_capacity(existing.len().max(end));
    out.extend_from_slice(&existing[..start]);
    out.extend_from_slice(bytes);
    if end < existing.len() {
        out.extend_from_slice(&existing[end..]);
    }
    out
}

/// Slice of `content` for a clamped range read.
pub(crate) fn clamp_range(content: &[u8], offset: u64, length: u64) -> &[u8] {
    let start = clamp_offset(offset, content.len());
    let available = (content.len() - start) as u64;
    let end = start + length.min(available) as usize;
    &content[start..end]
}

fn clamp_offset(offset: u64, len: usize) -> usize {
    usize::try_from(offset).map_or(len, |offset| offset.min(len))
}
