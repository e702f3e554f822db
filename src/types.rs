//! Core types shared by handles, adapters and streams.

use std::fmt;
use std::time::SystemTime;

use crate::FsError;

/// Kind of an entry in a storage tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("file"),
            EntryKind::Directory => f.write_str("directory"),
        }
    }
}

/// Immutable snapshot of a file's committed content.
///
/// Returned by [`FileHandle::get_file`](crate::FileHandle::get_file). Later
/// commits never change an existing snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    data: Vec<u8>,
    last_modified: SystemTime,
}

impl File {
    /// Create a snapshot from raw parts.
    pub fn new(name: impl Into<String>, data: Vec<u8>, last_modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            data,
            last_modified,
        }
    }

    /// Name of the file (not a path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Time of the last successful commit.
    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// Content as bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the snapshot and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes in `start..end`, clamped to the file size.
    pub fn slice(&self, start: u64, end: u64) -> &[u8] {
        let len = self.data.len();
        let end = (end.min(len as u64)) as usize;
        let start = (start as usize).min(end);
        &self.data[start..end]
    }

    /// Content decoded as UTF-8.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidData`] if the content is not valid UTF-8
    pub fn text(&self) -> Result<String, FsError> {
        String::from_utf8(self.data.clone()).map_err(|_| FsError::InvalidData {
            name: self.name.clone(),
            details: "file contents are not valid UTF-8".into(),
        })
    }
}

/// Committed bytes of a file as held by a backend.
#[derive(Debug, Clone)]
pub(crate) struct FileRecord {
    pub(crate) data: Vec<u8>,
    pub(crate) last_modified: SystemTime,
}

impl FileRecord {
    pub(crate) fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            last_modified: SystemTime::now(),
        }
    }

    pub(crate) fn to_file(&self, name: &str) -> File {
        File::new(name, self.data.clone(), self.last_modified)
    }
}

/// Options for `get_file_handle` / `get_directory_handle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GetOptions {
    /// Create an empty entry when it does not exist.
    pub create: bool,
}

impl GetOptions {
    /// Look up an existing entry only.
    pub const EXISTING: Self = Self { create: false };

    /// Look up, creating the entry if absent.
    pub const CREATE: Self = Self { create: true };
}

/// Options for `remove_entry`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RemoveOptions {
    /// Remove a non-empty directory together with all descendants.
    pub recursive: bool,
}

impl RemoveOptions {
    /// Remove files and empty directories only.
    pub const SHALLOW: Self = Self { recursive: false };

    /// Remove directories with everything below them.
    pub const RECURSIVE: Self = Self { recursive: true };
}

/// Options for `create_writable`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CreateWritableOptions {
    /// Start from the committed content instead of an empty buffer.
    pub keep_existing_data: bool,
}

impl CreateWritableOptions {
    /// Start from an empty buffer.
    pub const REPLACE: Self = Self {
        keep_existing_data: false,
    };

    /// Start from a copy of the committed content.
    pub const KEEP: Self = Self {
        keep_existing_data: true,
    };
}

/// Access mode for a permission query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PermissionMode {
    /// Read access.
    #[default]
    Read,
    /// Read and write access.
    ReadWrite,
}

/// Result of a permission query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PermissionState {
    /// Access is granted.
    Granted,
    /// Access is denied.
    Denied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_kind_display() {
        assert_eq!(EntryKind::File.to_string(), "file");
        assert_eq!(EntryKind::Directory.to_string(), "directory");
    }

    #[test]
    fn file_accessors() {
        let f = File::new("a.txt", b"awesome content".to_vec(), SystemTime::UNIX_EPOCH);
        assert_eq!(f.name(), "a.txt");
        assert_eq!(f.size(), 15);
        assert_eq!(f.text().unwrap(), "awesome content");
        assert_eq!(f.slice(1, 4), b"wes");
    }

    #[test]
    fn file_slice_clamps() {
        let f = File::new("a", b"abc".to_vec(), SystemTime::UNIX_EPOCH);
        assert_eq!(f.slice(1, 100), b"bc");
        assert_eq!(f.slice(10, 20), b"");
        assert_eq!(f.slice(2, 1), b"");
    }

    #[test]
    fn file_text_rejects_invalid_utf8() {
        let f = File::new("bin", vec![0xff, 0xfe], SystemTime::UNIX_EPOCH);
        assert!(matches!(f.text(), Err(FsError::InvalidData { .. })));
    }

    #[test]
    fn option_constants() {
        assert!(GetOptions::CREATE.create);
        assert!(!GetOptions::EXISTING.create);
        assert_eq!(GetOptions::default(), GetOptions::EXISTING);
        assert!(RemoveOptions::RECURSIVE.recursive);
        assert!(!RemoveOptions::SHALLOW.recursive);
        assert!(CreateWritableOptions::KEEP.keep_existing_data);
        assert_eq!(CreateWritableOptions::default(), CreateWritableOptions::REPLACE);
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EntryKind>();
        assert_send_sync::<File>();
        assert_send_sync::<GetOptions>();
        assert_send_sync::<PermissionState>();
    }
}
