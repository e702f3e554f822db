//! # Extension Traits
//!
//! Convenience methods for directory handles.
//!
//! ## Overview
//!
//! [`DirectoryExt`] bundles the common multi-step operations (look up a
//! child, open a stream, write, close) into single calls. Every method is
//! built on the public [`DirectoryHandle`] API, so it works the same on all
//! backends.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`is_file`](DirectoryExt::is_file) | Check if a child file exists |
//! | [`is_directory`](DirectoryExt::is_directory) | Check if a child directory exists |
//! | [`sorted_entry_names`](DirectoryExt::sorted_entry_names) | Sorted listing, directories suffixed with `/` |
//! | [`write_file`](DirectoryExt::write_file) | Create or replace a file in one commit |
//! | [`read_file`](DirectoryExt::read_file) | Committed bytes of a child file |
//! | [`read_to_string`](DirectoryExt::read_to_string) | Committed text of a child file |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled, [`DirectoryExtJson`] adds `read_json`
//! and `write_json`.

use crate::{CreateWritableOptions, DirectoryHandle, FileHandle, FsError, GetOptions, Handle, WriteChunk};

/// Extension methods for directory handles.
///
/// # Example
///
/// ```rust
/// use fs_handles::{memory_root, DirectoryExt};
///
/// # fn main() -> Result<(), fs_handles::FsError> {
/// let root = memory_root();
/// root.write_file("hello.txt", "hello")?;
/// assert_eq!(root.read_to_string("hello.txt")?, "hello");
/// assert!(root.is_file("hello.txt")?);
/// # Ok(())
/// # }
/// ```
pub trait DirectoryExt {
    /// Check if child `name` is a file.
    ///
    /// Returns `Ok(false)` if the child is missing or a directory.
    fn is_file(&self, name: &str) -> Result<bool, FsError>;

    /// Check if child `name` is a directory.
    ///
    /// Returns `Ok(false)` if the child is missing or a file.
    fn is_directory(&self, name: &str) -> Result<bool, FsError>;

    /// Child names sorted, with a trailing `/` on directories.
    fn sorted_entry_names(&self) -> Result<Vec<String>, FsError>;

    /// Create `name` if needed and replace its content with `chunk` in one
    /// commit.
    fn write_file(&self, name: &str, chunk: impl Into<WriteChunk>) -> Result<FileHandle, FsError>;

    /// Committed bytes of child file `name`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file doesn't exist
    /// - [`FsError::TypeMismatch`] if `name` is a directory
    fn read_file(&self, name: &str) -> Result<Vec<u8>, FsError>;

    /// Committed content of child file `name` as UTF-8.
    ///
    /// # Errors
    ///
    /// As [`read_file`](Self::read_file), plus [`FsError::InvalidData`] for
    /// non-UTF-8 content.
    fn read_to_string(&self, name: &str) -> Result<String, FsError>;
}

impl DirectoryExt for DirectoryHandle {
    fn is_file(&self, name: &str) -> Result<bool, FsError> {
        match self.get_file_handle(name, GetOptions::EXISTING) {
            Ok(_) => Ok(true),
            Err(FsError::NotFound { .. } | FsError::TypeMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_directory(&self, name: &str) -> Result<bool, FsError> {
        match self.get_directory_handle(name, GetOptions::EXISTING) {
            Ok(_) => Ok(true),
            Err(FsError::NotFound { .. } | FsError::TypeMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn sorted_entry_names(&self) -> Result<Vec<String>, FsError> {
        let mut names = self
            .entries()?
            .map(|entry| {
                entry.map(|(name, handle)| match handle {
                    Handle::Directory(_) => format!("{name}/"),
                    Handle::File(_) => name,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }

    fn write_file(&self, name: &str, chunk: impl Into<WriteChunk>) -> Result<FileHandle, FsError> {
        let file = self.get_file_handle(name, GetOptions::CREATE)?;
        let stream = file.create_writable(CreateWritableOptions::REPLACE)?;
        if let Err(e) = stream.write(chunk) {
            stream.abort()?;
            return Err(e);
        }
        stream.close()?;
        Ok(file)
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, FsError> {
        let file = self.get_file_handle(name, GetOptions::EXISTING)?;
        Ok(file.get_file()?.into_bytes())
    }

    fn read_to_string(&self, name: &str) -> Result<String, FsError> {
        let file = self.get_file_handle(name, GetOptions::EXISTING)?;
        file.get_file()?.text()
    }
}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    /// JSON serialization extension methods.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait DirectoryExtJson: DirectoryExt {
        /// Read child file `name` and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - [`FsError::NotFound`] if the file doesn't exist
        /// - [`FsError::Deserialization`] if JSON parsing failed
        fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, FsError> {
            let data = self.read_file(name)?;
            serde_json::from_slice(&data).map_err(|e| FsError::Deserialization(e.to_string()))
        }

        /// Serialize `value` as pretty-printed JSON into child file `name`.
        ///
        /// # Errors
        ///
        /// - [`FsError::Serialization`] if JSON serialization failed
        /// - other variants from [`write_file`](DirectoryExt::write_file)
        fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<FileHandle, FsError> {
            let json = serde_json::to_string_pretty(value).map_err(|e| FsError::Serialization(e.to_string()))?;
            self.write_file(name, json)
        }
    }

    impl DirectoryExtJson for DirectoryHandle {}
}

#[cfg(feature = "serde")]
pub use json::DirectoryExtJson;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_root;

    #[test]
    fn is_file_and_is_directory() {
        let root = memory_root();
        root.write_file("f", "x").unwrap();
        root.get_directory_handle("d", GetOptions::CREATE).unwrap();
        assert!(root.is_file("f").unwrap());
        assert!(!root.is_file("d").unwrap());
        assert!(!root.is_file("missing").unwrap());
        assert!(root.is_directory("d").unwrap());
        assert!(!root.is_directory("f").unwrap());
    }

    #[test]
    fn invalid_name_is_still_an_error() {
        let root = memory_root();
        assert!(matches!(root.is_file(".."), Err(FsError::InvalidName { .. })));
    }

    #[test]
    fn sorted_names_mark_directories() {
        let root = memory_root();
        root.write_file("b.txt", "").unwrap();
        root.get_directory_handle("a", GetOptions::CREATE).unwrap();
        root.write_file("c", "").unwrap();
        assert_eq!(root.sorted_entry_names().unwrap(), ["a/", "b.txt", "c"]);
    }

    #[test]
    fn write_file_replaces_content() {
        let root = memory_root();
        root.write_file("f", "long content").unwrap();
        root.write_file("f", b"short").unwrap();
        assert_eq!(root.read_file("f").unwrap(), b"short");
    }

    #[test]
    fn write_file_with_bad_command_leaves_file_unchanged() {
        let root = memory_root();
        root.write_file("f", "keep").unwrap();
        let bad = crate::WriteParams {
            kind: crate::CommandType::Seek,
            ..Default::default()
        };
        assert!(matches!(root.write_file("f", bad), Err(FsError::Syntax { .. })));
        assert_eq!(root.read_to_string("f").unwrap(), "keep");
    }

    #[test]
    fn read_file_reports_kind_mismatch() {
        let root = memory_root();
        root.get_directory_handle("d", GetOptions::CREATE).unwrap();
        assert!(matches!(root.read_file("d"), Err(FsError::TypeMismatch { .. })));
        assert!(matches!(root.read_file("nope"), Err(FsError::NotFound { .. })));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip() {
        use std::collections::BTreeMap;

        let root = memory_root();
        let value = BTreeMap::from([("answer".to_string(), 42)]);
        root.write_json("config.json", &value).unwrap();
        let back: BTreeMap<String, i32> = root.read_json("config.json").unwrap();
        assert_eq!(back, value);
    }
}
