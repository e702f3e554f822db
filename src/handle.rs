//! # Handles
//!
//! Backend-agnostic capability objects. A handle validates its input and
//! delegates to the adapter it owns; it never caches content, so every call
//! re-touches the backend.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`DirectoryHandle`] | Navigate, enumerate and modify a directory |
//! | [`FileHandle`] | Read committed content, open writable streams |
//! | [`Handle`] | Either of the two, as yielded by iteration |

use std::fmt;
use std::sync::Arc;

use crate::path_resolver::{DepthFirstResolver, PathResolver};
use crate::{
    AdapterEntry, CreateWritableOptions, DirectoryAdapter, EntryIter, EntryKind, File, FileAdapter,
    FsError, GetOptions, PermissionMode, PermissionState, RemoveOptions, WritableFileStream,
};

/// Check an entry name against the naming rules.
///
/// Names must be non-empty, must not be `.` or `..` and must not contain a
/// path separator (`/` or `\`).
///
/// # Errors
///
/// - [`FsError::InvalidName`] describing the violated rule
///
/// # Example
///
/// ```rust
/// use fs_handles::validate_name;
///
/// assert!(validate_name("notes.txt").is_ok());
/// assert!(validate_name("").is_err());
/// assert!(validate_name("..").is_err());
/// assert!(validate_name("a/b").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<(), FsError> {
    let reason = if name.is_empty() {
        "name can't be an empty string"
    } else if name == "." || name == ".." {
        "name is a reserved path component"
    } else if name.contains(['/', '\\']) {
        "name contains a path separator"
    } else {
        return Ok(());
    };
    Err(FsError::InvalidName {
        name: name.to_owned(),
        reason,
    })
}

/// Stub capability check shared by every handle.
///
/// Read access is always granted; read-write access is granted iff the
/// adapter is writable.
pub fn permission_state(mode: PermissionMode, writable: bool) -> PermissionState {
    match mode {
        PermissionMode::Read => PermissionState::Granted,
        PermissionMode::ReadWrite if writable => PermissionState::Granted,
        PermissionMode::ReadWrite => PermissionState::Denied,
    }
}

// ============================================================================
// Handle
// ============================================================================

/// A file or directory handle.
#[derive(Clone, Debug)]
pub enum Handle {
    /// A file handle.
    File(FileHandle),
    /// A directory handle.
    Directory(DirectoryHandle),
}

impl Handle {
    fn from_adapter(entry: AdapterEntry) -> Self {
        match entry {
            AdapterEntry::File(adapter) => Handle::File(FileHandle { adapter }),
            AdapterEntry::Directory(adapter) => Handle::Directory(DirectoryHandle { adapter }),
        }
    }

    /// Kind of the entry.
    pub fn kind(&self) -> EntryKind {
        match self {
            Handle::File(_) => EntryKind::File,
            Handle::Directory(_) => EntryKind::Directory,
        }
    }

    /// Name of the entry.
    pub fn name(&self) -> &str {
        match self {
            Handle::File(file) => file.name(),
            Handle::Directory(dir) => dir.name(),
        }
    }

    /// `true` iff both handles are of the same kind and the adapter reports
    /// the same underlying entry.
    pub fn is_same_entry(&self, other: &Handle) -> bool {
        match (self, other) {
            (Handle::File(a), Handle::File(b)) => a.adapter.is_same_entry(b.adapter.as_ref()),
            (Handle::Directory(a), Handle::Directory(b)) => a.adapter.is_same_entry(b.adapter.as_ref()),
            _ => false,
        }
    }

    /// Current permission for `mode`.
    pub fn query_permission(&self, mode: PermissionMode) -> PermissionState {
        permission_state(mode, self.writable())
    }

    /// Request permission for `mode`. No prompt is shown; the answer equals
    /// [`query_permission`](Self::query_permission).
    pub fn request_permission(&self, mode: PermissionMode) -> PermissionState {
        self.query_permission(mode)
    }

    fn writable(&self) -> bool {
        match self {
            Handle::File(file) => file.adapter.writable(),
            Handle::Directory(dir) => dir.adapter.writable(),
        }
    }

    /// The file handle, if this is a file.
    pub fn as_file(&self) -> Option<&FileHandle> {
        match self {
            Handle::File(file) => Some(file),
            Handle::Directory(_) => None,
        }
    }

    /// The directory handle, if this is a directory.
    pub fn as_directory(&self) -> Option<&DirectoryHandle> {
        match self {
            Handle::Directory(dir) => Some(dir),
            Handle::File(_) => None,
        }
    }
}

impl From<FileHandle> for Handle {
    fn from(file: FileHandle) -> Self {
        Handle::File(file)
    }
}

impl From<DirectoryHandle> for Handle {
    fn from(dir: DirectoryHandle) -> Self {
        Handle::Directory(dir)
    }
}

// ============================================================================
// DirectoryHandle
// ============================================================================

/// Handle to a directory.
///
/// # Example
///
/// ```rust
/// use fs_handles::{memory_root, GetOptions, RemoveOptions};
///
/// # fn main() -> Result<(), fs_handles::FsError> {
/// let root = memory_root();
/// let docs = root.get_directory_handle("docs", GetOptions::CREATE)?;
/// docs.get_file_handle("a.txt", GetOptions::CREATE)?;
///
/// let names: Vec<String> = docs.keys()?.collect::<Result<_, _>>()?;
/// assert_eq!(names, ["a.txt"]);
///
/// root.remove_entry("docs", RemoveOptions::RECURSIVE)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DirectoryHandle {
    adapter: Arc<dyn DirectoryAdapter>,
}

impl DirectoryHandle {
    /// Wrap a directory adapter.
    pub fn new(adapter: Arc<dyn DirectoryAdapter>) -> Self {
        Self { adapter }
    }

    /// Always [`EntryKind::Directory`].
    pub fn kind(&self) -> EntryKind {
        EntryKind::Directory
    }

    /// Name of the directory.
    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Look up a child directory, creating it when `options.create` is set.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidName`] if `name` breaks the naming rules
    /// - [`FsError::TypeMismatch`] if a file with that name exists
    /// - [`FsError::NotFound`] if absent and `create` is false
    pub fn get_directory_handle(&self, name: &str, options: GetOptions) -> Result<DirectoryHandle, FsError> {
        validate_name(name)?;
        let adapter = self.adapter.get_directory(name, options.create)?;
        Ok(DirectoryHandle { adapter })
    }

    /// Look up a child file, creating an empty one when `options.create` is set.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidName`] if `name` breaks the naming rules
    /// - [`FsError::TypeMismatch`] if a directory with that name exists
    /// - [`FsError::NotFound`] if absent and `create` is false
    pub fn get_file_handle(&self, name: &str, options: GetOptions) -> Result<FileHandle, FsError> {
        validate_name(name)?;
        let adapter = self.adapter.get_file(name, options.create)?;
        Ok(FileHandle { adapter })
    }

    /// Iterate `(name, handle)` pairs. Each call starts a fresh sequence.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if this directory has been removed
    pub fn entries(&self) -> Result<Entries, FsError> {
        Ok(Entries(self.adapter.entries()?))
    }

    /// Iterate child names.
    pub fn keys(&self) -> Result<Keys, FsError> {
        Ok(Keys(self.entries()?))
    }

    /// Iterate child handles.
    pub fn values(&self) -> Result<Values, FsError> {
        Ok(Values(self.entries()?))
    }

    /// Remove a child entry.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidName`] if `name` breaks the naming rules
    /// - [`FsError::NotFound`] if the child does not exist
    /// - [`FsError::InvalidModification`] if the child is a non-empty
    ///   directory and `options.recursive` is false
    pub fn remove_entry(&self, name: &str, options: RemoveOptions) -> Result<(), FsError> {
        validate_name(name)?;
        self.adapter.remove_entry(name, options.recursive)
    }

    /// Relative path from this directory to `other`.
    ///
    /// Returns `Some(vec![])` for this directory itself and `None` when
    /// `other` is not a descendant.
    pub fn resolve(&self, other: &Handle) -> Result<Option<Vec<String>>, FsError> {
        self.resolve_with(&DepthFirstResolver, other)
    }

    /// [`resolve`](Self::resolve) with an explicit search strategy.
    pub fn resolve_with(&self, resolver: &dyn PathResolver, other: &Handle) -> Result<Option<Vec<String>>, FsError> {
        resolver.resolve(self, other)
    }

    /// `true` iff `other` is a directory handle for the same entry.
    pub fn is_same_entry(&self, other: &Handle) -> bool {
        match other {
            Handle::Directory(dir) => self.adapter.is_same_entry(dir.adapter.as_ref()),
            Handle::File(_) => false,
        }
    }

    /// Current permission for `mode`.
    pub fn query_permission(&self, mode: PermissionMode) -> PermissionState {
        permission_state(mode, self.adapter.writable())
    }

    /// Request permission for `mode`.
    pub fn request_permission(&self, mode: PermissionMode) -> PermissionState {
        self.query_permission(mode)
    }
}

impl fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`DirectoryHandle::entries`].
pub struct Entries(EntryIter);

impl Iterator for Entries {
    type Item = Result<(String, Handle), FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0
            .next()
            .map(|entry| entry.map(|(name, adapter)| (name, Handle::from_adapter(adapter))))
    }
}

/// Iterator returned by [`DirectoryHandle::keys`].
pub struct Keys(Entries);

impl Iterator for Keys {
    type Item = Result<String, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|entry| entry.map(|(name, _)| name))
    }
}

/// Iterator returned by [`DirectoryHandle::values`].
pub struct Values(Entries);

impl Iterator for Values {
    type Item = Result<Handle, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|entry| entry.map(|(_, handle)| handle))
    }
}

// ============================================================================
// FileHandle
// ============================================================================

/// Handle to a file.
#[derive(Clone)]
pub struct FileHandle {
    adapter: Arc<dyn FileAdapter>,
}

impl FileHandle {
    /// Wrap a file adapter.
    pub fn new(adapter: Arc<dyn FileAdapter>) -> Self {
        Self { adapter }
    }

    /// Always [`EntryKind::File`].
    pub fn kind(&self) -> EntryKind {
        EntryKind::File
    }

    /// Name of the file.
    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Snapshot of the committed content.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file has been removed
    pub fn get_file(&self) -> Result<File, FsError> {
        self.adapter.get_file()
    }

    /// Open a transactional writable stream.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotAllowed`] if the file is read-only
    /// - [`FsError::NotFound`] if the file has been removed
    pub fn create_writable(&self, options: CreateWritableOptions) -> Result<WritableFileStream, FsError> {
        if !self.adapter.writable() {
            return Err(FsError::NotAllowed {
                operation: "create_writable",
            });
        }
        let sink = self.adapter.create_writable(options)?;
        Ok(WritableFileStream::new(self.name(), sink))
    }

    /// `true` iff `other` is a file handle for the same entry.
    pub fn is_same_entry(&self, other: &Handle) -> bool {
        match other {
            Handle::File(file) => self.adapter.is_same_entry(file.adapter.as_ref()),
            Handle::Directory(_) => false,
        }
    }

    /// Current permission for `mode`.
    pub fn query_permission(&self, mode: PermissionMode) -> PermissionState {
        permission_state(mode, self.adapter.writable())
    }

    /// Request permission for `mode`.
    pub fn request_permission(&self, mode: PermissionMode) -> PermissionState {
        self.query_permission(mode)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_root;

    #[test]
    fn validate_name_rules() {
        for bad in ["", ".", "..", "a/b", "a\\b", "/"] {
            let err = validate_name(bad).unwrap_err();
            assert!(err.is_type_error(), "{bad:?} should be a type error");
        }
        for good in ["a", "...", ".hidden", "file name.txt"] {
            assert!(validate_name(good).is_ok(), "{good:?} should be valid");
        }
    }

    #[test]
    fn permission_state_table() {
        assert_eq!(permission_state(PermissionMode::Read, false), PermissionState::Granted);
        assert_eq!(permission_state(PermissionMode::Read, true), PermissionState::Granted);
        assert_eq!(permission_state(PermissionMode::ReadWrite, true), PermissionState::Granted);
        assert_eq!(permission_state(PermissionMode::ReadWrite, false), PermissionState::Denied);
    }

    #[test]
    fn handle_kind_and_name() {
        let root = memory_root();
        let dir = root.get_directory_handle("d", GetOptions::CREATE).unwrap();
        let file = root.get_file_handle("f", GetOptions::CREATE).unwrap();
        let dir = Handle::from(dir);
        let file = Handle::from(file);
        assert_eq!(dir.kind(), EntryKind::Directory);
        assert_eq!(file.kind(), EntryKind::File);
        assert_eq!(dir.name(), "d");
        assert!(file.as_file().is_some());
        assert!(file.as_directory().is_none());
    }

    #[test]
    fn same_entry_requires_same_kind() {
        let root = memory_root();
        let a = root.get_file_handle("x", GetOptions::CREATE).unwrap();
        let b = root.get_file_handle("x", GetOptions::EXISTING).unwrap();
        let d = root.get_directory_handle("y", GetOptions::CREATE).unwrap();
        assert!(a.is_same_entry(&Handle::from(b)));
        assert!(!a.is_same_entry(&Handle::from(d.clone())));
        assert!(!d.is_same_entry(&Handle::from(a)));
    }

    #[test]
    fn invalid_names_rejected_before_storage() {
        let root = memory_root();
        assert!(matches!(
            root.get_file_handle("a/b", GetOptions::CREATE),
            Err(FsError::InvalidName { .. })
        ));
        assert!(matches!(
            root.remove_entry("..", RemoveOptions::RECURSIVE),
            Err(FsError::InvalidName { .. })
        ));
        assert_eq!(root.entries().unwrap().count(), 0);
    }

    #[test]
    fn debug_shows_name() {
        let root = memory_root();
        let file = root.get_file_handle("notes", GetOptions::CREATE).unwrap();
        assert!(format!("{file:?}").contains("notes"));
    }
}
