//! Directory operations of a storage adapter.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::{EntryKind, FileAdapter, FsError};

/// A child adapter yielded by [`DirectoryAdapter::entries`] or returned by
/// a lookup.
#[derive(Clone)]
pub enum AdapterEntry {
    /// A file.
    File(Arc<dyn FileAdapter>),
    /// A directory.
    Directory(Arc<dyn DirectoryAdapter>),
}

impl AdapterEntry {
    /// Kind of the child.
    pub fn kind(&self) -> EntryKind {
        match self {
            AdapterEntry::File(_) => EntryKind::File,
            AdapterEntry::Directory(_) => EntryKind::Directory,
        }
    }
}

impl fmt::Debug for AdapterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterEntry::File(file) => f.debug_tuple("File").field(&file.name()).finish(),
            AdapterEntry::Directory(dir) => f.debug_tuple("Directory").field(&dir.name()).finish(),
        }
    }
}

/// Directory operations of a storage backend.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods use `&self` to allow
/// concurrent access.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn DirectoryAdapter`.
pub trait DirectoryAdapter: Send + Sync {
    /// Name of this directory (empty for most roots).
    fn name(&self) -> &str;

    /// Whether entries below this directory may be written.
    fn writable(&self) -> bool;

    /// List children.
    ///
    /// Every call starts a fresh sequence. Order is backend-defined.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if this directory has been removed
    fn entries(&self) -> Result<EntryIter, FsError>;

    /// Look up (or create) a child directory.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if absent and `create` is false, or if this
    ///   directory has been removed
    /// - [`FsError::TypeMismatch`] if a file with that name exists
    fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryAdapter>, FsError>;

    /// Look up (or create) a child file.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if absent and `create` is false, or if this
    ///   directory has been removed
    /// - [`FsError::TypeMismatch`] if a directory with that name exists
    fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileAdapter>, FsError>;

    /// Remove a child.
    ///
    /// Recursive removal frees all descendant storage. Refused removals
    /// leave every entry untouched.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the child does not exist
    /// - [`FsError::InvalidModification`] if the child is a non-empty
    ///   directory and `recursive` is false
    fn remove_entry(&self, name: &str, recursive: bool) -> Result<(), FsError>;

    /// Backend identity comparison.
    fn is_same_entry(&self, other: &dyn DirectoryAdapter) -> bool;

    /// Upcast used by [`is_same_entry`](Self::is_same_entry) implementations
    /// to recover the concrete type of `other`.
    fn as_any(&self) -> &dyn Any;
}

/// Iterator over the children of a directory.
///
/// Wraps a boxed iterator so each backend can stay as lazy as its storage
/// allows.
///
/// - Outer `Result` (from [`DirectoryAdapter::entries`]) = "can I open this directory?"
/// - Inner `Result` (per item) = "can I read this entry?"
pub struct EntryIter(Box<dyn Iterator<Item = Result<(String, AdapterEntry), FsError>> + Send + 'static>);

impl EntryIter {
    /// Create from any compatible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<(String, AdapterEntry), FsError>> + Send + 'static,
    {
        Self(Box::new(iter))
    }

    /// Create from a pre-collected vector.
    pub fn from_vec(entries: Vec<(String, AdapterEntry)>) -> Self {
        Self(Box::new(entries.into_iter().map(Ok)))
    }

    /// Collect all entries, short-circuiting on first error.
    pub fn collect_all(self) -> Result<Vec<(String, AdapterEntry)>, FsError> {
        self.collect()
    }
}

impl Iterator for EntryIter {
    type Item = Result<(String, AdapterEntry), FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CreateWritableOptions, File, WriteSink};

    struct StubFile(&'static str);

    impl FileAdapter for StubFile {
        fn name(&self) -> &str {
            self.0
        }

        fn writable(&self) -> bool {
            false
        }

        fn get_file(&self) -> Result<File, FsError> {
            Ok(File::new(self.0, vec![], std::time::SystemTime::UNIX_EPOCH))
        }

        fn create_writable(&self, _: CreateWritableOptions) -> Result<Box<dyn WriteSink>, FsError> {
            Err(FsError::NotAllowed {
                operation: "create_writable",
            })
        }

        fn is_same_entry(&self, _: &dyn FileAdapter) -> bool {
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn entry_iter_from_vec() {
        let iter = EntryIter::from_vec(vec![
            ("a".into(), AdapterEntry::File(Arc::new(StubFile("a")))),
            ("b".into(), AdapterEntry::File(Arc::new(StubFile("b")))),
        ]);
        let collected = iter.collect_all().unwrap();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].0, "a");
        assert_eq!(collected[1].1.kind(), EntryKind::File);
    }

    #[test]
    fn entry_iter_collect_all_error() {
        let items: Vec<Result<(String, AdapterEntry), FsError>> = vec![
            Ok(("a".into(), AdapterEntry::File(Arc::new(StubFile("a"))))),
            Err(FsError::NotFound { name: "b".into() }),
        ];
        let iter = EntryIter::new(items.into_iter());
        assert!(iter.collect_all().is_err());
    }

    #[test]
    fn entry_iter_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<EntryIter>();
    }

    #[test]
    fn adapter_entry_debug_shows_name() {
        let entry = AdapterEntry::File(Arc::new(StubFile("notes.txt")));
        assert_eq!(format!("{entry:?}"), "File(\"notes.txt\")");
    }
}
