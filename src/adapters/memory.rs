//! In-memory object graph.
//!
//! Every directory owns its children behind a lock. Removing an entry
//! detaches it and marks the whole detached subtree deleted, so handles that
//! still point into it fail with [`FsError::NotFound`].

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::buffer::StagedBuffer;
use crate::types::FileRecord;
use crate::{
    AdapterEntry, CreateWritableOptions, DirectoryAdapter, EntryIter, EntryKind, File, FileAdapter, FsError,
    WriteCommand, WriteSink,
};

#[derive(Clone)]
enum MemoryEntry {
    File(Arc<MemoryFile>),
    Directory(Arc<MemoryDirectory>),
}

impl MemoryEntry {
    fn mark_deleted(&self) {
        match self {
            MemoryEntry::File(file) => file.mark_deleted(),
            MemoryEntry::Directory(dir) => dir.mark_deleted(),
        }
    }

    fn to_adapter(&self) -> AdapterEntry {
        match self {
            MemoryEntry::File(file) => AdapterEntry::File(file.clone()),
            MemoryEntry::Directory(dir) => AdapterEntry::Directory(dir.clone()),
        }
    }
}

/// A directory node of the in-memory tree.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use fs_handles::{DirectoryHandle, GetOptions, MemoryDirectory};
///
/// # fn main() -> Result<(), fs_handles::FsError> {
/// let root = DirectoryHandle::new(Arc::new(MemoryDirectory::new("")));
/// root.get_file_handle("a.txt", GetOptions::CREATE)?;
/// assert_eq!(root.keys()?.count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryDirectory {
    name: String,
    writable: bool,
    deleted: AtomicBool,
    children: RwLock<BTreeMap<String, MemoryEntry>>,
}

impl MemoryDirectory {
    /// Create an empty, writable directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_access(name.into(), true)
    }

    fn with_access(name: String, writable: bool) -> Self {
        Self {
            name,
            writable,
            deleted: AtomicBool::new(false),
            children: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a read-only tree from `(relative path, content)` pairs.
    ///
    /// Paths use `/` as separator; intermediate directories are created as
    /// needed and empty components are skipped.
    ///
    /// # Errors
    ///
    /// - [`FsError::TypeMismatch`] if a path uses an earlier file as a
    ///   directory, or names an earlier directory as a file
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use fs_handles::{CreateWritableOptions, DirectoryHandle, GetOptions, MemoryDirectory};
    ///
    /// # fn main() -> Result<(), fs_handles::FsError> {
    /// let tree = MemoryDirectory::from_file_list("upload", [("docs/a.txt", b"hi".to_vec())])?;
    /// let root = DirectoryHandle::new(Arc::new(tree));
    /// let file = root
    ///     .get_directory_handle("docs", GetOptions::EXISTING)?
    ///     .get_file_handle("a.txt", GetOptions::EXISTING)?;
    /// assert_eq!(file.get_file()?.bytes(), b"hi");
    /// assert!(file.create_writable(CreateWritableOptions::default()).is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file_list<P, I>(root_name: impl Into<String>, files: I) -> Result<Self, FsError>
    where
        P: AsRef<str>,
        I: IntoIterator<Item = (P, Vec<u8>)>,
    {
        let root = Self::with_access(root_name.into(), false);
        for (path, data) in files {
            let mut parts: Vec<&str> = path.as_ref().split('/').filter(|p| !p.is_empty()).collect();
            let Some(file_name) = parts.pop() else {
                continue;
            };

            let mut dir: Option<Arc<MemoryDirectory>> = None;
            for part in parts {
                let parent = dir.as_deref().unwrap_or(&root);
                let next = {
                    let mut children = parent.children_mut();
                    match children.get(part) {
                        Some(MemoryEntry::Directory(d)) => d.clone(),
                        Some(MemoryEntry::File(_)) => {
                            return Err(FsError::TypeMismatch {
                                name: part.to_owned(),
                                expected: EntryKind::Directory,
                            });
                        }
                        None => {
                            let d = Arc::new(Self::with_access(part.to_owned(), false));
                            children.insert(part.to_owned(), MemoryEntry::Directory(d.clone()));
                            d
                        }
                    }
                };
                dir = Some(next);
            }

            let parent = dir.as_deref().unwrap_or(&root);
            let mut children = parent.children_mut();
            if let Some(MemoryEntry::Directory(_)) = children.get(file_name) {
                return Err(FsError::TypeMismatch {
                    name: file_name.to_owned(),
                    expected: EntryKind::File,
                });
            }
            let file = MemoryFile::read_only(file_name, data);
            children.insert(file_name.to_owned(), MemoryEntry::File(Arc::new(file)));
        }
        Ok(root)
    }

    fn children(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, MemoryEntry>> {
        self.children.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn children_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, MemoryEntry>> {
        self.children.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> Result<(), FsError> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(FsError::NotFound {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn ensure_writable(&self, operation: &'static str) -> Result<(), FsError> {
        if !self.writable {
            return Err(FsError::NotAllowed { operation });
        }
        Ok(())
    }

    fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
        let children = std::mem::take(&mut *self.children_mut());
        for child in children.values() {
            child.mark_deleted();
        }
    }
}

impl DirectoryAdapter for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn entries(&self) -> Result<EntryIter, FsError> {
        let children = self.children();
        self.ensure_live()?;
        let entries = children
            .iter()
            .map(|(name, entry)| (name.clone(), entry.to_adapter()))
            .collect();
        Ok(EntryIter::from_vec(entries))
    }

    fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        let mut children = self.children_mut();
        self.ensure_live()?;
        match children.get(name) {
            Some(MemoryEntry::Directory(dir)) => Ok(dir.clone()),
            Some(MemoryEntry::File(_)) => Err(FsError::TypeMismatch {
                name: name.to_owned(),
                expected: EntryKind::Directory,
            }),
            None if create => {
                self.ensure_writable("get_directory_handle")?;
                let dir = Arc::new(MemoryDirectory::new(name));
                children.insert(name.to_owned(), MemoryEntry::Directory(dir.clone()));
                debug!(parent = %self.name, name, "created memory directory");
                Ok(dir)
            }
            None => Err(FsError::NotFound { name: name.to_owned() }),
        }
    }

    fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileAdapter>, FsError> {
        let mut children = self.children_mut();
        self.ensure_live()?;
        match children.get(name) {
            Some(MemoryEntry::File(file)) => Ok(file.clone()),
            Some(MemoryEntry::Directory(_)) => Err(FsError::TypeMismatch {
                name: name.to_owned(),
                expected: EntryKind::File,
            }),
            None if create => {
                self.ensure_writable("get_file_handle")?;
                let file = Arc::new(MemoryFile::new(name));
                children.insert(name.to_owned(), MemoryEntry::File(file.clone()));
                debug!(parent = %self.name, name, "created memory file");
                Ok(file)
            }
            None => Err(FsError::NotFound { name: name.to_owned() }),
        }
    }

    fn remove_entry(&self, name: &str, recursive: bool) -> Result<(), FsError> {
        let mut children = self.children_mut();
        self.ensure_live()?;
        let entry = children
            .get(name)
            .ok_or_else(|| FsError::NotFound { name: name.to_owned() })?;
        self.ensure_writable("remove_entry")?;
        if let MemoryEntry::Directory(dir) = entry {
            if !recursive && !dir.children().is_empty() {
                return Err(FsError::InvalidModification {
                    name: name.to_owned(),
                    reason: "directory is not empty",
                });
            }
        }
        if let Some(entry) = children.remove(name) {
            entry.mark_deleted();
        }
        debug!(parent = %self.name, name, recursive, "removed memory entry");
        Ok(())
    }

    fn is_same_entry(&self, other: &dyn DirectoryAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryDirectory>()
            .is_some_and(|other| std::ptr::eq(self, other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A file node of the in-memory tree.
pub struct MemoryFile {
    name: String,
    writable: bool,
    state: Arc<FileState>,
}

struct FileState {
    deleted: AtomicBool,
    record: RwLock<FileRecord>,
}

impl FileState {
    fn ensure_live(&self, name: &str) -> Result<(), FsError> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(FsError::NotFound { name: name.to_owned() });
        }
        Ok(())
    }
}

impl MemoryFile {
    /// Create an empty, writable file.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_record(name.into(), true, FileRecord::empty())
    }

    /// Create a file with fixed content on which streams can not be opened.
    pub fn read_only(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::with_record(name.into(), false, FileRecord::new(data))
    }

    fn with_record(name: String, writable: bool, record: FileRecord) -> Self {
        Self {
            name,
            writable,
            state: Arc::new(FileState {
                deleted: AtomicBool::new(false),
                record: RwLock::new(record),
            }),
        }
    }

    fn mark_deleted(&self) {
        self.state.deleted.store(true, Ordering::Release);
    }
}

impl FileAdapter for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn get_file(&self) -> Result<File, FsError> {
        self.state.ensure_live(&self.name)?;
        let record = self.state.record.read().unwrap_or_else(PoisonError::into_inner);
        Ok(record.to_file(&self.name))
    }

    fn create_writable(&self, options: CreateWritableOptions) -> Result<Box<dyn WriteSink>, FsError> {
        if !self.writable {
            return Err(FsError::NotAllowed {
                operation: "create_writable",
            });
        }
        self.state.ensure_live(&self.name)?;
        let initial = if options.keep_existing_data {
            self.state
                .record
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .data
                .clone()
        } else {
            Vec::new()
        };
        Ok(Box::new(MemorySink {
            name: self.name.clone(),
            state: self.state.clone(),
            buffer: StagedBuffer::new(initial),
        }))
    }

    fn is_same_entry(&self, other: &dyn FileAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryFile>()
            .is_some_and(|other| Arc::ptr_eq(&self.state, &other.state))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MemorySink {
    name: String,
    state: Arc<FileState>,
    buffer: StagedBuffer,
}

impl WriteSink for MemorySink {
    fn write(&mut self, command: WriteCommand) -> Result<(), FsError> {
        self.state.ensure_live(&self.name)?;
        self.buffer.apply(command)
    }

    fn close(&mut self) -> Result<(), FsError> {
        let mut record = self.state.record.write().unwrap_or_else(PoisonError::into_inner);
        self.state.ensure_live(&self.name)?;
        let data = std::mem::take(&mut self.buffer).into_inner();
        debug!(file = %self.name, size = data.len(), "committed memory file");
        *record = FileRecord::new(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_of(dir: &MemoryDirectory, name: &str) -> Arc<dyn FileAdapter> {
        dir.get_file(name, false).unwrap()
    }

    #[test]
    fn create_and_lookup() {
        let root = MemoryDirectory::new("");
        let a = root.get_file("a", true).unwrap();
        let again = root.get_file("a", false).unwrap();
        assert!(a.is_same_entry(again.as_ref()));
        assert!(matches!(root.get_file("b", false), Err(FsError::NotFound { .. })));
        assert!(matches!(
            root.get_directory("a", true),
            Err(FsError::TypeMismatch {
                expected: EntryKind::Directory,
                ..
            })
        ));
    }

    #[test]
    fn removal_marks_subtree_deleted() {
        let root = MemoryDirectory::new("");
        let sub = root.get_directory("sub", true).unwrap();
        let nested = sub.get_file("n.txt", true).unwrap();

        assert!(matches!(
            root.remove_entry("sub", false),
            Err(FsError::InvalidModification { .. })
        ));
        assert!(nested.get_file().is_ok());

        root.remove_entry("sub", true).unwrap();
        assert!(matches!(nested.get_file(), Err(FsError::NotFound { .. })));
        assert!(matches!(sub.entries(), Err(FsError::NotFound { .. })));
        assert!(matches!(root.remove_entry("sub", true), Err(FsError::NotFound { .. })));
    }

    #[test]
    fn sink_commits_only_on_close() {
        let root = MemoryDirectory::new("");
        let file = root.get_file("f", true).unwrap();
        let mut sink = file.create_writable(CreateWritableOptions::REPLACE).unwrap();
        sink.write(WriteCommand::Write {
            position: None,
            data: b"hello".to_vec(),
        })
        .unwrap();
        assert_eq!(file.get_file().unwrap().size(), 0);
        sink.close().unwrap();
        assert_eq!(file_of(&root, "f").get_file().unwrap().bytes(), b"hello");
    }

    #[test]
    fn keep_existing_data_starts_from_committed_bytes() {
        let root = MemoryDirectory::new("");
        let file = root.get_file("f", true).unwrap();
        let mut sink = file.create_writable(CreateWritableOptions::REPLACE).unwrap();
        sink.write(WriteCommand::Write {
            position: None,
            data: b"12345".to_vec(),
        })
        .unwrap();
        sink.close().unwrap();

        let mut sink = file.create_writable(CreateWritableOptions::KEEP).unwrap();
        sink.write(WriteCommand::Write {
            position: Some(1),
            data: b"x".to_vec(),
        })
        .unwrap();
        sink.close().unwrap();
        assert_eq!(file.get_file().unwrap().bytes(), b"1x345");
    }

    #[test]
    fn commit_after_removal_fails() {
        let root = MemoryDirectory::new("");
        let file = root.get_file("f", true).unwrap();
        let mut sink = file.create_writable(CreateWritableOptions::REPLACE).unwrap();
        root.remove_entry("f", false).unwrap();
        assert!(matches!(
            sink.write(WriteCommand::Truncate { size: 1 }),
            Err(FsError::NotFound { .. })
        ));
        assert!(matches!(sink.close(), Err(FsError::NotFound { .. })));
    }

    #[test]
    fn file_list_builds_read_only_tree() {
        let tree = MemoryDirectory::from_file_list(
            "upload",
            [("a/b/c.txt", b"c".to_vec()), ("a/d.txt", b"d".to_vec()), ("top", vec![])],
        )
        .unwrap();
        assert!(!tree.writable());
        let a = tree.get_directory("a", false).unwrap();
        let names: Vec<String> = a.entries().unwrap().map(|e| e.unwrap().0).collect();
        assert_eq!(names, ["b", "d.txt"]);

        let c = a.get_directory("b", false).unwrap().get_file("c.txt", false).unwrap();
        assert_eq!(c.get_file().unwrap().bytes(), b"c");
        assert!(!c.writable());
        assert!(matches!(
            c.create_writable(CreateWritableOptions::KEEP),
            Err(FsError::NotAllowed { .. })
        ));
        assert!(matches!(a.get_file("new", true), Err(FsError::NotAllowed { .. })));
        assert!(matches!(tree.remove_entry("top", false), Err(FsError::NotAllowed { .. })));
    }

    #[test]
    fn file_list_rejects_conflicting_paths() {
        let result = MemoryDirectory::from_file_list("r", [("x", vec![]), ("x/y", vec![])]);
        assert!(matches!(result, Err(FsError::TypeMismatch { .. })));
    }
}
