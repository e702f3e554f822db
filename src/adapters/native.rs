//! Direct access to an existing host directory.
//!
//! Entries are read lazily from the host. A stream writes into a hidden
//! swap file (`.<name>.XXXXXX.crswap`) next to its target and renames it over
//! the target on commit, so readers only ever see committed content. Swap
//! files are never listed.

use std::any::Any;
use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::adapters::host;
use crate::buffer;
use crate::{
    AdapterEntry, CreateWritableOptions, DirectoryAdapter, EntryIter, EntryKind, File, FileAdapter, FsError,
    WriteCommand, WriteSink,
};

const SWAP_SUFFIX: &str = ".crswap";

/// Options for opening a host directory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NativeOptions {
    /// Existing host directory to expose.
    pub root: PathBuf,
}

impl NativeOptions {
    /// Expose `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Open the host directory described by `options`.
///
/// # Errors
///
/// - [`FsError::NotFound`] if the directory does not exist
/// - [`FsError::TypeMismatch`] if the path is a file
pub fn open_native(options: NativeOptions) -> Result<NativeDirectory, FsError> {
    let path = fs::canonicalize(&options.root).map_err(|e| FsError::from_io("canonicalize", &options.root, e))?;
    let name = file_name(&path);
    host::expect_kind(&path, &name, EntryKind::Directory)?;
    debug!(root = %path.display(), "opened native directory");
    Ok(NativeDirectory { path, name })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_swap_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(SWAP_SUFFIX)
}

fn is_read_only(path: &Path) -> Result<bool, FsError> {
    fs::metadata(path)
        .map(|m| m.permissions().readonly())
        .map_err(|e| FsError::from_io("metadata", path, e))
}

/// A host directory.
pub struct NativeDirectory {
    /// Canonical absolute path.
    path: PathBuf,
    name: String,
}

impl NativeDirectory {
    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DirectoryAdapter for NativeDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        is_read_only(&self.path).map(|ro| !ro).unwrap_or(false)
    }

    fn entries(&self) -> Result<EntryIter, FsError> {
        let dir = self.path.clone();
        host::expect_live(&dir, &self.name, EntryKind::Directory)?;
        let reader = fs::read_dir(&dir).map_err(|e| FsError::from_io("read_dir", &dir, e))?;
        let iter = reader.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(FsError::from_io("read_dir", &dir, e))),
            };
            let name = entry.file_name().into_string().ok()?;
            if is_swap_file(&name) {
                return None;
            }
            let path = entry.path();
            let adapter = match entry.file_type() {
                Ok(t) if t.is_dir() => AdapterEntry::Directory(Arc::new(NativeDirectory {
                    path,
                    name: name.clone(),
                })),
                Ok(_) => AdapterEntry::File(Arc::new(NativeFile {
                    path,
                    name: name.clone(),
                })),
                Err(e) => return Some(Err(FsError::from_io("file_type", path, e))),
            };
            Some(Ok((name, adapter)))
        });
        Ok(EntryIter::new(iter))
    }

    fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        if host::lookup_or_create(&self.path, name, EntryKind::Directory, create)? {
            debug!(path = %self.path.join(name).display(), "created native directory");
        }
        Ok(Arc::new(NativeDirectory {
            path: self.path.join(name),
            name: name.to_owned(),
        }))
    }

    fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileAdapter>, FsError> {
        if host::lookup_or_create(&self.path, name, EntryKind::File, create)? {
            debug!(path = %self.path.join(name).display(), "created native file");
        }
        Ok(Arc::new(NativeFile {
            path: self.path.join(name),
            name: name.to_owned(),
        }))
    }

    fn remove_entry(&self, name: &str, recursive: bool) -> Result<(), FsError> {
        host::remove_child(&self.path, name, recursive)?;
        debug!(path = %self.path.join(name).display(), recursive, "removed native entry");
        Ok(())
    }

    fn is_same_entry(&self, other: &dyn DirectoryAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<NativeDirectory>()
            .is_some_and(|other| self.path == other.path)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A host file.
pub struct NativeFile {
    path: PathBuf,
    name: String,
}

impl NativeFile {
    /// Absolute path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileAdapter for NativeFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        is_read_only(&self.path).map(|ro| !ro).unwrap_or(false)
    }

    fn get_file(&self) -> Result<File, FsError> {
        host::expect_live(&self.path, &self.name, EntryKind::File)?;
        let data = fs::read(&self.path).map_err(|e| FsError::from_io("read", &self.path, e))?;
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| FsError::from_io("metadata", &self.path, e))?;
        Ok(File::new(self.name.clone(), data, modified))
    }

    fn create_writable(&self, options: CreateWritableOptions) -> Result<Box<dyn WriteSink>, FsError> {
        host::expect_live(&self.path, &self.name, EntryKind::File)?;
        if is_read_only(&self.path)? {
            return Err(FsError::NotAllowed {
                operation: "create_writable",
            });
        }
        // a symlinked file is committed through to the file it points at
        let target = fs::canonicalize(&self.path).map_err(|e| FsError::from_io("canonicalize", &self.path, e))?;
        let dir = target.parent().unwrap_or(Path::new("."));
        let prefix = format!(".{}.", file_name(&target));
        let mut swap = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(SWAP_SUFFIX)
            .tempfile_in(dir)
            .map_err(|e| FsError::from_io("create swap file", dir, e))?;

        let mut len = 0;
        if options.keep_existing_data {
            let mut source = fs::File::open(&self.path).map_err(|e| FsError::from_io("open", &self.path, e))?;
            len = io::copy(&mut source, swap.as_file_mut()).map_err(|e| FsError::from_io("copy", swap.path(), e))?;
        }
        trace!(file = %self.path.display(), swap = %swap.path().display(), "opened swap file");

        Ok(Box::new(NativeSink {
            entry: self.path.clone(),
            target,
            name: self.name.clone(),
            swap: Some(swap),
            position: 0,
            len,
        }))
    }

    fn is_same_entry(&self, other: &dyn FileAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<NativeFile>()
            .is_some_and(|other| self.path == other.path)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Stages commands in a swap file; the swap file is deleted on drop unless
/// it has been persisted.
struct NativeSink {
    entry: PathBuf,
    target: PathBuf,
    name: String,
    swap: Option<NamedTempFile>,
    position: u64,
    len: u64,
}

impl NativeSink {
    fn swap(&mut self) -> Result<&mut NamedTempFile, FsError> {
        self.swap.as_mut().ok_or(FsError::StreamClosed { operation: "write" })
    }

    fn write_at(&mut self, position: u64, data: &[u8]) -> Result<(), FsError> {
        let swap = self.swap()?;
        let file = swap.as_file_mut();
        file.seek(SeekFrom::Start(position))
            .and_then(|_| file.write_all(data))
            .map_err(|e| FsError::from_io("write", swap.path(), e))?;
        self.position = position + data.len() as u64;
        self.len = self.len.max(self.position);
        Ok(())
    }

    fn set_len(&mut self, size: u64) -> Result<(), FsError> {
        let swap = self.swap()?;
        swap.as_file()
            .set_len(size)
            .map_err(|e| FsError::from_io("truncate", swap.path(), e))?;
        self.len = size;
        self.position = self.position.min(size);
        Ok(())
    }
}

impl WriteSink for NativeSink {
    fn write(&mut self, command: WriteCommand) -> Result<(), FsError> {
        host::expect_live(&self.entry, &self.name, EntryKind::File)?;
        match command {
            WriteCommand::Write { position, data } => {
                let position = position.unwrap_or(self.position);
                buffer::write_end(position, data.len(), self.len)?;
                if position > self.len {
                    self.set_len(position)?;
                }
                self.write_at(position, &data)
            }
            WriteCommand::Seek { position } => {
                if position > self.len {
                    return Err(FsError::InvalidState {
                        position,
                        size: self.len,
                    });
                }
                self.position = position;
                Ok(())
            }
            WriteCommand::Truncate { size } => {
                buffer::check_len(size, self.len)?;
                self.set_len(size)
            }
        }
    }

    fn close(&mut self) -> Result<(), FsError> {
        let swap = self.swap.take().ok_or(FsError::StreamClosed { operation: "close" })?;
        host::expect_live(&self.entry, &self.name, EntryKind::File)?;
        let permissions = fs::metadata(&self.target)
            .map_err(|e| FsError::from_io("metadata", &self.target, e))?
            .permissions();
        swap.as_file()
            .set_permissions(permissions)
            .and_then(|()| swap.as_file().sync_all())
            .map_err(|e| FsError::from_io("sync", swap.path(), e))?;
        swap.persist(&self.target)
            .map_err(|e| FsError::from_io("persist", &self.target, e.error))?;
        debug!(path = %self.target.display(), size = self.len, "committed native file");
        Ok(())
    }

    fn abort(&mut self) -> Result<(), FsError> {
        if let Some(swap) = self.swap.take() {
            let path = swap.path().to_path_buf();
            swap.close().map_err(|e| FsError::from_io("remove swap file", path, e))?;
        }
        Ok(())
    }
}
