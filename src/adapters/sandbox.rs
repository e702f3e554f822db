//! Sandboxed host storage with an optional byte quota.
//!
//! All entries live below one root directory, created on open. Streams stage
//! in memory; a commit takes the sandbox-wide commit lock, re-checks that the
//! file still exists, verifies the quota and writes the file in place.

use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::adapters::host;
use crate::buffer::StagedBuffer;
use crate::{
    AdapterEntry, CreateWritableOptions, DirectoryAdapter, EntryIter, EntryKind, File, FileAdapter, FsError,
    WriteCommand, WriteSink,
};

/// Options for opening a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SandboxOptions {
    /// Host directory holding the sandbox; created if missing.
    pub root: PathBuf,
    /// Maximum total size of all files, in bytes.
    #[cfg_attr(feature = "serde", serde(default))]
    pub quota: Option<u64>,
}

impl SandboxOptions {
    /// Sandbox at `root` without a quota.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota: None,
        }
    }

    /// Set the quota in bytes.
    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = Some(quota);
        self
    }
}

struct Sandbox {
    root: PathBuf,
    quota: Option<u64>,
    commit_lock: Mutex<()>,
}

impl Sandbox {
    fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

/// Open the sandbox described by `options`.
///
/// # Errors
///
/// - [`FsError::Io`] if the root directory can not be created
pub fn open_sandbox(options: SandboxOptions) -> Result<SandboxDirectory, FsError> {
    fs::create_dir_all(&options.root).map_err(|e| FsError::from_io("create_dir_all", &options.root, e))?;
    debug!(root = %options.root.display(), quota = ?options.quota, "opened sandbox");
    Ok(SandboxDirectory {
        sandbox: Arc::new(Sandbox {
            root: options.root,
            quota: options.quota,
            commit_lock: Mutex::new(()),
        }),
        path: PathBuf::new(),
        name: String::new(),
    })
}

/// A directory inside a sandbox.
pub struct SandboxDirectory {
    sandbox: Arc<Sandbox>,
    /// Path relative to the sandbox root.
    path: PathBuf,
    name: String,
}

impl SandboxDirectory {
    fn child_dir(&self, name: &str) -> SandboxDirectory {
        SandboxDirectory {
            sandbox: self.sandbox.clone(),
            path: self.path.join(name),
            name: name.to_owned(),
        }
    }

    fn child_file(&self, name: &str) -> SandboxFile {
        SandboxFile {
            sandbox: self.sandbox.clone(),
            path: self.path.join(name),
            name: name.to_owned(),
        }
    }
}

impl DirectoryAdapter for SandboxDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        true
    }

    fn entries(&self) -> Result<EntryIter, FsError> {
        let dir = self.sandbox.absolute(&self.path);
        host::expect_live(&dir, &self.name, EntryKind::Directory)?;
        let reader = fs::read_dir(&dir).map_err(|e| FsError::from_io("read_dir", &dir, e))?;

        let mut entries = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|e| FsError::from_io("read_dir", &dir, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let file_type = entry
                .file_type()
                .map_err(|e| FsError::from_io("file_type", entry.path(), e))?;
            let adapter = if file_type.is_dir() {
                AdapterEntry::Directory(Arc::new(self.child_dir(&name)))
            } else {
                AdapterEntry::File(Arc::new(self.child_file(&name)))
            };
            entries.push((name, adapter));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(EntryIter::from_vec(entries))
    }

    fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        let dir = self.sandbox.absolute(&self.path);
        if host::lookup_or_create(&dir, name, EntryKind::Directory, create)? {
            debug!(path = %self.path.join(name).display(), "created sandbox directory");
        }
        Ok(Arc::new(self.child_dir(name)))
    }

    fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileAdapter>, FsError> {
        let dir = self.sandbox.absolute(&self.path);
        if host::lookup_or_create(&dir, name, EntryKind::File, create)? {
            debug!(path = %self.path.join(name).display(), "created sandbox file");
        }
        Ok(Arc::new(self.child_file(name)))
    }

    fn remove_entry(&self, name: &str, recursive: bool) -> Result<(), FsError> {
        let dir = self.sandbox.absolute(&self.path);
        host::remove_child(&dir, name, recursive)?;
        debug!(path = %self.path.join(name).display(), recursive, "removed sandbox entry");
        Ok(())
    }

    fn is_same_entry(&self, other: &dyn DirectoryAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<SandboxDirectory>()
            .is_some_and(|other| self.sandbox.root == other.sandbox.root && self.path == other.path)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A file inside a sandbox.
pub struct SandboxFile {
    sandbox: Arc<Sandbox>,
    path: PathBuf,
    name: String,
}

impl SandboxFile {
    fn read(&self) -> Result<(Vec<u8>, std::time::SystemTime), FsError> {
        let path = self.sandbox.absolute(&self.path);
        host::expect_live(&path, &self.name, EntryKind::File)?;
        let data = fs::read(&path).map_err(|e| FsError::from_io("read", &path, e))?;
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| FsError::from_io("metadata", &path, e))?;
        Ok((data, modified))
    }
}

impl FileAdapter for SandboxFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        true
    }

    fn get_file(&self) -> Result<File, FsError> {
        let (data, modified) = self.read()?;
        Ok(File::new(self.name.clone(), data, modified))
    }

    fn create_writable(&self, options: CreateWritableOptions) -> Result<Box<dyn WriteSink>, FsError> {
        let initial = if options.keep_existing_data {
            self.read()?.0
        } else {
            host::expect_live(&self.sandbox.absolute(&self.path), &self.name, EntryKind::File)?;
            Vec::new()
        };
        Ok(Box::new(SandboxSink {
            sandbox: self.sandbox.clone(),
            path: self.sandbox.absolute(&self.path),
            name: self.name.clone(),
            buffer: StagedBuffer::new(initial),
        }))
    }

    fn is_same_entry(&self, other: &dyn FileAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<SandboxFile>()
            .is_some_and(|other| self.sandbox.root == other.sandbox.root && self.path == other.path)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SandboxSink {
    sandbox: Arc<Sandbox>,
    /// Absolute path of the target file.
    path: PathBuf,
    name: String,
    buffer: StagedBuffer,
}

impl SandboxSink {
    fn check_quota(&self) -> Result<(), FsError> {
        let Some(limit) = self.sandbox.quota else {
            return Ok(());
        };
        let usage = host::disk_usage(&self.sandbox.root)?;
        let current = fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| FsError::from_io("metadata", &self.path, e))?;
        let requested = self.buffer.len();
        if usage - current.min(usage) + requested > limit {
            return Err(FsError::QuotaExceeded {
                limit,
                requested,
                usage,
            });
        }
        Ok(())
    }
}

impl WriteSink for SandboxSink {
    fn write(&mut self, command: WriteCommand) -> Result<(), FsError> {
        host::expect_live(&self.path, &self.name, EntryKind::File)?;
        self.buffer.apply(command)
    }

    fn close(&mut self) -> Result<(), FsError> {
        let _guard = self.sandbox.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        host::expect_live(&self.path, &self.name, EntryKind::File)?;
        self.check_quota()?;
        fs::write(&self.path, self.buffer.as_slice()).map_err(|e| FsError::from_io("write", &self.path, e))?;
        debug!(path = %self.path.display(), size = self.buffer.len(), "committed sandbox file");
        self.buffer = StagedBuffer::default();
        Ok(())
    }
}
