//! Host-filesystem helpers shared by the sandbox and native backends.

use std::fs;
use std::io;
use std::path::Path;

use crate::{EntryKind, FsError};

/// Kind of the entry at `path`, or `None` when it does not exist.
pub(crate) fn entry_kind(path: &Path) -> Result<Option<EntryKind>, FsError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),
        Ok(_) => Ok(Some(EntryKind::File)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FsError::from_io("metadata", path, e)),
    }
}

/// Fail with [`FsError::NotFound`] if `path` is missing, or with
/// [`FsError::TypeMismatch`] if it is an entry of another kind.
pub(crate) fn expect_kind(path: &Path, name: &str, kind: EntryKind) -> Result<(), FsError> {
    match entry_kind(path)? {
        Some(found) if found == kind => Ok(()),
        Some(_) => Err(FsError::TypeMismatch {
            name: name.to_owned(),
            expected: kind,
        }),
        None => Err(FsError::NotFound { name: name.to_owned() }),
    }
}

/// Fail with [`FsError::NotFound`] unless the entry a handle refers to is
/// still at `path` with its original `kind`. An entry of the other kind at
/// the same path is a different entry.
pub(crate) fn expect_live(path: &Path, name: &str, kind: EntryKind) -> Result<(), FsError> {
    match entry_kind(path)? {
        Some(found) if found == kind => Ok(()),
        _ => Err(FsError::NotFound { name: name.to_owned() }),
    }
}

/// Look up child `name` of `dir` as `kind`, creating it when absent and
/// `create` is set. Returns `true` when the entry was created.
pub(crate) fn lookup_or_create(dir: &Path, name: &str, kind: EntryKind, create: bool) -> Result<bool, FsError> {
    expect_live(dir, dir_name(dir), EntryKind::Directory)?;
    let path = dir.join(name);
    match entry_kind(&path)? {
        Some(found) if found == kind => Ok(false),
        Some(_) => Err(FsError::TypeMismatch {
            name: name.to_owned(),
            expected: kind,
        }),
        None if create => {
            let created = match kind {
                EntryKind::Directory => fs::create_dir(&path),
                EntryKind::File => fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .map(drop),
            };
            match created {
                Ok(()) => Ok(true),
                // lost a race against a concurrent create
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => expect_kind(&path, name, kind).map(|()| false),
                Err(e) => Err(FsError::from_io("create", &path, e)),
            }
        }
        None => Err(FsError::NotFound { name: name.to_owned() }),
    }
}

/// Remove child `name` of `dir`.
pub(crate) fn remove_child(dir: &Path, name: &str, recursive: bool) -> Result<(), FsError> {
    expect_live(dir, dir_name(dir), EntryKind::Directory)?;
    let path = dir.join(name);
    let result = match entry_kind(&path)? {
        None => return Err(FsError::NotFound { name: name.to_owned() }),
        Some(EntryKind::File) => fs::remove_file(&path),
        Some(EntryKind::Directory) if recursive => fs::remove_dir_all(&path),
        Some(EntryKind::Directory) => {
            let mut children = fs::read_dir(&path).map_err(|e| FsError::from_io("read_dir", &path, e))?;
            if children.next().is_some() {
                return Err(FsError::InvalidModification {
                    name: name.to_owned(),
                    reason: "directory is not empty",
                });
            }
            fs::remove_dir(&path)
        }
    };
    result.map_err(|e| FsError::from_io("remove", &path, e))
}

/// Total size of the regular files below `path`.
pub(crate) fn disk_usage(path: &Path) -> Result<u64, FsError> {
    let mut total = 0;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| FsError::from_io("read_dir", &dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| FsError::from_io("read_dir", &dir, e))?;
            let meta = entry
                .metadata()
                .map_err(|e| FsError::from_io("metadata", entry.path(), e))?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

fn dir_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}
