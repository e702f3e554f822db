//! # Root Acquisition
//!
//! A [`Driver`] turns backend options into a root adapter.
//! [`get_origin_private_directory`] wraps that adapter in a
//! [`DirectoryHandle`]. Nothing is global: every call opens a new root, and
//! roots over the same storage (the same sandbox directory, database or
//! cache) see each other's entries.
//!
//! | Driver | Options |
//! |--------|---------|
//! | [`MemoryDriver`] | `()` |
//! | [`IndexedDriver`] | `Arc<IndexedDatabase>` |
//! | [`CacheDriver`] | [`CacheOptions`] (feature `cache`) |
//! | [`SandboxDriver`] | [`SandboxOptions`] |
//! | [`NativeDriver`] | [`NativeOptions`] |
//!
//! [`DriverConfig`] selects a driver from configuration data.

use std::sync::Arc;

#[cfg(feature = "cache")]
use crate::adapters::{CacheStorage, open_cache_root};
use crate::adapters::{
    IndexedDatabase, IndexedDirectory, MemoryDirectory, NativeOptions, SandboxOptions, open_native, open_sandbox,
};
use crate::{DirectoryAdapter, DirectoryHandle, FsError};

/// Default cache name used by [`DriverConfig::Cache`].
#[cfg(feature = "cache")]
pub const DEFAULT_CACHE_NAME: &str = "sandboxed-fs";

/// A storage backend factory.
pub trait Driver {
    /// Backend-specific options.
    type Options;

    /// Open the root directory adapter.
    ///
    /// # Errors
    ///
    /// Backend-specific; host backends report [`FsError::NotFound`] or
    /// [`FsError::Io`] for unusable roots.
    fn open(options: Self::Options) -> Result<Arc<dyn DirectoryAdapter>, FsError>;
}

/// Fresh in-memory tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDriver;

impl Driver for MemoryDriver {
    type Options = ();

    fn open(_: ()) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        Ok(Arc::new(MemoryDirectory::new("")))
    }
}

/// Root of an [`IndexedDatabase`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedDriver;

impl Driver for IndexedDriver {
    type Options = Arc<IndexedDatabase>;

    fn open(database: Arc<IndexedDatabase>) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        Ok(Arc::new(IndexedDirectory::root(database)))
    }
}

/// Options for [`CacheDriver`].
#[cfg(feature = "cache")]
#[derive(Clone)]
pub struct CacheOptions {
    /// Storage holding the cache.
    pub storage: Arc<CacheStorage>,
    /// Name of the cache to open or create.
    pub cache_name: String,
}

#[cfg(feature = "cache")]
impl CacheOptions {
    /// Cache [`DEFAULT_CACHE_NAME`] in `storage`.
    pub fn new(storage: Arc<CacheStorage>) -> Self {
        Self {
            storage,
            cache_name: DEFAULT_CACHE_NAME.to_owned(),
        }
    }
}

/// Root of a named cache.
#[cfg(feature = "cache")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheDriver;

#[cfg(feature = "cache")]
impl Driver for CacheDriver {
    type Options = CacheOptions;

    fn open(options: CacheOptions) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        let cache = options.storage.open(&options.cache_name);
        Ok(Arc::new(open_cache_root(cache)?))
    }
}

/// Sandboxed host directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxDriver;

impl Driver for SandboxDriver {
    type Options = SandboxOptions;

    fn open(options: SandboxOptions) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        Ok(Arc::new(open_sandbox(options)?))
    }
}

/// Existing host directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDriver;

impl Driver for NativeDriver {
    type Options = NativeOptions;

    fn open(options: NativeOptions) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        Ok(Arc::new(open_native(options)?))
    }
}

/// Open a root directory handle with driver `D`.
///
/// # Example
///
/// ```rust
/// use fs_handles::{get_origin_private_directory, GetOptions, SandboxDriver, SandboxOptions};
///
/// # fn main() -> Result<(), fs_handles::FsError> {
/// let tmp = tempfile::tempdir()?;
/// let root = get_origin_private_directory::<SandboxDriver>(SandboxOptions::new(tmp.path()))?;
/// root.get_file_handle("a.txt", GetOptions::CREATE)?;
/// assert!(tmp.path().join("a.txt").is_file());
/// # Ok(())
/// # }
/// ```
pub fn get_origin_private_directory<D: Driver>(options: D::Options) -> Result<DirectoryHandle, FsError> {
    D::open(options).map(DirectoryHandle::new)
}

/// Root of a fresh in-memory tree.
pub fn memory_root() -> DirectoryHandle {
    DirectoryHandle::new(Arc::new(MemoryDirectory::new("")))
}

/// Backend selection as configuration data.
///
/// With the `serde` feature this deserialises from a tagged object such as
/// `{"driver": "sandbox", "root": "/var/lib/app", "quota": 1048576}`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "driver", rename_all = "lowercase"))]
pub enum DriverConfig {
    /// A fresh in-memory tree.
    Memory,
    /// A fresh in-process database.
    Indexed {
        /// Database name.
        database: String,
    },
    /// A cache in a fresh in-process storage.
    #[cfg(feature = "cache")]
    Cache {
        /// Cache name.
        cache: String,
    },
    /// A sandboxed host directory.
    Sandbox(SandboxOptions),
    /// An existing host directory.
    Native(NativeOptions),
}

/// Open the root described by `config`.
///
/// # Errors
///
/// As the selected [`Driver::open`].
pub fn open_root(config: &DriverConfig) -> Result<DirectoryHandle, FsError> {
    match config {
        DriverConfig::Memory => get_origin_private_directory::<MemoryDriver>(()),
        DriverConfig::Indexed { database } => {
            get_origin_private_directory::<IndexedDriver>(IndexedDatabase::open(database.as_str()))
        }
        #[cfg(feature = "cache")]
        DriverConfig::Cache { cache } => get_origin_private_directory::<CacheDriver>(CacheOptions {
            storage: CacheStorage::new(),
            cache_name: cache.clone(),
        }),
        DriverConfig::Sandbox(options) => get_origin_private_directory::<SandboxDriver>(options.clone()),
        DriverConfig::Native(options) => get_origin_private_directory::<NativeDriver>(options.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GetOptions;

    #[test]
    fn memory_roots_are_independent() {
        let a = memory_root();
        let b = memory_root();
        a.get_file_handle("x", GetOptions::CREATE).unwrap();
        assert!(b.get_file_handle("x", GetOptions::EXISTING).is_err());
        assert_eq!(a.name(), "");
    }

    #[test]
    fn indexed_roots_share_a_database() {
        let db = IndexedDatabase::open("shared");
        let a = get_origin_private_directory::<IndexedDriver>(db.clone()).unwrap();
        let b = get_origin_private_directory::<IndexedDriver>(db).unwrap();
        a.get_directory_handle("d", GetOptions::CREATE).unwrap();
        assert!(b.get_directory_handle("d", GetOptions::EXISTING).is_ok());
        assert!(a.is_same_entry(&b.into()));
    }

    #[cfg(feature = "cache")]
    #[test]
    fn cache_roots_share_a_storage() {
        let storage = CacheStorage::new();
        let a = get_origin_private_directory::<CacheDriver>(CacheOptions::new(storage.clone())).unwrap();
        let b = get_origin_private_directory::<CacheDriver>(CacheOptions::new(storage.clone())).unwrap();
        a.get_file_handle("f", GetOptions::CREATE).unwrap();
        assert!(b.get_file_handle("f", GetOptions::EXISTING).is_ok());
        assert!(storage.has(DEFAULT_CACHE_NAME));
    }

    #[test]
    fn open_root_dispatches_on_config() {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = open_root(&DriverConfig::Sandbox(SandboxOptions::new(tmp.path().join("box")))).unwrap();
        sandbox.get_file_handle("f", GetOptions::CREATE).unwrap();
        assert!(tmp.path().join("box/f").is_file());

        let native = open_root(&DriverConfig::Native(NativeOptions::new(tmp.path()))).unwrap();
        assert!(native.get_directory_handle("box", GetOptions::EXISTING).is_ok());

        let memory = open_root(&DriverConfig::Memory).unwrap();
        assert_eq!(memory.entries().unwrap().count(), 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_from_json() {
        let config: DriverConfig = serde_json::from_str(r#"{"driver":"sandbox","root":"/tmp/x","quota":10}"#).unwrap();
        assert_eq!(config, DriverConfig::Sandbox(SandboxOptions::new("/tmp/x").with_quota(10)));

        let config: DriverConfig = serde_json::from_str(r#"{"driver":"indexed","database":"db"}"#).unwrap();
        assert_eq!(
            config,
            DriverConfig::Indexed {
                database: "db".into()
            }
        );

        let config: DriverConfig = serde_json::from_str(r#"{"driver":"memory"}"#).unwrap();
        assert_eq!(config, DriverConfig::Memory);
    }
}
