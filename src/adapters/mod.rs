//! # Storage Adapters
//!
//! Concrete implementations of [`DirectoryAdapter`](crate::DirectoryAdapter)
//! and [`FileAdapter`](crate::FileAdapter).
//!
//! | Backend | Types | Commit |
//! |---------|-------|--------|
//! | memory | [`MemoryDirectory`], [`MemoryFile`] | record replaced under the file lock |
//! | indexed | [`IndexedDirectory`], [`IndexedFile`] over [`IndexedDatabase`] | one transaction: existence check, then put |
//! | cache | [`CacheDirectory`], [`CacheFile`] over [`CacheStorage`] | response replaced under the cache lock |
//! | sandbox | [`SandboxDirectory`], [`SandboxFile`] | quota check, then in-place write under the sandbox commit lock |
//! | native | [`NativeDirectory`], [`NativeFile`] | swap file renamed over the target |
//!
//! Entry order is sorted by name for every backend except native, which
//! yields entries in host order.

#[cfg(feature = "cache")]
mod cache;
mod host;
mod indexed;
mod memory;
mod native;
mod sandbox;

#[cfg(feature = "cache")]
pub use cache::{Cache, CacheDirectory, CacheFile, CacheStorage, CachedResponse, open_root as open_cache_root};
pub use indexed::{IndexedDatabase, IndexedDirectory, IndexedFile};
pub use memory::{MemoryDirectory, MemoryFile};
pub use native::{NativeDirectory, NativeFile, NativeOptions, open_native};
pub use sandbox::{SandboxDirectory, SandboxFile, SandboxOptions, open_sandbox};
