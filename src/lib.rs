//! # fs-handles
//!
//! Capability-based **file system handles** with **transactional writable
//! streams** over interchangeable storage backends.
//!
//! A caller obtains a root [`DirectoryHandle`], navigates with
//! [`get_directory_handle`](DirectoryHandle::get_directory_handle) and
//! [`get_file_handle`](DirectoryHandle::get_file_handle), and writes files
//! through a [`WritableFileStream`] whose commands stay invisible to every
//! reader until [`close`](WritableFileStream::close) commits them at once.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use fs_handles::{memory_root, CreateWritableOptions, GetOptions, WriteParams, CommandType};
//!
//! # fn main() -> Result<(), fs_handles::FsError> {
//! let root = memory_root();
//! let docs = root.get_directory_handle("docs", GetOptions::CREATE)?;
//! let file = docs.get_file_handle("notes.txt", GetOptions::CREATE)?;
//!
//! let stream = file.create_writable(CreateWritableOptions::default())?;
//! stream.write("abc")?;
//! stream.write("def")?;
//! stream.truncate(9)?;
//! stream.seek(0)?;
//! stream.write(WriteParams {
//!     kind: CommandType::Write,
//!     data: Some(fs_handles::ChunkData::Text("xyz".into())),
//!     ..Default::default()
//! })?;
//! stream.close()?;
//!
//! assert_eq!(file.get_file()?.bytes(), b"xyzdef\0\0\0");
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`DirectoryHandle`] | Navigate, enumerate, create and remove entries |
//! | [`FileHandle`] | Read the committed [`File`] snapshot, open streams |
//! | [`WritableFileStream`] | Ordered write/seek/truncate, atomic commit on close |
//! | [`FsError`] | Error taxonomy with stable symbolic names |
//! | [`DirectoryAdapter`] / [`FileAdapter`] / [`WriteSink`] | Backend contract |
//!
//! ---
//!
//! ## Backends
//!
//! | Driver | Storage |
//! |--------|---------|
//! | [`MemoryDriver`] | In-memory object graph |
//! | [`IndexedDriver`] | Transactional object store with auto-increment keys |
//! | [`CacheDriver`] | Named response cache (feature `cache`) |
//! | [`SandboxDriver`] | Host directory confined to a root, with optional quota |
//! | [`NativeDriver`] | Existing host directory, swap-file commits |
//!
//! Open a root with [`get_origin_private_directory`], [`memory_root`] or,
//! from configuration, [`open_root`].
//!
//! ---
//!
//! ## Error Handling
//!
//! All operations return `Result<T, FsError>`:
//!
//! ```rust
//! use fs_handles::{memory_root, FsError, GetOptions};
//!
//! let root = memory_root();
//! let err = root.get_file_handle("missing.txt", GetOptions::EXISTING).unwrap_err();
//! assert_eq!(err.name(), "NotFoundError");
//!
//! let err = root.get_file_handle("..", GetOptions::CREATE).unwrap_err();
//! assert!(err.is_type_error());
//! ```
//!
//! ---
//!
//! ## Thread Safety
//!
//! Handles, adapters and streams are `Send + Sync`. Methods take `&self`;
//! backends use interior mutability. Commands on one stream are applied in
//! submission order, and of several concurrent `close` calls exactly one
//! commits.
//!
//! ---
//!
//! ## Logging
//!
//! Backends emit [`tracing`] events: `debug` for entry creation, removal and
//! commits, `trace` for individual stream commands. No subscriber is
//! installed by this crate.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `cache` (default) | Response-cache backend |
//! | `serde` | Serialization for [`WriteParams`], [`DriverConfig`], option types; [`DirectoryExtJson`] |

// Private modules
mod adapters;
mod buffer;
mod command;
mod error;
mod ext;
mod handle;
mod path_resolver;
mod root;
mod traits;
mod types;
mod writable;

// Public re-exports - error types
pub use error::FsError;

// Public re-exports - core types
pub use types::{CreateWritableOptions, EntryKind, File, GetOptions, PermissionMode, PermissionState, RemoveOptions};

// Public re-exports - write commands
pub use command::{ChunkData, CommandType, WriteChunk, WriteCommand, WriteParams};

// Public re-exports - adapter contract
pub use traits::{AdapterEntry, DirectoryAdapter, EntryIter, FileAdapter, WriteSink};

// Public re-exports - handles and streams
pub use handle::{DirectoryHandle, Entries, FileHandle, Handle, Keys, Values, permission_state, validate_name};
pub use writable::{AbortSignal, StreamState, WritableFileStream};

// Public re-exports - path resolution
pub use path_resolver::{BreadthFirstResolver, DepthFirstResolver, PathResolver};

// Public re-exports - backends
#[cfg(feature = "cache")]
pub use adapters::{Cache, CacheDirectory, CacheFile, CacheStorage, CachedResponse};
pub use adapters::{
    IndexedDatabase, IndexedDirectory, IndexedFile, MemoryDirectory, MemoryFile, NativeDirectory, NativeFile,
    NativeOptions, SandboxDirectory, SandboxFile, SandboxOptions,
};

// Public re-exports - root acquisition
#[cfg(feature = "cache")]
pub use root::{CacheDriver, CacheOptions, DEFAULT_CACHE_NAME};
pub use root::{
    Driver, DriverConfig, IndexedDriver, MemoryDriver, NativeDriver, SandboxDriver, get_origin_private_directory,
    memory_root, open_root,
};

// Public re-exports - infrastructure
pub use ext::DirectoryExt;

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::DirectoryExtJson;
