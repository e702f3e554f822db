//! File operations of a storage adapter.

use std::any::Any;

use crate::{CreateWritableOptions, File, FsError, WriteSink};

/// File operations of a storage backend.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods use `&self` to allow
/// concurrent access.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FileAdapter`.
pub trait FileAdapter: Send + Sync {
    /// Name of the file.
    fn name(&self) -> &str;

    /// Whether streams may be opened on this file.
    fn writable(&self) -> bool;

    /// Snapshot of the committed content.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file has been removed
    fn get_file(&self) -> Result<File, FsError>;

    /// Open a sink that stages commands and commits them on close.
    ///
    /// The committed file must stay unchanged until the sink's
    /// [`close`](WriteSink::close) succeeds.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file has been removed
    /// - [`FsError::NotAllowed`] if the file is read-only
    fn create_writable(&self, options: CreateWritableOptions) -> Result<Box<dyn WriteSink>, FsError>;

    /// Backend identity comparison.
    fn is_same_entry(&self, other: &dyn FileAdapter) -> bool;

    /// Upcast used by [`is_same_entry`](Self::is_same_entry) implementations.
    fn as_any(&self) -> &dyn Any;
}
