//! The backend half of a writable stream.

use crate::{FsError, WriteCommand};

/// Stages write commands against one backend and commits them on close.
///
/// A sink is driven by exactly one [`WritableFileStream`](crate::WritableFileStream),
/// which guarantees that calls are sequential and that [`close`](Self::close)
/// and [`abort`](Self::abort) are invoked at most once.
pub trait WriteSink: Send {
    /// Apply one command to the staged data.
    ///
    /// Implementations re-check that the file still exists before applying.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file has been removed
    /// - [`FsError::InvalidState`] if a seek lies beyond the staged size
    fn write(&mut self, command: WriteCommand) -> Result<(), FsError>;

    /// Atomically replace the committed content with the staged data.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file (or its parent) has been removed
    fn close(&mut self) -> Result<(), FsError>;

    /// Discard the staged data.
    fn abort(&mut self) -> Result<(), FsError> {
        Ok(())
    }
}
