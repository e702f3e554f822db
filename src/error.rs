//! Error types shared by every storage adapter.

use std::path::PathBuf;

use crate::EntryKind;

/// Error type for handle, adapter and writable-stream operations.
///
/// The domain variants form a fixed taxonomy; each has a stable symbolic
/// name returned by [`FsError::name`]. Backend-native failures that have no
/// domain meaning (`Io`, `Backend`, ...) are surfaced as-is.
///
/// # Examples
///
/// ```rust
/// use fs_handles::FsError;
///
/// let err = FsError::NotFound { name: "missing.txt".into() };
/// assert_eq!(err.to_string(), "not found: missing.txt");
/// assert_eq!(err.name(), "NotFoundError");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    // Domain taxonomy
    /// Entry missing at the time the operation was processed.
    #[error("not found: {name}")]
    NotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// Entry exists but is not of the requested kind.
    #[error("type mismatch: {name} is not a {expected}")]
    TypeMismatch {
        /// Name of the entry.
        name: String,
        /// The kind the caller asked for.
        expected: EntryKind,
    },

    /// The entry can not be modified in this way.
    #[error("invalid modification of {name}: {reason}")]
    InvalidModification {
        /// Name of the entry.
        name: String,
        /// Why the modification was refused.
        reason: &'static str,
    },

    /// A seek target lies beyond the end of the staged data.
    #[error("invalid state: position {position} exceeds size {size}")]
    InvalidState {
        /// Requested position.
        position: u64,
        /// Current staged size.
        size: u64,
    },

    /// A write command is missing its required field.
    #[error("syntax error: {reason}")]
    Syntax {
        /// Description of the missing field.
        reason: &'static str,
    },

    /// The operation is not allowed on this handle.
    #[error("{operation}: not allowed")]
    NotAllowed {
        /// The refused operation.
        operation: &'static str,
    },

    /// An in-flight transfer was cancelled.
    #[error("transfer aborted")]
    Aborted,

    /// Storage quota would be exceeded by the operation.
    #[error("quota exceeded: limit {limit}, requested {requested}, usage {usage}")]
    QuotaExceeded {
        /// The quota limit in bytes.
        limit: u64,
        /// Bytes the operation needs.
        requested: u64,
        /// Bytes in use before the operation.
        usage: u64,
    },

    // Type errors
    /// Entry name violates the naming rules.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Which rule was violated.
        reason: &'static str,
    },

    /// Operation issued on a stream that is closing, closed or errored.
    #[error("{operation}: writable stream is closed")]
    StreamClosed {
        /// The refused operation.
        operation: &'static str,
    },

    // Backend errors
    /// Stored data could not be interpreted.
    #[error("invalid data: {name} ({details})")]
    InvalidData {
        /// Name of the entry.
        name: String,
        /// Details about the invalid data.
        details: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Generic backend error.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error with context.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Stable symbolic name of the error condition.
    pub fn name(&self) -> &'static str {
        match self {
            FsError::NotFound { .. } => "NotFoundError",
            FsError::TypeMismatch { .. } => "TypeMismatchError",
            FsError::InvalidModification { .. } => "InvalidModificationError",
            FsError::InvalidState { .. } => "InvalidStateError",
            FsError::Syntax { .. } => "SyntaxError",
            FsError::NotAllowed { .. } => "NotAllowedError",
            FsError::Aborted => "AbortError",
            FsError::QuotaExceeded { .. } => "QuotaExceededError",
            FsError::InvalidName { .. } | FsError::StreamClosed { .. } => "TypeError",
            FsError::InvalidData { .. } => "DataError",
            FsError::Serialization(_) | FsError::Deserialization(_) => "EncodingError",
            FsError::Backend(_) | FsError::Io { .. } => "OperationError",
        }
    }

    /// Returns `true` for caller misuse (bad names, use after termination)
    /// as opposed to a domain failure.
    pub fn is_type_error(&self) -> bool {
        matches!(self, FsError::InvalidName { .. } | FsError::StreamClosed { .. })
    }

    /// Translate an I/O error raised while touching `path`.
    ///
    /// Missing entries become [`FsError::NotFound`], non-empty directories
    /// [`FsError::InvalidModification`] and permission failures
    /// [`FsError::NotAllowed`]; everything else is kept as [`FsError::Io`].
    pub fn from_io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match source.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound { name },
            std::io::ErrorKind::DirectoryNotEmpty => FsError::InvalidModification {
                name,
                reason: "directory not empty",
            },
            std::io::ErrorKind::PermissionDenied => FsError::NotAllowed { operation },
            _ => FsError::Io {
                operation,
                path,
                source,
            },
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(error: std::io::Error) -> Self {
        FsError::from_io("io", PathBuf::new(), error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = FsError::NotFound {
            name: "missing".into(),
        };
        assert_eq!(err.to_string(), "not found: missing");
    }

    #[test]
    fn type_mismatch_display() {
        let err = FsError::TypeMismatch {
            name: "dir".into(),
            expected: EntryKind::File,
        };
        assert_eq!(err.to_string(), "type mismatch: dir is not a file");
    }

    #[test]
    fn symbolic_names_are_stable() {
        assert_eq!(FsError::Aborted.name(), "AbortError");
        assert_eq!(FsError::InvalidState { position: 4, size: 2 }.name(), "InvalidStateError");
        assert_eq!(FsError::Syntax { reason: "x" }.name(), "SyntaxError");
        assert_eq!(
            FsError::NotAllowed {
                operation: "create_writable"
            }
            .name(),
            "NotAllowedError"
        );
    }

    #[test]
    fn type_errors_are_distinct_from_domain_errors() {
        assert!(FsError::StreamClosed { operation: "write" }.is_type_error());
        assert!(
            FsError::InvalidName {
                name: "..".into(),
                reason: "reserved"
            }
            .is_type_error()
        );
        assert!(!FsError::NotFound { name: "a".into() }.is_type_error());
    }

    #[test]
    fn from_io_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err = FsError::from_io("stat", "/tmp/a.txt", io_err);
        match err {
            FsError::NotFound { name } => assert_eq!(name, "a.txt"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn from_io_directory_not_empty() {
        let io_err = std::io::Error::new(std::io::ErrorKind::DirectoryNotEmpty, "test");
        let err = FsError::from_io("remove_dir", "/tmp/d", io_err);
        assert!(matches!(err, FsError::InvalidModification { .. }));
    }

    #[test]
    fn from_io_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err = FsError::from(io_err);
        assert!(matches!(err, FsError::NotAllowed { .. }));
    }

    #[test]
    fn from_io_other() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "test");
        let err = FsError::from(io_err);
        assert!(matches!(err, FsError::Io { .. }));
    }
}
