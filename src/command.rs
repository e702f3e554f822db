//! Write commands accepted by a [`WritableFileStream`](crate::WritableFileStream).
//!
//! Callers hand the stream a [`WriteChunk`]. Raw bytes and text are writes at
//! the cursor; [`WriteParams`] is the loose, possibly incomplete record that
//! untyped callers produce (for example from JSON), and is validated into a
//! [`WriteCommand`] before any storage is touched.

use crate::FsError;

/// A validated command for a write sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCommand {
    /// Write `data` at `position`, or at the cursor when `None`.
    Write {
        /// Absolute target offset.
        position: Option<u64>,
        /// Bytes to write.
        data: Vec<u8>,
    },
    /// Move the cursor.
    Seek {
        /// New cursor position; must not exceed the staged size.
        position: u64,
    },
    /// Resize the staged data.
    Truncate {
        /// New size in bytes.
        size: u64,
    },
}

impl WriteCommand {
    /// Tag of the command.
    pub fn kind(&self) -> CommandType {
        match self {
            WriteCommand::Write { .. } => CommandType::Write,
            WriteCommand::Seek { .. } => CommandType::Seek,
            WriteCommand::Truncate { .. } => CommandType::Truncate,
        }
    }
}

/// Tag of a [`WriteParams`] record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CommandType {
    /// `write`
    #[default]
    Write,
    /// `seek`
    Seek,
    /// `truncate`
    Truncate,
}

/// Payload of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ChunkData {
    /// UTF-8 text, written as its bytes.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl ChunkData {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            ChunkData::Text(text) => text.into_bytes(),
            ChunkData::Bytes(bytes) => bytes,
        }
    }
}

/// Loosely typed command record.
///
/// Any field may be missing; [`WriteParams::into_command`] reports a
/// [`FsError::Syntax`] when the field the tag requires is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteParams {
    /// Command tag.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: CommandType,
    /// Target offset for `write`, new cursor for `seek`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub position: Option<u64>,
    /// New size for `truncate`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub size: Option<u64>,
    /// Payload for `write`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub data: Option<ChunkData>,
}

impl WriteParams {
    /// Validate the record into a [`WriteCommand`].
    ///
    /// # Errors
    ///
    /// - [`FsError::Syntax`] if `write` has no `data`, `seek` no `position`
    ///   or `truncate` no `size`
    pub fn into_command(self) -> Result<WriteCommand, FsError> {
        match self.kind {
            CommandType::Write => {
                let data = self.data.ok_or(FsError::Syntax {
                    reason: "write requires a data argument",
                })?;
                Ok(WriteCommand::Write {
                    position: self.position,
                    data: data.into_bytes(),
                })
            }
            CommandType::Seek => {
                let position = self.position.ok_or(FsError::Syntax {
                    reason: "seek requires a position argument",
                })?;
                Ok(WriteCommand::Seek { position })
            }
            CommandType::Truncate => {
                let size = self.size.ok_or(FsError::Syntax {
                    reason: "truncate requires a size argument",
                })?;
                Ok(WriteCommand::Truncate { size })
            }
        }
    }
}

/// Anything a writable stream accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteChunk {
    /// Raw bytes written at the cursor.
    Bytes(Vec<u8>),
    /// Text written at the cursor.
    Text(String),
    /// Loose record, validated on submission.
    Params(WriteParams),
    /// Already validated command.
    Command(WriteCommand),
}

impl WriteChunk {
    /// Convert into a validated command.
    ///
    /// # Errors
    ///
    /// - [`FsError::Syntax`] for incomplete [`WriteChunk::Params`]
    pub fn into_command(self) -> Result<WriteCommand, FsError> {
        match self {
            WriteChunk::Bytes(data) => Ok(WriteCommand::Write {
                position: None,
                data,
            }),
            WriteChunk::Text(text) => Ok(WriteCommand::Write {
                position: None,
                data: text.into_bytes(),
            }),
            WriteChunk::Params(params) => params.into_command(),
            WriteChunk::Command(command) => Ok(command),
        }
    }
}

impl From<Vec<u8>> for WriteChunk {
    fn from(data: Vec<u8>) -> Self {
        WriteChunk::Bytes(data)
    }
}

impl From<&[u8]> for WriteChunk {
    fn from(data: &[u8]) -> Self {
        WriteChunk::Bytes(data.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for WriteChunk {
    fn from(data: &[u8; N]) -> Self {
        WriteChunk::Bytes(data.to_vec())
    }
}

impl From<String> for WriteChunk {
    fn from(text: String) -> Self {
        WriteChunk::Text(text)
    }
}

impl From<&str> for WriteChunk {
    fn from(text: &str) -> Self {
        WriteChunk::Text(text.to_owned())
    }
}

impl From<WriteParams> for WriteChunk {
    fn from(params: WriteParams) -> Self {
        WriteChunk::Params(params)
    }
}

impl From<WriteCommand> for WriteChunk {
    fn from(command: WriteCommand) -> Self {
        WriteChunk::Command(command)
    }
}
