//! In-memory staging area for buffer-based write sinks.

use crate::{FsError, WriteCommand};

/// Largest size, in bytes, a staged file may grow to.
pub(crate) const MAX_STAGED_LEN: u64 = isize::MAX as u64;

/// Fail with [`FsError::QuotaExceeded`] when a command would grow a file of
/// `usage` bytes to `requested` bytes past [`MAX_STAGED_LEN`].
pub(crate) fn check_len(requested: u64, usage: u64) -> Result<(), FsError> {
    if requested > MAX_STAGED_LEN {
        return Err(too_large(requested, usage));
    }
    Ok(())
}

/// End offset of `len` bytes written at `position`.
pub(crate) fn write_end(position: u64, len: usize, usage: u64) -> Result<u64, FsError> {
    let end = position
        .checked_add(len as u64)
        .ok_or_else(|| too_large(u64::MAX, usage))?;
    check_len(end, usage)?;
    Ok(end)
}

fn too_large(requested: u64, usage: u64) -> FsError {
    FsError::QuotaExceeded {
        limit: MAX_STAGED_LEN,
        requested,
        usage,
    }
}

/// Bytes staged by an open stream together with its cursor.
///
/// Every command is applied as `head ++ zero padding ++ data ++ tail`, where
/// `head = data[..position]` and `tail = data[position + len..]`. A command
/// that fails leaves both the bytes and the cursor untouched.
#[derive(Debug, Default)]
pub(crate) struct StagedBuffer {
    data: Vec<u8>,
    position: u64,
}

impl StagedBuffer {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn apply(&mut self, command: WriteCommand) -> Result<(), FsError> {
        match command {
            WriteCommand::Write { position, data } => {
                let start = position.unwrap_or(self.position);
                let end = write_end(start, data.len(), self.len())?;
                self.grow(end)?;
                // both fit in usize once grown
                let (start, end) = (start as usize, end as usize);
                if end > self.data.len() {
                    self.data.resize(end, 0);
                }
                self.data[start..end].copy_from_slice(&data);
                self.position = end as u64;
                Ok(())
            }
            WriteCommand::Seek { position } => {
                if position > self.len() {
                    return Err(FsError::InvalidState {
                        position,
                        size: self.len(),
                    });
                }
                self.position = position;
                Ok(())
            }
            WriteCommand::Truncate { size } => {
                check_len(size, self.len())?;
                self.grow(size)?;
                self.data.resize(size as usize, 0);
                self.position = self.position.min(size);
                Ok(())
            }
        }
    }

    /// Reserve room for `new_len` bytes without changing the contents.
    fn grow(&mut self, new_len: u64) -> Result<(), FsError> {
        let usage = self.len();
        let new_len = usize::try_from(new_len).map_err(|_| too_large(new_len, usage))?;
        if let Some(additional) = new_len.checked_sub(self.data.len()) {
            self.data
                .try_reserve(additional)
                .map_err(|_| too_large(new_len as u64, usage))?;
        }
        Ok(())
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
