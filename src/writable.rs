//! # Transactional Writable Stream
//!
//! [`WritableFileStream`] queues write/seek/truncate commands against a
//! [`WriteSink`] and commits them atomically on [`close`](WritableFileStream::close).
//!
//! ## States
//!
//! ```text
//! Open ──close()──▶ Closing ──ok──▶ Closed
//!   │                  │
//!   └──abort()──┐      └──err──▶ Errored
//!               ▼
//!            Errored
//! ```
//!
//! `Closed` and `Errored` are terminal. Every call on a stream that is not
//! `Open` fails with [`FsError::StreamClosed`].

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::{FsError, WriteChunk, WriteCommand, WriteSink};

/// Chunk size used by [`WritableFileStream::write_from`].
const PIPE_CHUNK_SIZE: usize = 64 * 1024;

/// Lifecycle state of a [`WritableFileStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamState {
    /// Accepting commands.
    Open = 0,
    /// A close is committing.
    Closing = 1,
    /// Committed successfully.
    Closed = 2,
    /// Failed or aborted.
    Errored = 3,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Open,
            1 => StreamState::Closing,
            2 => StreamState::Closed,
            _ => StreamState::Errored,
        }
    }

    /// Returns `true` for `Closed` and `Errored`.
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Closed | StreamState::Errored)
    }
}

/// Cancellation flag for [`WritableFileStream::write_from`].
///
/// Clones share the flag, so one side can keep a clone and abort a transfer
/// running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Create an un-raised signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the signal has been raised.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A per-session writer that commits atomically on close.
///
/// Commands are applied to staged data in submission order. Nothing is
/// visible to other readers of the file until [`close`](Self::close)
/// succeeds. Methods take `&self`, so a stream can be shared between
/// threads; concurrent calls are serialised.
///
/// # Example
///
/// ```rust
/// use fs_handles::{memory_root, CreateWritableOptions, GetOptions};
///
/// # fn main() -> Result<(), fs_handles::FsError> {
/// let root = memory_root();
/// let file = root.get_file_handle("log.txt", GetOptions::CREATE)?;
///
/// let stream = file.create_writable(CreateWritableOptions::default())?;
/// stream.write("hello")?;
/// stream.seek(0)?;
/// stream.write("J")?;
/// assert_eq!(file.get_file()?.size(), 0);
///
/// stream.close()?;
/// assert_eq!(file.get_file()?.text()?, "Jello");
/// # Ok(())
/// # }
/// ```
pub struct WritableFileStream {
    name: String,
    state: AtomicU8,
    sink: Mutex<Box<dyn WriteSink>>,
}

impl WritableFileStream {
    pub(crate) fn new(name: &str, sink: Box<dyn WriteSink>) -> Self {
        Self {
            name: name.to_owned(),
            state: AtomicU8::new(StreamState::Open as u8),
            sink: Mutex::new(sink),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Submit a chunk: raw bytes or text at the cursor, or a command.
    ///
    /// # Errors
    ///
    /// - [`FsError::StreamClosed`] if the stream is not open
    /// - [`FsError::Syntax`] if a command record is incomplete
    /// - [`FsError::NotFound`] if the file has been removed
    /// - [`FsError::InvalidState`] for a seek beyond the staged size
    /// - [`FsError::QuotaExceeded`] if the data would grow past what can be
    ///   staged; the stream stays open
    pub fn write(&self, chunk: impl Into<WriteChunk>) -> Result<(), FsError> {
        self.ensure_open("write")?;
        let command = chunk.into().into_command()?;
        self.submit("write", command)
    }

    /// Move the cursor.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidState`] if `position` exceeds the staged size
    /// - otherwise as [`write`](Self::write)
    pub fn seek(&self, position: u64) -> Result<(), FsError> {
        self.ensure_open("seek")?;
        self.submit("seek", WriteCommand::Seek { position })
    }

    /// Resize the staged data, zero-padding when growing.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub fn truncate(&self, size: u64) -> Result<(), FsError> {
        self.ensure_open("truncate")?;
        self.submit("truncate", WriteCommand::Truncate { size })
    }

    /// Commit the staged data.
    ///
    /// Exactly one close per stream can proceed; concurrent or repeated calls
    /// fail with [`FsError::StreamClosed`]. The stream is terminal afterwards
    /// whether the commit succeeded or not.
    ///
    /// # Errors
    ///
    /// - [`FsError::StreamClosed`] if another close or abort already ran
    /// - [`FsError::NotFound`] if the file or its parent was removed
    pub fn close(&self) -> Result<(), FsError> {
        self.begin_terminal("close")?;
        let result = self.lock_sink().close();
        match &result {
            Ok(()) => {
                self.state.store(StreamState::Closed as u8, Ordering::Release);
                debug!(file = %self.name, "committed writable stream");
            }
            Err(err) => {
                self.state.store(StreamState::Errored as u8, Ordering::Release);
                debug!(file = %self.name, error = %err, "commit failed");
            }
        }
        result
    }

    /// Discard the staged data without committing.
    ///
    /// # Errors
    ///
    /// - [`FsError::StreamClosed`] if the stream is not open
    pub fn abort(&self) -> Result<(), FsError> {
        self.begin_terminal("abort")?;
        let result = self.lock_sink().abort();
        self.state.store(StreamState::Errored as u8, Ordering::Release);
        debug!(file = %self.name, "aborted writable stream");
        result
    }

    /// Pipe `reader` into the stream at the cursor until end of input.
    ///
    /// Returns the number of bytes written. When `signal` is raised the
    /// transfer stops with [`FsError::Aborted`]; data already submitted stays
    /// staged and the stream stays open.
    ///
    /// # Errors
    ///
    /// - [`FsError::Aborted`] if `signal` was raised
    /// - [`FsError::Io`] if reading fails
    /// - otherwise as [`write`](Self::write)
    pub fn write_from<R: Read>(&self, mut reader: R, signal: &AbortSignal) -> Result<u64, FsError> {
        let mut buf = vec![0u8; PIPE_CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            if signal.is_aborted() {
                debug!(file = %self.name, written = total, "transfer aborted");
                return Err(FsError::Aborted);
            }
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FsError::from_io("read", self.name.as_str(), e)),
            };
            if signal.is_aborted() {
                debug!(file = %self.name, written = total, "transfer aborted");
                return Err(FsError::Aborted);
            }
            self.write(&buf[..n])?;
            total += n as u64;
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), FsError> {
        match self.state() {
            StreamState::Open => Ok(()),
            _ => Err(FsError::StreamClosed { operation }),
        }
    }

    fn begin_terminal(&self, operation: &'static str) -> Result<(), FsError> {
        self.state
            .compare_exchange(
                StreamState::Open as u8,
                StreamState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| FsError::StreamClosed { operation })
    }

    fn submit(&self, operation: &'static str, command: WriteCommand) -> Result<(), FsError> {
        let mut sink = self.lock_sink();
        // A close may have won while we waited for the sink.
        self.ensure_open(operation)?;
        trace!(file = %self.name, kind = ?command.kind(), "applying command");
        sink.write(command)
    }

    fn lock_sink(&self) -> MutexGuard<'_, Box<dyn WriteSink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for WritableFileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableFileStream")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory_root, CommandType, CreateWritableOptions, FileHandle, GetOptions, WriteParams};

    fn file_with(content: &str) -> FileHandle {
        let root = memory_root();
        let file = root.get_file_handle("f", GetOptions::CREATE).unwrap();
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        stream.write(content).unwrap();
        stream.close().unwrap();
        file
    }

    #[test]
    fn state_transitions_on_close() {
        let file = file_with("");
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        assert_eq!(stream.state(), StreamState::Open);
        stream.close().unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(stream.state().is_terminal());
    }

    #[test]
    fn calls_after_close_are_type_errors() {
        let file = file_with("");
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        stream.write("abc").unwrap();
        stream.close().unwrap();

        for err in [
            stream.write("x").unwrap_err(),
            stream.seek(0).unwrap_err(),
            stream.truncate(1).unwrap_err(),
            stream.close().unwrap_err(),
            stream.abort().unwrap_err(),
        ] {
            assert!(matches!(err, FsError::StreamClosed { .. }), "{err:?}");
            assert!(err.is_type_error());
        }
        assert_eq!(file.get_file().unwrap().text().unwrap(), "abc");
    }

    #[test]
    fn syntax_error_does_not_touch_buffer() {
        let file = file_with("");
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        stream.write("abc").unwrap();
        let err = stream
            .write(WriteParams {
                kind: CommandType::Write,
                position: Some(0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, FsError::Syntax { .. }));
        assert_eq!(stream.state(), StreamState::Open);
        stream.close().unwrap();
        assert_eq!(file.get_file().unwrap().text().unwrap(), "abc");
    }

    #[test]
    fn seek_failure_keeps_stream_open() {
        let file = file_with("");
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        assert!(matches!(stream.seek(1), Err(FsError::InvalidState { .. })));
        assert_eq!(stream.state(), StreamState::Open);
        stream.write("ok").unwrap();
        stream.close().unwrap();
        assert_eq!(file.get_file().unwrap().text().unwrap(), "ok");
    }

    #[test]
    fn concurrent_closes_have_one_winner() {
        let file = file_with("");
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        stream.write("winner").unwrap();

        let results: Vec<Result<(), FsError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..100).map(|_| s.spawn(|| stream.close())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, FsError::StreamClosed { .. })));
        assert_eq!(file.get_file().unwrap().text().unwrap(), "winner");
    }

    #[test]
    fn abort_discards_staged_data() {
        let file = file_with("keep");
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        stream.write("discard").unwrap();
        stream.abort().unwrap();
        assert_eq!(stream.state(), StreamState::Errored);
        assert!(matches!(stream.close(), Err(FsError::StreamClosed { .. })));
        assert_eq!(file.get_file().unwrap().text().unwrap(), "keep");
    }

    #[test]
    fn write_from_copies_reader() {
        let file = file_with("");
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        let data = vec![7u8; PIPE_CHUNK_SIZE * 2 + 3];
        let n = stream.write_from(data.as_slice(), &AbortSignal::new()).unwrap();
        assert_eq!(n, data.len() as u64);
        stream.close().unwrap();
        assert_eq!(file.get_file().unwrap().bytes(), data.as_slice());
    }

    /// Reader that raises the signal after handing out its first chunk.
    struct AbortingReader {
        signal: AbortSignal,
        reads: usize,
    }

    impl Read for AbortingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            if self.reads == 2 {
                self.signal.abort();
            }
            buf[0] = b'a';
            Ok(1)
        }
    }

    #[test]
    fn aborted_transfer_leaves_stream_open() {
        let file = file_with("");
        let stream = file.create_writable(CreateWritableOptions::default()).unwrap();
        let signal = AbortSignal::new();
        let reader = AbortingReader {
            signal: signal.clone(),
            reads: 0,
        };

        let err = stream.write_from(reader, &signal).unwrap_err();
        assert!(matches!(err, FsError::Aborted));
        assert_eq!(err.name(), "AbortError");
        assert_eq!(stream.state(), StreamState::Open);

        stream.close().unwrap();
        assert_eq!(file.get_file().unwrap().text().unwrap(), "a");
        assert!(matches!(stream.write("b"), Err(FsError::StreamClosed { .. })));
    }

    #[test]
    fn stream_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WritableFileStream>();
        assert_send_sync::<AbortSignal>();
    }
}
