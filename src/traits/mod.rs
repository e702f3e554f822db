//! # Storage Adapter Contract
//!
//! The traits every storage backend implements. Handles in
//! [`handle`](crate::DirectoryHandle) validate input and delegate here;
//! adapters own existence and kind checks and the persistence primitive.
//!
//! ## Quick Reference
//!
//! | Trait | Role |
//! |-------|------|
//! | [`DirectoryAdapter`] | Enumerate, look up, create and remove children |
//! | [`FileAdapter`] | Read committed content, open write sinks |
//! | [`WriteSink`] | Apply commands to staged data and commit on close |
//!
//! ## Thread Safety
//!
//! Adapters are `Send + Sync` and take `&self`; backends use interior
//! mutability. Sinks are `Send` and owned by exactly one stream, which
//! serialises access to them.
//!
//! ## Object Safety
//!
//! All three traits are object-safe; handles hold `Arc<dyn DirectoryAdapter>`
//! and `Arc<dyn FileAdapter>`.

mod directory;
mod file;
mod sink;

pub use directory::{AdapterEntry, DirectoryAdapter, EntryIter};
pub use file::FileAdapter;
pub use sink::WriteSink;
