//! Transactional object-store backend.
//!
//! [`IndexedDatabase`] is a single object store with auto-increment keys.
//! Rows are either a directory listing (`name -> (key, is_file)`) or a file
//! record; the root listing always has key [`ROOT_KEY`]. Every adapter
//! operation runs inside one [`Transaction`], which stages its puts and
//! deletes and applies all of them or none.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::buffer::StagedBuffer;
use crate::types::FileRecord;
use crate::{
    AdapterEntry, CreateWritableOptions, DirectoryAdapter, EntryIter, EntryKind, File, FileAdapter, FsError,
    WriteCommand, WriteSink,
};

/// Key of the root directory row.
pub const ROOT_KEY: u64 = 1;

/// Directory row: child name to `(row key, is_file)`.
type Listing = BTreeMap<String, (u64, bool)>;

#[derive(Debug, Clone)]
enum Row {
    Directory(Listing),
    File(FileRecord),
}

#[derive(Debug, Default)]
struct ObjectStore {
    next_key: u64,
    rows: HashMap<u64, Row>,
}

/// An in-process object store shared by all handles opened on it.
pub struct IndexedDatabase {
    name: String,
    store: Mutex<ObjectStore>,
}

impl IndexedDatabase {
    /// Open a new database whose store holds an empty root listing.
    pub fn open(name: impl Into<String>) -> Arc<Self> {
        let mut store = ObjectStore {
            next_key: ROOT_KEY,
            rows: HashMap::new(),
        };
        store.rows.insert(ROOT_KEY, Row::Directory(Listing::new()));
        store.next_key = ROOT_KEY + 1;
        let db = Arc::new(Self {
            name: name.into(),
            store: Mutex::new(store),
        });
        debug!(database = %db.name, "opened indexed database");
        db
    }

    /// Name given at [`open`](Self::open).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows in the store, the root listing included.
    pub fn row_count(&self) -> usize {
        self.lock().rows.len()
    }

    /// Run `f` in a read-write transaction.
    ///
    /// Writes staged by `f` are applied when it returns `Ok` and dropped
    /// when it returns `Err`.
    fn transaction<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T, FsError>) -> Result<T, FsError> {
        let mut store = self.lock();
        let mut tx = Transaction {
            store: &store,
            next_key: store.next_key,
            staged: HashMap::new(),
        };
        let value = f(&mut tx)?;
        let Transaction { next_key, staged, .. } = tx;
        trace!(database = %self.name, writes = staged.len(), "committing transaction");
        store.next_key = next_key;
        for (key, row) in staged {
            match row {
                Some(row) => store.rows.insert(key, row),
                None => store.rows.remove(&key),
            };
        }
        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, ObjectStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for IndexedDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedDatabase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Staged view over the store.
///
/// Reads see the transaction's own writes first.
struct Transaction<'a> {
    store: &'a ObjectStore,
    next_key: u64,
    staged: HashMap<u64, Option<Row>>,
}

impl Transaction<'_> {
    fn get(&self, key: u64) -> Option<&Row> {
        match self.staged.get(&key) {
            Some(row) => row.as_ref(),
            None => self.store.rows.get(&key),
        }
    }

    fn put(&mut self, key: u64, row: Row) {
        self.staged.insert(key, Some(row));
    }

    fn add(&mut self, row: Row) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.put(key, row);
        key
    }

    fn delete(&mut self, key: u64) {
        self.staged.insert(key, None);
    }

    fn listing(&self, key: u64, name: &str) -> Result<Listing, FsError> {
        match self.get(key) {
            Some(Row::Directory(listing)) => Ok(listing.clone()),
            Some(Row::File(_)) => Err(FsError::TypeMismatch {
                name: name.to_owned(),
                expected: EntryKind::Directory,
            }),
            None => Err(FsError::NotFound { name: name.to_owned() }),
        }
    }

    fn file(&self, key: u64, name: &str) -> Result<&FileRecord, FsError> {
        match self.get(key) {
            Some(Row::File(record)) => Ok(record),
            Some(Row::Directory(_)) => Err(FsError::TypeMismatch {
                name: name.to_owned(),
                expected: EntryKind::File,
            }),
            None => Err(FsError::NotFound { name: name.to_owned() }),
        }
    }

    /// Delete `key` and, for directories, every row below it.
    fn delete_tree(&mut self, key: u64) {
        let mut pending = vec![key];
        while let Some(key) = pending.pop() {
            if let Some(Row::Directory(listing)) = self.get(key) {
                pending.extend(listing.values().map(|(child, _)| *child));
            }
            self.delete(key);
        }
    }
}

/// Directory row of an [`IndexedDatabase`].
pub struct IndexedDirectory {
    db: Arc<IndexedDatabase>,
    key: u64,
    name: String,
}

impl IndexedDirectory {
    /// Root directory of `db`.
    pub fn root(db: Arc<IndexedDatabase>) -> Self {
        Self {
            db,
            key: ROOT_KEY,
            name: String::new(),
        }
    }

    fn child(&self, key: u64, name: &str, is_file: bool) -> AdapterEntry {
        if is_file {
            AdapterEntry::File(Arc::new(IndexedFile {
                db: self.db.clone(),
                key,
                name: name.to_owned(),
            }))
        } else {
            AdapterEntry::Directory(Arc::new(IndexedDirectory {
                db: self.db.clone(),
                key,
                name: name.to_owned(),
            }))
        }
    }
}

impl DirectoryAdapter for IndexedDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        true
    }

    fn entries(&self) -> Result<EntryIter, FsError> {
        let listing = self.db.transaction(|tx| tx.listing(self.key, &self.name))?;
        let entries = listing
            .into_iter()
            .map(|(name, (key, is_file))| {
                let entry = self.child(key, &name, is_file);
                (name, entry)
            })
            .collect();
        Ok(EntryIter::from_vec(entries))
    }

    fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        let key = self.db.transaction(|tx| {
            let mut listing = tx.listing(self.key, &self.name)?;
            match listing.get(name) {
                Some(&(key, false)) => Ok(key),
                Some(&(_, true)) => Err(FsError::TypeMismatch {
                    name: name.to_owned(),
                    expected: EntryKind::Directory,
                }),
                None if create => {
                    let key = tx.add(Row::Directory(Listing::new()));
                    listing.insert(name.to_owned(), (key, false));
                    tx.put(self.key, Row::Directory(listing));
                    debug!(database = %self.db.name, name, key, "created directory row");
                    Ok(key)
                }
                None => Err(FsError::NotFound { name: name.to_owned() }),
            }
        })?;
        Ok(Arc::new(IndexedDirectory {
            db: self.db.clone(),
            key,
            name: name.to_owned(),
        }))
    }

    fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileAdapter>, FsError> {
        let key = self.db.transaction(|tx| {
            let mut listing = tx.listing(self.key, &self.name)?;
            match listing.get(name) {
                Some(&(key, true)) => Ok(key),
                Some(&(_, false)) => Err(FsError::TypeMismatch {
                    name: name.to_owned(),
                    expected: EntryKind::File,
                }),
                None if create => {
                    let key = tx.add(Row::File(FileRecord::empty()));
                    listing.insert(name.to_owned(), (key, true));
                    tx.put(self.key, Row::Directory(listing));
                    debug!(database = %self.db.name, name, key, "created file row");
                    Ok(key)
                }
                None => Err(FsError::NotFound { name: name.to_owned() }),
            }
        })?;
        Ok(Arc::new(IndexedFile {
            db: self.db.clone(),
            key,
            name: name.to_owned(),
        }))
    }

    fn remove_entry(&self, name: &str, recursive: bool) -> Result<(), FsError> {
        self.db.transaction(|tx| {
            let mut listing = tx.listing(self.key, &self.name)?;
            let (key, is_file) = listing
                .remove(name)
                .ok_or_else(|| FsError::NotFound { name: name.to_owned() })?;
            if !is_file && !recursive && !tx.listing(key, name)?.is_empty() {
                return Err(FsError::InvalidModification {
                    name: name.to_owned(),
                    reason: "directory is not empty",
                });
            }
            tx.put(self.key, Row::Directory(listing));
            tx.delete_tree(key);
            debug!(database = %self.db.name, name, key, recursive, "removed row");
            Ok(())
        })
    }

    fn is_same_entry(&self, other: &dyn DirectoryAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<IndexedDirectory>()
            .is_some_and(|other| Arc::ptr_eq(&self.db, &other.db) && self.key == other.key)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// File row of an [`IndexedDatabase`].
pub struct IndexedFile {
    db: Arc<IndexedDatabase>,
    key: u64,
    name: String,
}

impl FileAdapter for IndexedFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        true
    }

    fn get_file(&self) -> Result<File, FsError> {
        self.db
            .transaction(|tx| Ok(tx.file(self.key, &self.name)?.to_file(&self.name)))
    }

    fn create_writable(&self, options: CreateWritableOptions) -> Result<Box<dyn WriteSink>, FsError> {
        let current = self.db.transaction(|tx| Ok(tx.file(self.key, &self.name)?.data.clone()))?;
        let initial = if options.keep_existing_data { current } else { Vec::new() };
        Ok(Box::new(IndexedSink {
            db: self.db.clone(),
            key: self.key,
            name: self.name.clone(),
            buffer: StagedBuffer::new(initial),
        }))
    }

    fn is_same_entry(&self, other: &dyn FileAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<IndexedFile>()
            .is_some_and(|other| Arc::ptr_eq(&self.db, &other.db) && self.key == other.key)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct IndexedSink {
    db: Arc<IndexedDatabase>,
    key: u64,
    name: String,
    buffer: StagedBuffer,
}

impl WriteSink for IndexedSink {
    fn write(&mut self, command: WriteCommand) -> Result<(), FsError> {
        self.db.transaction(|tx| tx.file(self.key, &self.name).map(|_| ()))?;
        self.buffer.apply(command)
    }

    fn close(&mut self) -> Result<(), FsError> {
        let data = std::mem::take(&mut self.buffer).into_inner();
        let size = data.len();
        self.db.transaction(|tx| {
            tx.file(self.key, &self.name)?;
            tx.put(self.key, Row::File(FileRecord::new(data)));
            Ok(())
        })?;
        debug!(database = %self.db.name, file = %self.name, key = self.key, size, "committed file row");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> (Arc<IndexedDatabase>, IndexedDirectory) {
        let db = IndexedDatabase::open("test");
        (db.clone(), IndexedDirectory::root(db))
    }

    #[test]
    fn root_row_has_key_one() {
        let (db, root) = root();
        assert_eq!(db.row_count(), 1);
        assert_eq!(root.key, ROOT_KEY);
        assert_eq!(root.entries().unwrap().count(), 0);
    }

    #[test]
    fn created_rows_get_increasing_keys() {
        let (db, root) = root();
        let a = root.get_directory("a", true).unwrap();
        let f = a.get_file("f", true).unwrap();
        let a = a.as_any().downcast_ref::<IndexedDirectory>().unwrap();
        let f = f.as_any().downcast_ref::<IndexedFile>().unwrap();
        assert_eq!(a.key, 2);
        assert_eq!(f.key, 3);
        assert_eq!(db.row_count(), 3);
    }

    #[test]
    fn failed_transaction_changes_nothing() {
        let (db, root) = root();
        let a = root.get_directory("a", true).unwrap();
        a.get_file("f", true).unwrap();
        assert!(matches!(
            root.remove_entry("a", false),
            Err(FsError::InvalidModification { .. })
        ));
        assert_eq!(db.row_count(), 3);
        assert!(root.get_directory("a", false).is_ok());
    }

    #[test]
    fn recursive_remove_deletes_descendant_rows() {
        let (db, root) = root();
        let a = root.get_directory("a", true).unwrap();
        let b = a.get_directory("b", true).unwrap();
        let f = b.get_file("f", true).unwrap();
        root.remove_entry("a", true).unwrap();
        assert_eq!(db.row_count(), 1);
        assert!(matches!(f.get_file(), Err(FsError::NotFound { .. })));
        assert!(matches!(b.entries(), Err(FsError::NotFound { .. })));
    }

    #[test]
    fn sink_checks_row_on_every_write() {
        let (_, root) = root();
        let f = root.get_file("f", true).unwrap();
        let mut sink = f.create_writable(CreateWritableOptions::REPLACE).unwrap();
        sink.write(WriteCommand::Write {
            position: None,
            data: b"abc".to_vec(),
        })
        .unwrap();
        sink.close().unwrap();
        assert_eq!(f.get_file().unwrap().bytes(), b"abc");

        let mut sink = f.create_writable(CreateWritableOptions::KEEP).unwrap();
        root.remove_entry("f", false).unwrap();
        assert!(matches!(
            sink.write(WriteCommand::Seek { position: 1 }),
            Err(FsError::NotFound { .. })
        ));
        assert!(matches!(sink.close(), Err(FsError::NotFound { .. })));
    }

    #[test]
    fn identity_is_database_and_key() {
        let (_, root) = root();
        let other = IndexedDirectory::root(IndexedDatabase::open("other"));
        let again = IndexedDirectory::root(root.db.clone());
        assert!(root.is_same_entry(&again));
        assert!(!root.is_same_entry(&other));
    }
}
