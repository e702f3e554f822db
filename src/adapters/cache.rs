//! Response-cache backend.
//!
//! Entries live in a named [`Cache`] inside a [`CacheStorage`], keyed by
//! request path. A directory is a response whose body is a JSON object of
//! `{child path: is_file}` with `content-type: dir`; a file is a response
//! whose body is the file content with `content-type: file` and
//! `last-modified` in milliseconds since the Unix epoch.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::buffer::StagedBuffer;
use crate::{
    AdapterEntry, CreateWritableOptions, DirectoryAdapter, EntryIter, EntryKind, File, FileAdapter, FsError,
    WriteCommand, WriteSink,
};

/// Request key of the root directory.
pub const ROOT_PATH: &str = "/";

const CONTENT_TYPE: &str = "content-type";
const LAST_MODIFIED: &str = "last-modified";
const DIR_TYPE: &str = "dir";
const FILE_TYPE: &str = "file";

type Tree = BTreeMap<String, bool>;

/// A stored response: headers plus body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedResponse {
    /// Response headers, lower-case names.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl CachedResponse {
    fn directory(tree: &Tree) -> Result<Self, FsError> {
        let body = serde_json::to_vec(tree).map_err(|e| FsError::Serialization(e.to_string()))?;
        Ok(Self {
            headers: BTreeMap::from([(CONTENT_TYPE.to_owned(), DIR_TYPE.to_owned())]),
            body,
        })
    }

    fn file(body: Vec<u8>) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            headers: BTreeMap::from([
                (CONTENT_TYPE.to_owned(), FILE_TYPE.to_owned()),
                (LAST_MODIFIED.to_owned(), millis.to_string()),
            ]),
            body,
        }
    }

    /// Value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn kind(&self) -> Option<EntryKind> {
        match self.header(CONTENT_TYPE) {
            Some(DIR_TYPE) => Some(EntryKind::Directory),
            Some(FILE_TYPE) => Some(EntryKind::File),
            _ => None,
        }
    }

    fn last_modified(&self) -> SystemTime {
        self.header(LAST_MODIFIED)
            .and_then(|v| v.parse::<u64>().ok())
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms))
            .unwrap_or(UNIX_EPOCH)
    }
}

/// A named request-to-response map.
pub struct Cache {
    name: String,
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl Cache {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the cache.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored response for `request`.
    pub fn match_request(&self, request: &str) -> Option<CachedResponse> {
        self.lock().get(request).cloned()
    }

    /// Store `response` under `request`, replacing any previous one.
    pub fn put(&self, request: impl Into<String>, response: CachedResponse) {
        self.lock().insert(request.into(), response);
    }

    /// Delete the response for `request`; returns whether one existed.
    pub fn delete(&self, request: &str) -> bool {
        self.lock().remove(request).is_some()
    }

    /// All stored request keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedResponse>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Collection of named caches.
#[derive(Default)]
pub struct CacheStorage {
    caches: Mutex<HashMap<String, Arc<Cache>>>,
}

impl CacheStorage {
    /// Create an empty storage.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open cache `name`, creating it when absent.
    pub fn open(&self, name: &str) -> Arc<Cache> {
        self.lock()
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Cache::new(name.to_owned())))
            .clone()
    }

    /// Whether cache `name` exists.
    pub fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Delete cache `name`; returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Cache>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Entries of one locked cache.
type Entries = HashMap<String, CachedResponse>;

/// The record under `path` if it is an entry of `kind`. A record of the
/// other kind counts as missing.
fn live_record<'a>(entries: &'a Entries, path: &str, kind: EntryKind) -> Result<&'a CachedResponse, FsError> {
    entries
        .get(path)
        .filter(|response| response.kind() == Some(kind))
        .ok_or_else(|| FsError::NotFound {
            name: last_segment(path).to_owned(),
        })
}

fn read_tree(entries: &Entries, path: &str) -> Result<Tree, FsError> {
    let response = live_record(entries, path, EntryKind::Directory)?;
    serde_json::from_slice(&response.body).map_err(|e| FsError::Deserialization(e.to_string()))
}

fn write_tree(entries: &mut Entries, path: &str, tree: &Tree) -> Result<(), FsError> {
    entries.insert(path.to_owned(), CachedResponse::directory(tree)?);
    Ok(())
}

fn child_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Open the root directory of `cache`, creating its record when absent.
pub fn open_root(cache: Arc<Cache>) -> Result<CacheDirectory, FsError> {
    {
        let mut entries = cache.lock();
        if !entries.contains_key(ROOT_PATH) {
            write_tree(&mut entries, ROOT_PATH, &Tree::new())?;
            debug!(cache = %cache.name, "created cache root");
        }
    }
    Ok(CacheDirectory::new(cache, ROOT_PATH.to_owned()))
}

/// Directory record of a [`Cache`].
pub struct CacheDirectory {
    cache: Arc<Cache>,
    path: String,
    name: String,
}

impl CacheDirectory {
    fn new(cache: Arc<Cache>, path: String) -> Self {
        let name = last_segment(&path).to_owned();
        Self { cache, path, name }
    }

    /// Request key of this directory.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Look up or create child `name` of `kind`, returning its request key.
    fn child(&self, name: &str, kind: EntryKind, create: bool) -> Result<String, FsError> {
        let mut entries = self.cache.lock();
        let mut tree = read_tree(&entries, &self.path)?;
        let path = child_path(&self.path, name);
        match tree.get(&path) {
            Some(&is_file) if is_file == (kind == EntryKind::File) => Ok(path),
            Some(_) => Err(FsError::TypeMismatch {
                name: name.to_owned(),
                expected: kind,
            }),
            None if create => {
                let record = match kind {
                    EntryKind::File => CachedResponse::file(Vec::new()),
                    EntryKind::Directory => CachedResponse::directory(&Tree::new())?,
                };
                tree.insert(path.clone(), kind == EntryKind::File);
                write_tree(&mut entries, &self.path, &tree)?;
                entries.insert(path.clone(), record);
                debug!(cache = %self.cache.name, %path, %kind, "created cache entry");
                Ok(path)
            }
            None => Err(FsError::NotFound { name: name.to_owned() }),
        }
    }
}

impl DirectoryAdapter for CacheDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        true
    }

    fn entries(&self) -> Result<EntryIter, FsError> {
        let tree = read_tree(&self.cache.lock(), &self.path)?;
        let entries = tree
            .into_iter()
            .map(|(path, is_file)| {
                let name = last_segment(&path).to_owned();
                let entry = if is_file {
                    AdapterEntry::File(Arc::new(CacheFile::new(self.cache.clone(), path)))
                } else {
                    AdapterEntry::Directory(Arc::new(CacheDirectory::new(self.cache.clone(), path)))
                };
                (name, entry)
            })
            .collect();
        Ok(EntryIter::from_vec(entries))
    }

    fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryAdapter>, FsError> {
        let path = self.child(name, EntryKind::Directory, create)?;
        Ok(Arc::new(CacheDirectory::new(self.cache.clone(), path)))
    }

    fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileAdapter>, FsError> {
        let path = self.child(name, EntryKind::File, create)?;
        Ok(Arc::new(CacheFile::new(self.cache.clone(), path)))
    }

    fn remove_entry(&self, name: &str, recursive: bool) -> Result<(), FsError> {
        let mut entries = self.cache.lock();
        let mut tree = read_tree(&entries, &self.path)?;
        let path = child_path(&self.path, name);
        let is_file = tree
            .remove(&path)
            .ok_or_else(|| FsError::NotFound { name: name.to_owned() })?;

        let mut doomed = vec![path.clone()];
        if !is_file {
            let children = read_tree(&entries, &path)?;
            if !recursive && !children.is_empty() {
                return Err(FsError::InvalidModification {
                    name: name.to_owned(),
                    reason: "directory is not empty",
                });
            }
            let mut pending: Vec<(String, bool)> = children.into_iter().collect();
            while let Some((child, child_is_file)) = pending.pop() {
                if !child_is_file {
                    pending.extend(read_tree(&entries, &child)?);
                }
                doomed.push(child);
            }
        }

        write_tree(&mut entries, &self.path, &tree)?;
        for key in &doomed {
            entries.remove(key);
        }
        debug!(cache = %self.cache.name, %path, removed = doomed.len(), "removed cache entry");
        Ok(())
    }

    fn is_same_entry(&self, other: &dyn DirectoryAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<CacheDirectory>()
            .is_some_and(|other| Arc::ptr_eq(&self.cache, &other.cache) && self.path == other.path)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// File record of a [`Cache`].
pub struct CacheFile {
    cache: Arc<Cache>,
    path: String,
    name: String,
}

impl CacheFile {
    fn new(cache: Arc<Cache>, path: String) -> Self {
        let name = last_segment(&path).to_owned();
        Self { cache, path, name }
    }

    fn response(&self) -> Result<CachedResponse, FsError> {
        live_record(&self.cache.lock(), &self.path, EntryKind::File).cloned()
    }
}

impl FileAdapter for CacheFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        true
    }

    fn get_file(&self) -> Result<File, FsError> {
        let response = self.response()?;
        let last_modified = response.last_modified();
        Ok(File::new(self.name.clone(), response.body, last_modified))
    }

    fn create_writable(&self, options: CreateWritableOptions) -> Result<Box<dyn WriteSink>, FsError> {
        let response = self.response()?;
        let initial = if options.keep_existing_data {
            response.body
        } else {
            Vec::new()
        };
        Ok(Box::new(CacheSink {
            cache: self.cache.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
            buffer: StagedBuffer::new(initial),
        }))
    }

    fn is_same_entry(&self, other: &dyn FileAdapter) -> bool {
        other
            .as_any()
            .downcast_ref::<CacheFile>()
            .is_some_and(|other| Arc::ptr_eq(&self.cache, &other.cache) && self.path == other.path)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct CacheSink {
    cache: Arc<Cache>,
    path: String,
    name: String,
    buffer: StagedBuffer,
}

impl CacheSink {
    fn ensure_exists(&self, entries: &Entries) -> Result<(), FsError> {
        live_record(entries, &self.path, EntryKind::File).map(drop)
    }
}

impl WriteSink for CacheSink {
    fn write(&mut self, command: WriteCommand) -> Result<(), FsError> {
        self.ensure_exists(&self.cache.lock())?;
        self.buffer.apply(command)
    }

    fn close(&mut self) -> Result<(), FsError> {
        let mut entries = self.cache.lock();
        self.ensure_exists(&entries)?;
        let data = std::mem::take(&mut self.buffer).into_inner();
        let size = data.len();
        entries.insert(self.path.clone(), CachedResponse::file(data));
        debug!(cache = %self.cache.name, path = %self.path, size, "committed cache entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> (Arc<Cache>, CacheDirectory) {
        let storage = CacheStorage::new();
        let cache = storage.open("sandboxed-fs");
        (cache.clone(), open_root(cache).unwrap())
    }

    #[test]
    fn storage_reuses_named_caches() {
        let storage = CacheStorage::new();
        let a = storage.open("x");
        let b = storage.open("x");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(storage.has("x"));
        assert!(storage.delete("x"));
        assert!(!storage.has("x"));
    }

    #[test]
    fn directory_record_is_json_tree() {
        let (cache, root) = root();
        root.get_directory("docs", true).unwrap();
        root.get_file("a.txt", true).unwrap();

        let record = cache.match_request(ROOT_PATH).unwrap();
        assert_eq!(record.header("content-type"), Some("dir"));
        let tree: Tree = serde_json::from_slice(&record.body).unwrap();
        assert_eq!(tree.get("/docs"), Some(&false));
        assert_eq!(tree.get("/a.txt"), Some(&true));

        let file = cache.match_request("/a.txt").unwrap();
        assert_eq!(file.header("content-type"), Some("file"));
        assert!(file.header("last-modified").is_some());
    }

    #[test]
    fn nested_paths_and_names() {
        let (cache, root) = root();
        let docs = root.get_directory("docs", true).unwrap();
        let f = docs.get_file("n.txt", true).unwrap();
        assert_eq!(docs.name(), "docs");
        assert_eq!(f.name(), "n.txt");
        assert!(cache.match_request("/docs/n.txt").is_some());
        assert_eq!(root.name(), "");
    }

    #[test]
    fn recursive_removal_deletes_only_the_subtree() {
        let (cache, root) = root();
        let a = root.get_directory("a", true).unwrap();
        a.get_directory("b", true).unwrap().get_file("c", true).unwrap();
        root.get_file("keep", true).unwrap();

        assert!(matches!(
            root.remove_entry("a", false),
            Err(FsError::InvalidModification { .. })
        ));
        assert!(cache.match_request("/a/b/c").is_some());

        root.remove_entry("a", true).unwrap();
        assert_eq!(cache.keys(), ["/", "/keep"]);
    }

    #[test]
    fn commit_replaces_response_body() {
        let (cache, root) = root();
        let f = root.get_file("f", true).unwrap();
        let mut sink = f.create_writable(CreateWritableOptions::REPLACE).unwrap();
        sink.write(WriteCommand::Write {
            position: None,
            data: b"body".to_vec(),
        })
        .unwrap();
        assert!(cache.match_request("/f").unwrap().body.is_empty());
        sink.close().unwrap();
        assert_eq!(cache.match_request("/f").unwrap().body, b"body");
        assert!(f.get_file().unwrap().last_modified() > UNIX_EPOCH);
    }

    #[test]
    fn stale_file_sink_cannot_overwrite_new_directory() {
        let (cache, root) = root();
        let f = root.get_file("x", true).unwrap();
        let mut sink = f.create_writable(CreateWritableOptions::REPLACE).unwrap();
        root.remove_entry("x", false).unwrap();
        let dir = root.get_directory("x", true).unwrap();

        assert!(matches!(f.get_file(), Err(FsError::NotFound { .. })));
        assert!(matches!(
            f.create_writable(CreateWritableOptions::KEEP),
            Err(FsError::NotFound { .. })
        ));
        assert!(matches!(sink.close(), Err(FsError::NotFound { .. })));
        assert_eq!(cache.match_request("/x").unwrap().header("content-type"), Some("dir"));
        assert_eq!(dir.entries().unwrap().count(), 0);
    }

    #[test]
    fn stale_directory_handle_does_not_read_new_file() {
        let (_, root) = root();
        let dir = root.get_directory("x", true).unwrap();
        root.remove_entry("x", false).unwrap();
        root.get_file("x", true).unwrap();
        assert!(matches!(dir.entries(), Err(FsError::NotFound { .. })));
        assert!(matches!(dir.get_file("y", true), Err(FsError::NotFound { .. })));
    }

    #[test]
    fn corrupt_directory_record_is_deserialization_error() {
        let (cache, root) = root();
        cache.put(
            ROOT_PATH,
            CachedResponse {
                headers: BTreeMap::from([("content-type".to_owned(), "dir".to_owned())]),
                body: b"not json".to_vec(),
            },
        );
        assert!(matches!(root.entries(), Err(FsError::Deserialization(_))));
    }
}
