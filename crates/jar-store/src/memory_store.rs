//! The durable memory collection.
//!
//! The whole collection is serialized as one JSON array under
//! [`STORAGE_KEY`] and rewritten on every change. A change is staged on a
//! copy first, written, then committed, so a failed write leaves the
//! in-memory collection as it was. The write step only needs a
//! [`StoreWriter`], which callers may run off their own thread.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;

use jar_core::{
    JarError, MemoryCollection, MemoryRecord, MemoryRepository, STORAGE_KEY, decode_collection,
    encode_collection, now_unix_millis,
};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Default ceiling on the serialized collection, in bytes.
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

pub struct MemoryStore {
    store: Arc<Mutex<Store>>,
    collection: MemoryCollection,
    max_bytes: usize,
    last_write: Option<u64>,
}

/// A serialized collection that passed the quota check and is waiting to be
/// written. Staged writes must be committed in the order they were staged.
#[derive(Debug)]
pub struct StagedWrite {
    collection: MemoryCollection,
    json: String,
    at: u64,
}

/// Handle to the backing file that can outlive a borrow of the store.
#[derive(Clone)]
pub struct StoreWriter {
    store: Arc<Mutex<Store>>,
}

impl StoreWriter {
    pub fn write(&self, staged: &StagedWrite) -> Result<()> {
        self.with_store(|store| store.set(STORAGE_KEY, &staged.json, staged.at))
    }

    pub fn with_store<T>(&self, f: impl FnOnce(&Store) -> T) -> T {
        f(&lock(&self.store))
    }
}

fn lock(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    /// Wrap an opened store and read whatever collection it holds.
    pub fn open(store: Store, max_bytes: usize) -> Self {
        let collection = load_all(&store);
        let last_write = match store.updated_at(STORAGE_KEY) {
            Ok(at) => at.filter(|&at| at > 0),
            Err(e) => {
                tracing::warn!("could not read last write time: {e}");
                None
            }
        };
        tracing::info!(memories = collection.len(), max_bytes, "memory store opened");
        Self {
            store: Arc::new(Mutex::new(store)),
            collection,
            max_bytes,
            last_write,
        }
    }

    /// Open the database file at `path`. A file SQLite does not recognise is
    /// moved aside to `<name>.corrupt-<ms>` and an empty jar takes its place.
    pub fn open_path(path: &Path, max_bytes: usize) -> Result<Self> {
        let store = match Store::open(path) {
            Ok(store) => store,
            Err(e) if e.is_corrupt() => {
                let aside = set_aside(path)?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    "database file is corrupt, starting empty: {e}"
                );
                Store::open(path)?
            }
            Err(e) => return Err(e),
        };
        Ok(Self::open(store, max_bytes))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::open(Store::open_in_memory()?, DEFAULT_MAX_BYTES))
    }

    pub fn writer(&self) -> StoreWriter {
        StoreWriter {
            store: Arc::clone(&self.store),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// When the collection was last written, in Unix ms.
    pub fn last_write(&self) -> Option<u64> {
        self.last_write
    }

    pub fn collection(&self) -> &MemoryCollection {
        &self.collection
    }

    pub fn records(&self) -> &[MemoryRecord] {
        self.collection.records()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Re-read the collection from the backing store.
    #[cfg(test)]
    pub fn load_all(&mut self) -> &MemoryCollection {
        self.collection = self.writer().with_store(load_all);
        &self.collection
    }

    /// Add `record` at the end and persist. On error nothing changes.
    pub fn append(&mut self, record: MemoryRecord) -> Result<()> {
        let staged = self.stage_append(record)?;
        self.writer().write(&staged)?;
        self.commit(staged);
        Ok(())
    }

    /// Swap in a whole new collection, with the same all-or-nothing rule as
    /// [`append`](Self::append).
    pub fn replace_all(&mut self, collection: MemoryCollection) -> Result<()> {
        let staged = self.stage_replace(collection)?;
        self.writer().write(&staged)?;
        self.commit(staged);
        Ok(())
    }

    pub fn stage_append(&self, record: MemoryRecord) -> Result<StagedWrite> {
        let mut next = self.collection.clone();
        next.push(record)?;
        self.stage_replace(next)
    }

    pub fn stage_replace(&self, collection: MemoryCollection) -> Result<StagedWrite> {
        let json = encode_collection(&collection)?;
        if json.len() > self.max_bytes {
            tracing::warn!(
                needed = json.len(),
                limit = self.max_bytes,
                "write rejected by storage quota"
            );
            return Err(StoreError::QuotaExceeded {
                needed: json.len(),
                limit: self.max_bytes,
            });
        }
        Ok(StagedWrite {
            collection,
            json,
            at: now_unix_millis(),
        })
    }

    /// Adopt a staged collection once its write has succeeded.
    pub fn commit(&mut self, staged: StagedWrite) {
        self.collection = staged.collection;
        self.last_write = Some(staged.at);
        tracing::info!(memories = self.collection.len(), "collection written");
    }

    pub fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> jar_core::Result<&MemoryRecord> {
        self.collection.pick_random(rng)
    }

    /// Bytes the current collection occupies once serialized.
    pub fn stored_bytes(&self) -> Result<usize> {
        Ok(encode_collection(&self.collection)?.len())
    }
}

impl MemoryRepository for MemoryStore {
    fn collection(&self) -> &MemoryCollection {
        &self.collection
    }

    fn append(&mut self, record: MemoryRecord) -> jar_core::Result<()> {
        if self.collection.contains(record.id()) {
            return Err(JarError::DuplicateId(record.id().to_string()));
        }
        MemoryStore::append(self, record).map_err(JarError::from)
    }
}

/// Move a damaged database file, and any WAL sidecars, out of the way.
fn set_aside(path: &Path) -> Result<PathBuf> {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".corrupt-{}", now_unix_millis()));
    let aside = path.with_file_name(name);
    fs::rename(path, &aside).map_err(|e| {
        StoreError::InvalidData(format!("failed to move {} aside: {e}", path.display()))
    })?;
    for suffix in ["-wal", "-shm"] {
        let mut from = path.as_os_str().to_owned();
        from.push(suffix);
        let mut to = aside.as_os_str().to_owned();
        to.push(suffix);
        if Path::new(&from).exists() {
            let _ = fs::rename(&from, &to);
        }
    }
    Ok(aside)
}

/// Read the stored collection. Missing, unreadable or corrupt data all come
/// back as an empty collection.
pub fn load_all(store: &Store) -> MemoryCollection {
    let json = match store.get(STORAGE_KEY) {
        Ok(Some(json)) => json,
        Ok(None) => return MemoryCollection::new(),
        Err(e) => {
            tracing::warn!("could not read stored memories, starting empty: {e}");
            return MemoryCollection::new();
        }
    };
    match decode_collection(&json) {
        Ok(collection) => collection,
        Err(e) => {
            tracing::warn!("discarding corrupt stored memories: {e}");
            MemoryCollection::new()
        }
    }
}
