//! Content-addressed storage.
//!
//! Backed by SQLite in WAL mode for the inline path, with an optional
//! filesystem overflow for large blobs. A single [`ContentStore`] is not
//! `Sync`; open one per thread against the same database file and let the
//! write-ahead log and busy timeout arbitrate between them.

mod stats;

pub use stats::StoreStats;

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, instrument, warn};

use crate::error::{Result, StrataError};
use crate::ids::Hash;
use crate::model::object::{Location, ObjectKind, StoredObject};
use crate::model::tree::{TreeEntry, decode_tree, encode_tree};

/// Busy-timeout applied to the SQLite connection, matching the "tens of
/// seconds" concurrency guidance.
const BUSY_TIMEOUT_MS: u32 = 30_000;

pub(crate) fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Durable, deduplicating, type-prefixed object store.
pub struct ContentStore {
    conn: Connection,
    blobs_dir: Option<PathBuf>,
    max_blob_size: u64,
    fs_threshold: u64,
    in_batch: Cell<bool>,
}

impl ContentStore {
    /// Opens (creating if absent) the store database at `db_path`.
    ///
    /// `blobs_dir` of `None` disables filesystem overflow regardless of
    /// `fs_threshold`. `fs_threshold` of `0` also disables overflow.
    pub fn open(
        db_path: &Path,
        blobs_dir: Option<PathBuf>,
        max_blob_size: u64,
        fs_threshold: u64,
    ) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let store = Self {
            conn,
            blobs_dir,
            max_blob_size,
            fs_threshold,
            in_batch: Cell::new(false),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS objects (
                hash TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                size INTEGER NOT NULL,
                data BLOB,
                location TEXT NOT NULL,
                created_at REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_objects_kind ON objects(kind);
            CREATE TABLE IF NOT EXISTS stat_cache (
                path TEXT PRIMARY KEY,
                mtime_ns INTEGER NOT NULL,
                size INTEGER NOT NULL,
                blob_hash TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Runs `f` inside a write transaction. Nested calls (detected via an
    /// interior reentrancy flag) pass through without opening a second
    /// transaction, since `rusqlite::Connection`'s native transaction guard
    /// requires `&mut self` and every store method here is `&self` by
    /// design (a store is not shared across threads, but it is shared
    /// across the many call sites within one thread that all hold a `&`).
    pub fn batch<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let already_in_batch = self.in_batch.get();
        if !already_in_batch {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_batch.set(true);
        }
        let result = f(self);
        if already_in_batch {
            return result;
        }
        self.in_batch.set(false);
        match result {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback_err, "rollback failed after batch error");
                }
                Err(e)
            }
        }
    }

    fn fanout_path(&self, hash: &Hash) -> Option<PathBuf> {
        let dir = self.blobs_dir.as_ref()?;
        let s = hash.as_str();
        Some(dir.join(&s[0..2]).join(&s[2..4]).join(s))
    }

    /// Stores `bytes` under `kind`, returning its hash. Idempotent: storing
    /// identical bytes under the same kind twice is a no-op the second time.
    #[instrument(skip(self, bytes), fields(kind = %kind, len = bytes.len()))]
    pub fn put(&self, bytes: &[u8], kind: ObjectKind) -> Result<Hash> {
        let hash = Hash::digest(kind.as_str(), bytes);
        if self.exists(&hash)? {
            return Ok(hash);
        }
        if kind == ObjectKind::Blob && bytes.len() as u64 > self.max_blob_size && self.max_blob_size > 0 {
            return Err(StrataError::LimitExceeded {
                what: "blob size".to_owned(),
                limit: self.max_blob_size,
                actual: bytes.len() as u64,
            });
        }
        let use_fs = kind == ObjectKind::Blob
            && self.fs_threshold > 0
            && bytes.len() as u64 > self.fs_threshold
            && self.blobs_dir.is_some();
        if use_fs {
            self.put_fs(&hash, bytes, kind)
        } else {
            self.put_inline(&hash, bytes, kind)
        }
    }

    fn put_inline(&self, hash: &Hash, bytes: &[u8], kind: ObjectKind) -> Result<Hash> {
        self.conn.execute(
            "INSERT OR IGNORE INTO objects (hash, kind, size, data, location, created_at)
             VALUES (?1, ?2, ?3, ?4, 'inline', ?5)",
            params![hash.as_str(), kind.as_str(), bytes.len() as i64, bytes, now_secs()],
        )?;
        Ok(hash.clone())
    }

    fn put_fs(&self, hash: &Hash, bytes: &[u8], kind: ObjectKind) -> Result<Hash> {
        let path = self.fanout_path(hash).expect("use_fs implies blobs_dir is set");
        let parent = path.parent().expect("fanout path always has a parent");
        std::fs::create_dir_all(parent).map_err(|e| io_failure("creating blob fanout directory", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_failure("creating temp blob file", e))?;
        use std::io::Write;
        tmp.write_all(bytes).map_err(|e| io_failure("writing temp blob file", e))?;
        tmp.as_file().sync_all().map_err(|e| io_failure("fsyncing temp blob file", e))?;
        tmp.persist(&path).map_err(|e| io_failure("renaming temp blob file into place", e.error))?;

        let insert = self.conn.execute(
            "INSERT OR IGNORE INTO objects (hash, kind, size, data, location, created_at)
             VALUES (?1, ?2, ?3, NULL, 'fs', ?4)",
            params![hash.as_str(), kind.as_str(), bytes.len() as i64, now_secs()],
        );
        if let Err(e) = insert {
            if let Err(remove_err) = std::fs::remove_file(&path) {
                warn!(error = %remove_err, path = %path.display(), "failed to remove orphaned fs blob after insert failure");
            }
            return Err(e.into());
        }
        Ok(hash.clone())
    }

    /// Fetches a stored object. Returns `Ok(None)` if no such hash is
    /// recorded, and `Err(Missing)` if it is recorded as `fs`-located but
    /// the filesystem payload is gone.
    pub fn get(&self, hash: &Hash) -> Result<Option<StoredObject>> {
        let row: Option<(String, i64, Option<Vec<u8>>, String)> = self
            .conn
            .query_row(
                "SELECT kind, size, data, location FROM objects WHERE hash = ?1",
                params![hash.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((kind_str, size, data, location)) = row else {
            return Ok(None);
        };
        let kind: ObjectKind = kind_str.parse().map_err(StrataError::from)?;
        let payload = match location.as_str() {
            "inline" => data.unwrap_or_default(),
            "fs" => {
                let path = self.fanout_path(hash).ok_or_else(|| StrataError::Missing { hash: hash.clone() })?;
                std::fs::read(&path).map_err(|_| StrataError::Missing { hash: hash.clone() })?
            }
            other => {
                return Err(StrataError::ConfigInvalid {
                    path: PathBuf::from("<objects table>"),
                    detail: format!("unknown location '{other}'"),
                });
            }
        };
        #[allow(clippy::cast_sign_loss)]
        Ok(Some(StoredObject {
            kind,
            size: size as u64,
            payload,
        }))
    }

    /// Whether `hash` is present in the store.
    pub fn exists(&self, hash: &Hash) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM objects WHERE hash = ?1", params![hash.as_str()], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Canonicalizes, encodes, and stores a tree. Entries need not be
    /// pre-sorted; this sorts by name before serializing.
    pub fn store_tree(&self, entries: &mut [TreeEntry]) -> Result<Hash> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let payload = encode_tree(entries);
        self.put(&payload, ObjectKind::Tree)
    }

    /// Reads back a stored tree's entries.
    pub fn get_tree(&self, hash: &Hash) -> Result<Vec<TreeEntry>> {
        let object = self.get(hash)?.ok_or_else(|| StrataError::NotFound {
            kind: "tree".to_owned(),
            id: hash.to_string(),
        })?;
        decode_tree(&object.payload)
    }

    /// Looks up a cached blob hash for a file by its last-known stat triple.
    pub fn stat_cache_lookup(&self, path: &str, mtime_ns: i64, size: i64) -> Result<Option<Hash>> {
        let row: Option<String> = self
            .conn
            .query_row(
                "SELECT blob_hash FROM stat_cache WHERE path = ?1 AND mtime_ns = ?2 AND size = ?3",
                params![path, mtime_ns, size],
                |r| r.get(0),
            )
            .optional()?;
        row.map(|s| Hash::new(s).map_err(StrataError::from)).transpose()
    }

    /// Records (or overwrites) a stat-cache entry.
    pub fn stat_cache_put(&self, path: &str, mtime_ns: i64, size: i64, blob_hash: &Hash) -> Result<()> {
        self.conn.execute(
            "INSERT INTO stat_cache (path, mtime_ns, size, blob_hash) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET mtime_ns = excluded.mtime_ns, size = excluded.size, blob_hash = excluded.blob_hash",
            params![path, mtime_ns, size, blob_hash.as_str()],
        )?;
        Ok(())
    }

    /// Removes stat-cache rows whose recorded blob hash is in `dead`.
    pub(crate) fn stat_cache_purge(&self, dead: &[Hash]) -> Result<u64> {
        let mut removed = 0u64;
        for hash in dead {
            removed += self.conn.execute("DELETE FROM stat_cache WHERE blob_hash = ?1", params![hash.as_str()])? as u64;
        }
        Ok(removed)
    }

    /// Deletes object rows for the given hashes. Filesystem payload cleanup
    /// is the caller's responsibility, and must happen only after this is
    /// committed (see the GC driver).
    pub(crate) fn delete_objects(&self, hashes: &[Hash]) -> Result<u64> {
        let mut removed = 0u64;
        for hash in hashes {
            removed += self.conn.execute("DELETE FROM objects WHERE hash = ?1", params![hash.as_str()])? as u64;
        }
        Ok(removed)
    }

    /// Returns the fanout path an `fs`-located hash would live at, for
    /// callers that need to delete it after a committed GC sweep.
    pub(crate) fn blob_path(&self, hash: &Hash) -> Option<PathBuf> {
        self.fanout_path(hash)
    }

    /// Aggregate statistics over the store.
    pub fn stats(&self) -> Result<StoreStats> {
        stats::collect(&self.conn)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn io_failure(context: &str, source: std::io::Error) -> StrataError {
    StrataError::IoFailure {
        context: context.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::EntryKind;

    fn temp_store() -> (ContentStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), Some(dir.path().join("blobs")), 0, 0).unwrap();
        (store, dir)
    }

    #[test]
    fn put_is_idempotent() {
        let (store, _dir) = temp_store();
        let a = store.put(b"hello", ObjectKind::Blob).unwrap();
        let b = store.put(b"hello", ObjectKind::Blob).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_kinds_do_not_collide() {
        let (store, _dir) = temp_store();
        let blob = store.put(b"x", ObjectKind::Blob).unwrap();
        let tree = store.put(b"x", ObjectKind::Tree).unwrap();
        assert_ne!(blob, tree);
    }

    #[test]
    fn get_missing_hash_is_none() {
        let (store, _dir) = temp_store();
        let bogus = Hash::digest("blob", b"never stored");
        assert!(store.get(&bogus).unwrap().is_none());
    }

    #[test]
    fn get_round_trips_payload() {
        let (store, _dir) = temp_store();
        let hash = store.put(b"payload bytes", ObjectKind::Blob).unwrap();
        let object = store.get(&hash).unwrap().unwrap();
        assert_eq!(object.payload, b"payload bytes");
        assert_eq!(object.kind, ObjectKind::Blob);
    }

    #[test]
    fn size_limit_applies_only_to_new_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), None, 1_000_000, 0).unwrap();
        let big = vec![0u8; 2_000_000];
        assert!(matches!(store.put(&big, ObjectKind::Blob), Err(StrataError::LimitExceeded { .. })));
    }

    #[test]
    fn dedup_probe_runs_before_size_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), None, 1_000_000_000, 0).unwrap();
        let big = vec![7u8; 2_000_000];
        let hash = store.put(&big, ObjectKind::Blob).unwrap();

        let store2 = ContentStore::open(&dir.path().join("store.db"), None, 10, 0).unwrap();
        // Lowering the limit must not reject re-storing an already-present blob.
        let again = store2.put(&big, ObjectKind::Blob).unwrap();
        assert_eq!(hash, again);
    }

    #[test]
    fn fs_overflow_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), Some(dir.path().join("blobs")), 0, 10).unwrap();
        let big = vec![42u8; 1000];
        let hash = store.put(&big, ObjectKind::Blob).unwrap();
        let path = store.blob_path(&hash).unwrap();
        assert!(path.exists());
        let object = store.get(&hash).unwrap().unwrap();
        assert_eq!(object.payload, big);
    }

    #[test]
    fn fs_missing_payload_errors_instead_of_reconstructing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), Some(dir.path().join("blobs")), 0, 10).unwrap();
        let big = vec![9u8; 1000];
        let hash = store.put(&big, ObjectKind::Blob).unwrap();
        std::fs::remove_file(store.blob_path(&hash).unwrap()).unwrap();
        assert!(matches!(store.get(&hash), Err(StrataError::Missing { .. })));
    }

    #[test]
    fn store_tree_sorts_by_name() {
        let (store, _dir) = temp_store();
        let h1 = store.put(b"1", ObjectKind::Blob).unwrap();
        let h2 = store.put(b"2", ObjectKind::Blob).unwrap();
        let mut entries = vec![
            TreeEntry::new("zebra", EntryKind::Blob, h1, None),
            TreeEntry::new("apple", EntryKind::Blob, h2, None),
        ];
        let hash = store.store_tree(&mut entries).unwrap();
        let read_back = store.get_tree(&hash).unwrap();
        assert_eq!(read_back[0].name, "apple");
        assert_eq!(read_back[1].name, "zebra");
    }

    #[test]
    fn identical_file_sets_hash_identically_regardless_of_input_order() {
        let (store, _dir) = temp_store();
        let h1 = store.put(b"a", ObjectKind::Blob).unwrap();
        let h2 = store.put(b"b", ObjectKind::Blob).unwrap();
        let mut e1 = vec![
            TreeEntry::new("a.txt", EntryKind::Blob, h1.clone(), None),
            TreeEntry::new("b.txt", EntryKind::Blob, h2.clone(), None),
        ];
        let mut e2 = vec![
            TreeEntry::new("b.txt", EntryKind::Blob, h2, None),
            TreeEntry::new("a.txt", EntryKind::Blob, h1, None),
        ];
        assert_eq!(store.store_tree(&mut e1).unwrap(), store.store_tree(&mut e2).unwrap());
    }

    #[test]
    fn stat_cache_round_trips() {
        let (store, _dir) = temp_store();
        let hash = store.put(b"content", ObjectKind::Blob).unwrap();
        store.stat_cache_put("src/main.rs", 123, 7, &hash).unwrap();
        let found = store.stat_cache_lookup("src/main.rs", 123, 7).unwrap();
        assert_eq!(found, Some(hash));
    }

    #[test]
    fn stat_cache_miss_on_changed_mtime() {
        let (store, _dir) = temp_store();
        let hash = store.put(b"content", ObjectKind::Blob).unwrap();
        store.stat_cache_put("src/main.rs", 123, 7, &hash).unwrap();
        assert!(store.stat_cache_lookup("src/main.rs", 999, 7).unwrap().is_none());
    }

    #[test]
    fn batch_commits_on_success() {
        let (store, _dir) = temp_store();
        let hash = store
            .batch(|s| s.put(b"batched", ObjectKind::Blob))
            .unwrap();
        assert!(store.exists(&hash).unwrap());
    }

    #[test]
    fn batch_rolls_back_on_error() {
        let (store, _dir) = temp_store();
        let bogus = Hash::digest("blob", b"rolled back");
        let result: Result<()> = store.batch(|s| {
            s.put(b"will be rolled back", ObjectKind::Blob)?;
            Err(StrataError::NotFound {
                kind: "test".to_owned(),
                id: "forced failure".to_owned(),
            })
        });
        assert!(result.is_err());
        assert!(!store.exists(&bogus).unwrap());
        assert!(!store.exists(&Hash::digest("blob", b"will be rolled back")).unwrap());
    }

    #[test]
    fn nested_batches_pass_through() {
        let (store, _dir) = temp_store();
        let hash = store
            .batch(|s| s.batch(|inner| inner.put(b"nested", ObjectKind::Blob)))
            .unwrap();
        assert!(store.exists(&hash).unwrap());
    }

    #[test]
    fn stats_reports_counts_by_kind() {
        let (store, _dir) = temp_store();
        store.put(b"a", ObjectKind::Blob).unwrap();
        store.put(b"b", ObjectKind::Blob).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_objects, 2);
        assert_eq!(stats.by_kind.get(ObjectKind::Blob.as_str()).copied().unwrap_or(0), 2);
    }
}
