// 🗄️ KV Store + Scanner - bounded iteration over the opaque key-value store
//
// The store is read-only from our side: a node process keeps writing to it.
// The node's own LevelDB directories are read through a private copy; SQLite
// stores are opened read-only in WAL mode. Either way the scanner gets its own
// handle per export request.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Records fetched per round trip to the store
pub const DEFAULT_PAGE_SIZE: usize = 256;

// ============================================================================
// RAW RECORD
// ============================================================================

/// One key/value pair exactly as stored. Never persisted by us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl RawRecord {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        RawRecord {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// A schema-less, key-ordered store we can page through.
pub trait KvStore {
    /// Return up to `limit` records with key strictly greater than `after`,
    /// in ascending key order. `None` starts from the first key.
    fn read_page(&self, after: Option<&[u8]>, limit: usize) -> Result<Vec<RawRecord>, StoreError>;

    /// When the store content was last changed, if known.
    ///
    /// Used as the best-effort timestamp for records whose block time cannot be
    /// looked up, so an unchanged store always yields the same export.
    fn snapshot_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Short label for logs
    fn describe(&self) -> String;
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

/// On-disk store format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KvBackend {
    /// Directory: LevelDB. File: SQLite.
    #[default]
    Auto,
    LevelDb,
    Sqlite,
}

impl KvBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            KvBackend::Auto => "auto",
            KvBackend::LevelDb => "leveldb",
            KvBackend::Sqlite => "sqlite",
        }
    }

    /// Concrete backend for `path`
    pub fn resolve(self, path: &Path) -> KvBackend {
        match self {
            KvBackend::Auto if path.is_dir() => KvBackend::LevelDb,
            KvBackend::Auto => KvBackend::Sqlite,
            other => other,
        }
    }
}

impl std::fmt::Display for KvBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KvBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(KvBackend::Auto),
            "leveldb" | "goleveldb" => Ok(KvBackend::LevelDb),
            "sqlite" => Ok(KvBackend::Sqlite),
            other => Err(format!("unknown KV backend '{}'", other)),
        }
    }
}

/// Open an on-disk store read-only
pub fn open_store(path: &Path, backend: KvBackend) -> Result<Box<dyn KvStore>, StoreError> {
    match backend.resolve(path) {
        KvBackend::Sqlite => Ok(Box::new(SqliteKvStore::open_read_only(path)?)),
        #[cfg(feature = "leveldb")]
        _ => Ok(Box::new(LevelDbKvStore::open_read_only(path)?)),
        #[cfg(not(feature = "leveldb"))]
        _ => Err(StoreError::Unsupported(format!(
            "{} is a LevelDB store but this build has no leveldb feature",
            path.display()
        ))),
    }
}

// ============================================================================
// LEVELDB BACKEND
// ============================================================================

#[cfg(feature = "leveldb")]
pub use self::leveldb::LevelDbKvStore;

#[cfg(feature = "leveldb")]
mod leveldb {
    use super::{KvStore, RawRecord};
    use crate::error::StoreError;
    use chrono::{DateTime, Utc};
    use rusty_leveldb::{DBIterator, LdbIterator, Options, DB};
    use std::cell::RefCell;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use tracing::debug;

    /// Held by the node for as long as it has the database open
    const LOCK_FILE: &str = "LOCK";

    fn leveldb_error(e: impl std::fmt::Display) -> StoreError {
        StoreError::LevelDb(e.to_string())
    }

    /// Read-only view of a node's LevelDB directory (e.g. `tx_index.db`).
    ///
    /// LevelDB has no read-only mode: opening takes the directory lock and may
    /// rewrite the manifest. The directory is copied into a private temp dir
    /// (without the lock file) and the copy is opened instead, so the running
    /// node is neither blocked nor modified. The copy is removed on drop.
    pub struct LevelDbKvStore {
        source: PathBuf,
        modified: Option<DateTime<Utc>>,
        cursor: RefCell<Cursor>,
        _copy: TempDir,
    }

    /// Live iterator, resumed while pages are requested in order
    struct Cursor {
        db: DB,
        iter: Option<DBIterator>,
        last: Option<Vec<u8>>,
        pending: Option<RawRecord>,
    }

    impl Cursor {
        fn next_record(&mut self) -> Option<RawRecord> {
            let (key, value) = self.iter.as_mut()?.next()?;
            Some(RawRecord::new(key.to_vec(), value.to_vec()))
        }

        /// Fresh iterator positioned just after `after`
        fn restart(&mut self, after: Option<&[u8]>) -> Result<(), StoreError> {
            self.iter = Some(self.db.new_iter().map_err(leveldb_error)?);
            self.pending = None;
            self.last = None;

            if let Some(after) = after {
                while let Some(record) = self.next_record() {
                    if record.key.as_slice() > after {
                        self.pending = Some(record);
                        break;
                    }
                }
            }
            Ok(())
        }
    }

    impl LevelDbKvStore {
        /// Snapshot and open a LevelDB directory. Never writes to `path`.
        pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
            let path = path.as_ref();
            if !path.join("CURRENT").is_file() {
                return Err(StoreError::NotFound(format!("{} (not a LevelDB directory)", path.display())));
            }

            let copy = tempfile::Builder::new().prefix("taxbit-leveldb-").tempdir()?;
            let mut newest = None;
            let mut copied = 0usize;
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() || entry.file_name() == LOCK_FILE {
                    continue;
                }
                newest = newest.max(entry.metadata()?.modified().ok());
                fs::copy(entry.path(), copy.path().join(entry.file_name()))?;
                copied += 1;
            }

            let mut options = Options::default();
            options.create_if_missing = false;
            let db = DB::open(copy.path(), options).map_err(leveldb_error)?;

            debug!(source = %path.display(), files = copied, "opened leveldb snapshot");

            Ok(LevelDbKvStore {
                source: path.to_path_buf(),
                modified: newest.map(DateTime::<Utc>::from),
                cursor: RefCell::new(Cursor {
                    db,
                    iter: None,
                    last: None,
                    pending: None,
                }),
                _copy: copy,
            })
        }
    }

    impl KvStore for LevelDbKvStore {
        fn read_page(&self, after: Option<&[u8]>, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
            let mut cursor = self.cursor.borrow_mut();

            let resumable = cursor.iter.is_some() && after.is_some() && cursor.last.as_deref() == after;
            if !resumable {
                cursor.restart(after)?;
            }

            let mut page = Vec::with_capacity(limit);
            while page.len() < limit {
                let next = match cursor.pending.take() {
                    Some(record) => Some(record),
                    None => cursor.next_record(),
                };
                match next {
                    Some(record) => page.push(record),
                    None => break,
                }
            }

            if let Some(last) = page.last() {
                cursor.last = Some(last.key.clone());
            }
            Ok(page)
        }

        fn snapshot_time(&self) -> Option<DateTime<Utc>> {
            self.modified
        }

        fn describe(&self) -> String {
            format!("leveldb:{}", self.source.display())
        }
    }
}

// ============================================================================
// SQLITE BACKEND
// ============================================================================

/// Name of the key/value table inside the store file
pub const KV_TABLE: &str = "kv";

/// Read-only handle on a SQLite key/value store
pub struct SqliteKvStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteKvStore {
    /// Open an existing store read-only. Never creates the file.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        // Fail fast if the table is missing rather than on first page
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![KV_TABLE],
            |row| row.get(0),
        )?;
        if tables != 1 {
            return Err(StoreError::NotFound(format!(
                "{} (no {} table)",
                path.display(),
                KV_TABLE
            )));
        }

        Ok(SqliteKvStore {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn modified(path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

impl KvStore for SqliteKvStore {
    fn read_page(&self, after: Option<&[u8]>, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
        let limit = limit as i64;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawRecord> {
            Ok(RawRecord {
                key: row.get(0)?,
                value: row.get(1)?,
            })
        };

        let records = match after {
            Some(key) => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT key, value FROM kv WHERE key > ?1 ORDER BY key LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![key, limit], map_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare_cached("SELECT key, value FROM kv ORDER BY key LIMIT ?1")?;
                let rows = stmt.query_map(params![limit], map_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(records)
    }

    fn snapshot_time(&self) -> Option<DateTime<Utc>> {
        // Writes land in the -wal file until checkpoint
        let mut wal = self.path.clone().into_os_string();
        wal.push("-wal");

        let main = Self::modified(&self.path);
        let wal = Self::modified(Path::new(&wal));
        main.into_iter().chain(wal).max().map(DateTime::<Utc>::from)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

/// Create the key/value table in WAL mode (writer side and tests)
pub fn setup_kv_table(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key BLOB PRIMARY KEY NOT NULL,
            value BLOB NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Insert or replace one record (writer side and tests)
pub fn put_record(conn: &Connection, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// Ordered in-memory store, for snapshots already loaded by the caller
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    records: BTreeMap<Vec<u8>, Vec<u8>>,
    snapshot: Option<DateTime<Utc>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: fix the snapshot time reported to the normalizer
    pub fn with_snapshot_time(mut self, at: DateTime<Utc>) -> Self {
        self.snapshot = Some(at);
        self
    }

    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.records.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KvStore for MemoryKvStore {
    fn read_page(&self, after: Option<&[u8]>, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
        use std::ops::Bound;

        let lower = match after {
            Some(key) => Bound::Excluded(key.to_vec()),
            None => Bound::Unbounded,
        };

        Ok(self
            .records
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| RawRecord::new(k.clone(), v.clone()))
            .collect())
    }

    fn snapshot_time(&self) -> Option<DateTime<Utc>> {
        self.snapshot
    }

    fn describe(&self) -> String {
        format!("memory:{} records", self.records.len())
    }
}

// ============================================================================
// SCANNER
// ============================================================================

/// Caps that bound worst-case scan latency independent of store size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Stop after this many records have been examined
    pub scan_cap: usize,

    /// Stop after this many matches have been produced
    pub match_cap: usize,

    /// Records fetched per page
    pub page_size: usize,
}

impl ScanLimits {
    pub fn new(scan_cap: usize, match_cap: usize) -> Self {
        ScanLimits {
            scan_cap,
            match_cap,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for ScanLimits {
    fn default() -> Self {
        ScanLimits::new(10_000, 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
    ScanCap,
    MatchCap,
    ReadError,
}

/// What the scan saw. `truncated` is set when records were left unexamined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub examined: usize,
    pub matched: usize,
    pub truncated: Option<TruncationReason>,
}

impl ScanStats {
    pub fn is_truncated(&self) -> bool {
        self.truncated.is_some()
    }
}

/// Lazy, finite, non-restartable scan.
///
/// `filter` sees every examined record and returns `Some` for a match; each
/// `Some` counts toward `match_cap` and is yielded.
pub struct KvScan<'a, T, F>
where
    F: FnMut(RawRecord) -> Option<T>,
{
    store: &'a dyn KvStore,
    limits: ScanLimits,
    filter: F,
    buffer: VecDeque<RawRecord>,
    cursor: Option<Vec<u8>>,
    exhausted: bool,
    done: bool,
    stats: ScanStats,
}

/// Start a bounded scan over `store`
pub fn scan<'a, T, F>(store: &'a dyn KvStore, limits: ScanLimits, filter: F) -> KvScan<'a, T, F>
where
    F: FnMut(RawRecord) -> Option<T>,
{
    debug!(
        store = %store.describe(),
        scan_cap = limits.scan_cap,
        match_cap = limits.match_cap,
        "starting kv scan"
    );

    let mut scan = KvScan {
        store,
        limits,
        filter,
        buffer: VecDeque::new(),
        cursor: None,
        exhausted: false,
        done: false,
        stats: ScanStats::default(),
    };

    // A zero cap still reports that records were left unexamined
    if limits.scan_cap == 0 {
        scan.stop(TruncationReason::ScanCap);
    } else if limits.match_cap == 0 {
        scan.stop(TruncationReason::MatchCap);
    }
    scan
}

impl<'a, T, F> KvScan<'a, T, F>
where
    F: FnMut(RawRecord) -> Option<T>,
{
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Consume the scan, returning everything it matched plus its stats
    pub fn collect_with_stats(mut self) -> (Vec<T>, ScanStats) {
        let mut out = Vec::new();
        for item in self.by_ref() {
            out.push(item);
        }
        (out, self.stats)
    }

    /// Refill the buffer; false when the store has nothing more
    fn fill(&mut self) -> bool {
        if self.exhausted {
            return false;
        }

        let page = self
            .store
            .read_page(self.cursor.as_deref(), self.limits.page_size.max(1));

        match page {
            Ok(records) => {
                if records.len() < self.limits.page_size.max(1) {
                    self.exhausted = true;
                }
                if let Some(last) = records.last() {
                    self.cursor = Some(last.key.clone());
                }
                let got_any = !records.is_empty();
                self.buffer.extend(records);
                got_any
            }
            Err(e) => {
                warn!(store = %self.store.describe(), error = %e, "kv page read failed, stopping scan");
                self.exhausted = true;
                self.stats.truncated = Some(TruncationReason::ReadError);
                false
            }
        }
    }

    fn has_more(&mut self) -> bool {
        !self.buffer.is_empty() || self.fill()
    }

    fn stop(&mut self, reason: TruncationReason) {
        self.done = true;
        if self.stats.truncated.is_none() && self.has_more() {
            self.stats.truncated = Some(reason);
            debug!(
                examined = self.stats.examined,
                matched = self.stats.matched,
                ?reason,
                "kv scan truncated"
            );
        }
        self.buffer.clear();
    }
}

impl<'a, T, F> Iterator for KvScan<'a, T, F>
where
    F: FnMut(RawRecord) -> Option<T>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while !self.done {
            if self.stats.examined >= self.limits.scan_cap {
                self.stop(TruncationReason::ScanCap);
                break;
            }

            if self.buffer.is_empty() && !self.fill() {
                self.done = true;
                break;
            }

            let record = match self.buffer.pop_front() {
                Some(r) => r,
                None => continue,
            };
            self.stats.examined += 1;

            if let Some(item) = (self.filter)(record) {
                self.stats.matched += 1;
                if self.stats.matched >= self.limits.match_cap {
                    self.stop(TruncationReason::MatchCap);
                }
                return Some(item);
            }
        }
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_store(n: u32) -> MemoryKvStore {
        let mut store = MemoryKvStore::new();
        for i in 0..n {
            let value = if i % 2 == 0 { b"match".to_vec() } else { b"other".to_vec() };
            store.insert(i.to_be_bytes().to_vec(), value);
        }
        store
    }

    fn keep_matches(record: RawRecord) -> Option<RawRecord> {
        if record.value == b"match" {
            Some(record)
        } else {
            None
        }
    }

    #[test]
    fn test_scan_visits_in_key_order() {
        let mut store = MemoryKvStore::new();
        store.insert(b"b".to_vec(), b"2".to_vec());
        store.insert(b"a".to_vec(), b"1".to_vec());
        store.insert(b"c".to_vec(), b"3".to_vec());

        let mut limits = ScanLimits::new(100, 100);
        limits.page_size = 2;
        let keys: Vec<Vec<u8>> = scan(&store, limits, |r| Some(r.key)).collect();

        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_scan_complete_is_not_truncated() {
        let store = numbered_store(10);
        let (matches, stats) = scan(&store, ScanLimits::new(100, 100), keep_matches).collect_with_stats();

        assert_eq!(matches.len(), 5);
        assert_eq!(stats.examined, 10);
        assert!(!stats.is_truncated());
    }

    #[test]
    fn test_scan_cap_truncates() {
        let store = numbered_store(50);
        let mut limits = ScanLimits::new(7, 100);
        limits.page_size = 3;
        let (matches, stats) = scan(&store, limits, keep_matches).collect_with_stats();

        assert_eq!(stats.examined, 7);
        assert_eq!(matches.len(), 4);
        assert_eq!(stats.truncated, Some(TruncationReason::ScanCap));
    }

    #[test]
    fn test_match_cap_truncates() {
        let store = numbered_store(50);
        let (matches, stats) = scan(&store, ScanLimits::new(1000, 3), keep_matches).collect_with_stats();

        assert_eq!(matches.len(), 3);
        assert_eq!(stats.matched, 3);
        assert_eq!(stats.truncated, Some(TruncationReason::MatchCap));
    }

    #[test]
    fn test_cap_hit_on_last_record_is_not_truncation() {
        let store = numbered_store(4);
        let (_, stats) = scan(&store, ScanLimits::new(4, 100), keep_matches).collect_with_stats();

        assert_eq!(stats.examined, 4);
        assert!(!stats.is_truncated());
    }

    #[test]
    fn test_zero_cap_on_non_empty_store_is_truncation() {
        let store = numbered_store(3);

        let (matches, stats) = scan(&store, ScanLimits::new(0, 100), keep_matches).collect_with_stats();
        assert!(matches.is_empty());
        assert_eq!(stats.examined, 0);
        assert_eq!(stats.truncated, Some(TruncationReason::ScanCap));

        let (_, stats) = scan(&store, ScanLimits::new(100, 0), keep_matches).collect_with_stats();
        assert_eq!(stats.truncated, Some(TruncationReason::MatchCap));
    }

    #[test]
    fn test_zero_cap_on_empty_store_is_not_truncation() {
        let store = MemoryKvStore::new();
        let (_, stats) = scan(&store, ScanLimits::new(0, 0), keep_matches).collect_with_stats();
        assert!(!stats.is_truncated());
    }

    #[test]
    fn test_backend_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("kv.sqlite");
        std::fs::write(&file, b"").unwrap();

        assert_eq!(KvBackend::Auto.resolve(dir.path()), KvBackend::LevelDb);
        assert_eq!(KvBackend::Auto.resolve(&file), KvBackend::Sqlite);
        assert_eq!(KvBackend::Sqlite.resolve(dir.path()), KvBackend::Sqlite);
        assert_eq!("LevelDB".parse::<KvBackend>(), Ok(KvBackend::LevelDb));
        assert!("rocks".parse::<KvBackend>().is_err());
    }

    #[cfg(feature = "leveldb")]
    mod leveldb_store {
        use super::*;
        use rusty_leveldb::{Options, DB};

        fn write_node_db(path: &Path) -> DB {
            let mut options = Options::default();
            options.create_if_missing = true;
            let mut db = DB::open(path, options).unwrap();
            db.put(b"tx/1", b"match").unwrap();
            db.put(b"tx/2", b"other").unwrap();
            db.put(b"tx/3", b"match").unwrap();
            db.flush().unwrap();
            db
        }

        fn listing(path: &Path) -> Vec<(std::ffi::OsString, u64)> {
            let mut files: Vec<_> = std::fs::read_dir(path)
                .unwrap()
                .map(|e| {
                    let e = e.unwrap();
                    (e.file_name(), e.metadata().unwrap().len())
                })
                .collect();
            files.sort();
            files
        }

        #[test]
        fn test_leveldb_scan_while_node_holds_lock() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("tx_index.db");
            let _node = write_node_db(&path);
            let before = listing(&path);

            let store = LevelDbKvStore::open_read_only(&path).unwrap();
            let mut limits = ScanLimits::new(10, 10);
            limits.page_size = 1;
            let (matches, stats) = scan(&store, limits, keep_matches).collect_with_stats();

            assert_eq!(stats.examined, 3);
            assert_eq!(matches.len(), 2);
            assert_eq!(matches[1].key, b"tx/3".to_vec());
            assert!(store.snapshot_time().is_some());
            assert_eq!(listing(&path), before);
        }

        #[test]
        fn test_leveldb_page_after_arbitrary_key() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("tx_index.db");
            drop(write_node_db(&path));

            let store = LevelDbKvStore::open_read_only(&path).unwrap();
            let page = store.read_page(Some(b"tx/1"), 10).unwrap();
            assert_eq!(page.len(), 2);
            assert_eq!(page[0].key, b"tx/2".to_vec());

            // Starting over after a partial read
            let page = store.read_page(None, 1).unwrap();
            assert_eq!(page[0].key, b"tx/1".to_vec());
        }

        #[test]
        fn test_open_store_auto_detects_leveldb() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("tx_index.db");
            drop(write_node_db(&path));

            let store = open_store(&path, KvBackend::Auto).unwrap();
            assert!(store.describe().starts_with("leveldb:"));
        }

        #[test]
        fn test_leveldb_rejects_plain_directory() {
            let dir = tempfile::tempdir().unwrap();
            let result = LevelDbKvStore::open_read_only(dir.path());
            assert!(matches!(result, Err(StoreError::NotFound(_))));
        }
    }

    #[test]
    fn test_sqlite_store_read_only_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx_index.sqlite");

        // Writer connection stays open for the whole test
        let writer = Connection::open(&path).unwrap();
        setup_kv_table(&writer).unwrap();
        put_record(&writer, b"k1", b"match").unwrap();
        put_record(&writer, b"k2", b"other").unwrap();

        let store = SqliteKvStore::open_read_only(&path).unwrap();
        let (matches, stats) = scan(&store, ScanLimits::new(10, 10), keep_matches).collect_with_stats();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, b"k1".to_vec());
        assert_eq!(stats.examined, 2);

        // Writer is not blocked by the reader
        put_record(&writer, b"k3", b"match").unwrap();
        assert!(store.snapshot_time().is_some());
    }

    #[test]
    fn test_sqlite_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteKvStore::open_read_only(dir.path().join("nope.sqlite"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_sqlite_never_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sqlite");
        let _ = SqliteKvStore::open_read_only(&path);
        assert!(!path.exists());
    }
}
