// 🧭 Discovery Strategies - independent ways of finding a wallet's transactions
//
// Each strategy returns its own list; the merger combines them. A strategy that
// cannot run (store missing, node down) returns an empty outcome and logs why.

use crate::address::WalletAddress;
use crate::extractor::ExtractedFields;
use crate::matcher::CandidateMatcher;
use crate::merger::DateRange;
use crate::normalizer::{normalize, NormalizeContext, NormalizedTransaction};
use crate::rpc::{BlockTimeLookup, MemoizedBlockTimes};
use crate::store::{open_store, scan, KvBackend, KvStore, ScanLimits, ScanStats};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a strategy is asked for
pub struct DiscoveryRequest<'a> {
    pub wallet: &'a WalletAddress,

    /// Strategies may use it to narrow work; the merger applies it regardless
    pub range: &'a DateRange,
}

/// What a strategy hands back
#[derive(Debug, Clone, Default)]
pub struct StrategyOutcome {
    pub transactions: Vec<NormalizedTransaction>,

    /// Records (or indexed txs) looked at
    pub examined: usize,

    /// Stopped at a cap with more left
    pub truncated: bool,

    /// Non-fatal failures, for the report
    pub errors: Vec<String>,
}

pub trait DiscoveryStrategy {
    /// Stable name, recorded in provenance and the report
    fn name(&self) -> &str;

    fn discover(&self, request: &DiscoveryRequest<'_>) -> StrategyOutcome;
}

// ============================================================================
// KV SCAN STRATEGY
// ============================================================================

pub const KV_STRATEGY: &str = "kv_scan";

/// Where the KV strategy reads from
pub enum StoreSource {
    /// On-disk store (LevelDB directory or SQLite file), opened read-only per request
    Disk(PathBuf, KvBackend),

    /// Store already held by the caller
    Shared(Arc<dyn KvStore>),
}

/// Heuristic discovery: scan the raw store, match, extract, normalize
pub struct KvScanStrategy {
    source: StoreSource,
    limits: ScanLimits,
    default_denom: String,
    blocks: Option<Arc<dyn BlockTimeLookup>>,
}

impl KvScanStrategy {
    pub fn new(source: StoreSource, limits: ScanLimits) -> Self {
        KvScanStrategy {
            source,
            limits,
            default_denom: "actr".to_string(),
            blocks: None,
        }
    }

    pub fn on_disk(path: impl Into<PathBuf>, backend: KvBackend, limits: ScanLimits) -> Self {
        Self::new(StoreSource::Disk(path.into(), backend), limits)
    }

    pub fn sqlite(path: impl Into<PathBuf>, limits: ScanLimits) -> Self {
        Self::on_disk(path, KvBackend::Sqlite, limits)
    }

    pub fn leveldb(path: impl Into<PathBuf>, limits: ScanLimits) -> Self {
        Self::on_disk(path, KvBackend::LevelDb, limits)
    }

    pub fn with_default_denom(mut self, denom: impl Into<String>) -> Self {
        self.default_denom = denom.into();
        self
    }

    pub fn with_block_lookup(mut self, blocks: Arc<dyn BlockTimeLookup>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    /// Scan and normalize against an open store
    fn run(&self, store: &dyn KvStore, wallet: &WalletAddress) -> (Vec<NormalizedTransaction>, ScanStats) {
        info!(store = %store.describe(), scan_cap = self.limits.scan_cap, match_cap = self.limits.match_cap, "Scanning KV store");

        let matcher = CandidateMatcher::new(wallet);
        let (matches, stats) = scan(store, self.limits, |record| matcher.filter(record)).collect_with_stats();

        let memo = self.blocks.as_deref().map(MemoizedBlockTimes::new);
        let ctx = NormalizeContext {
            target: wallet,
            block_lookup: memo.as_ref().map(|m| m as &dyn BlockTimeLookup),
            snapshot_time: store.snapshot_time(),
            default_denom: &self.default_denom,
            strategy: KV_STRATEGY,
        };

        let transactions = matches
            .iter()
            .map(|candidate| {
                let fields = ExtractedFields::from_value(&candidate.record.value);
                normalize(candidate, &fields, &ctx)
            })
            .collect();

        (transactions, stats)
    }
}

impl DiscoveryStrategy for KvScanStrategy {
    fn name(&self) -> &str {
        KV_STRATEGY
    }

    fn discover(&self, request: &DiscoveryRequest<'_>) -> StrategyOutcome {
        let (transactions, stats) = match &self.source {
            StoreSource::Disk(path, backend) => match open_store(path, *backend) {
                Ok(store) => self.run(store.as_ref(), request.wallet),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "KV store unavailable, skipping scan");
                    return StrategyOutcome {
                        errors: vec![e.to_string()],
                        ..StrategyOutcome::default()
                    };
                }
            },
            StoreSource::Shared(store) => self.run(store.as_ref(), request.wallet),
        };

        debug!(examined = stats.examined, matched = stats.matched, "KV discovery finished");

        StrategyOutcome {
            transactions,
            examined: stats.examined,
            truncated: stats.is_truncated(),
            errors: Vec::new(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{Confidence, TimestampSource};
    use crate::store::{put_record, setup_kv_table, MemoryKvStore};
    use chrono::{TimeZone, Utc};
    use rusqlite::Connection;

    const WALLET: &str = "0x400d4a7c9df0b8f438e819b91f7d76b4ed27ce1c";
    const OTHER: &str = "676944eb6ba099d99b7d73d9a20427740e04e3d4";

    fn wallet() -> WalletAddress {
        WalletAddress::parse(WALLET).unwrap()
    }

    /// wallet -> other, 5 * 10^18
    fn transfer_value() -> Vec<u8> {
        let mut value = vec![0x0a, 0x14];
        value.extend_from_slice(wallet().bytes());
        value.extend_from_slice(&[0x12, 0x14]);
        value.extend_from_slice(&hex::decode(OTHER).unwrap());
        value.extend_from_slice(&[0u8; 4]);
        value.extend_from_slice(&5_000_000_000_000_000_000u64.to_le_bytes());
        value.extend_from_slice(&[0u8; 8]);
        value
    }

    fn memory_store() -> MemoryKvStore {
        let mut store = MemoryKvStore::new().with_snapshot_time(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
        store.insert(b"tx/height/5/a".to_vec(), transfer_value());
        store.insert(b"tx/other".to_vec(), vec![1, 2, 3, 4]);
        store
    }

    #[test]
    fn test_kv_strategy_normalizes_matches() {
        let strategy = KvScanStrategy::new(StoreSource::Shared(Arc::new(memory_store())), ScanLimits::default());
        let range = DateRange::unbounded();
        let outcome = strategy.discover(&DiscoveryRequest { wallet: &wallet(), range: &range });

        assert_eq!(outcome.examined, 2);
        assert!(!outcome.truncated);
        assert_eq!(outcome.transactions.len(), 1);

        let tx = &outcome.transactions[0];
        assert_eq!(tx.from_address, WALLET);
        assert_eq!(tx.to_address, format!("0x{}", OTHER));
        assert_eq!(tx.amount, 5_000_000_000_000_000_000);
        assert_eq!(tx.height, Some(5));
        assert_eq!(tx.timestamp_source, TimestampSource::Estimated);
        assert_eq!(tx.confidence(), Confidence::Inferred);
        assert_eq!(tx.provenance.strategy, KV_STRATEGY);
    }

    #[test]
    fn test_missing_store_gives_empty_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = KvScanStrategy::sqlite(dir.path().join("absent.db"), ScanLimits::default());
        let range = DateRange::unbounded();
        let outcome = strategy.discover(&DiscoveryRequest { wallet: &wallet(), range: &range });

        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(!dir.path().join("absent.db").exists());
    }

    #[test]
    fn test_sqlite_store_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let conn = Connection::open(&path).unwrap();
        setup_kv_table(&conn).unwrap();
        put_record(&conn, b"tx/1", &transfer_value()).unwrap();

        let strategy = KvScanStrategy::sqlite(&path, ScanLimits::default()).with_default_denom("uctr");
        let range = DateRange::unbounded();
        let outcome = strategy.discover(&DiscoveryRequest { wallet: &wallet(), range: &range });

        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].denom, "uctr");
    }

    #[cfg(feature = "leveldb")]
    #[test]
    fn test_leveldb_store_scan() {
        use rusty_leveldb::{Options, DB};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx_index.db");
        let mut options = Options::default();
        options.create_if_missing = true;
        let mut node = DB::open(&path, options).unwrap();
        node.put(b"tx/height/7/a", &transfer_value()).unwrap();
        node.put(b"tx/height/8/b", &[9, 9, 9]).unwrap();
        node.flush().unwrap();

        let strategy = KvScanStrategy::on_disk(&path, KvBackend::Auto, ScanLimits::default());
        let range = DateRange::unbounded();
        let outcome = strategy.discover(&DiscoveryRequest { wallet: &wallet(), range: &range });

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.examined, 2);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].height, Some(7));
        assert_eq!(outcome.transactions[0].to_address, format!("0x{}", OTHER));
    }

    #[test]
    fn test_missing_leveldb_directory_gives_empty_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = KvScanStrategy::leveldb(dir.path().join("tx_index.db"), ScanLimits::default());
        let range = DateRange::unbounded();
        let outcome = strategy.discover(&DiscoveryRequest { wallet: &wallet(), range: &range });

        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_match_cap_truncates() {
        let mut store = MemoryKvStore::new();
        for i in 0..5u8 {
            store.insert(vec![b'k', i], transfer_value());
        }

        let strategy = KvScanStrategy::new(StoreSource::Shared(Arc::new(store)), ScanLimits::new(100, 2));
        let range = DateRange::unbounded();
        let outcome = strategy.discover(&DiscoveryRequest { wallet: &wallet(), range: &range });

        assert_eq!(outcome.transactions.len(), 2);
        assert!(outcome.truncated);
    }
}
