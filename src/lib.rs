// Cintara TaxBit Export - Core Library
// Recovers a wallet's transactions from the node's raw KV store and/or its tx
// indexer, classifies them and writes TaxBit CSV.

pub mod address;
pub mod amount;
pub mod classifier;
pub mod config;
pub mod error;
pub mod export;
pub mod extractor;
pub mod matcher;
pub mod merger;
pub mod normalizer;
pub mod pipeline;
pub mod rpc;
pub mod store;
pub mod strategy;
pub mod tokens;

// Re-export commonly used types
pub use address::WalletAddress;
pub use amount::{convert, DisplayAmount};
pub use classifier::{classify, classify_transaction, Category};
pub use config::PipelineConfig;
pub use error::{AddressError, AmountError, ConfigError, ExportError, RpcError, StoreError};
pub use export::{CsvExporter, ExportOptions, TaxBitRow, HEADER};
pub use extractor::{extract_addresses, extract_amounts, ExtractedFields};
pub use matcher::{CandidateMatch, CandidateMatcher};
pub use merger::{merge, DateRange};
pub use normalizer::{normalize, Confidence, NormalizedTransaction, TimestampSource};
pub use pipeline::{ExportPipeline, ExportReport, ExportRequest};
pub use rpc::{BlockTimeLookup, RpcSearchStrategy, TxSearchClient};
#[cfg(feature = "rpc")]
pub use rpc::TendermintRpcClient;
pub use store::{open_store, scan, KvBackend, KvStore, MemoryKvStore, RawRecord, ScanLimits, ScanStats, SqliteKvStore};
#[cfg(feature = "leveldb")]
pub use store::LevelDbKvStore;
pub use strategy::{DiscoveryStrategy, KvScanStrategy, StoreSource};
pub use tokens::{TokenInfo, TokenRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
