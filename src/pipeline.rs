// 🚚 Export Pipeline - one request from address to CSV
//
// discover (every strategy) -> merge -> classify -> convert -> CSV
//
// Runs synchronously on the caller's thread. The registry and config are shared
// read-only between requests; every request opens its own store handle.

use crate::address::WalletAddress;
use crate::classifier::classify_transaction;
use crate::config::PipelineConfig;
use crate::error::{ExportResult, RpcError};
use crate::export::{CsvExporter, ExportOptions};
use crate::merger::{merge, DateRange};
use crate::normalizer::{Confidence, TimestampSource};
use crate::strategy::{DiscoveryRequest, DiscoveryStrategy, KvScanStrategy};
use crate::tokens::TokenRegistry;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Caller input for one export
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    /// `cintara1...` or `0x...`
    pub address: String,

    /// `YYYY-MM-DD` or RFC 3339, inclusive
    pub start: Option<String>,
    pub end: Option<String>,
}

impl ExportRequest {
    pub fn new(address: impl Into<String>) -> Self {
        ExportRequest {
            address: address.into(),
            ..ExportRequest::default()
        }
    }

    pub fn between(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start = start.map(str::to_string);
        self.end = end.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StrategyReport {
    pub name: String,
    pub found: usize,
    pub examined: usize,
    pub truncated: bool,
    pub errors: Vec<String>,
}

/// Finished CSV plus a summary of how it was produced
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub csv: String,
    pub rows: usize,

    /// A strategy stopped at a cap; the CSV may be incomplete
    pub truncated: bool,

    pub low_confidence: usize,
    pub estimated_timestamps: usize,
    pub strategies: Vec<StrategyReport>,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct ExportPipeline {
    registry: Arc<TokenRegistry>,
    options: ExportOptions,
    direction_aware: bool,
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
}

impl ExportPipeline {
    /// Pipeline over an explicit strategy chain, in priority order
    pub fn new(config: &PipelineConfig, registry: Arc<TokenRegistry>, strategies: Vec<Box<dyn DiscoveryStrategy>>) -> Self {
        ExportPipeline {
            registry,
            options: config.export_options(),
            direction_aware: config.direction_aware,
            strategies,
        }
    }

    /// Pipeline with the strategies the config enables: indexed search first,
    /// then the KV scan
    pub fn from_config(config: &PipelineConfig, registry: Arc<TokenRegistry>) -> Result<Self, RpcError> {
        let strategies = build_strategies(config)?;
        Ok(Self::new(config, registry, strategies))
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run one export. Only a bad address or date range is an error.
    pub fn export(&self, request: &ExportRequest) -> ExportResult<ExportReport> {
        let wallet = WalletAddress::parse(&request.address)?;
        let range = DateRange::parse(request.start.as_deref(), request.end.as_deref())?;

        info!(wallet = %wallet, strategies = self.strategies.len(), "Starting export");

        let discovery = DiscoveryRequest {
            wallet: &wallet,
            range: &range,
        };

        let mut results = Vec::with_capacity(self.strategies.len());
        let mut reports = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let outcome = strategy.discover(&discovery);
            reports.push(StrategyReport {
                name: strategy.name().to_string(),
                found: outcome.transactions.len(),
                examined: outcome.examined,
                truncated: outcome.truncated,
                errors: outcome.errors,
            });
            results.push(outcome.transactions);
        }

        let merged = merge(results, &range);

        let classified: Vec<_> = merged
            .into_iter()
            .map(|tx| {
                let category = classify_transaction(&tx, &wallet, self.direction_aware);
                (tx, category)
            })
            .collect();

        let low_confidence = classified
            .iter()
            .filter(|(tx, _)| tx.confidence() == Confidence::Low)
            .count();
        let estimated_timestamps = classified
            .iter()
            .filter(|(tx, _)| tx.timestamp_source == TimestampSource::Estimated)
            .count();

        let csv = CsvExporter::new(&self.registry, &self.options).export(&classified)?;

        let truncated = reports.iter().any(|r| r.truncated);
        if truncated {
            warn!(wallet = %wallet, "Export truncated by a scan cap, results may be incomplete");
        }
        info!(rows = classified.len(), low_confidence, estimated_timestamps, "Export finished");

        Ok(ExportReport {
            csv,
            rows: classified.len(),
            truncated,
            low_confidence,
            estimated_timestamps,
            strategies: reports,
        })
    }
}

/// Strategies enabled by the config
pub fn build_strategies(config: &PipelineConfig) -> Result<Vec<Box<dyn DiscoveryStrategy>>, RpcError> {
    let mut strategies: Vec<Box<dyn DiscoveryStrategy>> = Vec::new();

    #[cfg(feature = "rpc")]
    let node = match &config.rpc_url {
        Some(url) => Some(Arc::new(crate::rpc::TendermintRpcClient::new(
            url.as_str(),
            std::time::Duration::from_secs(config.rpc_timeout_secs),
        )?)),
        None => None,
    };

    #[cfg(feature = "rpc")]
    if let Some(node) = &node {
        let search = crate::rpc::RpcSearchStrategy::new(node.clone(), config.rpc_per_page, config.rpc_max_pages)
            .with_block_lookup(node.clone())
            .with_bech32_prefix(config.bech32_prefix.as_str())
            .with_native_denom(config.native_denom.as_str());
        strategies.push(Box::new(search));
    }

    #[cfg(not(feature = "rpc"))]
    if config.rpc_url.is_some() {
        warn!("Built without the rpc feature, ignoring TAXBIT_RPC_URL");
    }

    if let Some(path) = &config.kv_path {
        #[allow(unused_mut)]
        let mut kv = KvScanStrategy::on_disk(path.clone(), config.kv_backend, config.scan_limits())
            .with_default_denom(config.kv_default_denom.as_str());

        #[cfg(feature = "rpc")]
        if let Some(node) = &node {
            kv = kv.with_block_lookup(node.clone());
        }

        strategies.push(Box::new(kv));
    }

    if strategies.is_empty() {
        warn!("No discovery strategy configured, exports will be header-only");
    }

    Ok(strategies)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::export::HEADER;
    use crate::store::{MemoryKvStore, ScanLimits};
    use crate::strategy::StoreSource;
    use chrono::{TimeZone, Utc};

    const WALLET: &str = "0x400d4a7c9df0b8f438e819b91f7d76b4ed27ce1c";
    const OTHER: &str = "676944eb6ba099d99b7d73d9a20427740e04e3d4";

    fn value_to_other(amount: u64) -> Vec<u8> {
        let wallet = WalletAddress::parse(WALLET).unwrap();
        let mut value = vec![0x0a, 0x14];
        value.extend_from_slice(wallet.bytes());
        value.extend_from_slice(&[0x12, 0x14]);
        value.extend_from_slice(&hex::decode(OTHER).unwrap());
        value.extend_from_slice(&[0u8; 4]);
        value.extend_from_slice(&amount.to_le_bytes());
        value.extend_from_slice(&[0u8; 8]);
        value
    }

    fn pipeline() -> ExportPipeline {
        let mut store = MemoryKvStore::new().with_snapshot_time(Utc.with_ymd_and_hms(2024, 4, 1, 9, 30, 0).unwrap());
        store.insert(b"tx/a".to_vec(), value_to_other(1_000_000_000_000_000_000));
        store.insert(b"tx/b".to_vec(), value_to_other(2_500_000_000_000_000_000));
        store.insert(b"unrelated".to_vec(), vec![9u8; 64]);

        let kv = KvScanStrategy::new(StoreSource::Shared(Arc::new(store)), ScanLimits::default());
        ExportPipeline::new(
            &PipelineConfig::default(),
            Arc::new(TokenRegistry::with_defaults()),
            vec![Box::new(kv)],
        )
    }

    #[test]
    fn test_export_rows() {
        let report = pipeline().export(&ExportRequest::new(WALLET)).unwrap();

        assert_eq!(report.rows, 2);
        assert!(!report.truncated);
        assert_eq!(report.estimated_timestamps, 2);

        let lines: Vec<&str> = report.csv.lines().collect();
        assert_eq!(lines[0], HEADER.join(","));
        assert!(lines[1].starts_with("2024-04-01T09:30:00Z,0x"));
        assert!(lines.iter().skip(1).all(|l| l.contains("Outbound > Transfer")));
        assert!(report.csv.contains(",CTR,2.5,"));
    }

    #[test]
    fn test_export_is_idempotent() {
        let pipeline = pipeline();
        let request = ExportRequest::new(WALLET);

        let first = pipeline.export(&request).unwrap();
        let second = pipeline.export(&request).unwrap();
        assert_eq!(first.csv, second.csv);
    }

    #[test]
    fn test_date_filter_outside_snapshot() {
        let request = ExportRequest::new(WALLET).between(Some("2024-05-01"), None);
        let report = pipeline().export(&request).unwrap();

        assert_eq!(report.rows, 0);
        assert_eq!(report.csv.lines().count(), 1);
    }

    #[test]
    fn test_no_strategies_header_only() {
        let pipeline = ExportPipeline::new(
            &PipelineConfig::default(),
            Arc::new(TokenRegistry::with_defaults()),
            Vec::new(),
        );
        let report = pipeline.export(&ExportRequest::new(WALLET)).unwrap();
        assert_eq!(report.csv, format!("{}\n", HEADER.join(",")));
    }

    #[test]
    fn test_bad_input_is_an_error() {
        let bad_address = pipeline().export(&ExportRequest::new("not-an-address"));
        assert!(matches!(bad_address, Err(ExportError::Address(_))));

        let bad_date = pipeline().export(&ExportRequest::new(WALLET).between(Some("01/02/2024"), None));
        assert!(matches!(bad_date, Err(ExportError::InvalidDate(_))));
    }

    #[test]
    fn test_build_strategies_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            kv_path: Some(dir.path().join("kv.db")),
            ..PipelineConfig::default()
        };

        let pipeline = ExportPipeline::from_config(&config, Arc::new(TokenRegistry::with_defaults())).unwrap();
        assert_eq!(pipeline.strategy_names(), vec![crate::strategy::KV_STRATEGY]);

        // Store file does not exist: degrades to header-only
        let report = pipeline.export(&ExportRequest::new(WALLET)).unwrap();
        assert_eq!(report.rows, 0);
        assert_eq!(report.strategies[0].errors.len(), 1);
    }
}
