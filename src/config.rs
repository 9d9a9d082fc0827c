// ⚙️ Pipeline Configuration - environment with defaults
//
// Read once at startup and handed to the pipeline; nothing reads the
// environment after that.

use crate::error::ConfigError;
use crate::export::ExportOptions;
use crate::store::{KvBackend, ScanLimits};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_SCAN_CAP: usize = 10_000;
pub const DEFAULT_MATCH_CAP: usize = 100;
pub const DEFAULT_RPC_PER_PAGE: u32 = 50;
pub const DEFAULT_RPC_MAX_PAGES: u32 = 10;
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Node KV store (LevelDB directory or SQLite file); None disables the KV strategy
    pub kv_path: Option<PathBuf>,

    pub kv_backend: KvBackend,

    /// Node RPC endpoint; None disables indexed search
    pub rpc_url: Option<String>,

    pub scan_cap: usize,
    pub match_cap: usize,
    pub rpc_per_page: u32,
    pub rpc_max_pages: u32,
    pub rpc_timeout_secs: u64,

    pub source_name: String,

    /// Fee token
    pub native_denom: String,

    /// Denom assumed for amounts recovered from raw KV values
    pub kv_default_denom: String,

    /// Chain prefix used to build RPC queries from hex addresses
    pub bech32_prefix: String,

    /// Extra token registrations (JSON)
    pub tokens_file: Option<PathBuf>,

    /// Refine outbound transfers by which side the wallet is on
    pub direction_aware: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            kv_path: None,
            kv_backend: KvBackend::Auto,
            rpc_url: None,
            scan_cap: DEFAULT_SCAN_CAP,
            match_cap: DEFAULT_MATCH_CAP,
            rpc_per_page: DEFAULT_RPC_PER_PAGE,
            rpc_max_pages: DEFAULT_RPC_MAX_PAGES,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            source_name: "Cintara".to_string(),
            native_denom: "actr".to_string(),
            kv_default_denom: "actr".to_string(),
            bech32_prefix: "cintara".to_string(),
            tokens_file: None,
            direction_aware: true,
        }
    }
}

impl PipelineConfig {
    /// Load from `TAXBIT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup (the environment, or a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PipelineConfig::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_url = text("TAXBIT_RPC_URL").map(validate_rpc_url).transpose()?;

        Ok(PipelineConfig {
            kv_path: text("TAXBIT_KV_PATH").map(PathBuf::from),
            kv_backend: parsed(&text, "TAXBIT_KV_BACKEND", defaults.kv_backend),
            rpc_url,
            scan_cap: parsed(&text, "TAXBIT_SCAN_CAP", defaults.scan_cap),
            match_cap: parsed(&text, "TAXBIT_MATCH_CAP", defaults.match_cap),
            rpc_per_page: parsed(&text, "TAXBIT_RPC_PER_PAGE", defaults.rpc_per_page),
            rpc_max_pages: parsed(&text, "TAXBIT_RPC_MAX_PAGES", defaults.rpc_max_pages),
            rpc_timeout_secs: parsed(&text, "TAXBIT_RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs),
            source_name: text("TAXBIT_SOURCE_NAME").unwrap_or(defaults.source_name),
            native_denom: text("TAXBIT_NATIVE_DENOM").unwrap_or(defaults.native_denom),
            kv_default_denom: text("TAXBIT_KV_DEFAULT_DENOM").unwrap_or(defaults.kv_default_denom),
            bech32_prefix: text("TAXBIT_BECH32_PREFIX").unwrap_or(defaults.bech32_prefix),
            tokens_file: text("TAXBIT_TOKENS_FILE").map(PathBuf::from),
            direction_aware: parsed(&text, "TAXBIT_DIRECTION_AWARE", defaults.direction_aware),
        })
    }

    /// Override the RPC endpoint, with the same check as `TAXBIT_RPC_URL`
    pub fn set_rpc_url(&mut self, url: impl Into<String>) -> Result<(), ConfigError> {
        self.rpc_url = Some(validate_rpc_url(url.into())?);
        Ok(())
    }

    pub fn scan_limits(&self) -> ScanLimits {
        ScanLimits::new(self.scan_cap, self.match_cap)
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            source_name: self.source_name.clone(),
            native_denom: self.native_denom.clone(),
        }
    }
}

fn validate_rpc_url(url: String) -> Result<String, ConfigError> {
    let url = url.trim().to_string();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url)
    } else {
        Err(ConfigError::InvalidValue {
            var: "TAXBIT_RPC_URL".to_string(),
            reason: format!("{:?} must start with http:// or https://", url),
        })
    }
}

/// Parse a value, warning and falling back to the default when it is malformed
fn parsed<T, F>(text: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match text(key) {
        Some(raw) => match raw.to_ascii_lowercase().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid {} '{}', defaulting to {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}

// ============================================================================
// TESTS
// ============================================================================
