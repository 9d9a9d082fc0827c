// 🪙 Token Registry - denomination → (symbol, decimals)
//
// Built once per process, then shared read-only behind an Arc.
// Runtime registrations happen before the registry is handed to a pipeline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Decimals assumed for EVM contracts we have never seen
pub const EVM_FALLBACK_DECIMALS: u32 = 18;

// ============================================================================
// TOKEN INFO
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Display symbol written to the CSV (e.g., "CTR")
    pub symbol: String,

    /// Base-unit precision: display = raw / 10^decimals
    pub decimals: u32,

    /// Human-readable name
    pub name: String,
}

impl TokenInfo {
    pub fn new(symbol: impl Into<String>, decimals: u32, name: impl Into<String>) -> Self {
        TokenInfo {
            symbol: symbol.into(),
            decimals,
            name: name.into(),
        }
    }
}

/// Registry entry as stored in a JSON registrations file
#[derive(Debug, Clone, Deserialize)]
struct TokenEntry {
    denom: String,
    symbol: String,
    decimals: u32,
    #[serde(default)]
    name: Option<String>,
}

/// How a denom was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Found in the registry
    Registered,

    /// Unregistered EVM contract: synthesized symbol, 18 decimals assumed
    EvmFallback,

    /// Anything else: passthrough symbol, 0 decimals
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub info: TokenInfo,
    pub resolution: Resolution,
}

// ============================================================================
// TOKEN REGISTRY
// ============================================================================

/// Immutable mapping from denomination or contract id to token metadata.
///
/// Lookups are case-insensitive. Resolution never fails: unknown denoms get a
/// synthesized entry so every transaction has a symbol to print.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        TokenRegistry {
            tokens: HashMap::new(),
        }
    }

    /// Registry with the chain's native and common IBC denoms
    pub fn with_defaults() -> Self {
        let mut registry = TokenRegistry::new();
        registry.register_defaults();
        registry
    }

    fn register_defaults(&mut self) {
        // Native token: atto (EVM side), micro (Cosmos side), whole
        self.register("actr", TokenInfo::new("CTR", 18, "Cintara"));
        self.register("uctr", TokenInfo::new("CTR", 6, "Cintara"));
        self.register("ctr", TokenInfo::new("CTR", 0, "Cintara"));

        self.register("wei", TokenInfo::new("ETH", 18, "Ether"));

        // Common IBC assets
        self.register("uatom", TokenInfo::new("ATOM", 6, "Cosmos Hub"));
        self.register("uosmo", TokenInfo::new("OSMO", 6, "Osmosis"));
        self.register("uusdc", TokenInfo::new("USDC", 6, "USD Coin"));
    }

    /// Load extra registrations from a JSON array of
    /// `{"denom", "symbol", "decimals", "name"?}` objects
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read token file: {:?}", path.as_ref()))?;

        let entries: Vec<TokenEntry> = serde_json::from_str(&content)
            .context("Failed to parse token registrations JSON")?;

        let count = entries.len();
        for entry in entries {
            let name = entry.name.unwrap_or_else(|| entry.symbol.clone());
            self.register(&entry.denom, TokenInfo::new(entry.symbol, entry.decimals, name));
        }

        Ok(count)
    }

    /// Register (or replace) a denomination
    pub fn register(&mut self, denom: &str, info: TokenInfo) {
        self.tokens.insert(denom.trim().to_ascii_lowercase(), info);
    }

    /// Exact registry lookup, no fallback
    pub fn get(&self, denom: &str) -> Option<&TokenInfo> {
        self.tokens.get(&denom.trim().to_ascii_lowercase())
    }

    /// Resolve a denom, falling back when it is not registered
    pub fn resolve(&self, denom: &str) -> ResolvedToken {
        if let Some(info) = self.get(denom) {
            return ResolvedToken {
                info: info.clone(),
                resolution: Resolution::Registered,
            };
        }

        let trimmed = denom.trim();
        let contract = trimmed.strip_prefix("erc20/").unwrap_or(trimmed);
        if is_evm_contract(contract) {
            let short = contract[2..8].to_ascii_uppercase();
            return ResolvedToken {
                info: TokenInfo::new(
                    format!("ERC20-{}", short),
                    EVM_FALLBACK_DECIMALS,
                    format!("Unregistered contract {}", contract.to_ascii_lowercase()),
                ),
                resolution: Resolution::EvmFallback,
            };
        }

        let symbol = if trimmed.is_empty() {
            "UNKNOWN".to_string()
        } else {
            trimmed.to_ascii_uppercase()
        };
        ResolvedToken {
            info: TokenInfo::new(symbol, 0, "Unknown token"),
            resolution: Resolution::Unknown,
        }
    }

    /// All registered denoms, sorted (for listing)
    pub fn entries(&self) -> Vec<(&str, &TokenInfo)> {
        let mut out: Vec<(&str, &TokenInfo)> = self
            .tokens
            .iter()
            .map(|(denom, info)| (denom.as_str(), info))
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    pub fn count(&self) -> usize {
        self.tokens.len()
    }
}

fn is_evm_contract(s: &str) -> bool {
    s.len() == 42
        && (s.starts_with("0x") || s.starts_with("0X"))
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

// ============================================================================
// TESTS
// ============================================================================
