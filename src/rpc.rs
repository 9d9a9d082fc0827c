// 🌐 Indexed Search - Tendermint RPC discovery and block time lookup
//
// The node's tx indexer is the structured discovery path. When it is available,
// records come back decoded (events, result code) and are marked Decoded.
// The HTTP client is behind the `rpc` feature; the parsing and the strategy
// work against the traits so tests can use fakes.

use crate::address::{encode_bech32, WalletAddress};
use crate::error::RpcError;
use crate::normalizer::{Confidence, NormalizedTransaction, Provenance, TimestampSource};
use crate::strategy::{DiscoveryRequest, DiscoveryStrategy, StrategyOutcome};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// One decoded event: type plus (key, value) attributes in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEvent {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl RpcEvent {
    pub fn new(kind: &str, attributes: &[(&str, &str)]) -> Self {
        RpcEvent {
            kind: kind.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One transaction as reported by `/tx_search`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcTx {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub events: Vec<RpcEvent>,

    /// Some indexers report the block time directly
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxSearchPage {
    pub txs: Vec<RpcTx>,
    pub total_count: u64,
}

/// Indexed transaction search
pub trait TxSearchClient {
    /// `page` is 1-based
    fn tx_search(&self, query: &str, page: u32, per_page: u32) -> Result<TxSearchPage, RpcError>;
}

/// Block height to block time
pub trait BlockTimeLookup {
    fn block_time(&self, height: u64) -> Option<DateTime<Utc>>;
}

/// Per-request memo in front of a block lookup
pub struct MemoizedBlockTimes<'a> {
    inner: &'a dyn BlockTimeLookup,
    cache: Mutex<HashMap<u64, Option<DateTime<Utc>>>>,
}

impl<'a> MemoizedBlockTimes<'a> {
    pub fn new(inner: &'a dyn BlockTimeLookup) -> Self {
        MemoizedBlockTimes {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl BlockTimeLookup for MemoizedBlockTimes<'_> {
    fn block_time(&self, height: u64) -> Option<DateTime<Utc>> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&height) {
                return *hit;
            }
        }

        let at = self.inner.block_time(height);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(height, at);
        }
        at
    }
}

// ============================================================================
// RESPONSE PARSING
// ============================================================================

fn rpc_result(body: &Value) -> Result<&Value, RpcError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("data")
            .and_then(Value::as_str)
            .or_else(|| err.get("message").and_then(Value::as_str))
            .unwrap_or("unknown error");
        return Err(RpcError::Remote(message.to_string()));
    }

    body.get("result")
        .ok_or_else(|| RpcError::Malformed("missing result".to_string()))
}

/// Numbers come back as strings or numbers depending on the node version
fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Parse a `/tx_search` JSON-RPC response
pub fn parse_tx_search(body: &Value) -> Result<TxSearchPage, RpcError> {
    let result = rpc_result(body)?;

    let txs = result
        .get("txs")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::Malformed("missing txs".to_string()))?;

    let mut page = TxSearchPage {
        txs: Vec::with_capacity(txs.len()),
        total_count: as_u64(result.get("total_count")).unwrap_or(0),
    };

    for tx in txs {
        let hash = tx
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Malformed("tx without hash".to_string()))?;
        let tx_result = tx.get("tx_result");

        let events = tx_result
            .and_then(|r| r.get("events"))
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(parse_event).collect())
            .unwrap_or_default();

        let timestamp = tx
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        page.txs.push(RpcTx {
            hash: hash.to_string(),
            height: as_u64(tx.get("height")).unwrap_or(0),
            code: as_u64(tx_result.and_then(|r| r.get("code"))).unwrap_or(0) as u32,
            events,
            timestamp,
        });
    }

    Ok(page)
}

/// Parse a `/block` JSON-RPC response into the header time
pub fn parse_block_time(body: &Value) -> Result<DateTime<Utc>, RpcError> {
    let time = rpc_result(body)?
        .pointer("/block/header/time")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::Malformed("missing block.header.time".to_string()))?;

    DateTime::parse_from_rfc3339(time)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RpcError::Malformed(format!("bad block time {:?}: {}", time, e)))
}

fn parse_event(event: &Value) -> Option<RpcEvent> {
    let kind = event.get("type").and_then(Value::as_str)?.to_string();

    let raw: Vec<(String, String)> = event
        .get("attributes")
        .and_then(Value::as_array)
        .map(|attrs| {
            attrs
                .iter()
                .map(|a| {
                    let text = |k: &str| a.get(k).and_then(Value::as_str).unwrap_or("").to_string();
                    (text("key"), text("value"))
                })
                .collect()
        })
        .unwrap_or_default();

    // Older nodes base64-encode attributes. Only decode when every key decodes
    // to an identifier, so plain keys such as "receiver" are left alone.
    let decoded_keys: Option<Vec<String>> = raw
        .iter()
        .map(|(k, _)| decode_base64_text(k).filter(|d| is_identifier(d)))
        .collect();

    let attributes = match decoded_keys {
        Some(keys) if !keys.is_empty() => keys
            .into_iter()
            .zip(raw.iter())
            .map(|(k, (_, v))| (k, decode_base64_text(v).unwrap_or_else(|| v.clone())))
            .collect(),
        _ => raw,
    };

    Some(RpcEvent { kind, attributes })
}

fn decode_base64_text(s: &str) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    let bytes = BASE64.decode(s).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.chars().all(|c| !c.is_control()).then_some(text)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'.')
}

// ============================================================================
// RECORD MAPPING
// ============================================================================

/// Split `1000uctr` (or `1000uctr,5uatom`) into its first (amount, denom)
pub fn parse_coin(s: &str) -> Option<(u128, String)> {
    let first = s.split(',').next()?.trim();
    let digits = first.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let amount = first[..digits].parse().ok()?;
    Some((amount, first[digits..].to_string()))
}

/// Turn one indexed tx into a normalized record
pub fn to_normalized(
    tx: &RpcTx,
    wallet: &WalletAddress,
    native_denom: &str,
    blocks: Option<&dyn BlockTimeLookup>,
    strategy: &str,
) -> NormalizedTransaction {
    let find = |kind: &str, key: &str| {
        tx.events
            .iter()
            .filter(|e| e.kind == kind)
            .find_map(|e| e.get(key))
            .map(str::to_string)
    };

    let fee = find("tx", "fee").and_then(|f| parse_coin(&f)).map(|(v, _)| v).unwrap_or(0);
    let fee_text = find("tx", "fee").unwrap_or_default();

    // Transfers touching the wallet, skipping the fee payment
    let transfers: Vec<&RpcEvent> = tx
        .events
        .iter()
        .filter(|e| e.kind == "transfer")
        .filter(|e| e.get("amount").map_or(false, |a| a != fee_text))
        .collect();
    let touches_wallet = |e: &RpcEvent| {
        e.get("sender").map_or(false, |s| wallet.same_as(s))
            || e.get("recipient").map_or(false, |r| wallet.same_as(r))
    };
    let primary = transfers
        .iter()
        .copied()
        .find(|e| touches_wallet(e))
        .or_else(|| transfers.first().copied());

    let evm = tx.events.iter().find(|e| e.kind == "ethereum_tx");

    let (amount, denom) = primary
        .and_then(|e| e.get("amount"))
        .and_then(parse_coin)
        .or_else(|| {
            evm.and_then(|e| e.get("amount"))
                .and_then(|a| a.parse().ok())
                .map(|v| (v, native_denom.to_string()))
        })
        .unwrap_or((0, native_denom.to_string()));

    // Second leg: a later transfer in a different denom
    let counter = transfers
        .iter()
        .filter_map(|e| e.get("amount").and_then(parse_coin))
        .find(|(_, d)| *d != denom);

    let from_address = primary
        .and_then(|e| e.get("sender"))
        .map(str::to_string)
        .or_else(|| find("message", "sender"))
        .unwrap_or_else(|| wallet.original().to_string());
    let to_address = primary
        .and_then(|e| e.get("recipient"))
        .map(str::to_string)
        .or_else(|| evm.and_then(|e| e.get("recipient")).map(str::to_string))
        .unwrap_or_default();

    let (timestamp, timestamp_source) = match tx.timestamp {
        Some(at) => (at, TimestampSource::Indexed),
        None => match blocks.and_then(|b| b.block_time(tx.height)) {
            Some(at) => (at, TimestampSource::Block),
            None => {
                debug!(hash = %tx.hash, height = tx.height, "No block time, using epoch");
                (DateTime::<Utc>::default(), TimestampSource::Estimated)
            }
        },
    };

    let message_type = find("message", "action").unwrap_or_else(|| {
        if evm.is_some() {
            "ethereum_tx".to_string()
        } else {
            String::new()
        }
    });

    NormalizedTransaction {
        hash: format!("0x{}", tx.hash.trim_start_matches("0x").to_ascii_lowercase()),
        height: Some(tx.height),
        timestamp,
        from_address: canonical_address(&from_address),
        to_address: canonical_address(&to_address),
        amount,
        denom,
        fee,
        memo: find("tx", "memo").unwrap_or_default(),
        success: tx.code == 0,
        message_type,
        event_types: tx.events.iter().map(|e| e.kind.clone()).collect::<BTreeSet<_>>(),
        counter_amount: counter.as_ref().map(|(v, _)| *v),
        counter_denom: counter.map(|(_, d)| d),
        timestamp_source,
        provenance: Provenance {
            strategy: strategy.to_string(),
            confidence: Confidence::Decoded,
        },
    }
}

/// Account addresses go out as `0x` hex; anything else (pool ids, module
/// names) stays as reported
fn canonical_address(s: &str) -> String {
    WalletAddress::parse(s)
        .map(|a| a.to_evm())
        .unwrap_or_else(|_| s.to_string())
}

// ============================================================================
// STRATEGY
// ============================================================================

pub const RPC_STRATEGY: &str = "rpc_tx_search";

/// Discovery through the node's tx indexer
pub struct RpcSearchStrategy {
    client: Arc<dyn TxSearchClient>,
    blocks: Option<Arc<dyn BlockTimeLookup>>,
    per_page: u32,
    max_pages: u32,
    bech32_prefix: String,
    native_denom: String,
}

impl RpcSearchStrategy {
    pub fn new(client: Arc<dyn TxSearchClient>, per_page: u32, max_pages: u32) -> Self {
        RpcSearchStrategy {
            client,
            blocks: None,
            per_page: per_page.max(1),
            max_pages: max_pages.max(1),
            bech32_prefix: "cintara".to_string(),
            native_denom: "actr".to_string(),
        }
    }

    pub fn with_block_lookup(mut self, blocks: Arc<dyn BlockTimeLookup>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub fn with_bech32_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bech32_prefix = prefix.into();
        self
    }

    pub fn with_native_denom(mut self, denom: impl Into<String>) -> Self {
        self.native_denom = denom.into();
        self
    }

    /// Event queries that can mention the wallet
    pub fn queries(&self, wallet: &WalletAddress) -> Vec<String> {
        let chain = match wallet.hrp() {
            Some(_) => wallet.original().to_string(),
            None => encode_bech32(&self.bech32_prefix, wallet.bytes())
                .unwrap_or_else(|| wallet.original().to_string()),
        };
        let evm = wallet.to_evm();

        vec![
            format!("message.sender='{}'", chain),
            format!("transfer.recipient='{}'", chain),
            format!("transfer.sender='{}'", chain),
            format!("ethereum_tx.recipient='{}'", evm),
        ]
    }
}

impl DiscoveryStrategy for RpcSearchStrategy {
    fn name(&self) -> &str {
        RPC_STRATEGY
    }

    fn discover(&self, request: &DiscoveryRequest<'_>) -> StrategyOutcome {
        let mut outcome = StrategyOutcome::default();
        let mut seen = HashSet::new();

        let memo = self.blocks.as_deref().map(MemoizedBlockTimes::new);
        let blocks = memo.as_ref().map(|m| m as &dyn BlockTimeLookup);

        for query in self.queries(request.wallet) {
            let mut fetched: u64 = 0;

            for page in 1..=self.max_pages {
                let result = match self.client.tx_search(&query, page, self.per_page) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(query = %query, page, error = %e, "tx_search failed");
                        outcome.errors.push(format!("{}: {}", query, e));
                        break;
                    }
                };

                let count = result.txs.len() as u64;
                fetched += count;
                outcome.examined += count as usize;

                for tx in &result.txs {
                    let normalized = to_normalized(tx, request.wallet, &self.native_denom, blocks, RPC_STRATEGY);
                    if seen.insert(normalized.hash.clone()) {
                        outcome.transactions.push(normalized);
                    }
                }

                if count == 0 || fetched >= result.total_count {
                    break;
                }
                if page == self.max_pages {
                    info!(query = %query, fetched, total = result.total_count, "tx_search page limit reached");
                    outcome.truncated = true;
                }
            }
        }

        debug!(found = outcome.transactions.len(), "RPC discovery finished");
        outcome
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

#[cfg(feature = "rpc")]
pub use http::TendermintRpcClient;

#[cfg(feature = "rpc")]
mod http {
    use super::*;
    use reqwest::blocking::Client;
    use std::time::Duration;

    /// Blocking JSON-RPC client for a Tendermint/CometBFT node
    pub struct TendermintRpcClient {
        base: String,
        client: Client,
    }

    impl TendermintRpcClient {
        pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(TendermintRpcClient {
                base: base.into().trim_end_matches('/').to_string(),
                client,
            })
        }

        fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, RpcError> {
            let url = format!("{}{}", self.base, path);
            let resp = self.client.get(&url).query(query).send()?;
            let status = resp.status();
            let body: Value = resp.json()?;
            if !status.is_success() && body.get("error").is_none() {
                return Err(RpcError::Remote(format!("{} returned {}", url, status)));
            }
            Ok(body)
        }
    }

    impl TxSearchClient for TendermintRpcClient {
        fn tx_search(&self, query: &str, page: u32, per_page: u32) -> Result<TxSearchPage, RpcError> {
            let body = self.get_json(
                "/tx_search",
                &[
                    ("query", format!("\"{}\"", query)),
                    ("prove", "false".to_string()),
                    ("page", page.to_string()),
                    ("per_page", per_page.to_string()),
                    ("order_by", "\"desc\"".to_string()),
                ],
            )?;
            parse_tx_search(&body)
        }
    }

    impl BlockTimeLookup for TendermintRpcClient {
        fn block_time(&self, height: u64) -> Option<DateTime<Utc>> {
            let result = self
                .get_json("/block", &[("height", height.to_string())])
                .and_then(|body| parse_block_time(&body));

            match result {
                Ok(at) => Some(at),
                Err(e) => {
                    warn!(height, error = %e, "Block lookup failed");
                    None
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
