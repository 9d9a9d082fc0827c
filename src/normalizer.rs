// 🧾 Transaction Normalizer - canonical records from whatever a strategy recovered
//
// KV records arrive as (key, value, extracted candidates) and are turned into the
// same NormalizedTransaction shape the RPC strategy produces. Never fails: a record
// with nothing recoverable is kept with Confidence::Low.

use crate::address::WalletAddress;
use crate::extractor::{AmountCandidate, ExtractedFields};
use crate::matcher::CandidateMatch;
use crate::rpc::BlockTimeLookup;
use chrono::{DateTime, Utc};
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::OnceLock;

/// Tag assumed for KV records with no readable message type
pub const DEFAULT_MESSAGE_TYPE: &str = "/ethermint.evm.v1.MsgEthereumTx";

// ============================================================================
// TYPES
// ============================================================================

/// Where the timestamp came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampSource {
    /// Block header lookup by height
    Block,

    /// Reported by the indexed search path
    Indexed,

    /// Store snapshot time; stable for an unchanged store, not the real block time
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    /// Decoded from structured node output
    Decoded,

    /// Recovered heuristically: byte-aligned wallet hit, at least one address
    /// and an amount
    Inferred,

    /// Something is missing
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Name of the discovery strategy that produced the record
    pub strategy: String,
    pub confidence: Confidence,
}

/// A transaction in the one shape every strategy produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    /// `0x`-prefixed, unique within a result set
    pub hash: String,
    pub height: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub from_address: String,
    pub to_address: String,

    /// Base units
    pub amount: u128,
    pub denom: String,

    /// Base units of the native fee token
    pub fee: u128,
    pub memo: String,
    pub success: bool,

    /// Message type URL or action, input to classification
    pub message_type: String,
    pub event_types: BTreeSet<String>,

    /// Second leg of a swap, when one was recovered
    pub counter_amount: Option<u128>,
    pub counter_denom: Option<String>,

    pub timestamp_source: TimestampSource,
    pub provenance: Provenance,
}

impl NormalizedTransaction {
    pub fn confidence(&self) -> Confidence {
        self.provenance.confidence
    }

    /// Date part of the timestamp
    pub fn date(&self) -> chrono::NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Inputs shared by every record of one scan
pub struct NormalizeContext<'a> {
    pub target: &'a WalletAddress,
    pub block_lookup: Option<&'a dyn BlockTimeLookup>,
    pub snapshot_time: Option<DateTime<Utc>>,
    pub default_denom: &'a str,
    pub strategy: &'a str,
}

// ============================================================================
// NORMALIZE
// ============================================================================

/// Build a NormalizedTransaction from a matched KV record and its extracted fields
pub fn normalize(
    candidate: &CandidateMatch,
    fields: &ExtractedFields,
    ctx: &NormalizeContext<'_>,
) -> NormalizedTransaction {
    let record = &candidate.record;
    let target = ctx.target.to_evm();

    let hash = hash_key(&record.key);
    let height = parse_height(&record.key);

    let (timestamp, timestamp_source) = resolve_timestamp(height, ctx);

    // Address assignment
    let (from_address, to_address) = match fields.addresses.as_slice() {
        [] => (target.clone(), String::new()),
        [only] if ctx.target.same_as(&only.address) => (target.clone(), String::new()),
        [only] => (target.clone(), only.address.clone()),
        [first, second, ..] => (first.address.clone(), second.address.clone()),
    };

    // Bytes that belong to addresses or the type URL cannot hold an amount
    let mut taken: Vec<Range<usize>> = fields.addresses.iter().map(|a| a.field_span()).collect();
    taken.extend(fields.message_type.as_ref().map(|(_, span)| span.clone()));
    let (amount, counter) = pick_amounts(&fields.amounts, &taken);

    let confidence = if candidate.confident && !fields.addresses.is_empty() && amount.is_some() {
        Confidence::Inferred
    } else {
        Confidence::Low
    };

    let message_type = fields
        .message_type
        .as_ref()
        .map_or_else(|| DEFAULT_MESSAGE_TYPE.to_string(), |(tag, _)| tag.clone());

    NormalizedTransaction {
        hash,
        height,
        timestamp,
        from_address,
        to_address,
        amount: amount.unwrap_or(0),
        denom: ctx.default_denom.to_string(),
        fee: 0,
        memo: String::new(),
        success: true,
        message_type,
        event_types: BTreeSet::new(),
        counter_amount: counter,
        counter_denom: counter.map(|_| ctx.default_denom.to_string()),
        timestamp_source,
        provenance: Provenance {
            strategy: ctx.strategy.to_string(),
            confidence,
        },
    }
}

/// `0x` + SHA-256 of the record key
pub fn hash_key(key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    format!("0x{:x}", hasher.finalize())
}

/// Block height from a `height/<digits>` key fragment
pub fn parse_height(key: &[u8]) -> Option<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"height/([0-9]{1,19})").unwrap_or_else(|_| unreachable!("static pattern"))
    });

    let caps = re.captures(key)?;
    let digits = std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?;
    digits.parse().ok()
}

fn resolve_timestamp(height: Option<u64>, ctx: &NormalizeContext<'_>) -> (DateTime<Utc>, TimestampSource) {
    if let (Some(h), Some(lookup)) = (height, ctx.block_lookup) {
        if let Some(at) = lookup.block_time(h) {
            return (at, TimestampSource::Block);
        }
    }

    (ctx.snapshot_time.unwrap_or_default(), TimestampSource::Estimated)
}

/// Primary amount and optional counter leg, skipping anything inside a taken span
fn pick_amounts(amounts: &[AmountCandidate], taken: &[Range<usize>]) -> (Option<u128>, Option<u128>) {
    let mut usable = amounts
        .iter()
        .filter(|a| !taken.iter().any(|span| a.overlaps(span)));

    let Some(primary) = usable.next() else {
        return (None, None);
    };
    let primary_span = primary.span();

    let counter = usable
        .find(|a| !a.overlaps(&primary_span))
        .map(|a| a.value);

    (Some(primary.value), counter)
}

// ============================================================================
// TESTS
// ============================================================================
