// 🔎 Candidate Matcher - does this record plausibly involve the wallet?
//
// Cheap first pass, linear in the value length. Never decodes anything.

use crate::address::WalletAddress;
use crate::store::RawRecord;

/// A record that passed the involvement check. Dropped once fields are extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMatch {
    pub record: RawRecord,

    /// True when the hit was on the hex-encoded value (the address appears at a
    /// byte boundary); false for the raw-byte containment fallback.
    pub confident: bool,
}

// ============================================================================
// MATCHER
// ============================================================================

#[derive(Debug, Clone)]
pub struct CandidateMatcher {
    hex: String,
    bytes: Vec<u8>,
}

impl CandidateMatcher {
    pub fn new(target: &WalletAddress) -> Self {
        CandidateMatcher {
            hex: target.hex().to_string(),
            bytes: target.bytes().to_vec(),
        }
    }

    /// Does `value` mention the target address?
    pub fn matches(&self, value: &[u8]) -> bool {
        self.check(value).is_some()
    }

    /// Some(confident) on a hit, None otherwise
    pub fn check(&self, value: &[u8]) -> Option<bool> {
        if self.bytes.is_empty() || value.is_empty() {
            return None;
        }

        // (a) the address as hex inside the hex-encoded value; an odd offset
        // means the hit straddles nibbles and is not a real address
        let value_hex = hex::encode(value);
        let mut from = 0;
        while let Some(pos) = value_hex[from..].find(&self.hex) {
            let at = from + pos;
            if at % 2 == 0 {
                return Some(true);
            }
            from = at + 1;
        }

        // (b) address bytes contained in the raw value, including addresses
        // stored as readable hex text
        if contains(value, &self.bytes) || contains_ascii_ci(value, self.hex.as_bytes()) {
            return Some(false);
        }

        None
    }

    /// Adapt to the scanner's filter shape
    pub fn filter(&self, record: RawRecord) -> Option<CandidateMatch> {
        self.check(&record.value)
            .map(|confident| CandidateMatch { record, confident })
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn contains_ascii_ci(haystack: &[u8], needle: &[u8]) -> bool {
    needle.len() <= haystack.len()
        && haystack
            .windows(needle.len())
            .any(|w| w.eq_ignore_ascii_case(needle))
}

// ============================================================================
// TESTS
// ============================================================================
