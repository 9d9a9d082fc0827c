// 🧲 Field Extractor - addresses and amounts from unstructured byte blobs
//
// Both extractors are pure: the same bytes always give the same candidates in
// the same order (earliest offset first). Every candidate records where it came
// from and how, so callers can tell inferred fields from decoded ones.

use regex::bytes::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// EVM account addresses are 20 bytes
pub const ADDRESS_LEN: usize = 20;

/// Amount windows are 8 bytes, read at every byte offset
pub const AMOUNT_WINDOW: usize = 8;

/// Longest run of non-zero bytes read as one integer (window plus carry)
const MAX_INTEGER_BYTES: usize = AMOUNT_WINDOW + 2;

/// Stop after this many accepted amount candidates
pub const MAX_AMOUNT_CANDIDATES: usize = 20;

/// Upper bound for a plausible amount: 10^6 tokens at 18 decimals
pub const MAX_PLAUSIBLE_AMOUNT: u128 = 1_000_000 * 1_000_000_000_000_000_000;

/// Message-type fragments that show up inside length-prefixed fields
const BLOCKLIST: &[&str] = &["ethermint", "ethereum", "cosmos", "msg", "evm", "type.googleapis"];

/// Protobuf length prefix for a 20-byte field
const LEN_PREFIX_20: u8 = 0x14;

// ============================================================================
// CANDIDATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// 20 raw bytes preceded by a protobuf length byte
    LengthPrefixed,

    /// 20 raw bytes found by the sliding window
    RawWindow,

    /// `0x...` literal stored as readable text
    TextLiteral,

    /// Little-endian integer (may extend into carry bytes)
    LittleEndian,

    /// Big-endian 64-bit integer
    BigEndian,
}

impl ExtractionMethod {
    /// Rough confidence, 0-100
    pub fn score(&self) -> u8 {
        match self {
            ExtractionMethod::LengthPrefixed => 90,
            ExtractionMethod::TextLiteral => 80,
            ExtractionMethod::RawWindow => 60,
            ExtractionMethod::LittleEndian => 60,
            ExtractionMethod::BigEndian => 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCandidate {
    /// `0x` + 40 lowercase hex chars
    pub address: String,
    pub offset: usize,
    pub len: usize,
    pub method: ExtractionMethod,
}

impl AddressCandidate {
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Span including the tag and length bytes of a length-prefixed field
    pub fn field_span(&self) -> Range<usize> {
        match self.method {
            ExtractionMethod::LengthPrefixed => self.offset.saturating_sub(2)..self.offset + self.len,
            _ => self.span(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountCandidate {
    /// Base units
    pub value: u128,
    pub offset: usize,
    pub len: usize,
    pub method: ExtractionMethod,
}

impl AmountCandidate {
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    pub fn overlaps(&self, other: &Range<usize>) -> bool {
        self.offset < other.end && other.start < self.offset + self.len
    }
}

/// Everything pulled out of one value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub addresses: Vec<AddressCandidate>,
    pub amounts: Vec<AmountCandidate>,

    /// Readable message type URL and where it sits
    pub message_type: Option<(String, Range<usize>)>,
}

impl ExtractedFields {
    /// Addresses and the type URL first; amounts are read only from what is left
    pub fn from_value(value: &[u8]) -> Self {
        let addresses = extract_addresses(value);
        let message_type = find_message_type(value);

        let mut taken: Vec<Range<usize>> = addresses.iter().map(|a| a.field_span()).collect();
        taken.extend(message_type.as_ref().map(|(_, span)| span.clone()));

        ExtractedFields {
            amounts: extract_amounts_outside(value, &taken),
            addresses,
            message_type,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.amounts.is_empty()
    }
}

// ============================================================================
// ADDRESS EXTRACTION
// ============================================================================

/// Plausible 20-byte addresses, earliest offset first, no duplicates
pub fn extract_addresses(value: &[u8]) -> Vec<AddressCandidate> {
    let mut found: Vec<AddressCandidate> = Vec::new();

    // Pass 1: length-prefixed 20-byte fields
    if value.len() > ADDRESS_LEN {
        for i in 1..=value.len() - ADDRESS_LEN {
            if value[i - 1] != LEN_PREFIX_20 {
                continue;
            }
            let window = &value[i..i + ADDRESS_LEN];
            if accept_address_window(window) && !overlaps_any(&found, i, ADDRESS_LEN) {
                found.push(raw_candidate(window, i, ExtractionMethod::LengthPrefixed));
            }
        }
    }

    // Pass 2: slide over what is left, non-overlapping
    let mut i = 0;
    while i + ADDRESS_LEN <= value.len() {
        if overlaps_any(&found, i, ADDRESS_LEN) {
            i += 1;
            continue;
        }
        let window = &value[i..i + ADDRESS_LEN];
        if accept_address_window(window) {
            found.push(raw_candidate(window, i, ExtractionMethod::RawWindow));
            i += ADDRESS_LEN;
        } else {
            i += 1;
        }
    }

    // Pass 3: readable `0x` literals
    found.extend(extract_text_literals(value));

    found.sort_by_key(|c| c.offset);

    let mut seen = std::collections::HashSet::new();
    found.retain(|c| seen.insert(c.address.clone()));
    found
}

fn raw_candidate(window: &[u8], offset: usize, method: ExtractionMethod) -> AddressCandidate {
    AddressCandidate {
        address: format!("0x{}", hex::encode(window)),
        offset,
        len: ADDRESS_LEN,
        method,
    }
}

fn overlaps_any(found: &[AddressCandidate], offset: usize, len: usize) -> bool {
    found
        .iter()
        .any(|c| offset < c.offset + c.len && c.offset < offset + len)
}

/// Window filters: degenerate, padding overlap, message-type text, low entropy
fn accept_address_window(window: &[u8]) -> bool {
    if window.iter().all(|b| *b == 0x00) || window.iter().all(|b| *b == 0xff) {
        return false;
    }

    // A zero byte at either edge or a run of 4+ zeros means the window
    // straddles padding rather than sitting on an address
    if window[0] == 0 || window[window.len() - 1] == 0 {
        return false;
    }
    if window.windows(4).any(|w| w == [0, 0, 0, 0]) {
        return false;
    }

    let printable = window.iter().filter(|b| (0x20..0x7f).contains(*b)).count();
    if printable >= 16 {
        return false;
    }

    let text: String = window
        .iter()
        .map(|b| (*b as char).to_ascii_lowercase())
        .collect();
    if BLOCKLIST.iter().any(|frag| text.contains(frag)) {
        return false;
    }

    let hex = hex::encode(window);
    let has_digit = hex.bytes().any(|b| b.is_ascii_digit());
    let has_letter = hex.bytes().any(|b| (b'a'..=b'f').contains(&b));
    has_digit && has_letter
}

fn literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"0[xX][0-9a-fA-F]{40}").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

fn extract_text_literals(value: &[u8]) -> Vec<AddressCandidate> {
    literal_regex()
        .find_iter(value)
        .filter(|m| {
            // Longer hex runs are hashes, not addresses
            value.get(m.end()).map_or(true, |b| !b.is_ascii_hexdigit())
                && (m.start() == 0 || !value[m.start() - 1].is_ascii_alphanumeric())
        })
        .filter_map(|m| {
            let literal = std::str::from_utf8(m.as_bytes()).ok()?.to_ascii_lowercase();
            if literal[2..].bytes().all(|b| b == b'0') {
                return None;
            }
            Some(AddressCandidate {
                address: format!("0x{}", &literal[2..]),
                offset: m.start(),
                len: m.end() - m.start(),
                method: ExtractionMethod::TextLiteral,
            })
        })
        .collect()
}

// ============================================================================
// MESSAGE TYPE
// ============================================================================

/// First `/pkg.module.Msg...` fragment in the value, with its byte span
pub fn find_message_type(value: &[u8]) -> Option<(String, Range<usize>)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"/[A-Za-z][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*\.Msg[A-Za-z0-9]+")
            .unwrap_or_else(|_| unreachable!("static pattern"))
    });

    let m = re.find(value)?;
    let tag = std::str::from_utf8(m.as_bytes()).ok()?;
    Some((tag.to_string(), m.range()))
}

// ============================================================================
// AMOUNT EXTRACTION
// ============================================================================
//
// The 8-byte window slides one byte at a time. Neighbouring offsets read the same
// integer shifted by whole bytes, so hits are grouped by the run of non-zero
// bytes ("island") they cover and each island yields its single best reading.

/// Plausible base-unit amounts, earliest offset first, at most
/// `MAX_AMOUNT_CANDIDATES`
pub fn extract_amounts(value: &[u8]) -> Vec<AmountCandidate> {
    extract_amounts_outside(value, &[])
}

/// Like `extract_amounts`, ignoring bytes that belong to already-recognized
/// fields. Runs touching a taken span are part of that field and never read.
pub fn extract_amounts_outside(value: &[u8], taken: &[Range<usize>]) -> Vec<AmountCandidate> {
    let mut found = Vec::new();

    for island in islands(value, taken) {
        if found.len() >= MAX_AMOUNT_CANDIDATES {
            break;
        }
        if island.len() > MAX_INTEGER_BYTES || intersects_taken(&island, taken) {
            continue;
        }

        // Readable text, not an integer
        let printable = value[island.clone()].iter().filter(|b| (0x20..0x7f).contains(*b)).count();
        if printable >= 6 {
            continue;
        }

        if let Some(best) = best_reading(value, &island, taken) {
            found.push(best);
        }
    }

    found
}

/// Maximal runs of non-zero (or taken) bytes; single zero bytes inside a run
/// do not split it
fn islands(value: &[u8], taken: &[Range<usize>]) -> Vec<Range<usize>> {
    let occupied = |i: usize| value[i] != 0 || taken.iter().any(|span| span.contains(&i));

    let mut out = Vec::new();
    let mut i = 0;
    while i < value.len() {
        if !occupied(i) {
            i += 1;
            continue;
        }

        let start = i;
        let mut end = i + 1;
        let mut j = i + 1;
        while j < value.len() {
            if occupied(j) {
                end = j + 1;
            } else if j + 1 >= value.len() || !occupied(j + 1) {
                break;
            }
            j += 1;
        }

        out.push(start..end);
        i = end;
    }
    out
}

fn intersects_taken(span: &Range<usize>, taken: &[Range<usize>]) -> bool {
    taken.iter().any(|t| span.start < t.end && t.start < span.end)
}

/// Every byte of `read` outside the island is a free zero byte
fn reads_only_island(value: &[u8], read: Range<usize>, island: &Range<usize>, taken: &[Range<usize>]) -> bool {
    !intersects_taken(&read, taken)
        && read
            .filter(|i| !island.contains(i))
            .all(|i| value.get(i).map_or(true, |b| *b == 0))
}

/// Best whole-island reading: the fewest significant decimal digits wins
/// (amounts are round numbers, shifted readings are not), then the smallest value
fn best_reading(value: &[u8], island: &Range<usize>, taken: &[Range<usize>]) -> Option<AmountCandidate> {
    let mut readings = Vec::new();

    for s in island.end.saturating_sub(MAX_INTEGER_BYTES)..=island.start {
        if s + AMOUNT_WINDOW > value.len() {
            break;
        }

        let mut window = [0u8; 8];
        window.copy_from_slice(&value[s..s + AMOUNT_WINDOW]);

        // The carry may belong to the next field, so the plain window is tried too
        let wide = read_little_endian(value, s);
        let narrow = (u128::from(u64::from_le_bytes(window)), AMOUNT_WINDOW);
        let little_endian = if wide.1 > AMOUNT_WINDOW { vec![wide, narrow] } else { vec![narrow] };

        for (le_value, le_len) in little_endian {
            if s + le_len >= island.end
                && is_plausible(le_value)
                && reads_only_island(value, s..s + le_len, island, taken)
            {
                readings.push(AmountCandidate {
                    value: le_value,
                    offset: s,
                    len: le_len,
                    method: ExtractionMethod::LittleEndian,
                });
            }
        }

        let be_value = u128::from(u64::from_be_bytes(window));
        if s + AMOUNT_WINDOW >= island.end
            && is_plausible(be_value)
            && reads_only_island(value, s..s + AMOUNT_WINDOW, island, taken)
        {
            readings.push(AmountCandidate {
                value: be_value,
                offset: s,
                len: AMOUNT_WINDOW,
                method: ExtractionMethod::BigEndian,
            });
        }
    }

    readings.into_iter().min_by_key(|c| {
        (
            significant_digits(c.value),
            c.value,
            std::cmp::Reverse(c.method.score()),
            c.offset,
        )
    })
}

/// Decimal digits left after dropping trailing zeros
fn significant_digits(mut v: u128) -> u32 {
    while v != 0 && v % 10 == 0 {
        v /= 10;
    }
    let mut digits = 0;
    while v != 0 {
        digits += 1;
        v /= 10;
    }
    digits
}

/// Read a little-endian integer at `offset`.
///
/// The 8-byte window is extended into the next 8 bytes when those hold a small
/// carry (at most two significant bytes, the rest zero): 18-decimal amounts above
/// `u64::MAX` are stored that way.
fn read_little_endian(value: &[u8], offset: usize) -> (u128, usize) {
    let mut low = [0u8; 8];
    low.copy_from_slice(&value[offset..offset + AMOUNT_WINDOW]);
    let narrow = u128::from(u64::from_le_bytes(low));

    let carry_start = offset + AMOUNT_WINDOW;
    let carry_end = (carry_start + AMOUNT_WINDOW).min(value.len());
    let carry = &value[carry_start.min(value.len())..carry_end];

    let significant = carry.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
    if significant == 0 || significant > 2 {
        return (narrow, AMOUNT_WINDOW);
    }

    let high = carry[..significant]
        .iter()
        .rev()
        .fold(0u128, |acc, b| (acc << 8) | u128::from(*b));
    let wide = narrow | (high << 64);
    if is_plausible(wide) {
        (wide, AMOUNT_WINDOW + carry.len())
    } else {
        (narrow, AMOUNT_WINDOW)
    }
}

fn is_plausible(v: u128) -> bool {
    (1..=MAX_PLAUSIBLE_AMOUNT).contains(&v)
}

// ============================================================================
// TESTS
// ============================================================================
