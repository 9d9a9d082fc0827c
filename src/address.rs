// 🏷️ Wallet Addresses - hex and bech32 normalization
// Every address the pipeline compares is reduced to 40 lowercase hex chars.

use crate::error::AddressError;
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// WALLET ADDRESS
// ============================================================================

/// A wallet address as supplied by the caller, with its 20-byte payload decoded.
///
/// `original` keeps whatever the caller typed (`cintara1...` or `0x...`) so RPC
/// queries can use the chain-native form; comparisons always use `hex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletAddress {
    original: String,
    hex: String,
    bytes: Vec<u8>,
    hrp: Option<String>,
}

impl WalletAddress {
    /// Parse a `0x`-prefixed (or bare) hex address or a bech32 chain address
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Some(hex_part) = strip_hex_prefix(trimmed) {
            return Self::from_hex(trimmed, hex_part);
        }

        // Bare 40-char hex is accepted too
        if trimmed.len() == 40 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Self::from_hex(trimmed, trimmed);
        }

        let (hrp, bytes) = decode_bech32(trimmed)?;
        if bytes.len() != 20 {
            return Err(AddressError::WrongLength(bytes.len()));
        }

        Ok(WalletAddress {
            original: trimmed.to_string(),
            hex: hex::encode(&bytes),
            bytes,
            hrp: Some(hrp),
        })
    }

    fn from_hex(original: &str, hex_part: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(hex_part)
            .map_err(|_| AddressError::InvalidHex(original.to_string()))?;
        if bytes.len() != 20 {
            return Err(AddressError::WrongLength(bytes.len()));
        }

        Ok(WalletAddress {
            original: original.to_string(),
            hex: hex_part.to_ascii_lowercase(),
            bytes,
            hrp: None,
        })
    }

    /// Lowercase hex without prefix (what the matcher searches for)
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Decoded 20-byte payload
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Address exactly as supplied
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Bech32 human-readable part, when the input was a chain address
    pub fn hrp(&self) -> Option<&str> {
        self.hrp.as_deref()
    }

    /// Canonical `0x` form used in output rows
    pub fn to_evm(&self) -> String {
        format!("0x{}", self.hex)
    }

    /// Does `other` (any supported form) refer to this wallet?
    pub fn same_as(&self, other: &str) -> bool {
        normalize_hex(other).map_or(false, |h| h == self.hex)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

/// Reduce any supported address form to 40 lowercase hex chars
pub fn normalize_hex(address: &str) -> Option<String> {
    WalletAddress::parse(address).ok().map(|a| a.hex)
}

/// Is this string shaped like a 20-byte account address?
///
/// Used by the classifier: EVM calls to something that is not address-shaped
/// (a pool id, a route string) are treated as swaps.
pub fn is_address_shaped(s: &str) -> bool {
    WalletAddress::parse(s).is_ok()
}

// ============================================================================
// BECH32
// ============================================================================

/// Decode a bech32 string into (hrp, payload bytes). Checksum is verified.
fn decode_bech32(input: &str) -> Result<(String, Vec<u8>), AddressError> {
    let (hrp, bytes) = bech32::decode(input).map_err(|_| AddressError::InvalidBech32(input.to_string()))?;
    Ok((hrp.as_str().to_ascii_lowercase(), bytes))
}

/// Encode a 20-byte payload as bech32 (used to build chain-native RPC queries)
pub fn encode_bech32(hrp: &str, payload: &[u8]) -> Option<String> {
    let hrp = Hrp::parse(hrp).ok()?;
    bech32::encode::<Bech32>(hrp, payload).ok()
}

// ============================================================================
// TESTS
// ============================================================================
