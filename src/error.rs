// ⚠️ Error Types - one enum per failure domain
// Only caller input errors abort an export; everything else degrades.

use thiserror::Error;

// ============================================================================
// ADDRESS ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,

    #[error("Invalid hex address: {0}")]
    InvalidHex(String),

    #[error("Invalid bech32 address: {0}")]
    InvalidBech32(String),

    #[error("Address payload must be 20 bytes, got {0}")]
    WrongLength(usize),
}

// ============================================================================
// STORE ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store not found: {0}")]
    NotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("LevelDB error: {0}")]
    LevelDb(String),

    #[error("Unsupported store: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// RPC ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RpcError {
    #[cfg(feature = "rpc")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed RPC response: {0}")]
    Malformed(String),

    #[error("RPC returned error: {0}")]
    Remote(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// AMOUNT ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Not a plain unsigned amount: {0:?}")]
    Malformed(String),
}

// ============================================================================
// EXPORT ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid wallet address: {0}")]
    Address(#[from] AddressError),

    #[error("Invalid date bound {0:?}: expected YYYY-MM-DD or RFC 3339")]
    InvalidDate(String),

    #[error("Date range is empty: start {start} is after end {end}")]
    EmptyRange { start: String, end: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

// ============================================================================
// CONFIG ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}
