// 💱 Amount Converter - base units to display amounts, exactly
//
// display = raw / 10^decimals, done on the decimal digits themselves so there is
// no upper bound on the raw amount and no floats anywhere.

use crate::error::AmountError;
use crate::tokens::TokenRegistry;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// DISPLAY AMOUNT
// ============================================================================

/// Exact non-negative decimal: `digits × 10^-scale`.
///
/// Always normalized: no leading zeros, no trailing fractional zeros, zero is
/// `"0"` with scale 0. Two equal amounts therefore compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayAmount {
    digits: String,
    scale: u32,
}

impl DisplayAmount {
    pub fn zero() -> Self {
        DisplayAmount {
            digits: "0".to_string(),
            scale: 0,
        }
    }

    /// `digits` must be ASCII digits only
    fn from_parts(digits: &str, scale: u32) -> Self {
        let mut digits = digits.trim_start_matches('0').to_string();
        let mut scale = scale;

        while scale > 0 && digits.ends_with('0') {
            digits.pop();
            scale -= 1;
        }

        if digits.is_empty() {
            return DisplayAmount::zero();
        }
        DisplayAmount { digits, scale }
    }

    pub fn is_zero(&self) -> bool {
        self.digits == "0"
    }

    /// Digits after the decimal point
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Inverse of `scale_down`: the base-unit integer, as digits.
    ///
    /// `None` when the amount has more fractional digits than `decimals` allows.
    pub fn to_base_units(&self, decimals: u32) -> Option<String> {
        if self.scale > decimals {
            return None;
        }
        if self.is_zero() {
            return Some("0".to_string());
        }

        let padding = (decimals - self.scale) as usize;
        let mut raw = String::with_capacity(self.digits.len() + padding);
        raw.push_str(&self.digits);
        raw.extend(std::iter::repeat('0').take(padding));
        Some(raw)
    }
}

impl Default for DisplayAmount {
    fn default() -> Self {
        DisplayAmount::zero()
    }
}

impl fmt::Display for DisplayAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = self.scale as usize;
        if scale == 0 {
            return f.write_str(&self.digits);
        }

        if self.digits.len() > scale {
            let (whole, frac) = self.digits.split_at(self.digits.len() - scale);
            write!(f, "{}.{}", whole, frac)
        } else {
            let zeros = "0".repeat(scale - self.digits.len());
            write!(f, "0.{}{}", zeros, self.digits)
        }
    }
}

impl FromStr for DisplayAmount {
    type Err = AmountError;

    /// Plain notation only: `123`, `0.5`, `1.000`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AmountError::Malformed(s.to_string());

        let (whole, frac) = match s.trim().split_once('.') {
            Some((w, f)) => (w, f),
            None => (s.trim(), ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(malformed());
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let scale = u32::try_from(frac.len()).map_err(|_| malformed())?;
        Ok(DisplayAmount::from_parts(&format!("{}{}", whole, frac), scale))
    }
}

// ============================================================================
// CONVERSION
// ============================================================================

/// Convert a base-unit amount string into (display amount, symbol)
pub fn convert(raw: &str, denom: &str, registry: &TokenRegistry) -> Result<(DisplayAmount, String), AmountError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Malformed(raw.to_string()));
    }

    let token = registry.resolve(denom);
    Ok((scale_down(trimmed, token.info.decimals), token.info.symbol))
}

/// Same as `convert` for an already-parsed integer
pub fn convert_base_units(value: u128, denom: &str, registry: &TokenRegistry) -> (DisplayAmount, String) {
    let token = registry.resolve(denom);
    (scale_down(&value.to_string(), token.info.decimals), token.info.symbol)
}

/// raw / 10^decimals for a string of ASCII digits
pub fn scale_down(digits: &str, decimals: u32) -> DisplayAmount {
    DisplayAmount::from_parts(digits, decimals)
}

// ============================================================================
// TESTS
// ============================================================================
