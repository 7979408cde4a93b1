//! `<number> <unit>` size strings ("12.3 MB") to exact byte counts.
//!
//! Units are powers of 1024. The magnitude goes through `f64`, which loses
//! precision only around the PB range; the exporter already rounds its
//! display values far more coarsely than that.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

use std::fmt;

use thiserror::Error;

/// Size unit recognized in the Size / Allocated columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeUnit {
    /// `Bytes`, 1024^0.
    Bytes,
    /// `KB`, 1024^1.
    Kilobytes,
    /// `MB`, 1024^2.
    Megabytes,
    /// `GB`, 1024^3.
    Gigabytes,
    /// `TB`, 1024^4.
    Terabytes,
    /// `PB`, 1024^5.
    Petabytes,
}

impl SizeUnit {
    /// Every unit, smallest first.
    pub const ALL: [Self; 6] = [
        Self::Bytes,
        Self::Kilobytes,
        Self::Megabytes,
        Self::Gigabytes,
        Self::Terabytes,
        Self::Petabytes,
    ];

    /// Power of 1024 this unit stands for.
    #[must_use]
    pub const fn exponent(self) -> u32 {
        match self {
            Self::Bytes => 0,
            Self::Kilobytes => 1,
            Self::Megabytes => 2,
            Self::Gigabytes => 3,
            Self::Terabytes => 4,
            Self::Petabytes => 5,
        }
    }

    /// Bytes in one of this unit.
    #[must_use]
    pub const fn multiplier(self) -> u64 {
        1024_u64.pow(self.exponent())
    }

    /// Token the exporter writes for this unit.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Bytes => "Bytes",
            Self::Kilobytes => "KB",
            Self::Megabytes => "MB",
            Self::Gigabytes => "GB",
            Self::Terabytes => "TB",
            Self::Petabytes => "PB",
        }
    }

    /// Case-insensitive match against the exporter's unit tokens.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.label().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a size string could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeParseError {
    /// Not a number followed by one unit token.
    #[error("expected `<number> <unit>`, got {0:?}")]
    Shape(String),
    /// Magnitude is not a finite number.
    #[error("non-numeric magnitude {0:?}")]
    Magnitude(String),
    /// Unit token outside the recognized set.
    #[error("unrecognized unit {0:?} (expected Bytes, KB, MB, GB, TB or PB)")]
    Unit(String),
    /// Negative, or too large for a `u64`.
    #[error("size {0:?} is out of range")]
    OutOfRange(String),
}

/// Convert `value` in `unit` to bytes: `round(value × 1024^exponent)`.
pub fn to_bytes(value: f64, unit: SizeUnit) -> Option<u64> {
    let bytes = (value * unit.multiplier() as f64).round();
    // u64::MAX as f64 rounds up to 2^64, so the bound is exclusive.
    if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
        return None;
    }
    Some(bytes as u64)
}

/// Parse a size field such as `"1 KB"` or `"12.3 MB"`.
///
/// Leading/trailing whitespace is ignored; any other deviation from
/// `<number> <unit>` is an error the caller downgrades to a warning.
pub fn parse_size(raw: &str) -> Result<u64, SizeParseError> {
    let trimmed = raw.trim();
    let mut parts = trimmed.split_whitespace();
    let (Some(number), Some(unit_token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SizeParseError::Shape(trimmed.to_string()));
    };

    let value: f64 = number
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| SizeParseError::Magnitude(number.to_string()))?;

    let unit = SizeUnit::from_token(unit_token)
        .ok_or_else(|| SizeParseError::Unit(unit_token.to_string()))?;

    to_bytes(value, unit).ok_or_else(|| SizeParseError::OutOfRange(trimmed.to_string()))
}
