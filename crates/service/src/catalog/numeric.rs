//! Exact-decimal codec for ratings crossing into and out of the index store.
//!
//! Ratings travel as plain JSON numbers (`f64`) and are persisted in the index
//! as `Decimal`. The conversion goes through the shortest decimal text of the
//! float, so `0.3` is stored as exactly `0.3` rather than
//! `0.299999999999999988897769753748...`, and reading it back yields the same
//! `f64` bit pattern the caller sent.

use std::str::FromStr;

use sea_orm::prelude::Decimal;
use serde::Serializer;
use thiserror::Error;

/// Largest integer an `f64` holds without gaps (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Error, PartialEq)]
pub enum NumericError {
    #[error("rating must be a finite number, got {0}")]
    NonFinite(f64),
    #[error("{value} cannot be stored as an exact decimal: {reason}")]
    Unrepresentable { value: String, reason: String },
}

/// Convert a caller-supplied number into the index store's exact decimal form.
pub fn to_storage(value: f64) -> Result<Decimal, NumericError> {
    if !value.is_finite() {
        return Err(NumericError::NonFinite(value));
    }
    // `Display` for f64 prints the shortest text that parses back to the same value.
    let text = value.to_string();
    let stored = Decimal::from_str(&text)
        .map(|d| d.normalize())
        .map_err(|e| NumericError::Unrepresentable { value: text.clone(), reason: e.to_string() })?;
    // from_str rounds past 28 fractional digits instead of failing
    if from_storage(stored)? != value {
        return Err(NumericError::Unrepresentable {
            value: text,
            reason: format!("rounds to {stored}"),
        });
    }
    Ok(stored)
}

/// Convert a stored decimal back to the plain number returned to callers.
pub fn from_storage(value: Decimal) -> Result<f64, NumericError> {
    let text = value.normalize().to_string();
    text.parse::<f64>()
        .map_err(|e| NumericError::Unrepresentable { value: text, reason: e.to_string() })
}

/// Serialize a rating as a plain JSON number; integral values render without a
/// fractional part (`5`, not `5.0`).
pub fn serialize_plain<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}
