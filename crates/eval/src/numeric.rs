//! Numeric model using `rust_decimal`.
//!
//! Money is kept at 2 fractional digits and rates at 4, both rounded with
//! `RoundingStrategy::MidpointAwayFromZero` (HALF_UP). No `f64` anywhere
//! in the evaluation path.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::value::Value;

pub const MONEY_SCALE: u32 = 2;
pub const RATE_SCALE: u32 = 4;

/// Context fields holding money; writes to them are rounded to 2 dp.
const MONEY_FIELDS: &[&str] = &["net_amount", "vat_amount", "gross_amount", "amount"];

/// Context fields holding rates; writes to them are rounded to 4 dp.
const RATE_FIELDS: &[&str] = &["vat_rate", "rate"];

/// Round HALF_UP to exactly `scale` fractional digits.
pub fn round_to(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded
}

pub fn round_money(value: Decimal) -> Decimal {
    round_to(value, MONEY_SCALE)
}

pub fn round_rate(value: Decimal) -> Decimal {
    round_to(value, RATE_SCALE)
}

/// Strict numeric view used by the condition evaluator: `Int` and
/// `Decimal` only. Text is never coerced.
pub fn as_number(value: &Value) -> Option<Decimal> {
    match value {
        Value::Int(i) => Some(Decimal::from(*i)),
        Value::Decimal(d) => Some(*d),
        _ => None,
    }
}

/// Boundary numeric view used by actions and functions: also accepts
/// decimal strings such as `"100.00"`.
pub fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Text(s) => s.trim().parse::<Decimal>().ok(),
        other => as_number(other),
    }
}

/// Normalize a value about to be written at `path`.
///
/// Money and rate fields (judged by the last path segment) are converted
/// to decimals and rounded to their scale. Values that are not numeric are
/// written unchanged.
pub fn normalize_for_path(path: &str, value: Value) -> Value {
    let field = path.rsplit('.').next().unwrap_or(path);
    let scale = if MONEY_FIELDS.contains(&field) {
        MONEY_SCALE
    } else if RATE_FIELDS.contains(&field) {
        RATE_SCALE
    } else {
        return value;
    };
    match to_decimal(&value) {
        Some(d) => Value::Decimal(round_to(d, scale)),
        None => value,
    }
}

/// Value equality for `==`, `!=` and `in`.
///
/// `Int` and `Decimal` compare numerically; every other pair compares
/// structurally, so values of different types are never equal.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

/// Ordering comparison for `<`, `<=`, `>`, `>=`.
///
/// Both sides must be numeric; anything else (including `Null`) yields
/// `None`, which the evaluator reads as false.
pub fn compare_numbers(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    let l = as_number(left)?;
    let r = as_number(right)?;
    Some(l.cmp(&r))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
