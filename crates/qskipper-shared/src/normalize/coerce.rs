//! Field-level coercions for values whose wire type drifts between string and
//! number. None of these fail: an unusable value becomes the field's zero.

use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Native number first, then a numeric string, otherwise zero. Negative
/// values clamp to zero.
pub fn decimal(value: &Value) -> Decimal {
    let parsed = match value {
        Value::Number(n) => number_to_decimal(n),
        Value::String(s) => str_to_decimal(s),
        _ => None,
    };
    parsed.unwrap_or(Decimal::ZERO).max(Decimal::ZERO)
}

fn number_to_decimal(n: &serde_json::Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    n.as_f64().and_then(Decimal::from_f64)
}

fn str_to_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(Decimal::from_f64))
}

/// Whole units, truncating any fraction.
pub fn quantity(value: &Value) -> u32 {
    decimal(value).trunc().to_u32().unwrap_or(u32::MAX)
}

/// Integer minor units, rounded half away from zero.
pub fn minor_units(value: &Value) -> u64 {
    decimal(value)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .unwrap_or(u64::MAX)
}

pub fn boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1"
        ),
        _ => false,
    }
}

/// Strings pass through, numbers become their text, anything else is empty.
pub fn string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

pub fn optional_string(value: &Value) -> Option<String> {
    Some(string(value)).filter(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// serde adapters
// ---------------------------------------------------------------------------

pub fn lenient_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(quantity(&Value::deserialize(deserializer)?))
}

pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string(&Value::deserialize(deserializer)?))
}
