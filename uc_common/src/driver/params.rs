//! Lenient parsing of driver configuration values.
//!
//! Driver configs come from JSON snapshots and API calls, so numbers may
//! arrive as strings. Anything unparsable counts as absent.

use crate::driver::StateMap;
use serde_json::Value;

/// Interpret a value as a float.
pub fn value_f64(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Interpret a value as an integer. Floats are truncated.
pub fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Interpret a value as a flag.
pub fn value_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

/// Float config key.
pub fn cfg_f64(cfg: &StateMap, key: &str) -> Option<f64> {
    cfg.get(key).and_then(value_f64)
}

/// Integer config key.
pub fn cfg_i64(cfg: &StateMap, key: &str) -> Option<i64> {
    cfg.get(key).and_then(value_i64)
}

/// Flag config key; absent means `false`.
pub fn cfg_bool(cfg: &StateMap, key: &str) -> bool {
    cfg.get(key).is_some_and(value_bool)
}
