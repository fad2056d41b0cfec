//! Payload type inference.
//!
//! Payloads arrive as raw strings that are usually JSON. Classification only
//! looks one level deep: array elements and object properties contribute
//! their own kind, nested structures are not walked.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object keys whose numeric values never count as telemetry.
pub const DEFAULT_EXCLUDED_NUMERIC_KEYS: [&str; 5] =
    ["timestamp", "time", "ts", "created_at", "updated_at"];

/// Non-exclusive set of JSON kinds observed in a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataTypes {
    pub numeric: bool,
    pub string: bool,
    pub boolean: bool,
    pub object: bool,
    pub array: bool,
}

impl DataTypes {
    pub fn is_empty(&self) -> bool {
        !(self.numeric || self.string || self.boolean || self.object || self.array)
    }

    /// Labels of the set flags, in a fixed order.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.numeric {
            out.push("numeric");
        }
        if self.string {
            out.push("string");
        }
        if self.boolean {
            out.push("boolean");
        }
        if self.object {
            out.push("object");
        }
        if self.array {
            out.push("array");
        }
        out
    }

    fn mark_kind(&mut self, value: &Value) {
        match value {
            Value::Number(_) => self.numeric = true,
            Value::String(_) => self.string = true,
            Value::Bool(_) => self.boolean = true,
            Value::Object(_) => self.object = true,
            Value::Array(_) => self.array = true,
            Value::Null => {}
        }
    }
}

/// Classifies payloads, skipping numeric properties whose key is excluded.
#[derive(Debug, Clone)]
pub struct PayloadAnalyzer {
    excluded: HashSet<String>,
}

impl Default for PayloadAnalyzer {
    fn default() -> Self {
        Self::with_excluded_keys(DEFAULT_EXCLUDED_NUMERIC_KEYS)
    }
}

impl PayloadAnalyzer {
    pub fn with_excluded_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let excluded = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { excluded }
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.excluded.contains(&key.to_lowercase())
    }

    pub fn classify(&self, payload: Option<&str>) -> DataTypes {
        let mut types = DataTypes::default();
        let raw = match payload {
            Some(raw) if !raw.is_empty() => raw,
            _ => return types,
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => {
                types.array = true;
                for item in &items {
                    types.mark_kind(item);
                }
            }
            Ok(Value::Object(map)) => {
                for (key, value) in &map {
                    match value {
                        Value::Number(_) if self.is_excluded(key) => {}
                        other => types.mark_kind(other),
                    }
                }
            }
            Ok(Value::Null) => {}
            Ok(scalar) => types.mark_kind(&scalar),
            Err(_) => {
                if parse_float_prefix(raw).is_some() {
                    types.numeric = true;
                } else {
                    types.string = true;
                }
            }
        }
        types
    }

    /// Numeric value of a scalar payload; `None` for structured or textual ones.
    pub fn numeric_sample(&self, payload: &str) -> Option<f64> {
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Number(n)) => n.as_f64(),
            Ok(_) => None,
            Err(_) => parse_float_prefix(payload),
        }
    }
}

/// Leading-prefix float parse in the manner of JavaScript's `parseFloat`:
/// leading whitespace is skipped, trailing garbage ignored, `Infinity`
/// accepted. Returns `None` when no number can be read.
pub fn parse_float_prefix(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut idx = 0usize;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        idx += 1;
    }
    if s[idx..].starts_with("Infinity") {
        return Some(if bytes.first() == Some(&b'-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let mut digits = 0usize;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
        digits += 1;
    }
    if idx < bytes.len() && bytes[idx] == b'.' {
        let mut frac = 0usize;
        let mut probe = idx + 1;
        while probe < bytes.len() && bytes[probe].is_ascii_digit() {
            probe += 1;
            frac += 1;
        }
        if digits > 0 || frac > 0 {
            idx = probe;
            digits += frac;
        }
    }
    if digits == 0 {
        return None;
    }
    if idx < bytes.len() && matches!(bytes[idx], b'e' | b'E') {
        let mut probe = idx + 1;
        if probe < bytes.len() && matches!(bytes[probe], b'+' | b'-') {
            probe += 1;
        }
        let exp_start = probe;
        while probe < bytes.len() && bytes[probe].is_ascii_digit() {
            probe += 1;
        }
        if probe > exp_start {
            idx = probe;
        }
    }
    s[..idx].parse::<f64>().ok()
}
