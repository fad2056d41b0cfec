//! Flat rows returned by the graph query, plus the lenient decoding that
//! turns loosely-typed query output into them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::{BoundProposal, ConformanceCounts};

/// One topic's aggregated statistics as reported by the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRow {
    pub path: String,
    pub message_count: u64,
    pub sample_payload: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub numeric_sample_count: u64,
    #[serde(flatten)]
    pub conformance: ConformanceCounts,
    pub bound_proposal_id: Option<String>,
    pub bound_proposal_name: Option<String>,
}

impl TopicRow {
    pub fn new(path: impl Into<String>, message_count: u64) -> Self {
        Self {
            path: path.into(),
            message_count,
            ..Self::default()
        }
    }

    pub fn with_sample(mut self, payload: impl Into<String>) -> Self {
        self.sample_payload = Some(payload.into());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64, samples: u64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self.numeric_sample_count = samples;
        self
    }

    pub fn with_conformance(mut self, conformance: ConformanceCounts) -> Self {
        self.conformance = conformance;
        self
    }

    /// `Some(min != max)` when numeric samples exist, `None` otherwise.
    pub fn variance(&self) -> Option<bool> {
        if self.numeric_sample_count == 0 {
            return None;
        }
        match (self.min_value, self.max_value) {
            (Some(min), Some(max)) => Some(min != max),
            _ => None,
        }
    }

    pub fn bound_proposal(&self) -> Option<BoundProposal> {
        self.bound_proposal_id.as_ref().map(|id| BoundProposal {
            id: id.clone(),
            name: self.bound_proposal_name.clone(),
        })
    }

    /// Decode a loosely-shaped record (one query row keyed by column name).
    ///
    /// Returns `None` only when no usable `path` is present; every other
    /// field degrades to its default instead of failing the whole build.
    pub fn from_value(value: &Value) -> Option<TopicRow> {
        let obj = value.as_object()?;
        let path = obj
            .get("path")
            .or_else(|| obj.get("topic"))
            .and_then(Value::as_str)?
            .to_string();
        Some(TopicRow {
            path,
            message_count: coerce_u64(obj.get("messageCount")),
            sample_payload: coerce_payload(obj.get("samplePayload")),
            min_value: coerce_f64(obj.get("minValue")),
            max_value: coerce_f64(obj.get("maxValue")),
            numeric_sample_count: coerce_u64(obj.get("numericSampleCount")),
            conformance: ConformanceCounts {
                conformant_count: coerce_u64(obj.get("conformantCount")),
                non_conformant_count: coerce_u64(obj.get("nonConformantCount")),
                unbound_count: coerce_u64(obj.get("unboundCount")),
            },
            bound_proposal_id: coerce_string(obj.get("boundProposalId")),
            bound_proposal_name: coerce_string(obj.get("boundProposalName")),
        })
    }
}

/// Non-negative integer extraction that never fails: numbers, numeric
/// strings and `{low, high}` 64-bit integer objects are accepted, anything
/// else yields 0.
pub fn coerce_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|v| v.max(0) as u64))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            trimmed
                .parse::<u64>()
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.max(0.0) as u64)
                })
                .unwrap_or(0)
        }
        Some(Value::Object(map)) => {
            let low = map.get("low").and_then(Value::as_i64);
            let high = map.get("high").and_then(Value::as_i64);
            match (low, high) {
                (Some(low), Some(high)) => {
                    let combined = (high << 32) | (low as u32 as i64);
                    combined.max(0) as u64
                }
                _ => 0,
            }
        }
        _ => 0,
    }
}

pub fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Sample payloads are normally stored as raw strings; structured values
/// are re-encoded so the analyzer still sees JSON text.
fn coerce_payload(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => serde_json::to_string(other).ok(),
    }
}
