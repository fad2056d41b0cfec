use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::DataTypes;

/// Most recent payload observed on an exact topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub payload: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Schema-conformance counters carried by a topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceCounts {
    pub conformant_count: u64,
    pub non_conformant_count: u64,
    pub unbound_count: u64,
}

impl ConformanceCounts {
    pub fn add(self, other: ConformanceCounts) -> ConformanceCounts {
        ConformanceCounts {
            conformant_count: self.conformant_count.saturating_add(other.conformant_count),
            non_conformant_count: self
                .non_conformant_count
                .saturating_add(other.non_conformant_count),
            unbound_count: self.unbound_count.saturating_add(other.unbound_count),
        }
    }

    pub fn status(&self) -> ConformanceStatus {
        ConformanceStatus::from_counts(self.conformant_count, self.non_conformant_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConformanceStatus {
    Conformant,
    NonConformant,
    Mixed,
    NoBinding,
}

impl ConformanceStatus {
    pub fn from_counts(conformant: u64, non_conformant: u64) -> Self {
        match (conformant > 0, non_conformant > 0) {
            (true, true) => ConformanceStatus::Mixed,
            (false, true) => ConformanceStatus::NonConformant,
            (true, false) => ConformanceStatus::Conformant,
            (false, false) => ConformanceStatus::NoBinding,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConformanceStatus::Conformant => "conformant",
            ConformanceStatus::NonConformant => "non_conformant",
            ConformanceStatus::Mixed => "mixed",
            ConformanceStatus::NoBinding => "no_binding",
        }
    }
}

/// Schema proposal a topic is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundProposal {
    pub id: String,
    pub name: Option<String>,
}

/// Serializable snapshot of one topic prefix.
///
/// Produced once per build by freezing the working tree and running the
/// propagation passes over it; children are already ordered by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicNode {
    pub name: String,
    pub full_path: String,
    pub is_leaf: bool,
    pub message_count: u64,
    pub total_message_count: u64,
    /// Messages on this prefix or any topic below it, counted at insertion.
    pub activity_count: u64,
    pub last_message: Option<LastMessage>,
    pub has_numeric_data: bool,
    pub data_types: DataTypes,
    pub has_variance: Option<bool>,
    #[serde(rename = "hasMLReadyDescendant")]
    pub has_ml_ready_descendant: bool,
    #[serde(flatten)]
    pub conformance: ConformanceCounts,
    pub bound_proposal_id: Option<String>,
    pub bound_proposal_name: Option<String>,
    pub conformance_status: ConformanceStatus,
    pub children: Vec<TopicNode>,
}

impl TopicNode {
    pub fn is_ml_ready(&self, min_messages: u64) -> bool {
        self.is_leaf && self.has_numeric_data && self.message_count >= min_messages
    }

    /// Depth-first search by exact path below (and including) this node.
    pub fn find(&self, full_path: &str) -> Option<&TopicNode> {
        if self.full_path == full_path {
            return Some(self);
        }
        let prefix_ok = full_path
            .strip_prefix(self.full_path.as_str())
            .is_some_and(|rest| rest.starts_with('/'));
        if !prefix_ok {
            return None;
        }
        self.children.iter().find_map(|child| child.find(full_path))
    }

    /// Copy of this node's own fields with an empty child list.
    pub fn without_children(&self) -> TopicNode {
        TopicNode {
            name: self.name.clone(),
            full_path: self.full_path.clone(),
            is_leaf: self.is_leaf,
            message_count: self.message_count,
            total_message_count: self.total_message_count,
            activity_count: self.activity_count,
            last_message: self.last_message.clone(),
            has_numeric_data: self.has_numeric_data,
            data_types: self.data_types,
            has_variance: self.has_variance,
            has_ml_ready_descendant: self.has_ml_ready_descendant,
            conformance: self.conformance,
            bound_proposal_id: self.bound_proposal_id.clone(),
            bound_proposal_name: self.bound_proposal_name.clone(),
            conformance_status: self.conformance_status,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TopicNode::node_count).sum::<usize>()
    }
}

/// Look up an exact path among root-level snapshots.
pub fn find_in<'a>(roots: &'a [TopicNode], full_path: &str) -> Option<&'a TopicNode> {
    let normalized = crate::path::normalize(full_path);
    if normalized.is_empty() {
        return None;
    }
    roots.iter().find_map(|root| root.find(&normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_counter_presence() {
        assert_eq!(ConformanceStatus::from_counts(2, 1), ConformanceStatus::Mixed);
        assert_eq!(
            ConformanceStatus::from_counts(0, 3),
            ConformanceStatus::NonConformant
        );
        assert_eq!(
            ConformanceStatus::from_counts(5, 0),
            ConformanceStatus::Conformant
        );
        assert_eq!(
            ConformanceStatus::from_counts(0, 0),
            ConformanceStatus::NoBinding
        );
    }

    #[test]
    fn status_serializes_snake_case() {
        let v = serde_json::to_value(ConformanceStatus::NonConformant).unwrap();
        assert_eq!(v, serde_json::json!("non_conformant"));
        assert_eq!(ConformanceStatus::NoBinding.as_str(), "no_binding");
    }
}
