//! Mutable working tree assembled while rows or messages stream in.
//!
//! A [`TopicTree`] lives for exactly one build. Nodes are created once per
//! distinct prefix and updated in place; [`TopicTree::serializable_tree`]
//! freezes the result into [`TopicNode`] snapshots.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::{BoundProposal, ConformanceCounts, LastMessage, TopicNode};
use crate::path;
use crate::payload::{DataTypes, PayloadAnalyzer};
use crate::propagate;
use crate::row::TopicRow;

/// Numeric samples kept per topic for variance detection.
pub const NUMERIC_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeStats {
    /// Distinct nodes created, intermediate prefixes included.
    pub total_topics: u64,
    pub total_messages: u64,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct NumericWindow {
    samples: VecDeque<f64>,
}

impl NumericWindow {
    fn push(&mut self, value: f64) {
        if self.samples.len() == NUMERIC_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn variance(&self) -> Option<bool> {
        let first = *self.samples.front()?;
        Some(self.samples.iter().any(|v| *v != first))
    }
}

/// One prefix in the working tree.
#[derive(Debug, Clone, Default)]
pub struct TopicEntry {
    pub name: String,
    pub full_path: String,
    pub children: HashMap<String, TopicEntry>,
    pub is_leaf: bool,
    pub message_count: u64,
    pub activity_count: u64,
    pub last_message: Option<LastMessage>,
    pub data_types: DataTypes,
    pub has_variance: Option<bool>,
    pub conformance: ConformanceCounts,
    pub bound_proposal: Option<BoundProposal>,
    numeric: NumericWindow,
}

impl TopicEntry {
    fn new(name: &str, full_path: String) -> Self {
        Self {
            name: name.to_string(),
            full_path,
            ..Self::default()
        }
    }

    fn freeze(&self) -> TopicNode {
        let (bound_proposal_id, bound_proposal_name) = match &self.bound_proposal {
            Some(p) => (Some(p.id.clone()), p.name.clone()),
            None => (None, None),
        };
        TopicNode {
            name: self.name.clone(),
            full_path: self.full_path.clone(),
            is_leaf: self.is_leaf,
            message_count: self.message_count,
            total_message_count: self.message_count,
            activity_count: self.activity_count,
            last_message: self.last_message.clone(),
            has_numeric_data: self.data_types.numeric,
            data_types: self.data_types,
            has_variance: self.has_variance,
            has_ml_ready_descendant: false,
            conformance: self.conformance,
            bound_proposal_id,
            bound_proposal_name,
            conformance_status: self.conformance.status(),
            children: self.children.values().map(TopicEntry::freeze).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TopicTree {
    root: TopicEntry,
    analyzer: PayloadAnalyzer,
    stats: TreeStats,
}

/// Walk `segments` from `node`, creating missing prefixes and adding
/// `activity` to every node on the way.
fn descend<'a>(
    mut node: &'a mut TopicEntry,
    stats: &mut TreeStats,
    segments: &[&str],
    activity: u64,
) -> &'a mut TopicEntry {
    for seg in segments {
        let TopicEntry {
            children,
            full_path,
            ..
        } = node;
        node = children.entry((*seg).to_string()).or_insert_with(|| {
            stats.total_topics += 1;
            TopicEntry::new(seg, path::child_path(full_path, seg))
        });
        node.activity_count = node.activity_count.saturating_add(activity);
    }
    node
}

impl TopicTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analyzer(analyzer: PayloadAnalyzer) -> Self {
        Self {
            analyzer,
            ..Self::default()
        }
    }

    /// Record one message on `topic`. Returns `false` (and changes nothing)
    /// when the topic has no usable segment.
    ///
    /// The payload overwrites `last_message` unconditionally; callers feed
    /// messages in the order that "latest" should follow.
    pub fn insert_message(
        &mut self,
        topic: &str,
        payload: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let segments = path::parse(topic);
        if segments.is_empty() {
            return false;
        }
        let TopicTree {
            root,
            analyzer,
            stats,
        } = self;
        let node = descend(root, stats, &segments, 1);
        node.is_leaf = true;
        node.message_count = node.message_count.saturating_add(1);
        node.last_message = Some(LastMessage {
            payload: payload.map(str::to_string),
            timestamp,
        });
        node.data_types = analyzer.classify(payload);
        node.has_variance = match payload.and_then(|p| analyzer.numeric_sample(p)) {
            Some(value) => {
                node.numeric.push(value);
                node.numeric.variance()
            }
            None => None,
        };

        stats.total_messages = stats.total_messages.saturating_add(1);
        stats.last_update = Some(timestamp);
        true
    }

    /// Record an aggregated query row. Counts are added, so repeated paths
    /// merge; the sample payload becomes the node's last message.
    pub fn insert_row(&mut self, row: &TopicRow, observed_at: DateTime<Utc>) -> bool {
        let segments = path::parse(&row.path);
        if segments.is_empty() {
            return false;
        }
        let TopicTree {
            root,
            analyzer,
            stats,
        } = self;
        let node = descend(root, stats, &segments, row.message_count);
        node.is_leaf = true;
        node.message_count = node.message_count.saturating_add(row.message_count);
        if let Some(sample) = row.sample_payload.as_deref() {
            node.last_message = Some(LastMessage {
                payload: Some(sample.to_string()),
                timestamp: observed_at,
            });
            node.data_types = analyzer.classify(Some(sample));
        }
        node.has_variance = row.variance();
        node.conformance = node.conformance.add(row.conformance);
        if let Some(proposal) = row.bound_proposal() {
            node.bound_proposal = Some(proposal);
        }

        stats.total_messages = stats.total_messages.saturating_add(row.message_count);
        stats.last_update = Some(observed_at);
        true
    }

    /// Exact lookup; never creates nodes.
    pub fn find_node(&self, topic: &str) -> Option<&TopicEntry> {
        let mut node = &self.root;
        let mut any = false;
        for seg in path::segments(topic) {
            node = node.children.get(seg)?;
            any = true;
        }
        any.then_some(node)
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Root-level snapshots with every aggregate computed.
    pub fn serializable_tree(&self, ml_ready_min_messages: u64) -> Vec<TopicNode> {
        let mut roots: Vec<TopicNode> = self
            .root
            .children
            .values()
            .map(TopicEntry::freeze)
            .collect();
        propagate::finalize(&mut roots, ml_ready_min_messages);
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn creates_each_prefix_once() {
        let mut tree = TopicTree::new();
        assert!(tree.insert_message("a/b/c", Some("1"), at(1)));
        assert!(tree.insert_message("a/b/d", Some("2"), at(2)));
        assert!(tree.insert_message("a/b/c", Some("3"), at(3)));
        let stats = tree.stats();
        assert_eq!(stats.total_topics, 4);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.last_update, Some(at(3)));
    }

    #[test]
    fn empty_topics_are_ignored() {
        let mut tree = TopicTree::new();
        assert!(!tree.insert_message("", Some("1"), at(1)));
        assert!(!tree.insert_message("//", None, at(1)));
        assert!(!tree.insert_row(&TopicRow::new("/", 9), at(1)));
        assert_eq!(tree.stats(), TreeStats::default());
        assert!(tree.is_empty());
    }

    #[test]
    fn direct_counts_stay_on_terminal_node() {
        let mut tree = TopicTree::new();
        tree.insert_message("x/y", Some("1"), at(1));
        tree.insert_message("x/y", Some("2"), at(2));
        tree.insert_message("x", Some("3"), at(3));
        let x = tree.find_node("x").expect("x");
        assert_eq!(x.message_count, 1);
        assert_eq!(x.activity_count, 3);
        assert!(x.is_leaf);
        let y = tree.find_node("x/y").expect("y");
        assert_eq!(y.message_count, 2);
        assert_eq!(y.activity_count, 2);
        assert_eq!(
            y.last_message.as_ref().and_then(|m| m.payload.as_deref()),
            Some("2")
        );
    }

    #[test]
    fn find_node_is_read_only() {
        let mut tree = TopicTree::new();
        tree.insert_message("a/b", None, at(1));
        assert!(tree.find_node("a/zzz").is_none());
        assert!(tree.find_node("").is_none());
        assert!(tree.find_node("/a//b/").is_some());
        assert_eq!(tree.stats().total_topics, 2);
    }

    #[test]
    fn variance_tracks_scalar_numeric_samples() {
        let mut tree = TopicTree::new();
        tree.insert_message("m", Some("5"), at(1));
        assert_eq!(tree.find_node("m").unwrap().has_variance, Some(false));
        tree.insert_message("m", Some("5.0"), at(2));
        assert_eq!(tree.find_node("m").unwrap().has_variance, Some(false));
        tree.insert_message("m", Some("6"), at(3));
        assert_eq!(tree.find_node("m").unwrap().has_variance, Some(true));
        tree.insert_message("m", Some(r#"{"value": 6}"#), at(4));
        assert_eq!(tree.find_node("m").unwrap().has_variance, None);
    }

    #[test]
    fn numeric_window_forgets_old_samples() {
        let mut tree = TopicTree::new();
        tree.insert_message("m", Some("1"), at(0));
        for i in 0..NUMERIC_WINDOW {
            tree.insert_message("m", Some("2"), at(i as i64 + 1));
        }
        assert_eq!(tree.find_node("m").unwrap().has_variance, Some(false));
    }

    #[test]
    fn rows_merge_and_keep_binding() {
        let mut tree = TopicTree::new();
        let row = TopicRow {
            bound_proposal_id: Some("p1".into()),
            ..TopicRow::new("plant/temp", 10).with_sample("21.5")
        };
        tree.insert_row(&row, at(10));
        tree.insert_row(&TopicRow::new("plant/temp", 5), at(11));
        let node = tree.find_node("plant/temp").unwrap();
        assert_eq!(node.message_count, 15);
        assert!(node.data_types.numeric);
        assert_eq!(node.bound_proposal.as_ref().map(|p| p.id.as_str()), Some("p1"));
        assert_eq!(tree.stats().total_messages, 15);
        assert_eq!(tree.find_node("plant").unwrap().activity_count, 15);
    }
}
