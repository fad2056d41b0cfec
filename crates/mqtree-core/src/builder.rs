use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::node::TopicNode;
use crate::payload::PayloadAnalyzer;
use crate::propagate::ML_READY_MIN_MESSAGES;
use crate::row::TopicRow;
use crate::tree::{TopicTree, TreeStats};

/// A single observed MQTT message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: String,
    pub payload: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TopicMessage {
    pub fn new(topic: impl Into<String>, payload: Option<&str>, timestamp: DateTime<Utc>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.map(str::to_string),
            timestamp,
        }
    }
}

/// Finished projection of one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltTree {
    pub tree: Vec<TopicNode>,
    pub stats: TreeStats,
}

/// Builds fresh trees with a fixed analyzer and ML-readiness threshold.
///
/// Every build starts from an empty [`TopicTree`]; nothing is shared
/// between builds.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    analyzer: PayloadAnalyzer,
    ml_ready_min_messages: u64,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self {
            analyzer: PayloadAnalyzer::default(),
            ml_ready_min_messages: ML_READY_MIN_MESSAGES,
        }
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analyzer(mut self, analyzer: PayloadAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_ml_ready_min_messages(mut self, min_messages: u64) -> Self {
        self.ml_ready_min_messages = min_messages;
        self
    }

    pub fn ml_ready_min_messages(&self) -> u64 {
        self.ml_ready_min_messages
    }

    /// Empty working tree using this builder's analyzer.
    pub fn store(&self) -> TopicTree {
        TopicTree::with_analyzer(self.analyzer.clone())
    }

    pub fn finish(&self, tree: &TopicTree) -> BuiltTree {
        BuiltTree {
            tree: tree.serializable_tree(self.ml_ready_min_messages),
            stats: tree.stats(),
        }
    }

    pub fn build_from_rows<'a, I>(&self, rows: I, observed_at: DateTime<Utc>) -> BuiltTree
    where
        I: IntoIterator<Item = &'a TopicRow>,
    {
        let mut tree = self.store();
        let mut skipped = 0usize;
        for row in rows {
            if !tree.insert_row(row, observed_at) {
                skipped += 1;
            }
        }
        let built = self.finish(&tree);
        debug!(
            topics = built.stats.total_topics,
            messages = built.stats.total_messages,
            skipped,
            "built topic tree from rows"
        );
        built
    }

    pub fn build_from_messages<'a, I>(&self, messages: I) -> BuiltTree
    where
        I: IntoIterator<Item = &'a TopicMessage>,
    {
        let mut tree = self.store();
        for msg in messages {
            tree.insert_message(&msg.topic, msg.payload.as_deref(), msg.timestamp);
        }
        self.finish(&tree)
    }
}
