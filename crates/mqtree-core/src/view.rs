//! Pruned projections of a finished tree.
//!
//! Browsers built on the same tree keep different subsets of it: the chart
//! browser only cares about numeric topics, the regression browser only
//! about branches that lead to ML-ready data. Aggregates on kept nodes are
//! the ones computed over the full tree.

use serde::{Deserialize, Serialize};

use crate::node::TopicNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeView {
    #[default]
    All,
    /// Numeric leaves and their ancestors.
    Numeric,
    /// Nodes with an ML-ready descendant.
    MlReady,
}

impl TreeView {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeView::All => "all",
            TreeView::Numeric => "numeric",
            TreeView::MlReady => "ml_ready",
        }
    }

    pub fn from_slug(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "all" | "full" => Some(TreeView::All),
            "numeric" | "chart" => Some(TreeView::Numeric),
            "ml_ready" | "ml-ready" | "mlready" | "regression" => Some(TreeView::MlReady),
            _ => None,
        }
    }

    fn keeps(&self, node: &TopicNode) -> bool {
        match self {
            TreeView::All => true,
            TreeView::Numeric => node.is_leaf && node.has_numeric_data,
            TreeView::MlReady => node.has_ml_ready_descendant,
        }
    }
}

/// Apply `view`, then an optional case-insensitive substring filter on
/// `full_path`. A path match keeps the matching node's whole (viewed)
/// subtree plus its ancestors.
pub fn project(roots: &[TopicNode], view: TreeView, query: Option<&str>) -> Vec<TopicNode> {
    let viewed: Vec<TopicNode> = match view {
        TreeView::All => roots.to_vec(),
        _ => roots.iter().filter_map(|n| retain(n, view)).collect(),
    };
    let needle = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
    match needle {
        Some(needle) => viewed
            .iter()
            .filter_map(|n| matching(n, &needle))
            .collect(),
        None => viewed,
    }
}

fn retain(node: &TopicNode, view: TreeView) -> Option<TopicNode> {
    let children: Vec<TopicNode> = node
        .children
        .iter()
        .filter_map(|child| retain(child, view))
        .collect();
    if !view.keeps(node) && children.is_empty() {
        return None;
    }
    let mut out = node.without_children();
    out.children = children;
    Some(out)
}

fn matching(node: &TopicNode, needle: &str) -> Option<TopicNode> {
    if node.full_path.to_lowercase().contains(needle) {
        return Some(node.clone());
    }
    let children: Vec<TopicNode> = node
        .children
        .iter()
        .filter_map(|child| matching(child, needle))
        .collect();
    if children.is_empty() {
        return None;
    }
    let mut out = node.without_children();
    out.children = children;
    Some(out)
}
