//! Bottom-up aggregate passes over frozen snapshots.
//!
//! Each pass is independent and visits every node exactly once. Children are
//! always finished before their parent's aggregate is written.

use std::cmp::Ordering;

use crate::node::{ConformanceCounts, TopicNode};

/// Minimum direct message count for a numeric leaf to be ML-ready.
pub const ML_READY_MIN_MESSAGES: u64 = 20;

/// Run every pass over a root-level forest: ordering first, then totals,
/// ML-readiness and the conformance rollup.
pub fn finalize(roots: &mut [TopicNode], ml_ready_min_messages: u64) {
    sort_children(roots);
    for root in roots.iter_mut() {
        compute_totals(root);
        mark_ml_ready(root, ml_ready_min_messages);
        roll_up_conformance(root);
    }
}

/// Case-insensitive name order; on ties lowercase sorts before uppercase.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

pub fn sort_children(nodes: &mut [TopicNode]) {
    nodes.sort_by(|a, b| compare_names(&a.name, &b.name));
    for node in nodes.iter_mut() {
        sort_children(&mut node.children);
    }
}

/// `total = own + Σ total(child)`, written on every node.
pub fn compute_totals(node: &mut TopicNode) -> u64 {
    let below: u64 = node.children.iter_mut().map(compute_totals).sum();
    node.total_message_count = node.message_count.saturating_add(below);
    node.total_message_count
}

/// Sets `has_ml_ready_descendant` on `node` and on every node beneath it.
///
/// The child results are folded without short-circuiting: each child's flag
/// is written even after an earlier sibling already qualified.
pub fn mark_ml_ready(node: &mut TopicNode, min_messages: u64) -> bool {
    let self_ready = node.is_ml_ready(min_messages);
    let any_child = node.children.iter_mut().fold(false, |acc, child| {
        let child_ready = mark_ml_ready(child, min_messages);
        acc || child_ready
    });
    node.has_ml_ready_descendant = self_ready || any_child;
    node.has_ml_ready_descendant
}

/// Non-leaf nodes with children take the sum of their children's rolled-up
/// counters (their own are discarded); leaves keep theirs.
pub fn roll_up_conformance(node: &mut TopicNode) -> ConformanceCounts {
    let below = node
        .children
        .iter_mut()
        .fold(ConformanceCounts::default(), |acc, child| {
            acc.add(roll_up_conformance(child))
        });
    if !node.is_leaf && !node.children.is_empty() {
        node.conformance = below;
    }
    node.conformance_status = node.conformance.status();
    node.conformance
}
