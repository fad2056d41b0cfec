use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use mqtree_core::{TopicMessage, TopicNode, TopicRow, TreeBuilder};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "Line", "temp", "x1"]).prop_map(str::to_string)
}

fn topic() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..4).prop_map(|segs| segs.join("/"))
}

fn check_node(node: &TopicNode, parent_path: &str) {
    let expected = if parent_path.is_empty() {
        node.name.clone()
    } else {
        format!("{parent_path}/{}", node.name)
    };
    assert_eq!(node.full_path, expected);
    let below: u64 = node.children.iter().map(|c| c.total_message_count).sum();
    assert_eq!(node.total_message_count, node.message_count + below);
    let child_ready = node.children.iter().any(|c| c.has_ml_ready_descendant);
    assert_eq!(
        node.has_ml_ready_descendant,
        node.is_ml_ready(20) || child_ready
    );
    for child in &node.children {
        check_node(child, &node.full_path);
    }
}

fn direct_counts(nodes: &[TopicNode], out: &mut HashMap<String, u64>) {
    for node in nodes {
        if node.message_count > 0 {
            out.insert(node.full_path.clone(), node.message_count);
        }
        direct_counts(&node.children, out);
    }
}

proptest! {
    #[test]
    fn message_builds_hold_structural_invariants(topics in prop::collection::vec(topic(), 0..60)) {
        let at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let messages: Vec<TopicMessage> = topics
            .iter()
            .map(|t| TopicMessage::new(t.clone(), Some("1.5"), at))
            .collect();
        let built = TreeBuilder::new().build_from_messages(&messages);

        for root in &built.tree {
            check_node(root, "");
        }

        let mut expected: HashMap<String, u64> = HashMap::new();
        for t in &topics {
            *expected.entry(t.clone()).or_insert(0) += 1;
        }
        let mut actual = HashMap::new();
        direct_counts(&built.tree, &mut actual);
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(built.stats.total_messages, topics.len() as u64);
    }

    #[test]
    fn row_builds_ignore_insertion_order(
        rows in prop::collection::hash_map(topic(), (0u64..60, any::<bool>()), 0..25),
        seed in any::<u64>(),
    ) {
        let at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let mut ordered: Vec<TopicRow> = rows
            .iter()
            .map(|(path, (count, numeric))| {
                let sample = if *numeric { "42" } else { r#"{"state":"idle"}"# };
                TopicRow::new(path.clone(), *count).with_sample(sample)
            })
            .collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));
        let mut shuffled = ordered.clone();
        let len = shuffled.len();
        if len > 1 {
            let mut state = seed;
            for i in (1..len).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                shuffled.swap(i, j);
            }
        }

        let builder = TreeBuilder::new();
        let first = builder.build_from_rows(&ordered, at);
        let second = builder.build_from_rows(&shuffled, at);
        prop_assert_eq!(first, second);
    }
}
