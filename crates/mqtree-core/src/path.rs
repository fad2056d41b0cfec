//! Topic path parsing.
//!
//! MQTT topics are slash-delimited. Empty segments produced by leading,
//! trailing or repeated slashes are dropped rather than turned into
//! empty-named nodes.

pub const SEPARATOR: char = '/';

/// Ordered, non-empty segments of `topic`.
pub fn segments(topic: &str) -> impl Iterator<Item = &str> {
    topic.split(SEPARATOR).filter(|seg| !seg.is_empty())
}

/// Collected form of [`segments`]; empty when the topic has no usable segment.
pub fn parse(topic: &str) -> Vec<&str> {
    segments(topic).collect()
}

/// Full path of a child whose parent lives at `parent` (empty for the root).
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        let mut out = String::with_capacity(parent.len() + 1 + name.len());
        out.push_str(parent);
        out.push(SEPARATOR);
        out.push_str(name);
        out
    }
}

/// Canonical form of a topic: segments re-joined with single separators.
pub fn normalize(topic: &str) -> String {
    parse(topic).join("/")
}
