use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;
use tracing::warn;

const MAX_BACKOFF_SECS: u64 = 30;

#[derive(Debug, Parser)]
#[command(
    name = "mqtree-watch",
    version,
    about = "Terminal watcher for the MQTT topic tree"
)]
struct Args {
    #[arg(long, env = "MQTREE_BASE", default_value = "http://127.0.0.1:8092")]
    base: String,
    /// Broker partition; the server default when omitted
    #[arg(long)]
    broker: Option<String>,
    /// Tree view: all, numeric or ml_ready
    #[arg(long, default_value = "all")]
    view: String,
    /// Case-insensitive topic path filter
    #[arg(long)]
    filter: Option<String>,
    #[arg(long, default_value_t = 5_000)]
    interval_ms: u64,
    /// Deepest level to print (1 = roots only)
    #[arg(long)]
    depth: Option<usize>,
    /// Print the raw response JSON on every poll
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Render once and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

fn fetch_tree(client: &Client, args: &Args) -> Result<JsonValue> {
    let url = format!("{}/api/tree", args.base.trim_end_matches('/'));
    let mut query: Vec<(&str, &str)> = vec![("view", args.view.as_str())];
    if let Some(broker) = args.broker.as_deref() {
        query.push(("broker", broker));
    }
    if let Some(filter) = args.filter.as_deref() {
        query.push(("q", filter));
    }
    let resp = client
        .get(url)
        .query(&query)
        .header(ACCEPT, "application/json")
        .send()
        .context("fetching topic tree")?;
    let status = resp.status();
    if !status.is_success() {
        let detail = resp
            .json::<JsonValue>()
            .ok()
            .and_then(|body| body.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or_default();
        bail!("topic tree request failed: {status} {detail}");
    }
    resp.json().context("decoding topic tree json")
}

fn summary_line(snapshot: &JsonValue) -> String {
    let stats = snapshot.get("stats");
    let field = |key: &str| {
        stats
            .and_then(|s| s.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    };
    let text = |key: &str| snapshot.get(key).and_then(|v| v.as_str()).unwrap_or("?");
    format!(
        "broker={} view={} topics={} messages={} freshness={}",
        text("broker"),
        text("view"),
        field("totalTopics"),
        field("totalMessages"),
        text("freshness"),
    )
}

fn node_line(node: &JsonValue, depth: usize) -> String {
    let name = node.get("name").and_then(|v| v.as_str()).unwrap_or("?");
    let own = node
        .get("messageCount")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let total = node
        .get("totalMessageCount")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let mut line = format!("{}{} msgs={} total={}", "  ".repeat(depth), name, own, total);
    if let Some(types) = node.get("dataTypes").and_then(|v| v.as_object()) {
        let mut kinds: Vec<&str> = types
            .iter()
            .filter(|(_, set)| set.as_bool() == Some(true))
            .map(|(kind, _)| kind.as_str())
            .collect();
        kinds.sort_unstable();
        if !kinds.is_empty() {
            line.push_str(&format!(" [{}]", kinds.join(",")));
        }
    }
    if node.get("hasMLReadyDescendant").and_then(|v| v.as_bool()) == Some(true) {
        line.push_str(" ml");
    }
    match node.get("conformanceStatus").and_then(|v| v.as_str()) {
        None | Some("no_binding") => {}
        Some(status) => line.push_str(&format!(" {status}")),
    }
    line
}

fn render_lines(tree: &JsonValue, max_depth: Option<usize>) -> Vec<String> {
    fn walk(nodes: &JsonValue, depth: usize, max_depth: Option<usize>, out: &mut Vec<String>) {
        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        for node in nodes.as_array().into_iter().flatten() {
            out.push(node_line(node, depth));
            if let Some(children) = node.get("children") {
                walk(children, depth + 1, max_depth, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(tree, 0, max_depth, &mut out);
    out
}

/// Direct message counts per topic path, topics without own traffic skipped.
fn topic_counts(tree: &JsonValue) -> BTreeMap<String, u64> {
    fn walk(nodes: &JsonValue, out: &mut BTreeMap<String, u64>) {
        for node in nodes.as_array().into_iter().flatten() {
            let count = node
                .get("messageCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            if count > 0 {
                if let Some(path) = node.get("fullPath").and_then(|v| v.as_str()) {
                    out.insert(path.to_string(), count);
                }
            }
            if let Some(children) = node.get("children") {
                walk(children, out);
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(tree, &mut out);
    out
}

fn count_deltas(
    previous: &BTreeMap<String, u64>,
    current: &BTreeMap<String, u64>,
) -> Vec<(String, i64)> {
    current
        .iter()
        .filter_map(|(path, &now)| {
            let before = previous.get(path).copied().unwrap_or(0);
            (now != before).then(|| (path.clone(), now as i64 - before as i64))
        })
        .collect()
}

fn render(snapshot: &JsonValue, args: &Args, previous: Option<&BTreeMap<String, u64>>) {
    let now = Local::now().format("%H:%M:%S");
    if args.json {
        println!(
            "{}",
            serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_string())
        );
        return;
    }
    println!("[{}] {}", now, summary_line(snapshot));
    let tree = snapshot.get("tree").cloned().unwrap_or(JsonValue::Null);
    match previous {
        None => {
            for line in render_lines(&tree, args.depth) {
                println!("{line}");
            }
        }
        Some(prev) => {
            for (path, delta) in count_deltas(prev, &topic_counts(&tree)) {
                println!("  {path} {delta:+}");
            }
        }
    }
}

fn main() -> Result<()> {
    mqtree_otel::init();
    let args = Args::parse();
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("client build")?;
    let interval = Duration::from_millis(args.interval_ms.max(100));

    let mut previous: Option<BTreeMap<String, u64>> = None;
    let mut backoff = 1u64;
    loop {
        match fetch_tree(&client, &args) {
            Ok(snapshot) => {
                render(&snapshot, &args, previous.as_ref());
                if args.once {
                    return Ok(());
                }
                let tree = snapshot.get("tree").cloned().unwrap_or(JsonValue::Null);
                previous = Some(topic_counts(&tree));
                backoff = 1;
                thread::sleep(interval);
            }
            Err(err) => {
                if args.once {
                    return Err(err);
                }
                warn!("[watch] poll failed: {err:#}; retrying in {backoff}s");
                thread::sleep(Duration::from_secs(backoff));
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> JsonValue {
        json!({
            "broker": "plant",
            "view": "all",
            "freshness": "cached",
            "stats": {"totalTopics": 4, "totalMessages": 29},
            "tree": [{
                "name": "plant", "fullPath": "plant", "messageCount": 0, "totalMessageCount": 29,
                "dataTypes": {"numeric": false, "string": false, "boolean": false, "object": false, "array": false},
                "hasMLReadyDescendant": true, "conformanceStatus": "no_binding",
                "children": [{
                    "name": "line1", "fullPath": "plant/line1", "messageCount": 0, "totalMessageCount": 29,
                    "hasMLReadyDescendant": true, "conformanceStatus": "mixed",
                    "children": [
                        {"name": "state", "fullPath": "plant/line1/state", "messageCount": 4, "totalMessageCount": 4,
                         "dataTypes": {"numeric": false, "string": true, "boolean": false, "object": true, "array": false},
                         "children": []},
                        {"name": "temp", "fullPath": "plant/line1/temp", "messageCount": 25, "totalMessageCount": 25,
                         "dataTypes": {"numeric": true, "string": false, "boolean": false, "object": false, "array": false},
                         "hasMLReadyDescendant": true, "children": []}
                    ]
                }]
            }]
        })
    }

    #[test]
    fn summary_reads_stats() {
        assert_eq!(
            summary_line(&sample()),
            "broker=plant view=all topics=4 messages=29 freshness=cached"
        );
    }

    #[test]
    fn render_indents_by_depth() {
        let lines = render_lines(&sample()["tree"], None);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "plant msgs=0 total=29 ml");
        assert_eq!(lines[1], "  line1 msgs=0 total=29 ml mixed");
        assert_eq!(lines[2], "    state msgs=4 total=4 [object,string]");
        assert_eq!(lines[3], "    temp msgs=25 total=25 [numeric] ml");
    }

    #[test]
    fn depth_limit_truncates() {
        let lines = render_lines(&sample()["tree"], Some(2));
        assert_eq!(lines.len(), 2);
        assert!(render_lines(&sample()["tree"], Some(0)).is_empty());
    }

    #[test]
    fn deltas_report_changed_and_new_topics() {
        let before = topic_counts(&sample()["tree"]);
        assert_eq!(before.len(), 2);

        let mut after = before.clone();
        after.insert("plant/line1/temp".into(), 31);
        after.insert("plant/line2/flow".into(), 2);
        let deltas = count_deltas(&before, &after);
        assert_eq!(
            deltas,
            vec![
                ("plant/line1/temp".to_string(), 6),
                ("plant/line2/flow".to_string(), 2),
            ]
        );
        assert!(count_deltas(&after, &after).is_empty());
    }
}
