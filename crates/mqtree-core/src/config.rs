use std::time::Duration;

use anyhow::Result;
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL;
use crate::payload::{PayloadAnalyzer, DEFAULT_EXCLUDED_NUMERIC_KEYS};
use crate::propagate::ML_READY_MIN_MESSAGES;
use crate::TreeBuilder;

pub const DEFAULT_BROKER: &str = "default";

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Interface to bind (default 127.0.0.1)
    #[serde(default)]
    pub bind: Option<String>,
    /// HTTP port (default 8092)
    #[serde(default)]
    pub port: Option<u16>,
    /// Maximum in-flight requests (default 1024)
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
}

impl HttpConfig {
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8092)
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit.unwrap_or(1024).max(1)
    }
}

/// Connection to the graph database's HTTP endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    /// Base URL, e.g. <http://127.0.0.1:7474>
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl GraphConfig {
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or("http://127.0.0.1:7474")
    }

    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or("neo4j")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(10).max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TreeConfig {
    /// How long a built tree is served before the graph is queried again.
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub ml_ready_min_messages: Option<u64>,
    /// Object keys whose numeric values are ignored during type inference.
    #[serde(default)]
    pub excluded_numeric_keys: Option<Vec<String>>,
    /// Partition keys that may be requested; the first is the default.
    #[serde(default)]
    pub brokers: Option<Vec<String>>,
    /// Refresh cadence for streaming subscribers.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl TreeConfig {
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TTL)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(5_000).max(100))
    }

    pub fn ml_ready_min_messages(&self) -> u64 {
        self.ml_ready_min_messages.unwrap_or(ML_READY_MIN_MESSAGES)
    }

    pub fn brokers(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .brokers
            .iter()
            .flatten()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        if configured.is_empty() {
            vec![DEFAULT_BROKER.to_string()]
        } else {
            configured
        }
    }

    pub fn analyzer(&self) -> PayloadAnalyzer {
        match &self.excluded_numeric_keys {
            Some(keys) => PayloadAnalyzer::with_excluded_keys(keys),
            None => PayloadAnalyzer::with_excluded_keys(DEFAULT_EXCLUDED_NUMERIC_KEYS),
        }
    }

    pub fn builder(&self) -> TreeBuilder {
        TreeBuilder::new()
            .with_analyzer(self.analyzer())
            .with_ml_ready_min_messages(self.ml_ready_min_messages())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub tree: TreeConfig,
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema_value = config_schema_json();
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration structure.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(anyhow::anyhow!(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(content)?;
    Ok(cfg)
}

pub fn load_config(path: &str) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_file() {
        let cfg = parse_config("").expect("empty config");
        assert_eq!(cfg.http.port(), 8092);
        assert_eq!(cfg.tree.cache_ttl(), Duration::from_secs(5));
        assert_eq!(cfg.tree.ml_ready_min_messages(), 20);
        assert_eq!(cfg.tree.brokers(), vec!["default".to_string()]);
        assert_eq!(cfg.graph.database(), "neo4j");
    }

    #[test]
    fn sections_are_read() {
        let cfg = parse_config(
            r#"
            [http]
            port = 9000

            [graph]
            url = "http://graph:7474"
            user = "neo4j"

            [tree]
            cache_ttl_ms = 2500
            brokers = ["plant", " office "]
            excluded_numeric_keys = ["seq"]
            "#,
        )
        .expect("config");
        assert_eq!(cfg.http.port(), 9000);
        assert_eq!(cfg.graph.url(), "http://graph:7474");
        assert_eq!(cfg.tree.cache_ttl(), Duration::from_millis(2500));
        assert_eq!(cfg.tree.brokers(), vec!["plant", "office"]);
        assert!(cfg.tree.analyzer().is_excluded("SEQ"));
        assert!(!cfg.tree.analyzer().is_excluded("timestamp"));
    }

    #[test]
    fn schema_rejects_unknown_keys_and_bad_types() {
        assert!(parse_config("[tree]\ncache_ttl = 5").is_err());
        assert!(parse_config("[http]\nport = \"eighty\"").is_err());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let cfg = parse_config(include_str!("../../../configs/mqtree.toml")).expect("shipped");
        let defaults = Config::default();
        assert_eq!(cfg.http.port(), defaults.http.port());
        assert_eq!(cfg.graph.timeout(), defaults.graph.timeout());
        assert_eq!(cfg.tree.cache_ttl(), defaults.tree.cache_ttl());
        assert_eq!(cfg.tree.poll_interval(), defaults.tree.poll_interval());
        assert_eq!(cfg.tree.brokers(), defaults.tree.brokers());
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mqtree.toml");
        std::fs::write(&path, "[tree]\npoll_interval_ms = 1000\n").expect("write");
        let cfg = load_config(path.to_str().expect("utf8 path")).expect("load");
        assert_eq!(cfg.tree.poll_interval(), Duration::from_secs(1));
    }
}
