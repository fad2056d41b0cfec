use std::path::Path;

use anyhow::Context;
use mqtree_core::{load_config, Config};
use tracing::info;

pub(crate) const DEFAULT_CONFIG_PATH: &str = "configs/mqtree.toml";

#[derive(Debug, thiserror::Error)]
pub(crate) enum EnvConfigError {
    #[error("invalid MQTREE_PORT: {0}")]
    InvalidPort(String),
    #[error("invalid MQTREE_HTTP_MAX_CONC: {0}")]
    InvalidConcurrency(String),
    #[error("invalid MQTREE_CACHE_TTL_MS: {0}")]
    InvalidCacheTtl(String),
}

/// Load the TOML config named by `MQTREE_CONFIG`, else `configs/mqtree.toml`
/// when it exists, else built-in defaults.
pub(crate) fn load_initial_config() -> anyhow::Result<Config> {
    let explicit = std::env::var("MQTREE_CONFIG")
        .ok()
        .filter(|p| !p.trim().is_empty());
    let path = match explicit {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => DEFAULT_CONFIG_PATH.to_string(),
        None => {
            info!("no config file found; using defaults");
            return Ok(Config::default());
        }
    };
    let cfg = load_config(&path).with_context(|| format!("loading config {path}"))?;
    info!(config_source = %path, "runtime config loaded");
    Ok(cfg)
}

pub(crate) fn apply_env_overrides(cfg: &mut Config) -> Result<(), EnvConfigError> {
    apply_overrides(cfg, |key| std::env::var(key).ok())
}

fn apply_overrides(
    cfg: &mut Config,
    get: impl Fn(&str) -> Option<String>,
) -> Result<(), EnvConfigError> {
    if let Some(bind) = get("MQTREE_BIND") {
        cfg.http.bind = Some(bind);
    }
    if let Some(raw) = get("MQTREE_PORT") {
        let port = raw
            .trim()
            .parse()
            .map_err(|_| EnvConfigError::InvalidPort(raw.clone()))?;
        cfg.http.port = Some(port);
    }
    if let Some(raw) = get("MQTREE_HTTP_MAX_CONC") {
        let limit: usize = raw
            .trim()
            .parse()
            .map_err(|_| EnvConfigError::InvalidConcurrency(raw.clone()))?;
        if limit == 0 {
            return Err(EnvConfigError::InvalidConcurrency(raw));
        }
        cfg.http.concurrency_limit = Some(limit);
    }
    if let Some(url) = get("MQTREE_GRAPH_URL") {
        cfg.graph.url = Some(url);
    }
    if let Some(user) = get("MQTREE_GRAPH_USER") {
        cfg.graph.user = Some(user);
    }
    if let Some(password) = get("MQTREE_GRAPH_PASSWORD") {
        cfg.graph.password = Some(password);
    }
    if let Some(raw) = get("MQTREE_CACHE_TTL_MS") {
        let ttl = raw
            .trim()
            .parse()
            .map_err(|_| EnvConfigError::InvalidCacheTtl(raw.clone()))?;
        cfg.tree.cache_ttl_ms = Some(ttl);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = mqtree_core::config::parse_config(
            "[http]\nport = 9000\n[tree]\ncache_ttl_ms = 1000\n",
        )
        .expect("config");
        apply_overrides(
            &mut cfg,
            lookup(&[
                ("MQTREE_PORT", "9100"),
                ("MQTREE_GRAPH_URL", "http://graph:7474"),
                ("MQTREE_CACHE_TTL_MS", "250"),
            ]),
        )
        .expect("overrides");
        assert_eq!(cfg.http.port(), 9100);
        assert_eq!(cfg.graph.url(), "http://graph:7474");
        assert_eq!(cfg.tree.cache_ttl().as_millis(), 250);
    }

    #[test]
    fn invalid_values_are_typed_errors() {
        let mut cfg = Config::default();
        let err = apply_overrides(&mut cfg, lookup(&[("MQTREE_PORT", "eighty")]))
            .expect_err("bad port");
        assert!(matches!(err, EnvConfigError::InvalidPort(ref raw) if raw == "eighty"));

        let err = apply_overrides(&mut cfg, lookup(&[("MQTREE_HTTP_MAX_CONC", "0")]))
            .expect_err("zero concurrency");
        assert!(matches!(err, EnvConfigError::InvalidConcurrency(_)));

        let err = apply_overrides(&mut cfg, lookup(&[("MQTREE_CACHE_TTL_MS", "-5")]))
            .expect_err("negative ttl");
        assert_eq!(err.to_string(), "invalid MQTREE_CACHE_TTL_MS: -5");
    }
}
