use std::sync::Arc;

use anyhow::Context;
use mqtree_core::{Config, TreeCache};
use tracing::info;

use crate::{access_log, app_state::AppState, graph::Neo4jSource, router::build_router};

pub(crate) struct BootstrapOutput {
    pub router: axum::Router<()>,
    pub http: HttpConfig,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpConfigError {
    #[error("invalid bind address {bind}:{port}")]
    InvalidBind { bind: String, port: u16 },
}

pub(crate) struct HttpConfig {
    pub addr: std::net::SocketAddr,
    pub concurrency_limit: usize,
}

pub(crate) fn http_config(cfg: &Config) -> Result<HttpConfig, HttpConfigError> {
    let bind = cfg.http.bind();
    let port = cfg.http.port();
    let addr = format!("{bind}:{port}")
        .parse()
        .map_err(|_| HttpConfigError::InvalidBind {
            bind: bind.to_string(),
            port,
        })?;
    Ok(HttpConfig {
        addr,
        concurrency_limit: cfg.http.concurrency_limit(),
    })
}

pub(crate) fn build_state(cfg: &Config) -> anyhow::Result<AppState> {
    let source = Neo4jSource::new(&cfg.graph).context("building graph client")?;
    let cache = TreeCache::new(Arc::new(source), cfg.tree.builder(), cfg.tree.cache_ttl());
    let brokers = cfg.tree.brokers();
    info!(
        graph = cfg.graph.url(),
        database = cfg.graph.database(),
        brokers = ?brokers,
        ttl_ms = cfg.tree.cache_ttl().as_millis() as u64,
        "topic tree cache ready"
    );
    Ok(AppState::new(cache, brokers, cfg.tree.poll_interval()))
}

pub(crate) fn build(cfg: &Config) -> anyhow::Result<BootstrapOutput> {
    let http = http_config(cfg)?;
    let state = build_state(cfg)?;
    let router = attach_global_layers(attach_http_layers(
        build_router().with_state(state),
        http.concurrency_limit,
    ));
    Ok(BootstrapOutput { router, http })
}

pub(crate) fn attach_http_layers(
    router: axum::Router<()>,
    concurrency_limit: usize,
) -> axum::Router<()> {
    use tower::limit::ConcurrencyLimitLayer;
    use tower_http::trace::TraceLayer;

    router
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
}

pub(crate) fn attach_global_layers(router: axum::Router<()>) -> axum::Router<()> {
    router.layer(axum::middleware::from_fn(access_log::access_log_mw))
}
