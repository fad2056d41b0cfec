use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::{ConnectInfo, MatchedPath};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;

#[derive(Clone, Debug)]
struct Cfg {
    enabled: bool,
    sample_n: u64,
}

static CFG: Lazy<Cfg> = Lazy::new(|| {
    let flag = |key: &str| std::env::var(key).ok().as_deref() == Some("1");
    Cfg {
        enabled: flag("MQTREE_ACCESS_LOG") || flag("MQTREE_ACCESS_LOG_ROLL"),
        sample_n: std::env::var("MQTREE_ACCESS_SAMPLE_N")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1)
            .max(1),
    }
});

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub async fn access_log_mw(req: Request<axum::body::Body>, next: Next) -> Response {
    if !CFG.enabled {
        return next.run(req).await;
    }
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let query = req.uri().query().map(str::to_string);
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());

    let response = next.run(req).await;

    if COUNTER.fetch_add(1, Ordering::Relaxed) % CFG.sample_n != 0 {
        return response;
    }
    tracing::info!(
        target: "http.access",
        method = %method,
        path = %path,
        query = query.as_deref().unwrap_or(""),
        status = response.status().as_u16(),
        dt_ms = started.elapsed().as_millis() as u64,
        remote = remote.as_deref().unwrap_or("-"),
        "access"
    );
    response
}
