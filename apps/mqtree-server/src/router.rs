use axum::{routing::get, Router};

use crate::{api, AppState};

pub(crate) mod paths {
    pub const HEALTHZ: &str = "/healthz";
    pub const TREE: &str = "/api/tree";
    pub const TREE_NODE: &str = "/api/tree/node";
    pub const TREE_STATS: &str = "/api/tree/stats";
    pub const TREE_STREAM: &str = "/api/tree/stream";
}

pub(crate) fn build_router() -> Router<AppState> {
    Router::new()
        .route(paths::HEALTHZ, get(api::meta::healthz))
        .route(paths::TREE, get(api::tree::tree))
        .route(paths::TREE_NODE, get(api::tree::node))
        .route(paths::TREE_STATS, get(api::tree::stats))
        .route(paths::TREE_STREAM, get(api::tree::stream))
}
