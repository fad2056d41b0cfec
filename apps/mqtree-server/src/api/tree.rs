use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use mqtree_core::{find_in, project, CacheLookup, CachedTree, TreeView};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::{responses, AppState};

const TREE_EVENT: &str = "tree";
const ERROR_EVENT: &str = "error";

#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    pub broker: Option<String>,
    pub view: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodeQuery {
    pub broker: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrokerQuery {
    pub broker: Option<String>,
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_broker(state: &AppState, requested: Option<&str>) -> Result<String, Response> {
    match non_empty(requested) {
        Some(broker) if state.knows_broker(broker) => Ok(broker.to_string()),
        Some(broker) => Err(responses::not_found(format!(
            "unknown broker '{broker}' (configured: {})",
            state.brokers().join(", ")
        ))),
        None => state
            .default_broker()
            .map(str::to_string)
            .ok_or_else(|| responses::not_found("no brokers configured")),
    }
}

fn resolve_view(raw: Option<&str>) -> Result<TreeView, Response> {
    match non_empty(raw) {
        None => Ok(TreeView::All),
        Some(slug) => TreeView::from_slug(slug)
            .ok_or_else(|| responses::bad_request(format!("unknown view '{slug}'"))),
    }
}

async fn lookup(state: &AppState, broker: &str) -> Result<CacheLookup, Response> {
    state.cache().get(broker).await.map_err(|err| {
        error!(broker, %err, "topic tree unavailable");
        responses::upstream_failed(err.to_string())
    })
}

fn tree_body(broker: &str, view: TreeView, filter: Option<&str>, lookup: &CacheLookup) -> Value {
    let nodes = project(&lookup.tree.tree, view, filter);
    json!({
        "broker": broker,
        "view": view.as_str(),
        "tree": nodes,
        "stats": lookup.tree.stats,
        "generatedAt": lookup.tree.generated_at,
        "freshness": lookup.freshness.as_str(),
    })
}

/// Whole (projected) tree for one broker.
pub async fn tree(
    State(state): State<AppState>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<Value>, Response> {
    let broker = resolve_broker(&state, query.broker.as_deref())?;
    let view = resolve_view(query.view.as_deref())?;
    let lookup = lookup(&state, &broker).await?;
    Ok(Json(tree_body(
        &broker,
        view,
        non_empty(query.q.as_deref()),
        &lookup,
    )))
}

/// Single topic by exact path, children included.
pub async fn node(
    State(state): State<AppState>,
    Query(query): Query<NodeQuery>,
) -> Result<Json<Value>, Response> {
    let broker = resolve_broker(&state, query.broker.as_deref())?;
    let path = non_empty(query.path.as_deref())
        .ok_or_else(|| responses::bad_request("missing 'path' parameter"))?;
    let lookup = lookup(&state, &broker).await?;
    let node = find_in(&lookup.tree.tree, path)
        .ok_or_else(|| responses::not_found(format!("no topic '{path}' on broker '{broker}'")))?;
    Ok(Json(json!({
        "broker": broker,
        "node": node,
        "generatedAt": lookup.tree.generated_at,
        "freshness": lookup.freshness.as_str(),
    })))
}

pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<BrokerQuery>,
) -> Result<Json<Value>, Response> {
    let broker = resolve_broker(&state, query.broker.as_deref())?;
    let lookup = lookup(&state, &broker).await?;
    let nodes: usize = lookup.tree.tree.iter().map(|n| n.node_count()).sum();
    Ok(Json(json!({
        "broker": broker,
        "stats": lookup.tree.stats,
        "nodes": nodes,
        "generatedAt": lookup.tree.generated_at,
        "freshness": lookup.freshness.as_str(),
        "rebuilds": state.cache().rebuild_count(),
        "ttlMs": state.cache().ttl().as_millis() as u64,
    })))
}

fn snapshot_changed(previous: Option<&Arc<CachedTree>>, next: &Arc<CachedTree>) -> bool {
    previous.is_none_or(|prev| !Arc::ptr_eq(prev, next))
}

/// Server-sent `tree` events, one per new cached snapshot.
pub async fn stream(State(state): State<AppState>, Query(query): Query<TreeQuery>) -> Response {
    let broker = match resolve_broker(&state, query.broker.as_deref()) {
        Ok(broker) => broker,
        Err(resp) => return resp,
    };
    let view = match resolve_view(query.view.as_deref()) {
        Ok(view) => view,
        Err(resp) => return resp,
    };
    let filter = non_empty(query.q.as_deref()).map(str::to_string);

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<Arc<CachedTree>> = None;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => break,
            }
            let event = match state.cache().get(&broker).await {
                Ok(lookup) => {
                    if !snapshot_changed(last.as_ref(), &lookup.tree) {
                        continue;
                    }
                    let body = tree_body(&broker, view, filter.as_deref(), &lookup);
                    last = Some(Arc::clone(&lookup.tree));
                    match Event::default().event(TREE_EVENT).json_data(&body) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!("serialize tree event failed: {}", err);
                            continue;
                        }
                    }
                }
                Err(err) => {
                    warn!(broker = %broker, %err, "tree stream refresh failed");
                    Event::default().event(ERROR_EVENT).data(err.to_string())
                }
            };
            if tx.send(Ok(event)).await.is_err() {
                break;
            }
        }
        debug!(broker = %broker, "tree stream closed");
    });

    Sse::new(ReceiverStream::new(rx))
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text(":keep-alive"),
        )
        .into_response()
}
