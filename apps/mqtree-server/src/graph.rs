//! Topic statistics pulled from Neo4j over its HTTP transactional endpoint.

use async_trait::async_trait;
use mqtree_core::{config::GraphConfig, SourceError, TopicRow, TreeSource};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::http_client;

/// One row per topic of the broker: traffic count, latest payload and the
/// numeric range over the 50 most recent samples, plus schema-binding
/// counters.
pub(crate) const TOPIC_STATS_QUERY: &str = "\
MATCH (t:Topic {broker: $broker})
OPTIONAL MATCH (t)-[:HAS_MESSAGE]->(m:Message)
WITH t, m ORDER BY m.timestamp DESC
WITH t, count(m) AS messageCount, collect(m)[0..50] AS recent
WITH t, messageCount, recent,
     [x IN recent WHERE x.numericValue IS NOT NULL | x.numericValue] AS samples
OPTIONAL MATCH (t)-[:BOUND_TO]->(p:SchemaProposal)
RETURN t.path AS path,
       messageCount,
       CASE WHEN size(recent) > 0 THEN recent[0].payload ELSE null END AS samplePayload,
       CASE WHEN size(samples) > 0
            THEN reduce(lo = samples[0], v IN samples | CASE WHEN v < lo THEN v ELSE lo END)
            ELSE null END AS minValue,
       CASE WHEN size(samples) > 0
            THEN reduce(hi = samples[0], v IN samples | CASE WHEN v > hi THEN v ELSE hi END)
            ELSE null END AS maxValue,
       size(samples) AS numericSampleCount,
       coalesce(t.conformantCount, 0) AS conformantCount,
       coalesce(t.nonConformantCount, 0) AS nonConformantCount,
       coalesce(t.unboundCount, 0) AS unboundCount,
       p.id AS boundProposalId,
       p.name AS boundProposalName";

pub(crate) struct Neo4jSource {
    client: reqwest::Client,
    endpoint: String,
    user: Option<String>,
    password: Option<String>,
}

impl Neo4jSource {
    pub(crate) fn new(cfg: &GraphConfig) -> reqwest::Result<Self> {
        let client = http_client::client_with_timeout(cfg.timeout())?;
        Ok(Self {
            client,
            endpoint: commit_endpoint(cfg.url(), cfg.database()),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
        })
    }
}

fn commit_endpoint(url: &str, database: &str) -> String {
    format!("{}/db/{}/tx/commit", url.trim_end_matches('/'), database)
}

#[async_trait]
impl TreeSource for Neo4jSource {
    async fn fetch_rows(&self, partition: &str) -> Result<Vec<TopicRow>, SourceError> {
        let body = json!({
            "statements": [{
                "statement": TOPIC_STATS_QUERY,
                "parameters": { "broker": partition },
            }]
        });
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body);
        if let Some(user) = self.user.as_deref() {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(partition, status = status.as_u16(), "graph query rejected");
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| SourceError::Decode(err.to_string()))?;
        let rows = rows_from_response(&payload)?;
        debug!(partition, rows = rows.len(), "graph query answered");
        Ok(rows)
    }
}

/// Flatten a transactional-endpoint response into topic rows.
///
/// Rows without a usable `path` column are dropped.
pub(crate) fn rows_from_response(payload: &Value) -> Result<Vec<TopicRow>, SourceError> {
    if let Some(first) = payload
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        let field = |key: &str| {
            first
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        return Err(SourceError::Query {
            code: field("code"),
            message: field("message"),
        });
    }

    let results = payload
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Decode("response has no results array".into()))?;

    let mut rows = Vec::new();
    for result in results {
        let columns: Vec<&str> = result
            .get("columns")
            .and_then(Value::as_array)
            .map(|cols| cols.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let Some(data) = result.get("data").and_then(Value::as_array) else {
            continue;
        };
        for record in data {
            let Some(values) = record.get("row").and_then(Value::as_array) else {
                continue;
            };
            let object: Map<String, Value> = columns
                .iter()
                .zip(values)
                .map(|(column, value)| (column.to_string(), value.clone()))
                .collect();
            if let Some(row) = TopicRow::from_value(&Value::Object(object)) {
                rows.push(row);
            }
        }
    }
    Ok(rows)
}
