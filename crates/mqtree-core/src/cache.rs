//! Time-boxed cache of built trees, one entry per partition (broker).
//!
//! No lock is held while rebuilding: concurrent misses on the same partition
//! may both rebuild and the last writer wins. Builds are pure functions of
//! the upstream rows, so the duplicate work is harmless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::builder::TreeBuilder;
use crate::node::TopicNode;
use crate::row::TopicRow;
use crate::tree::TreeStats;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("query failed ({code}): {message}")]
    Query { code: String, message: String },
}

/// Answers the per-partition topic statistics query.
#[async_trait]
pub trait TreeSource: Send + Sync {
    async fn fetch_rows(&self, partition: &str) -> Result<Vec<TopicRow>, SourceError>;
}

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("building topic tree for '{partition}' failed: {source}")]
    Build {
        partition: String,
        #[source]
        source: SourceError,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTree {
    pub partition: String,
    pub tree: Vec<TopicNode>,
    pub stats: TreeStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Served from an entry younger than the TTL.
    Cached,
    Rebuilt,
    /// Rebuild failed; an expired entry was served instead.
    Stale,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Cached => "cached",
            Freshness::Rebuilt => "rebuilt",
            Freshness::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub tree: Arc<CachedTree>,
    pub freshness: Freshness,
}

struct CacheEntry {
    tree: Arc<CachedTree>,
    stored_at: Instant,
}

pub struct TreeCache {
    source: Arc<dyn TreeSource>,
    builder: TreeBuilder,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    rebuilds: AtomicU64,
}

impl TreeCache {
    pub fn new(source: Arc<dyn TreeSource>, builder: TreeBuilder, ttl: Duration) -> Self {
        Self {
            source,
            builder,
            ttl,
            clock: Arc::new(SystemClock),
            entries: Mutex::new(HashMap::new()),
            rebuilds: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Successful rebuilds since construction.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Current entry for `partition`, regardless of age.
    pub fn peek(&self, partition: &str) -> Option<Arc<CachedTree>> {
        self.entries
            .lock()
            .get(partition)
            .map(|entry| Arc::clone(&entry.tree))
    }

    pub async fn get(&self, partition: &str) -> Result<CacheLookup, CacheError> {
        let now = self.clock.now();
        let existing = self
            .entries
            .lock()
            .get(partition)
            .map(|entry| (Arc::clone(&entry.tree), entry.stored_at));

        if let Some((tree, stored_at)) = existing.as_ref() {
            if now.saturating_duration_since(*stored_at) < self.ttl {
                debug!(partition, "topic tree cache hit");
                return Ok(CacheLookup {
                    tree: Arc::clone(tree),
                    freshness: Freshness::Cached,
                });
            }
        }

        match self.rebuild(partition).await {
            Ok(tree) => {
                let tree = Arc::new(tree);
                self.entries.lock().insert(
                    partition.to_string(),
                    CacheEntry {
                        tree: Arc::clone(&tree),
                        stored_at: self.clock.now(),
                    },
                );
                Ok(CacheLookup {
                    tree,
                    freshness: Freshness::Rebuilt,
                })
            }
            Err(err) => match existing {
                Some((tree, _)) => {
                    warn!(partition, %err, "topic tree rebuild failed; serving stale entry");
                    Ok(CacheLookup {
                        tree,
                        freshness: Freshness::Stale,
                    })
                }
                None => Err(CacheError::Build {
                    partition: partition.to_string(),
                    source: err,
                }),
            },
        }
    }

    async fn rebuild(&self, partition: &str) -> Result<CachedTree, SourceError> {
        let started = Instant::now();
        let rows = self.source.fetch_rows(partition).await?;
        let generated_at = Utc::now();
        let built = self.builder.build_from_rows(&rows, generated_at);
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        debug!(
            partition,
            rows = rows.len(),
            topics = built.stats.total_topics,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt topic tree"
        );
        Ok(CachedTree {
            partition: partition.to_string(),
            tree: built.tree,
            stats: built.stats,
            generated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Instant::now()),
            })
        }

        fn advance(&self, by: Duration) {
            *self.now.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock()
        }
    }

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl TreeSource for CountingSource {
        async fn fetch_rows(&self, partition: &str) -> Result<Vec<TopicRow>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::Transport("connection refused".into()));
            }
            Ok(vec![TopicRow::new(format!("{partition}/temp"), 3).with_sample("1")])
        }
    }

    fn cache_with(source: Arc<CountingSource>, clock: Arc<ManualClock>) -> TreeCache {
        TreeCache::new(source, TreeBuilder::new(), DEFAULT_TTL).with_clock(clock)
    }

    #[tokio::test]
    async fn hits_within_ttl_return_same_tree() {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let cache = cache_with(source.clone(), clock.clone());

        let first = cache.get("brokerA").await.expect("first build");
        assert_eq!(first.freshness, Freshness::Rebuilt);
        clock.advance(Duration::from_millis(4_999));
        let second = cache.get("brokerA").await.expect("cached");
        assert_eq!(second.freshness, Freshness::Cached);
        assert!(Arc::ptr_eq(&first.tree, &second.tree));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiry_triggers_exactly_one_rebuild() {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let cache = cache_with(source.clone(), clock.clone());

        let first = cache.get("brokerA").await.unwrap();
        clock.advance(DEFAULT_TTL);
        let second = cache.get("brokerA").await.unwrap();
        let third = cache.get("brokerA").await.unwrap();
        assert_eq!(second.freshness, Freshness::Rebuilt);
        assert_eq!(third.freshness, Freshness::Cached);
        assert!(!Arc::ptr_eq(&first.tree, &second.tree));
        assert!(Arc::ptr_eq(&second.tree, &third.tree));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.rebuild_count(), 2);
    }

    #[tokio::test]
    async fn partitions_are_independent() {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let cache = cache_with(source.clone(), clock);

        let a = cache.get("a").await.unwrap();
        let b = cache.get("b").await.unwrap();
        assert_eq!(a.tree.tree[0].name, "a");
        assert_eq!(b.tree.tree[0].name, "b");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("a").await.unwrap().freshness, Freshness::Cached);
    }

    #[tokio::test]
    async fn failed_rebuild_serves_stale_entry() {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let cache = cache_with(source.clone(), clock.clone());

        let first = cache.get("a").await.unwrap();
        source.failing.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(6));
        let stale = cache.get("a").await.expect("stale entry served");
        assert_eq!(stale.freshness, Freshness::Stale);
        assert!(Arc::ptr_eq(&first.tree, &stale.tree));

        // The stale entry is not re-stamped, so the next call retries.
        let again = cache.get("a").await.unwrap();
        assert_eq!(again.freshness, Freshness::Stale);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_without_entry_propagates() {
        let source = Arc::new(CountingSource::default());
        source.failing.store(true, Ordering::SeqCst);
        let cache = cache_with(source, ManualClock::new());
        let err = cache.get("a").await.expect_err("no entry to fall back on");
        match err {
            CacheError::Build { partition, .. } => assert_eq!(partition, "a"),
        }
        assert!(cache.peek("a").is_none());
    }
}
