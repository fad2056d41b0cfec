use std::sync::Arc;
use std::time::Duration;

use mqtree_core::TreeCache;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    cache: TreeCache,
    brokers: Vec<String>,
    poll_interval: Duration,
}

impl AppState {
    pub(crate) fn new(cache: TreeCache, brokers: Vec<String>, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                brokers,
                poll_interval,
            }),
        }
    }

    pub(crate) fn cache(&self) -> &TreeCache {
        &self.inner.cache
    }

    pub(crate) fn brokers(&self) -> &[String] {
        &self.inner.brokers
    }

    /// Broker used when a request names none.
    pub(crate) fn default_broker(&self) -> Option<&str> {
        self.inner.brokers.first().map(String::as_str)
    }

    pub(crate) fn knows_broker(&self, broker: &str) -> bool {
        self.inner.brokers.iter().any(|b| b == broker)
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }
}
