//! Topic-tree construction for MQTT dashboards.
//!
//! Flat topic statistics (or raw messages) go in, a navigable tree with
//! rolled-up message counts, inferred payload types, ML-readiness flags and
//! schema-conformance status comes out. [`TreeCache`] keeps one finished tree
//! per broker for a short TTL so the graph behind it is not queried on every
//! poll.

pub mod builder;
pub mod cache;
pub mod config;
pub mod node;
pub mod path;
pub mod payload;
pub mod propagate;
pub mod row;
pub mod tree;
pub mod view;

pub use builder::{BuiltTree, TopicMessage, TreeBuilder};
pub use cache::{
    CacheError, CacheLookup, CachedTree, Clock, Freshness, SourceError, SystemClock, TreeCache,
    TreeSource,
};
pub use config::{load_config, Config};
pub use node::{find_in, ConformanceCounts, ConformanceStatus, LastMessage, TopicNode};
pub use payload::{DataTypes, PayloadAnalyzer};
pub use row::TopicRow;
pub use tree::{TopicEntry, TopicTree, TreeStats};
pub use view::{project, TreeView};
