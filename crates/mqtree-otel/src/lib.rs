//! Process-wide tracing setup shared by the mqtree binaries.

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used for per-request access lines.
pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Install the console subscriber (`RUST_LOG`, default `info`).
///
/// With `MQTREE_ACCESS_LOG_ROLL=1`, access lines are additionally written to
/// a rolling file under `MQTREE_ACCESS_LOG_DIR` (or `MQTREE_LOGS_DIR`, or
/// `logs`). Calling this more than once is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    let Some(settings) = AccessLogSettings::from_env() else {
        let _ = registry.try_init();
        return;
    };

    if std::fs::create_dir_all(&settings.dir).is_err() {
        tracing::warn!(directory = %settings.dir, "failed to create access log directory");
    }
    let writer = match settings.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&settings.dir, &settings.prefix),
        "minutely" => tracing_appender::rolling::minutely(&settings.dir, &settings.prefix),
        _ => tracing_appender::rolling::daily(&settings.dir, &settings.prefix),
    };
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = ACCESS_GUARD.set(guard);
    let targets = Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO);
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(nb)
        .with_filter(targets);
    let _ = registry.with(access_layer).try_init();
}

#[derive(Debug, PartialEq, Eq)]
struct AccessLogSettings {
    dir: String,
    prefix: String,
    rotation: String,
}

impl AccessLogSettings {
    fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if get("MQTREE_ACCESS_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        let dir = get("MQTREE_ACCESS_LOG_DIR")
            .or_else(|| get("MQTREE_LOGS_DIR"))
            .unwrap_or_else(|| "logs".to_string());
        let prefix = get("MQTREE_ACCESS_LOG_PREFIX").unwrap_or_else(|| "http-access".into());
        let rotation = get("MQTREE_ACCESS_LOG_ROTATION")
            .unwrap_or_else(|| "daily".into())
            .to_lowercase();
        Some(Self {
            dir,
            prefix,
            rotation,
        })
    }
}
