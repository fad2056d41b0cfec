use std::net::SocketAddr;

use tracing::{error, info};

mod access_log;
mod api;
mod app_state;
mod bootstrap;
mod config;
mod graph;
mod http_client;
mod responses;
mod router;

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() {
    mqtree_otel::init();

    let mut cfg = match config::load_initial_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };
    if let Err(err) = config::apply_env_overrides(&mut cfg) {
        eprintln!("error: {err}");
        std::process::exit(2);
    }

    let bootstrap::BootstrapOutput { router, http } = match bootstrap::build(&cfg) {
        Ok(output) => output,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };

    let listener = match tokio::net::TcpListener::bind(http.addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %http.addr, "bind server socket failed: {err}");
            std::process::exit(1);
        }
    };
    info!(addr = %http.addr, "mqtree-server listening");

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }
    info!("shutdown complete");
}

async fn shutdown_signal() {
    info!("shutdown signal listener active");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!("install SIGTERM handler failed: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
