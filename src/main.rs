use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cleargate::api::build_router;
use cleargate::browser::{CdpSession, SessionConfig};
use cleargate::core::config::load_gate_config;
use cleargate::core::AppState;
use cleargate::sched::{Scheduler, SchedulerOptions};
use cleargate::solver::{ClearanceSolver, TurnstileSolver};

fn session_config(config: &cleargate::GateConfig) -> SessionConfig {
    SessionConfig {
        user_agent: config.user_agent.clone(),
        headless: config.headless,
        proxy: config.proxy.clone(),
        http2: config.http2,
        http3: config.http3,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn")),
        )
        .init();

    let config = load_gate_config();
    info!(
        "starting cleargate v{} ({} workers, {} max concurrent)",
        env!("CARGO_PKG_VERSION"),
        config.worker_count,
        config.max_concurrent
    );

    let clearance = ClearanceSolver::new(CdpSession::new(session_config(&config)));
    let turnstile = TurnstileSolver::new(CdpSession::new(session_config(&config)));
    let scheduler = Arc::new(Scheduler::new(
        Box::new(clearance),
        Box::new(turnstile),
        SchedulerOptions {
            worker_count: config.worker_count,
            max_concurrent: config.max_concurrent,
        },
    ));

    if let Err(e) = scheduler.start().await {
        bail!("scheduler failed to start: {}", e);
    }

    let port = config.port;
    let state = AppState::new(Arc::clone(&scheduler), config);
    let router = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            scheduler.stop().await;
            bail!("port {} is already in use; set CLEARGATE_PORT to change it", port);
        }
        Err(e) => {
            scheduler.stop().await;
            return Err(e).with_context(|| format!("binding {}", addr));
        }
    };
    info!("listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    scheduler.stop().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
