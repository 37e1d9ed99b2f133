use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tenure_core::api::AlertSink;
use tenure_core::config::Config;
use tenure_core::reconciler::Reconciler;
use tenure_core::shutdown::{self, ShutdownTrigger};
use tenure_discord::DiscordClient;
use tenure_server::state::AppState;
use tracing::{info, warn};

pub fn run(path: &Path, token: &str, alerts: Arc<dyn AlertSink + Send + Sync>) -> anyhow::Result<()> {
    let (config, warnings) = Config::load_validated(path).context("failed to load config")?;
    for w in &warnings {
        warn!("config: {}", w.message);
    }

    let client = DiscordClient::new(token).context("failed to build Discord client")?;
    let reconciler = Reconciler::new(client, alerts, &config).context("invalid tier table")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (trigger, shutdown) = shutdown::channel();

        let server = if config.health.enabled {
            let listener = tokio::net::TcpListener::bind(&config.health.bind)
                .await
                .with_context(|| format!("failed to bind health server on {}", config.health.bind))?;
            let state = AppState::new(reconciler.reports());
            Some(tokio::spawn(tenure_server::serve_on(
                listener,
                state,
                trigger.subscribe(),
            )))
        } else {
            None
        };

        tokio::spawn(forward_signals(trigger));
        reconciler.run(shutdown).await;

        if let Some(server) = server {
            server.await.context("health server task failed")??;
        }
        info!("shutdown complete");
        Ok::<(), anyhow::Error>(())
    })
}

/// Trigger shutdown on SIGINT or SIGTERM.
async fn forward_signals(trigger: ShutdownTrigger) {
    wait_for_signal().await;
    info!("shutdown signal received");
    trigger.trigger();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("cannot listen for SIGTERM: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
