pub mod error;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use state::AppState;
use tenure_core::shutdown::Shutdown;
use tower_http::trace::TraceLayer;

/// Build the axum Router with every route and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/cycles", get(routes::cycles::list_cycles))
        .route("/api/cycles/{community}", get(routes::cycles::get_cycle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` fires.
///
/// Taking the listener lets the caller report bind failures before anything
/// else starts, and lets tests bind port 0.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: AppState,
    mut shutdown: Shutdown,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "health server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.triggered().await })
        .await?;

    tracing::info!("health server stopped");
    Ok(())
}
