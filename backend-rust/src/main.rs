use std::net::SocketAddr;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use screen_server::handlers::router;
use screen_server::{start_ingest, AppState, ServerConfig};

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_server=info,tower_http=warn".into()),
        )
        .init();

    info!("Screen server starting...");

    let config = ServerConfig::default();
    let http_addr = SocketAddr::new(config.bind_addr, config.http_port);
    let state = AppState::shared(config);

    // Screens stay useful without a device feed, so a busy UDP port is not fatal
    let ingest = match start_ingest(state.clone()).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(
                "could not bind UDP {}:{}: {e} (no device frames will be received)",
                state.config.bind_addr, state.config.udp_port
            );
            None
        }
    };

    // CORS: screens are served from a separate origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {http_addr}"))?;
    info!("Listening on {http_addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    if let Some(ingest) = ingest {
        ingest.shutdown().await?;
    }
    Ok(())
}
