use crate::web::api::{get_cascade, get_series, get_series_csv, health, AppState};
use anyhow::Result;
use axum::{routing::get, Router};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/cascade", get(get_cascade))
        .route("/api/series", get(get_series))
        .route("/api/series.csv", get(get_series_csv))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(host: IpAddr, port: u16, state: Arc<AppState>) -> Result<()> {
    let mut current_port = port;
    let listener = loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Tokio requires a non-blocking socket
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port.wrapping_add(1);
                if current_port == 0 {
                    return Err(anyhow::anyhow!("No available ports found"));
                }
            }
        }
    };

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "NDVI dashboard API started on http://{:?}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, router(state)).await?;

    Ok(())
}
