//! Read-only settings export.
//!
//! Serves the current settings snapshot as JSON at `GET /settings.json` so
//! that other instances can merge it. No authentication, no mutation path.

use std::{net::SocketAddr, sync::Arc};

use axum::{extract::State, routing::get, Json, Router};

use asb_core::settings::{SettingsPatch, SettingsStore};

pub const SETTINGS_PATH: &str = "/settings.json";

async fn settings_json(State(store): State<Arc<SettingsStore>>) -> Json<SettingsPatch> {
    Json(store.get().await.export())
}

pub fn router(store: Arc<SettingsStore>) -> Router {
    Router::new()
        .route(SETTINGS_PATH, get(settings_json))
        .with_state(store)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: SocketAddr, store: Arc<SettingsStore>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "settings export listening");
    axum::serve(listener, router(store)).await?;
    Ok(())
}
