//! HTTP surface: router, shared state and health check.

mod api;
pub mod error;
pub mod form;
mod oauth;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::auth::{CredentialStore, PendingFlows};
use crate::config::AppConfig;
use crate::diploma::font::FontCache;
use crate::mail::DeliveryClient;
use crate::workspace::{OUTPUT_URL_PREFIX, OutputWorkspace};

pub use error::ApiError;

/// Uploads carry a roster, two templates and a logo.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub delivery: Arc<dyn DeliveryClient>,
    pub credentials: Arc<CredentialStore>,
    /// Resolved on the first request that stamps a diploma.
    pub fonts: Arc<FontCache>,
    pub pending: Arc<PendingFlows>,
    pub workspace: OutputWorkspace,
}

impl AppState {
    pub fn new(config: AppConfig, delivery: Arc<dyn DeliveryClient>) -> Self {
        let credentials = Arc::new(CredentialStore::new(config.token_path.clone()));
        let fonts = Arc::new(FontCache::new(
            config.font_candidates.clone(),
            config.font_preference.clone(),
        ));
        let pending = PendingFlows::new(config.oauth_flow_ttl);
        let workspace = OutputWorkspace::new(config.output_dir.clone());
        Self {
            config: Arc::new(config),
            delivery,
            credentials,
            fonts,
            pending,
            workspace,
        }
    }
}

/// Build the Axum router with every route and static mount.
pub fn app_routes(state: AppState) -> Router {
    let output = ServeDir::new(state.workspace.base_path());
    let static_dir = state.config.static_dir.clone();

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/oauth/start", get(oauth::start))
        .route("/oauth/callback", get(oauth::callback))
        .route("/oauth/status", get(oauth::status))
        .route("/oauth/check-setup", get(oauth::check_setup))
        .route("/oauth/logout", post(oauth::logout))
        .route("/api/preview", post(api::preview))
        .route("/api/preview-pdf", post(api::preview_pdf))
        .route("/api/test-send", post(api::test_send))
        .route("/api/send", post(api::send))
        .route("/api/send-stream", post(api::send_stream))
        .route("/api/save-csv", post(api::save_csv))
        .nest_service(OUTPUT_URL_PREFIX, output);

    if let Some(dir) = static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "diploma-mailer"
    }))
}
