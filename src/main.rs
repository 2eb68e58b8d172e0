use std::sync::Arc;

use anyhow::Context;

use diploma_mailer::auth::spawn_sweep_task;
use diploma_mailer::config::AppConfig;
use diploma_mailer::mail::GmailClient;
use diploma_mailer::web::{AppState, app_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let bind = config.bind;

    eprintln!("🎓 Diploma Mailer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   UI/API: http://{bind}");
    eprintln!("   Output: {}", config.output_dir.display());
    eprintln!("   Client secret: {}", config.client_secret_path.display());

    // ── Workspace ───────────────────────────────────────────────────────
    let state = AppState::new(config, Arc::new(GmailClient::new()));
    state
        .workspace
        .ensure_dirs()
        .await
        .with_context(|| format!("creating {}", state.workspace.base_path().display()))?;

    // ── OAuth flow expiry ───────────────────────────────────────────────
    spawn_sweep_task(Arc::clone(&state.pending));

    // ── HTTP server ─────────────────────────────────────────────────────
    let app = app_routes(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(addr = %bind, "Diploma mailer listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
