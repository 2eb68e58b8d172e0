//! Gmail connection endpoints.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{info, warn};

use super::AppState;
use super::error::ApiError;
use crate::auth::OAuthClient;
use crate::error::ValidationError;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CallbackParams {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    error: Option<String>,
}

fn page(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Html(text.into())).into_response()
}

/// Configured redirect URI, else `http://<request host>/oauth/callback`.
fn redirect_uri(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(uri) = &state.config.oauth_redirect_uri {
        return uri.clone();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.bind.to_string());
    format!("http://{host}/oauth/callback")
}

pub(crate) async fn start(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let client = match OAuthClient::from_file(&state.config.client_secret_path).await {
        Ok(client) => client,
        Err(e) => return page(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let redirect_uri = redirect_uri(&state, &headers);
    let flow_state = state.pending.start(redirect_uri.clone()).await;
    match client.authorization_url(&redirect_uri, &flow_state) {
        Ok(url) => {
            info!(redirect_uri = %redirect_uri, "OAuth flow started");
            Redirect::to(&url).into_response()
        }
        Err(e) => page(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub(crate) async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        warn!(error = %error, "OAuth consent declined");
        return page(StatusCode::BAD_REQUEST, format!("Authorization failed: {error}"));
    }
    if params.code.is_empty() {
        return page(
            StatusCode::BAD_REQUEST,
            ValidationError::MissingOAuthCode.to_string(),
        );
    }
    let Some(flow) = state.pending.take(&params.state).await else {
        return page(
            StatusCode::BAD_REQUEST,
            ValidationError::InvalidOAuthState.to_string(),
        );
    };

    let client = match OAuthClient::from_file(&state.config.client_secret_path).await {
        Ok(client) => client,
        Err(e) => return page(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let credentials = match client.exchange_code(&params.code, &flow.redirect_uri).await {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!(error = %e, "OAuth code exchange failed");
            return page(StatusCode::BAD_GATEWAY, e.to_string());
        }
    };
    if let Err(e) = state.credentials.save(&credentials).await {
        return page(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    info!(path = %state.credentials.path().display(), "Gmail connected");
    page(StatusCode::OK, "Gmail connected. You can close this tab.")
}

pub(crate) async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let Some(credentials) = state.credentials.load_valid().await else {
        return Json(serde_json::json!({ "ok": false, "email": "" }));
    };
    let email = state
        .delivery
        .resolve_sender_address(&credentials)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Could not resolve connected address");
            String::new()
        });
    Json(serde_json::json!({ "ok": true, "email": email }))
}

pub(crate) async fn check_setup(State(state): State<AppState>) -> Json<serde_json::Value> {
    let path = &state.config.client_secret_path;
    Json(serde_json::json!({
        "ok": tokio::fs::try_exists(path).await.unwrap_or(false),
        "client_secret_path": path.display().to_string(),
    }))
}

pub(crate) async fn logout(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.credentials.delete().await? {
        info!("Gmail disconnected");
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}
