//! Sends raw RFC 5322 messages through the Gmail REST API.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use lettre::Message;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::delivery::DeliveryClient;
use crate::auth::StoredCredentials;
use crate::error::DeliveryError;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const PROVIDER: &str = "gmail";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[serde(default)]
    email_address: String,
}

/// Gmail API client authenticated with the stored OAuth access token.
pub struct GmailClient {
    base_url: String,
    client: reqwest::Client,
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailClient {
    pub fn new() -> Self {
        Self::with_base_url(GMAIL_API_BASE)
    }

    /// Point the client at a different API root (used against local stubs).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/users/me/{path}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DeliveryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            provider: PROVIDER.into(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Base64url (padded) encoding of the formatted message, as Gmail expects in `raw`.
pub fn encode_raw(message: &Message) -> String {
    URL_SAFE.encode(message.formatted())
}

fn request_failed(e: reqwest::Error) -> DeliveryError {
    DeliveryError::RequestFailed {
        provider: PROVIDER.into(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl DeliveryClient for GmailClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn send(
        &self,
        message: &Message,
        credentials: &StoredCredentials,
    ) -> Result<(), DeliveryError> {
        let body = serde_json::json!({ "raw": encode_raw(message) });

        let response = self
            .client
            .post(self.api_url("messages/send"))
            .bearer_auth(credentials.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(request_failed)?;
        Self::check(response).await?;

        tracing::debug!("Gmail accepted message");
        Ok(())
    }

    async fn resolve_sender_address(
        &self,
        credentials: &StoredCredentials,
    ) -> Result<String, DeliveryError> {
        let response = self
            .client
            .get(self.api_url("profile"))
            .bearer_auth(credentials.access_token.expose_secret())
            .send()
            .await
            .map_err(request_failed)?;

        let profile: Profile = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DeliveryError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;
        Ok(profile.email_address)
    }
}
