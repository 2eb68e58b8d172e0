//! Stored Gmail credentials — the authorized-user token file and its
//! expiry-aware refresh.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CredentialError;

/// Google's token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry (seconds) are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth credentials for the connected account.
#[derive(Debug)]
pub struct StoredCredentials {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredCredentials {
    pub fn is_expired(&self) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry - TimeDelta::seconds(EXPIRY_SKEW_SECS) <= Utc::now())
    }

    /// A non-empty, unexpired access token.
    pub fn is_valid(&self) -> bool {
        !self.access_token.expose_secret().is_empty() && !self.is_expired()
    }

    /// Replace the access token with a token-endpoint response.
    pub(crate) fn apply(&mut self, response: TokenResponse) {
        self.access_token = SecretString::from(response.access_token);
        if let Some(refresh) = response.refresh_token.filter(|r| !r.is_empty()) {
            self.refresh_token = Some(SecretString::from(refresh));
        }
        if let Some(scope) = response.scope {
            self.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
        self.expiry = response
            .expires_in
            .map(|secs| Utc::now() + TimeDelta::seconds(secs));
    }
}

/// On-disk shape of the token file.
#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl From<TokenFile> for StoredCredentials {
    fn from(file: TokenFile) -> Self {
        Self {
            access_token: SecretString::from(file.token),
            refresh_token: file.refresh_token.map(SecretString::from),
            token_uri: file.token_uri,
            client_id: file.client_id,
            client_secret: file.client_secret.map(SecretString::from),
            scopes: file.scopes,
            expiry: file.expiry,
        }
    }
}

impl From<&StoredCredentials> for TokenFile {
    fn from(creds: &StoredCredentials) -> Self {
        Self {
            token: creds.access_token.expose_secret().to_string(),
            refresh_token: creds
                .refresh_token
                .as_ref()
                .map(|s| s.expose_secret().to_string()),
            token_uri: creds.token_uri.clone(),
            client_id: creds.client_id.clone(),
            client_secret: creds
                .client_secret
                .as_ref()
                .map(|s| s.expose_secret().to_string()),
            scopes: creds.scopes.clone(),
            expiry: creds.expiry,
        }
    }
}

/// Token endpoint response (code exchange and refresh).
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Reads, writes and refreshes the token file.
pub struct CredentialStore {
    path: PathBuf,
    http: reqwest::Client,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the token file. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<StoredCredentials>, CredentialError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: TokenFile = serde_json::from_slice(&raw)?;
        Ok(Some(file.into()))
    }

    pub async fn save(&self, credentials: &StoredCredentials) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&TokenFile::from(credentials))?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Remove the token file. Returns whether one existed.
    pub async fn delete(&self) -> Result<bool, CredentialError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Exchange the refresh token for a new access token.
    pub async fn refresh(&self, credentials: &mut StoredCredentials) -> Result<(), CredentialError> {
        let refresh_token = credentials
            .refresh_token
            .as_ref()
            .ok_or_else(|| CredentialError::Refresh("no refresh token stored".into()))?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("client_id", credentials.client_id.clone()),
            ("refresh_token", refresh_token.expose_secret().to_string()),
        ];
        if let Some(secret) = &credentials.client_secret {
            form.push(("client_secret", secret.expose_secret().to_string()));
        }

        let response = self
            .http
            .post(&credentials.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::Refresh(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Refresh(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Refresh(e.to_string()))?;
        credentials.apply(token);
        Ok(())
    }

    /// Credentials usable right now, refreshing (and persisting) them when
    /// expired. Any failure along the way means "not connected".
    pub async fn load_valid(&self) -> Option<StoredCredentials> {
        let mut credentials = match self.load().await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable token file");
                return None;
            }
        };

        if credentials.is_expired() && credentials.refresh_token.is_some() {
            if let Err(e) = self.refresh(&mut credentials).await {
                warn!(error = %e, "Credential refresh failed");
                return None;
            }
            if let Err(e) = self.save(&credentials).await {
                warn!(error = %e, "Failed to persist refreshed credentials");
            }
            info!("Gmail credentials refreshed");
        }

        credentials.is_valid().then_some(credentials)
    }
}
