//! OAuth client for the installed Google client secret.

use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::credentials::{GOOGLE_TOKEN_URI, StoredCredentials, TokenResponse};
use crate::config::GMAIL_SCOPES;
use crate::error::{ConfigError, CredentialError};

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// `client_secret.json` as downloaded from the Google console.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    web: Option<ClientSection>,
    installed: Option<ClientSection>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Google OAuth client bound to one client id.
pub struct OAuthClient {
    client_id: String,
    client_secret: SecretString,
    auth_uri: String,
    token_uri: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Load the client secret file.
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingClientSecret {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(path, &raw)
    }

    /// Parse client secret JSON (`web` or `installed` section).
    pub fn from_json(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidClientSecret {
            path: path.to_path_buf(),
            reason,
        };
        let file: ClientSecretFile = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
        let section = file
            .web
            .or(file.installed)
            .ok_or_else(|| invalid("expected a \"web\" or \"installed\" section".into()))?;

        Ok(Self {
            client_id: section.client_id,
            client_secret: SecretString::from(section.client_secret),
            auth_uri: section.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URI.into()),
            token_uri: section.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URI.into()),
            http: reqwest::Client::new(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Consent page URL for the Gmail scopes, requesting offline access.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, ConfigError> {
        let scope = GMAIL_SCOPES.join(" ");
        let url = reqwest::Url::parse_with_params(
            &self.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("state", state),
                ("access_type", "offline"),
                ("include_granted_scopes", "true"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| ConfigError::InvalidValue {
            key: "auth_uri".into(),
            message: e.to_string(),
        })?;
        Ok(url.into())
    }

    /// Trade an authorization code for credentials.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<StoredCredentials, CredentialError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];

        let response = self
            .http
            .post(&self.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::Exchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Exchange(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Exchange(e.to_string()))?;

        let mut credentials = StoredCredentials {
            access_token: SecretString::from(String::new()),
            refresh_token: None,
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: Some(SecretString::from(
                self.client_secret.expose_secret().to_string(),
            )),
            scopes: GMAIL_SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
        };
        credentials.apply(token);
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use std::collections::HashMap;

    const WEB_SECRET: &str = r#"{"web": {
        "client_id": "123.apps.googleusercontent.com",
        "client_secret": "s3cret",
        "auth_uri": "https://accounts.google.com/o/oauth2/auth",
        "token_uri": "https://oauth2.googleapis.com/token",
        "redirect_uris": ["http://localhost:8000/oauth/callback"]
    }}"#;

    fn query(url: &str) -> HashMap<String, String> {
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn authorization_url_requests_offline_consent() {
        let client = OAuthClient::from_json(Path::new("client_secret.json"), WEB_SECRET).unwrap();
        let url = client
            .authorization_url("http://localhost:8000/oauth/callback", "abc123")
            .unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));

        let params = query(&url);
        assert_eq!(params["client_id"], "123.apps.googleusercontent.com");
        assert_eq!(params["state"], "abc123");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["include_granted_scopes"], "true");
        assert_eq!(params["prompt"], "consent");
        assert!(params["scope"].contains("gmail.send"));
        assert!(params["scope"].contains("gmail.readonly"));
    }

    #[test]
    fn installed_section_is_accepted() {
        let raw = r#"{"installed": {"client_id": "x", "client_secret": "y"}}"#;
        let client = OAuthClient::from_json(Path::new("c.json"), raw).unwrap();
        assert_eq!(client.client_id(), "x");
    }

    #[test]
    fn secret_without_client_section_is_invalid() {
        let err = OAuthClient::from_json(Path::new("c.json"), r#"{"other": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidClientSecret { .. }));
    }

    #[tokio::test]
    async fn missing_secret_file_is_a_config_error() {
        let err = OAuthClient::from_file(Path::new("/nonexistent/client_secret.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingClientSecret { .. }));
    }

    #[tokio::test]
    async fn code_exchange_builds_credentials() {
        let app = Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["grant_type"], "authorization_code");
                assert_eq!(form["code"], "4/code");
                Json(serde_json::json!({
                    "access_token": "ya29.new",
                    "refresh_token": "1//new",
                    "expires_in": 3599,
                    "scope": "https://www.googleapis.com/auth/gmail.send",
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let raw = format!(
            r#"{{"web": {{"client_id": "id", "client_secret": "s", "token_uri": "http://{addr}/token"}}}}"#
        );
        let client = OAuthClient::from_json(Path::new("c.json"), &raw).unwrap();
        let creds = client
            .exchange_code("4/code", "http://localhost/oauth/callback")
            .await
            .unwrap();

        assert_eq!(creds.access_token.expose_secret(), "ya29.new");
        assert_eq!(creds.refresh_token.as_ref().unwrap().expose_secret(), "1//new");
        assert_eq!(creds.token_uri, format!("http://{addr}/token"));
        assert!(creds.is_valid());
    }
}
