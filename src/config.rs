//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::diploma::font::FontCandidate;
use crate::error::ConfigError;

/// Env var naming the preferred font candidate.
pub const FONT_PREF_ENV: &str = "DIPLOMA_FONT";

/// Env var that disables PDF → JPG rasterization (disabled unless set to a falsy value).
pub const DISABLE_JPG_ENV: &str = "DIPLOMA_DISABLE_JPG";

/// Default subject when the operator leaves it blank.
pub const DEFAULT_SUBJECT: &str = "תעודת סיום קורס";

/// Default display name for test sends.
pub const DEFAULT_TEST_NAME: &str = "אמיר";

/// Gmail scopes requested by the OAuth flow.
pub const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.readonly",
];

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server listens on.
    pub bind: SocketAddr,
    /// Root of all run directories, served at `/output`.
    pub output_dir: PathBuf,
    /// Optional directory served at `/static`.
    pub static_dir: Option<PathBuf>,
    /// Google OAuth client secret file.
    pub client_secret_path: PathBuf,
    /// Where the authorized-user credentials are persisted.
    pub token_path: PathBuf,
    /// Fixed OAuth redirect URI. Derived from the request host when unset.
    pub oauth_redirect_uri: Option<String>,
    /// How long a started OAuth flow stays valid.
    pub oauth_flow_ttl: Duration,
    /// Recipient of the end-of-batch report (`DIPLOMA_NOTIFY_EMAIL`).
    ///
    /// There is no built-in admin address: when unset, the report goes back
    /// to the batch's own sender address.
    pub notify_email: Option<String>,
    /// Font candidates in priority order.
    pub font_candidates: Vec<FontCandidate>,
    /// Preferred candidate name (must match a located candidate).
    pub font_preference: Option<String>,
    /// Rasterize stamped PDFs to JPG.
    pub rasterize_pdf: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            output_dir: PathBuf::from("./output"),
            static_dir: None,
            client_secret_path: PathBuf::from("./client_secret.json"),
            token_path: PathBuf::from("./.tokens/gmail_token.json"),
            oauth_redirect_uri: None,
            oauth_flow_ttl: Duration::from_secs(600), // 10 minutes
            notify_email: None,
            font_candidates: default_font_candidates(PathBuf::from(
                "./fonts/NotoSansHebrew_Condensed-Bold.ttf",
            )),
            font_preference: None,
            rasterize_pdf: false,
        }
    }
}

impl AppConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind = match non_empty_env("DIPLOMA_BIND") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "DIPLOMA_BIND".to_string(),
                message: format!("{e}"),
            })?,
            None => defaults.bind,
        };

        let output_dir = non_empty_env("DIPLOMA_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let static_dir = non_empty_env("DIPLOMA_STATIC_DIR").map(PathBuf::from);

        let client_secret_path = non_empty_env("GMAIL_CLIENT_SECRET_PATH")
            .map(|p| expand_home(&p))
            .unwrap_or(defaults.client_secret_path);

        let token_path = non_empty_env("DIPLOMA_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.token_path);

        let font_candidates = match non_empty_env("DIPLOMA_FONT_PATH") {
            Some(path) => default_font_candidates(PathBuf::from(path)),
            None => defaults.font_candidates,
        };

        Ok(Self {
            bind,
            output_dir,
            static_dir,
            client_secret_path,
            token_path,
            oauth_redirect_uri: non_empty_env("GMAIL_OAUTH_REDIRECT_URI"),
            oauth_flow_ttl: defaults.oauth_flow_ttl,
            notify_email: non_empty_env("DIPLOMA_NOTIFY_EMAIL"),
            font_candidates,
            font_preference: non_empty_env(FONT_PREF_ENV),
            rasterize_pdf: !is_truthy(
                &std::env::var(DISABLE_JPG_ENV).unwrap_or_else(|_| "1".to_string()),
            ),
        })
    }
}

/// The built-in candidate list, with the bundled Noto font path first.
pub fn default_font_candidates(noto_path: PathBuf) -> Vec<FontCandidate> {
    vec![
        FontCandidate::new("Noto", vec![noto_path]),
        FontCandidate::new(
            "Arial",
            vec![
                PathBuf::from("C:/Windows/Fonts/arial.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/msttcorefonts/Arial.ttf"),
            ],
        ),
        FontCandidate::new(
            "David",
            vec![
                PathBuf::from("C:/Windows/Fonts/david.ttf"),
                PathBuf::from("C:/Windows/Fonts/davidr.ttf"),
            ],
        ),
    ]
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "yes")
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy(" true "));
        assert!(is_truthy("yes"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("TRUE"));
    }

    #[test]
    fn default_candidates_keep_priority_order() {
        let candidates = default_font_candidates(PathBuf::from("/tmp/noto.ttf"));
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Noto", "Arial", "David"]);
        assert_eq!(candidates[0].paths, vec![PathBuf::from("/tmp/noto.ttf")]);
    }

    #[test]
    fn defaults_disable_rasterization() {
        let config = AppConfig::default();
        assert!(!config.rasterize_pdf);
        assert_eq!(config.oauth_flow_ttl, Duration::from_secs(600));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/etc/secret.json"), PathBuf::from("/etc/secret.json"));
    }
}
