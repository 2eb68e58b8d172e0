//! Error types for the diploma mailer.

use std::path::PathBuf;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Personalization error: {0}")]
    Personalize(#[from] PersonalizeError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors. Fatal for the request that hits them.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No supported font files found. Checked: {checked}")]
    FontNotFound { checked: String },

    #[error("Failed to load font {name} from {path}: {reason}")]
    FontLoad {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error(
        "Missing client secret file at {path}. Provide client_secret.json or set GMAIL_CLIENT_SECRET_PATH."
    )]
    MissingClientSecret { path: PathBuf },

    #[error("Invalid client secret file {path}: {reason}")]
    InvalidClientSecret { path: PathBuf, reason: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-level rejections. Raised before any recipient is processed.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing PDF or JPG template.")]
    MissingTemplate,

    #[error("Missing roster file.")]
    MissingRoster,

    #[error("Not connected to Gmail. Click Connect Google first.")]
    NotConnected,

    #[error("Missing from email.")]
    MissingSender,

    #[error("Letter content is empty.")]
    EmptyLetter,

    #[error("Missing test email.")]
    MissingTestEmail,

    #[error("Missing test name.")]
    MissingTestName,

    #[error("Missing OAuth code.")]
    MissingOAuthCode,

    #[error("Invalid OAuth state. Please try again.")]
    InvalidOAuthState,

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Errors while stamping a name onto a template.
#[derive(Debug, thiserror::Error)]
pub enum PersonalizeError {
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Rasterization failed: {0}")]
    Raster(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for PersonalizeError {
    fn from(e: lopdf::Error) -> Self {
        Self::Pdf(e.to_string())
    }
}

impl From<image::ImageError> for PersonalizeError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}

/// Errors while assembling an outgoing message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Mail-provider errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rejected the request ({status}): {body}")]
    Rejected {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Stored-credential and token-endpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to parse credentials: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Code exchange failed: {0}")]
    Exchange(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single recipient inside a batch. Recorded, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Personalize(#[from] PersonalizeError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl From<RecordError> for Error {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Personalize(e) => Self::Personalize(e),
            RecordError::Message(e) => Self::Message(e),
            RecordError::Delivery(e) => Self::Delivery(e),
            RecordError::Task(reason) => Self::Io(std::io::Error::other(reason)),
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
