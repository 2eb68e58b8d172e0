//! Wire format of the progressive batch: one `prefix:payload` text line per event.

use super::types::{BatchResult, BatchSummary};

/// Something the batch reports while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// `skip:<email-or-name>`
    Skipped { label: String },
    /// `send:<email>`
    Sent { email: String },
    /// `error:<email>:<message>`
    Failed { email: String, message: String },
    /// `notify_error:<message>`
    NotifyFailed { message: String },
    /// `summary: sent=N skipped=M`
    Summary(BatchSummary),
    /// `json:<serialized result>`
    Finished(BatchResult),
}

impl BatchEvent {
    /// Newline-terminated wire line.
    pub fn to_line(&self) -> String {
        match self {
            Self::Skipped { label } => format!("skip:{}\n", single_line(label)),
            Self::Sent { email } => format!("send:{}\n", single_line(email)),
            Self::Failed { email, message } => {
                format!("error:{}:{}\n", single_line(email), single_line(message))
            }
            Self::NotifyFailed { message } => format!("notify_error:{}\n", single_line(message)),
            Self::Summary(summary) => format!(
                "summary: sent={} skipped={}\n",
                summary.sent_count, summary.skipped_count
            ),
            Self::Finished(result) => {
                // Serializing plain strings and integers cannot fail.
                let json = serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string());
                format!("json:{json}\n")
            }
        }
    }

    /// Per-record and notification lines; the synchronous response's `log_lines`.
    pub fn is_log_line(&self) -> bool {
        !matches!(self, Self::Summary(_) | Self::Finished(_))
    }
}

/// Keep payloads on one line so the stream stays line-delimited.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
