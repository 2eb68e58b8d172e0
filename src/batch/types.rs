//! Selection, per-record decisions and the aggregated batch result.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::RecordError;
use crate::roster::RecipientRecord;

// ── Selection ───────────────────────────────────────────────────────

/// Rows the operator ticked in the preview table.
///
/// Encoded as comma-separated zero-based indices. Chunks that are not
/// plain digits are ignored; an empty result means every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    indices: Option<BTreeSet<usize>>,
}

impl Selection {
    /// Every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Exactly these rows. An empty list means every row.
    pub fn of(indices: impl IntoIterator<Item = usize>) -> Self {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        Self {
            indices: (!indices.is_empty()).then_some(indices),
        }
    }

    pub fn parse(raw: &str) -> Self {
        Self::of(
            raw.split(',')
                .map(str::trim)
                .filter(|chunk| !chunk.is_empty() && chunk.bytes().all(|b| b.is_ascii_digit()))
                .filter_map(|chunk| chunk.parse().ok()),
        )
    }

    pub fn is_explicit(&self) -> bool {
        self.indices.is_some()
    }

    /// Indices past the end of the roster select nothing.
    pub fn includes(&self, index: usize) -> bool {
        self.indices.as_ref().is_none_or(|set| set.contains(&index))
    }
}

// ── Per-record decision ─────────────────────────────────────────────

/// Why a record was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    #[serde(rename = "Not selected")]
    NotSelected,
    #[serde(rename = "Missing email")]
    MissingEmail,
    #[serde(rename = "Not eligible or already sent")]
    NotEligible,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotSelected => "Not selected",
            Self::MissingEmail => "Missing email",
            Self::NotEligible => "Not eligible or already sent",
        })
    }
}

/// Gate evaluated per record, in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    Process,
}

pub fn decide(record: &RecipientRecord, selection: &Selection) -> Decision {
    if !selection.includes(record.index) {
        Decision::Skip(SkipReason::NotSelected)
    } else if record.email.is_empty() {
        Decision::Skip(SkipReason::MissingEmail)
    } else if !record.is_eligible() {
        Decision::Skip(SkipReason::NotEligible)
    } else {
        Decision::Process
    }
}

/// Terminal state of one record.
#[derive(Debug)]
pub enum RecordOutcome {
    Skipped(SkipReason),
    Sent,
    Failed(RecordError),
}

// ── Aggregated result ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentEntry {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    #[serde(rename = "sent")]
    pub sent_count: usize,
    #[serde(rename = "skipped")]
    pub skipped_count: usize,
}

/// Everything a batch run produced, in row order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub sent: Vec<SentEntry>,
    pub sent_indices: Vec<usize>,
    pub skipped: Vec<SkippedEntry>,
    pub errors: Vec<ErrorEntry>,
    pub summary: BatchSummary,
}

impl BatchResult {
    /// Fold one record's outcome into the result.
    pub fn record(&mut self, record: &RecipientRecord, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Skipped(reason) => {
                self.skipped.push(SkippedEntry {
                    name: record.full_name.clone(),
                    reason: *reason,
                });
            }
            RecordOutcome::Sent => {
                self.sent.push(SentEntry {
                    name: record.full_name.clone(),
                    email: record.email.clone(),
                });
                self.sent_indices.push(record.index);
            }
            RecordOutcome::Failed(error) => {
                self.errors.push(ErrorEntry {
                    name: record.full_name.clone(),
                    error: error.to_string(),
                });
            }
        }
        self.summary = BatchSummary {
            sent_count: self.sent.len(),
            skipped_count: self.skipped.len(),
        };
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DeliveryError;

    pub(crate) fn record(index: usize, email: &str, new: &str, send: &str) -> RecipientRecord {
        RecipientRecord {
            index,
            first: String::new(),
            last: String::new(),
            full_name: format!("Student {index}"),
            email: email.into(),
            new_flag: new.into(),
            send_flag: send.into(),
            raw_fields: Default::default(),
        }
    }

    #[test]
    fn selection_parsing() {
        assert!(!Selection::parse("").is_explicit());
        assert!(!Selection::parse(" , x, -1").is_explicit());

        let sel = Selection::parse("0, 2,x,2,99");
        assert!(sel.includes(0));
        assert!(!sel.includes(1));
        assert!(sel.includes(2));
        // Out-of-range indices are harmless.
        assert!(sel.includes(99));
    }

    #[test]
    fn eligibility_is_the_exact_conjunction() {
        let all = Selection::all();
        assert_eq!(decide(&record(0, "a@b.com", "1", ""), &all), Decision::Process);

        assert_eq!(
            decide(&record(0, "a@b.com", "0", ""), &all),
            Decision::Skip(SkipReason::NotEligible)
        );
        assert_eq!(
            decide(&record(0, "a@b.com", "", ""), &all),
            Decision::Skip(SkipReason::NotEligible)
        );
        assert_eq!(
            decide(&record(0, "a@b.com", "1", "x"), &all),
            Decision::Skip(SkipReason::NotEligible)
        );
        assert_eq!(
            decide(&record(0, "", "1", ""), &all),
            Decision::Skip(SkipReason::MissingEmail)
        );
        assert_eq!(
            decide(&record(0, "a@b.com", "1", ""), &Selection::of([1])),
            Decision::Skip(SkipReason::NotSelected)
        );
    }

    #[test]
    fn selection_is_checked_before_email_and_eligibility() {
        let sel = Selection::of([2]);
        assert_eq!(
            decide(&record(0, "", "0", "x"), &sel),
            Decision::Skip(SkipReason::NotSelected)
        );
    }

    #[test]
    fn result_tracks_counts_and_indices() {
        let mut result = BatchResult::default();
        result.record(&record(0, "", "1", ""), &RecordOutcome::Skipped(SkipReason::MissingEmail));
        result.record(&record(1, "a@b.com", "1", ""), &RecordOutcome::Sent);
        result.record(
            &record(2, "c@d.com", "1", ""),
            &RecordOutcome::Failed(RecordError::Delivery(DeliveryError::RequestFailed {
                provider: "stub".into(),
                reason: "boom".into(),
            })),
        );

        assert_eq!(result.sent_indices, vec![1]);
        assert_eq!(result.summary, BatchSummary { sent_count: 1, skipped_count: 1 });
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].error.contains("boom"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["summary"], serde_json::json!({"sent": 1, "skipped": 1}));
        assert_eq!(json["skipped"][0]["reason"], "Missing email");
    }
}
