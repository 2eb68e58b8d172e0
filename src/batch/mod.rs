//! Batch sending — eligibility rules, the per-recipient pipeline and its
//! two reporting modes.

pub mod events;
pub mod orchestrator;
pub mod types;

pub use events::BatchEvent;
pub use orchestrator::{BatchJob, BatchReport, BatchRunner, compose};
pub use types::{
    BatchResult, BatchSummary, Decision, ErrorEntry, RecordOutcome, Selection, SentEntry,
    SkipReason, SkippedEntry, decide,
};
