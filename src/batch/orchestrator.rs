//! Batch orchestrator — walks the roster in row order and, for each
//! eligible recipient, stamps the diploma, assembles the message and hands
//! it to the delivery client.
//!
//! Both delivery modes share one loop:
//! - `run_sync` collects every event and returns the aggregated result
//! - `run_progressive` streams each event as a text line while it runs
//!
//! Recipients are processed strictly one at a time. A failing recipient is
//! recorded and the loop moves on. After the last row a report message goes
//! to the notification address; its failure is reported, never fatal.

use std::path::PathBuf;
use std::sync::Arc;

use lettre::Message;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use super::events::BatchEvent;
use super::types::{BatchResult, Decision, RecordOutcome, Selection, decide};
use crate::auth::StoredCredentials;
use crate::diploma::{DiplomaArtifacts, DiplomaTemplates, Personalizer};
use crate::error::RecordError;
use crate::mail::{
    DeliveryClient, DiplomaMessage, InlineLogo, build_diploma_message, build_text_message,
};
use crate::roster::RecipientRecord;

const REPORT_SUBJECT: &str = "Batch send report";

/// One batch request, fully validated.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub records: Vec<RecipientRecord>,
    pub selection: Selection,
    pub templates: DiplomaTemplates,
    /// Letter HTML; the logo reference is already injected when a logo is set.
    pub html_body: String,
    pub subject: String,
    pub from: String,
    pub logo: Option<InlineLogo>,
    /// Where this run's artifacts are written.
    pub run_dir: PathBuf,
}

/// Synchronous-mode output.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub result: BatchResult,
    /// Per-record and notification lines, without the trailing newline.
    pub log_lines: Vec<String>,
}

/// Runs batches against one delivery client and one set of credentials.
#[derive(Clone)]
pub struct BatchRunner {
    delivery: Arc<dyn DeliveryClient>,
    credentials: Arc<StoredCredentials>,
    personalizer: Option<Personalizer>,
    notify_to: Option<String>,
}

impl BatchRunner {
    pub fn new(delivery: Arc<dyn DeliveryClient>, credentials: Arc<StoredCredentials>) -> Self {
        Self {
            delivery,
            credentials,
            personalizer: None,
            notify_to: None,
        }
    }

    /// Personalizer used when the job carries templates.
    pub fn with_personalizer(mut self, personalizer: Personalizer) -> Self {
        self.personalizer = Some(personalizer);
        self
    }

    /// Report recipient. `None` sends the report to the job's sender
    /// address rather than a fixed admin mailbox.
    pub fn with_notify_to(mut self, address: Option<String>) -> Self {
        self.notify_to = address;
        self
    }

    // ── Modes ───────────────────────────────────────────────────────

    /// Run to completion and return the aggregated result.
    pub async fn run_sync(&self, job: BatchJob) -> BatchReport {
        let mut log_lines = Vec::new();
        let result = self
            .run(Arc::new(job), |event| {
                if event.is_log_line() {
                    log_lines.push(event.to_line().trim_end().to_string());
                }
                true
            })
            .await;
        BatchReport { result, log_lines }
    }

    /// Run on a background task, yielding one wire line per event.
    ///
    /// Dropping the stream stops the batch after the record in flight.
    pub fn run_progressive(self, job: BatchJob) -> UnboundedReceiverStream<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            self.run(Arc::new(job), |event| tx.send(event.to_line()).is_ok())
                .await;
        });
        UnboundedReceiverStream::new(rx)
    }

    // ── Core loop ───────────────────────────────────────────────────

    /// Drive every record, passing each event to `emit`. `emit` returning
    /// `false` means nobody is listening any more and the run stops.
    async fn run<F>(&self, job: Arc<BatchJob>, mut emit: F) -> BatchResult
    where
        F: FnMut(BatchEvent) -> bool,
    {
        let mut result = BatchResult::default();
        info!(
            records = job.records.len(),
            selected = job.selection.is_explicit(),
            run_dir = %job.run_dir.display(),
            "Batch started"
        );

        for record in &job.records {
            let outcome = match decide(record, &job.selection) {
                Decision::Skip(reason) => RecordOutcome::Skipped(reason),
                Decision::Process => match self.process_record(&job, record).await {
                    Ok(()) => RecordOutcome::Sent,
                    Err(e) => RecordOutcome::Failed(e),
                },
            };

            let event = match &outcome {
                RecordOutcome::Skipped(reason) => {
                    debug!(index = record.index, reason = %reason, "Record skipped");
                    BatchEvent::Skipped {
                        label: record.label().to_string(),
                    }
                }
                RecordOutcome::Sent => {
                    info!(index = record.index, email = %record.email, "Diploma sent");
                    BatchEvent::Sent {
                        email: record.email.clone(),
                    }
                }
                RecordOutcome::Failed(error) => {
                    warn!(
                        index = record.index,
                        email = %record.email,
                        error = %error,
                        "Diploma failed"
                    );
                    BatchEvent::Failed {
                        email: record.email.clone(),
                        message: error.to_string(),
                    }
                }
            };
            result.record(record, &outcome);

            if !emit(event) {
                warn!(
                    processed = record.index + 1,
                    "Client disconnected; batch stopped early"
                );
                return result;
            }
        }

        if let Err(e) = self.notify(&job.from, result.summary.sent_count).await {
            warn!(error = %e, "Batch report not delivered");
            if !emit(BatchEvent::NotifyFailed {
                message: e.to_string(),
            }) {
                return result;
            }
        }

        info!(
            sent = result.summary.sent_count,
            skipped = result.summary.skipped_count,
            errors = result.errors.len(),
            "Batch finished"
        );

        if emit(BatchEvent::Summary(result.summary)) {
            emit(BatchEvent::Finished(result.clone()));
        }
        result
    }

    /// Personalize, assemble and send for one recipient.
    async fn process_record(
        &self,
        job: &Arc<BatchJob>,
        record: &RecipientRecord,
    ) -> Result<(), RecordError> {
        let message = {
            let job = Arc::clone(job);
            let personalizer = self.personalizer.clone();
            let name = record.full_name.clone();
            let email = record.email.clone();

            tokio::task::spawn_blocking(move || {
                compose(personalizer.as_ref(), &job, &name, &email)
            })
            .await
            .map_err(|e| RecordError::Task(e.to_string()))??
        };

        self.delivery.send(&message, &self.credentials).await?;
        Ok(())
    }

    /// Send the end-of-batch report.
    async fn notify(&self, from: &str, total_sent: usize) -> Result<(), RecordError> {
        let to = self.notify_to.as_deref().unwrap_or(from);
        let body = format!("From email: {from}\nTotal sent: {total_sent}\n");
        let message = build_text_message(REPORT_SUBJECT, &body, from, to)?;
        self.delivery.send(&message, &self.credentials).await?;
        debug!(to, total_sent, "Batch report sent");
        Ok(())
    }
}

/// Stamp the job's templates for one recipient and build their message.
///
/// Blocking: reads templates, writes artifacts and reads them back as
/// attachments. Call from a blocking-capable context.
pub fn compose(
    personalizer: Option<&Personalizer>,
    job: &BatchJob,
    name: &str,
    email: &str,
) -> Result<Message, RecordError> {
    let artifacts = match personalizer {
        Some(p) if !job.templates.is_empty() => {
            p.personalize(&job.templates, name, &job.run_dir)?
        }
        _ => DiplomaArtifacts::default(),
    };
    Ok(build_diploma_message(&DiplomaMessage {
        recipient_name: name,
        recipient_email: email,
        html_body: &job.html_body,
        subject: &job.subject,
        from: &job.from,
        artifacts: &artifacts,
        logo: job.logo.as_ref(),
    })?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::credentials::tests::fresh_credentials;
    use crate::batch::types::SkipReason;
    use crate::batch::types::tests::record;
    use crate::diploma::pdf::tests::fixture_pdf;
    use crate::diploma::tests::system_font;
    use crate::error::DeliveryError;
    use async_trait::async_trait;
    use futures::StreamExt;
    use mail_parser::MimeHeaders;
    use std::path::Path;
    use std::sync::Mutex;

    /// Records recipients and raw messages; fails for addresses listed in
    /// `fail_for`.
    #[derive(Default)]
    pub(crate) struct StubDelivery {
        pub sent: Mutex<Vec<String>>,
        pub raw: Mutex<Vec<Vec<u8>>>,
        pub fail_for: Vec<String>,
    }

    impl StubDelivery {
        pub(crate) fn failing_for(addresses: &[&str]) -> Self {
            Self {
                fail_for: addresses.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn recipients(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn messages(&self) -> Vec<Vec<u8>> {
            self.raw.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryClient for StubDelivery {
        fn name(&self) -> &str {
            "stub"
        }

        async fn send(
            &self,
            message: &Message,
            _credentials: &StoredCredentials,
        ) -> Result<(), DeliveryError> {
            let to: Vec<String> = message.envelope().to().iter().map(|a| a.to_string()).collect();
            if to.iter().any(|addr| self.fail_for.contains(addr)) {
                return Err(DeliveryError::Rejected {
                    provider: "stub".into(),
                    status: 403,
                    body: "quota exceeded".into(),
                });
            }
            self.sent.lock().unwrap().extend(to);
            self.raw.lock().unwrap().push(message.formatted());
            Ok(())
        }

        async fn resolve_sender_address(
            &self,
            _credentials: &StoredCredentials,
        ) -> Result<String, DeliveryError> {
            Ok("school@example.com".into())
        }
    }

    fn job(records: Vec<RecipientRecord>, selection: Selection) -> BatchJob {
        BatchJob {
            records,
            selection,
            templates: DiplomaTemplates::default(),
            html_body: "<p>Hi {{name}}</p>".into(),
            subject: String::new(),
            from: "school@example.com".into(),
            logo: None,
            run_dir: std::env::temp_dir(),
        }
    }

    fn runner(delivery: Arc<StubDelivery>) -> BatchRunner {
        BatchRunner::new(delivery, Arc::new(fresh_credentials()))
            .with_notify_to(Some("admin@example.com".into()))
    }

    #[tokio::test]
    async fn explicit_selection_limits_processing() {
        let delivery = Arc::new(StubDelivery::default());
        let records = vec![
            record(0, "a@x.com", "1", ""),
            record(1, "b@x.com", "1", ""),
            record(2, "c@x.com", "1", ""),
        ];

        let report = runner(delivery.clone())
            .run_sync(job(records, Selection::parse("2")))
            .await;

        assert_eq!(report.result.sent_indices, vec![2]);
        let reasons: Vec<SkipReason> = report.result.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec![SkipReason::NotSelected, SkipReason::NotSelected]);
        // Recipient then report.
        assert_eq!(delivery.recipients(), vec!["c@x.com", "admin@example.com"]);
    }

    #[tokio::test]
    async fn failed_record_does_not_stop_the_batch() {
        let delivery = Arc::new(StubDelivery::failing_for(&["a@b.com"]));
        let records = vec![record(0, "a@b.com", "1", ""), record(1, "c@d.com", "1", "")];

        let report = runner(delivery.clone()).run_sync(job(records, Selection::all())).await;

        assert_eq!(report.result.errors.len(), 1);
        assert_eq!(report.result.errors[0].name, "Student 0");
        assert!(report.result.errors[0].error.contains("quota exceeded"));
        assert_eq!(report.result.sent_indices, vec![1]);
        assert_eq!(
            report.log_lines[0],
            format!("error:a@b.com:{}", report.result.errors[0].error)
        );
        assert_eq!(report.log_lines[1], "send:c@d.com");
    }

    #[tokio::test]
    async fn report_failure_is_recorded_not_fatal() {
        let delivery = Arc::new(StubDelivery::failing_for(&["admin@example.com"]));
        let records = vec![record(0, "a@b.com", "1", "")];

        let report = runner(delivery).run_sync(job(records, Selection::all())).await;

        assert_eq!(report.result.summary.sent_count, 1);
        assert_eq!(report.log_lines.len(), 2);
        assert!(report.log_lines[1].starts_with("notify_error:"));
    }

    #[tokio::test]
    async fn report_goes_to_sender_without_notify_address() {
        let delivery = Arc::new(StubDelivery::default());
        let runner = BatchRunner::new(delivery.clone(), Arc::new(fresh_credentials()));

        runner.run_sync(job(vec![], Selection::all())).await;
        assert_eq!(delivery.recipients(), vec!["school@example.com"]);
    }

    #[tokio::test]
    async fn progressive_lines_follow_row_order() {
        let delivery = Arc::new(StubDelivery::default());
        let records = vec![record(0, "", "1", ""), record(1, "b@x.com", "1", "")];

        let lines: Vec<String> = runner(delivery)
            .run_progressive(job(records, Selection::all()))
            .collect()
            .await;

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "skip:Student 0\n");
        assert_eq!(lines[1], "send:b@x.com\n");
        assert_eq!(lines[2], "summary: sent=1 skipped=1\n");

        let payload: serde_json::Value =
            serde_json::from_str(lines[3].strip_prefix("json:").unwrap().trim_end()).unwrap();
        assert_eq!(payload["summary"]["sent"], 1);
        assert_eq!(payload["summary"]["skipped"], 1);
        assert_eq!(payload["sent_indices"], serde_json::json!([1]));
        assert_eq!(payload["skipped"][0]["reason"], "Missing email");
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_batch() {
        let delivery = Arc::new(StubDelivery::default());
        let records: Vec<_> = (0..50)
            .map(|i| record(i, &format!("s{i}@x.com"), "1", ""))
            .collect();

        let mut stream = runner(delivery.clone()).run_progressive(job(records, Selection::all()));
        assert_eq!(stream.next().await.unwrap(), "send:s0@x.com\n");
        drop(stream);

        // Let the worker observe the closed channel.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let sent = delivery.recipients();
        assert!(sent.len() < 50);
        assert!(!sent.contains(&"admin@example.com".to_string()));
    }

    /// A job stamping `template` as its PDF, with artifacts under `dir/run`.
    fn pdf_job(records: Vec<RecipientRecord>, template: PathBuf, dir: &Path) -> BatchJob {
        BatchJob {
            templates: DiplomaTemplates {
                pdf: Some(template),
                jpg: None,
            },
            run_dir: dir.join("run"),
            ..job(records, Selection::all())
        }
    }

    #[tokio::test]
    async fn corrupt_template_fails_each_record_and_batch_continues() {
        let Some(font) = system_font() else {
            eprintln!("no system font installed; skipping");
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("cert.pdf");
        std::fs::write(&template, b"this is not a pdf").unwrap();

        let delivery = Arc::new(StubDelivery::default());
        let records = vec![record(0, "a@x.com", "1", ""), record(1, "b@x.com", "1", "")];
        let report = runner(delivery.clone())
            .with_personalizer(Personalizer::new(font))
            .run_sync(pdf_job(records, template, dir.path()))
            .await;

        let result = &report.result;
        assert!(result.sent.is_empty());
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].name, "Student 0");
        assert_eq!(result.errors[1].name, "Student 1");
        assert!(result.errors.iter().all(|e| e.error.starts_with("PDF error:")));

        assert_eq!(report.log_lines.len(), 2);
        assert!(report.log_lines[0].starts_with("error:a@x.com:PDF error:"));
        assert!(report.log_lines[1].starts_with("error:b@x.com:PDF error:"));

        // Only the report went out.
        assert_eq!(delivery.recipients(), vec!["admin@example.com"]);
    }

    #[tokio::test]
    async fn stamped_diploma_is_attached_to_the_sent_message() {
        let Some(font) = system_font() else {
            eprintln!("no system font installed; skipping");
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("cert.pdf");
        std::fs::write(&template, fixture_pdf(1)).unwrap();

        let delivery = Arc::new(StubDelivery::default());
        let records = vec![record(0, "a@x.com", "1", "")];
        let report = runner(delivery.clone())
            .with_personalizer(Personalizer::new(font))
            .run_sync(pdf_job(records, template, dir.path()))
            .await;

        assert!(report.result.errors.is_empty());
        assert_eq!(report.result.sent_indices, vec![0]);
        assert!(dir.path().join("run").join("Student_0_diploma.pdf").is_file());

        let messages = delivery.messages();
        let diploma = mail_parser::MessageParser::default()
            .parse(&messages[0])
            .unwrap();
        let attachments: Vec<_> = diploma.attachments().collect();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].attachment_name(), Some("Student_0_diploma.pdf"));
        assert!(attachments[0].contents().starts_with(b"%PDF"));
    }
}
