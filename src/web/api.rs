//! Upload endpoints: roster preview, diploma preview, test send, batch send
//! (synchronous and streamed) and roster save-back.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::task::JoinError;
use tracing::{info, warn};

use super::AppState;
use super::error::ApiError;
use super::form::MultipartForm;
use crate::auth::StoredCredentials;
use crate::batch::{BatchJob, BatchRunner, Selection, compose};
use crate::config::DEFAULT_TEST_NAME;
use crate::diploma::{DiplomaTemplates, NameOffset, Personalizer};
use crate::error::{ConfigError, Error, ValidationError};
use crate::mail::{InlineLogo, inject_logo_cid, text_to_html};
use crate::roster::{parse_roster, preview_roster};
use crate::workspace::{RunDirectory, RunMode, upload_file_name};

const DEFAULT_SAVE_NAME: &str = "updated_list.csv";

fn join_failed(e: JoinError) -> Error {
    Error::Io(std::io::Error::other(e))
}

// ── Shared request steps ────────────────────────────────────────────

/// Valid stored credentials, or the "connect first" rejection.
async fn connected(state: &AppState) -> Result<StoredCredentials, ValidationError> {
    state
        .credentials
        .load_valid()
        .await
        .ok_or(ValidationError::NotConnected)
}

/// `from_email`, else the connected account's own address.
async fn sender_address(
    state: &AppState,
    form: &MultipartForm,
    credentials: &StoredCredentials,
) -> Result<String, ValidationError> {
    let explicit = form.text("from_email").trim();
    if !explicit.is_empty() {
        return Ok(explicit.to_string());
    }
    match state.delivery.resolve_sender_address(credentials).await {
        Ok(address) if !address.trim().is_empty() => Ok(address.trim().to_string()),
        Ok(_) => Err(ValidationError::MissingSender),
        Err(e) => {
            warn!(error = %e, "Could not resolve sender address");
            Err(ValidationError::MissingSender)
        }
    }
}

/// Letter HTML from `html_content`, or from `text_content` when
/// `letter_format=text`.
fn letter_html(form: &MultipartForm) -> Result<String, ValidationError> {
    let html = if form.text("letter_format") == "text" {
        text_to_html(form.text("text_content"))
    } else {
        form.text("html_content").to_string()
    };
    if html.trim().is_empty() {
        return Err(ValidationError::EmptyLetter);
    }
    Ok(html)
}

fn has_templates(form: &MultipartForm) -> bool {
    form.file("pdf_template").is_some() || form.file("jpg_template").is_some()
}

/// Save uploaded templates into the run directory.
async fn save_templates(
    run: &RunDirectory,
    form: &MultipartForm,
) -> std::io::Result<DiplomaTemplates> {
    let mut templates = DiplomaTemplates::default();
    if let Some(pdf) = form.file("pdf_template") {
        templates.pdf = Some(run.save_upload(&pdf.file_name, "template.pdf", &pdf.bytes).await?);
    }
    if let Some(jpg) = form.file("jpg_template") {
        templates.jpg = Some(run.save_upload(&jpg.file_name, "template.jpg", &jpg.bytes).await?);
    }
    Ok(templates)
}

fn logo(form: &MultipartForm) -> Option<InlineLogo> {
    form.file("logo_file")
        .filter(|upload| !upload.bytes.is_empty())
        .map(|upload| InlineLogo {
            bytes: upload.bytes.to_vec(),
            file_name: upload_file_name(&upload.file_name, "logo"),
        })
}

/// Personalizer for this request. The font is only resolved when there is
/// something to stamp; a missing font is fatal for the request.
async fn personalizer(
    state: &AppState,
    needed: bool,
    offset: NameOffset,
    rasterize: bool,
) -> Result<Option<Personalizer>, ConfigError> {
    if !needed {
        return Ok(None);
    }
    let font = state.fonts.get().await?;
    Ok(Some(
        Personalizer::new(font)
            .with_offset(offset)
            .with_rasterize(rasterize),
    ))
}

// ── Roster preview ──────────────────────────────────────────────────

pub(crate) async fn preview(multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let form = MultipartForm::read(multipart).await?;
    let csv = form.file("csv_file").ok_or(ValidationError::MissingRoster)?;
    let preview = preview_roster(&csv.bytes)?;

    Ok(Json(json!({
        "ok": true,
        "headers": preview.headers,
        "rows": preview.rows,
        "encoding": preview.encoding,
    })))
}

// ── Diploma preview ─────────────────────────────────────────────────

pub(crate) async fn preview_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = MultipartForm::read(multipart).await?;
    let test_name = form.text("test_name").trim().to_string();
    if test_name.is_empty() {
        return Err(ValidationError::MissingTestName.into());
    }
    let offset = form.name_offset()?;
    let personalizer = personalizer(&state, has_templates(&form), offset, false).await?;

    let run = state.workspace.create_run(RunMode::Preview).await?;
    let templates = save_templates(&run, &form).await?;

    let (mut pdf_url, mut jpg_url) = (None, None);
    if let Some(personalizer) = personalizer {
        let out_dir = run.path().to_path_buf();
        let artifacts = tokio::task::spawn_blocking(move || {
            personalizer.personalize(&templates, &test_name, &out_dir)
        })
        .await
        .map_err(join_failed)??;
        pdf_url = artifacts.pdf.and_then(|p| run.artifact_url(&p));
        jpg_url = artifacts.jpg.and_then(|p| run.artifact_url(&p));
    }

    Ok(Json(json!({
        "ok": true,
        "pdf_url": pdf_url,
        "jpg_url": jpg_url,
        "jpg_received": form.file("jpg_template").is_some(),
    })))
}

// ── Test send ───────────────────────────────────────────────────────

pub(crate) async fn test_send(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = MultipartForm::read(multipart).await?;

    let credentials = connected(&state).await?;
    let test_email = form.text("test_email").trim().to_string();
    if test_email.is_empty() {
        return Err(ValidationError::MissingTestEmail.into());
    }
    let from = sender_address(&state, &form, &credentials).await?;
    let mut html_body = letter_html(&form)?;
    let logo = logo(&form);
    if logo.is_some() {
        html_body = inject_logo_cid(&html_body);
    }
    let offset = form.name_offset()?;
    let personalizer =
        personalizer(&state, has_templates(&form), offset, state.config.rasterize_pdf).await?;

    let run = state.workspace.create_run(RunMode::Test).await?;
    let job = BatchJob {
        records: Vec::new(),
        selection: Selection::all(),
        templates: save_templates(&run, &form).await?,
        html_body,
        subject: form.text("subject").to_string(),
        from,
        logo,
        run_dir: run.path().to_path_buf(),
    };

    let name = form.text_or("test_name", DEFAULT_TEST_NAME).to_string();
    let to = test_email.clone();
    let message =
        tokio::task::spawn_blocking(move || compose(personalizer.as_ref(), &job, &name, &to))
            .await
            .map_err(join_failed)?
            .map_err(Error::from)?;

    state.delivery.send(&message, &credentials).await?;
    info!(to = %test_email, run = %run.name(), "Test email sent");

    Ok(Json(json!({
        "ok": true,
        "message": format!("Test email sent to {test_email}"),
        "output_dir": run.path().display().to_string(),
    })))
}

// ── Batch send ──────────────────────────────────────────────────────

/// Validate a batch request and set up its run directory.
async fn prepare_batch(
    state: &AppState,
    multipart: Multipart,
) -> Result<(BatchRunner, BatchJob, RunDirectory), ApiError> {
    let form = MultipartForm::read(multipart).await?;

    let csv = form.file("csv_file").ok_or(ValidationError::MissingRoster)?;
    if !has_templates(&form) {
        return Err(ValidationError::MissingTemplate.into());
    }
    let credentials = connected(state).await?;
    let from = sender_address(state, &form, &credentials).await?;
    let mut html_body = letter_html(&form)?;
    let logo = logo(&form);
    if logo.is_some() {
        html_body = inject_logo_cid(&html_body);
    }
    let offset = form.name_offset()?;
    let roster = parse_roster(&csv.bytes)?;
    let personalizer = personalizer(state, true, offset, state.config.rasterize_pdf).await?;

    let run = state.workspace.create_run(RunMode::Batch).await?;
    let job = BatchJob {
        records: roster.records,
        selection: Selection::parse(form.text("selected_indices")),
        templates: save_templates(&run, &form).await?,
        html_body,
        subject: form.text("subject").to_string(),
        from,
        logo,
        run_dir: run.path().to_path_buf(),
    };

    let mut runner = BatchRunner::new(Arc::clone(&state.delivery), Arc::new(credentials))
        .with_notify_to(state.config.notify_email.clone());
    if let Some(personalizer) = personalizer {
        runner = runner.with_personalizer(personalizer);
    }
    Ok((runner, job, run))
}

pub(crate) async fn send(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let (runner, job, run) = prepare_batch(&state, multipart).await?;
    let report = runner.run_sync(job).await;
    let result = report.result;

    Ok(Json(json!({
        "ok": true,
        "output_dir": run.path().display().to_string(),
        "sent": result.sent,
        "sent_indices": result.sent_indices,
        "skipped": result.skipped,
        "errors": result.errors,
        "log_lines": report.log_lines,
        "summary": result.summary,
    })))
}

pub(crate) async fn send_stream(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (runner, job, _run) = prepare_batch(&state, multipart).await?;
    let lines = runner.run_progressive(job).map(Ok::<_, Infallible>);

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(lines),
    )
        .into_response())
}

// ── Roster save-back ────────────────────────────────────────────────

pub(crate) async fn save_csv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = MultipartForm::read(multipart).await?;
    let content = form.text("csv_content");
    if content.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "csv_content".into(),
            reason: "required".into(),
        }
        .into());
    }

    let target = form.text("target_path").trim();
    let saved_to = if target.is_empty() {
        let file_name = form.text_or("filename", DEFAULT_SAVE_NAME);
        state.workspace.save_text(file_name, DEFAULT_SAVE_NAME, content).await?
    } else {
        let dest = PathBuf::from(target);
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, content).await?;
        dest
    };

    info!(path = %saved_to.display(), "Roster saved");
    Ok(Json(json!({ "ok": true, "saved_to": saved_to.display().to_string() })))
}
