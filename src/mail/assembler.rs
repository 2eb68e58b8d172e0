//! Message assembly — one `multipart/mixed` message per recipient.
//!
//! Layout:
//! ```text
//! multipart/mixed
//! ├── multipart/alternative
//! │   └── text/html        (letter, {{name}} substituted)
//! ├── image/*  inline      (Content-ID: <logo_cid>, optional)
//! ├── application/pdf      (attachment, optional)
//! └── image/jpeg           (attachment, optional)
//! ```

use std::path::Path;

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

use super::letter::{LOGO_CID, personalize_body};
use crate::config::DEFAULT_SUBJECT;
use crate::diploma::DiplomaArtifacts;
use crate::error::MessageError;

/// Logo bytes embedded in every letter of a run.
#[derive(Debug, Clone)]
pub struct InlineLogo {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl InlineLogo {
    /// Sniffed image type, carrying the upload's file name when it parses.
    fn content_type(&self) -> ContentType {
        let mime = image::guess_format(&self.bytes)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");
        ContentType::parse(&format!("{mime}; name=\"{}\"", self.file_name))
            .or_else(|_| ContentType::parse(mime))
            .unwrap_or(ContentType::TEXT_PLAIN)
    }
}

/// Everything needed to build one recipient's message.
#[derive(Debug, Clone)]
pub struct DiplomaMessage<'a> {
    pub recipient_name: &'a str,
    pub recipient_email: &'a str,
    /// Letter HTML, possibly containing `{{name}}`.
    pub html_body: &'a str,
    /// Blank means [`DEFAULT_SUBJECT`].
    pub subject: &'a str,
    pub from: &'a str,
    pub artifacts: &'a DiplomaArtifacts,
    pub logo: Option<&'a InlineLogo>,
}

/// Build the personalized diploma message.
pub fn build_diploma_message(msg: &DiplomaMessage<'_>) -> Result<Message, MessageError> {
    let subject = if msg.subject.trim().is_empty() {
        DEFAULT_SUBJECT
    } else {
        msg.subject
    };

    let html = personalize_body(msg.html_body, msg.recipient_name);
    let mut body =
        MultiPart::mixed().multipart(MultiPart::alternative().singlepart(SinglePart::html(html)));

    if let Some(logo) = msg.logo.filter(|l| !l.bytes.is_empty()) {
        body = body.singlepart(
            Attachment::new_inline(LOGO_CID.to_string())
                .body(logo.bytes.clone(), logo.content_type()),
        );
    }

    if let Some(pdf) = &msg.artifacts.pdf {
        body = body.singlepart(file_attachment(pdf, "application/pdf")?);
    }
    if let Some(jpg) = &msg.artifacts.jpg {
        body = body.singlepart(file_attachment(jpg, "image/jpeg")?);
    }

    Message::builder()
        .from(parse_mailbox(msg.from)?)
        .to(parse_mailbox(msg.recipient_email)?)
        .subject(subject)
        .multipart(body)
        .map_err(|e| MessageError::Build(e.to_string()))
}

/// Build a plain-text message (used for the batch report).
pub fn build_text_message(
    subject: &str,
    body: &str,
    from: &str,
    to: &str,
) -> Result<Message, MessageError> {
    Message::builder()
        .from(parse_mailbox(from)?)
        .to(parse_mailbox(to)?)
        .subject(subject)
        .singlepart(SinglePart::plain(body.to_string()))
        .map_err(|e| MessageError::Build(e.to_string()))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MessageError> {
    address
        .trim()
        .parse()
        .map_err(|_| MessageError::InvalidAddress(address.to_string()))
}

/// Attachment part carrying the artifact's literal file name.
fn file_attachment(path: &Path, mime: &str) -> Result<SinglePart, MessageError> {
    let bytes = std::fs::read(path).map_err(|source| MessageError::Attachment {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let content_type =
        ContentType::parse(mime).map_err(|e| MessageError::Build(format!("{mime}: {e}")))?;
    Ok(Attachment::new(file_name).body(bytes, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_parser::{MessageParser, MimeHeaders};

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn parse(raw: &[u8]) -> mail_parser::Message<'_> {
        MessageParser::default().parse(raw).unwrap()
    }

    fn message<'a>(
        artifacts: &'a DiplomaArtifacts,
        logo: Option<&'a InlineLogo>,
    ) -> DiplomaMessage<'a> {
        DiplomaMessage {
            recipient_name: "Noa Levi",
            recipient_email: "noa@example.com",
            html_body: "<p>Dear {{name}}</p>",
            subject: "Your diploma",
            from: "school@example.com",
            artifacts,
            logo,
        }
    }

    #[test]
    fn html_body_is_personalized() {
        let artifacts = DiplomaArtifacts::default();
        let raw = build_diploma_message(&message(&artifacts, None)).unwrap().formatted();
        let parsed = parse(&raw);

        assert_eq!(parsed.subject(), Some("Your diploma"));
        assert_eq!(parsed.body_html(0).unwrap().trim(), "<p>Dear Noa Levi</p>");
        assert_eq!(parsed.attachment_count(), 0);
    }

    #[test]
    fn blank_subject_uses_default() {
        let artifacts = DiplomaArtifacts::default();
        let mut msg = message(&artifacts, None);
        msg.subject = "   ";
        let raw = build_diploma_message(&msg).unwrap().formatted();
        let parsed = parse(&raw);
        assert_eq!(parsed.subject(), Some(DEFAULT_SUBJECT));
    }

    #[test]
    fn artifacts_attached_with_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("Noa_Levi_diploma.pdf");
        let jpg = dir.path().join("Noa_Levi_diploma.jpg");
        std::fs::write(&pdf, b"%PDF-1.5 fake").unwrap();
        std::fs::write(&jpg, b"\xFF\xD8\xFF fake").unwrap();
        let artifacts = DiplomaArtifacts {
            pdf: Some(pdf),
            jpg: Some(jpg),
        };

        let raw = build_diploma_message(&message(&artifacts, None)).unwrap().formatted();
        let parsed = parse(&raw);
        let names: Vec<&str> = parsed
            .attachments()
            .filter_map(|p| p.attachment_name())
            .collect();
        assert_eq!(names, vec!["Noa_Levi_diploma.pdf", "Noa_Levi_diploma.jpg"]);
    }

    #[test]
    fn logo_is_inline_with_fixed_content_id() {
        let artifacts = DiplomaArtifacts::default();
        let logo = InlineLogo {
            bytes: PNG_MAGIC.to_vec(),
            file_name: "logo.png".into(),
        };
        let raw = build_diploma_message(&message(&artifacts, Some(&logo)))
            .unwrap()
            .formatted();
        let parsed = parse(&raw);

        let part = parsed
            .parts
            .iter()
            .find(|p| p.content_id().is_some())
            .expect("inline logo part");
        assert_eq!(part.content_id(), Some(LOGO_CID));
        assert_eq!(part.content_type().unwrap().subtype(), Some("png"));
    }

    #[test]
    fn missing_artifact_file_is_an_error() {
        let artifacts = DiplomaArtifacts {
            pdf: Some("/nonexistent/x_diploma.pdf".into()),
            jpg: None,
        };
        let err = build_diploma_message(&message(&artifacts, None)).unwrap_err();
        assert!(matches!(err, MessageError::Attachment { .. }));
    }

    #[test]
    fn invalid_recipient_address_rejected() {
        let artifacts = DiplomaArtifacts::default();
        let mut msg = message(&artifacts, None);
        msg.recipient_email = "not an address";
        assert!(matches!(
            build_diploma_message(&msg).unwrap_err(),
            MessageError::InvalidAddress(_)
        ));
    }

    #[test]
    fn text_message_is_plain() {
        let built = build_text_message(
            "Batch send report",
            "Total sent: 2\n",
            "school@example.com",
            "admin@example.com",
        )
        .unwrap()
        .formatted();
        let parsed = parse(&built);
        assert_eq!(parsed.subject(), Some("Batch send report"));
        assert!(parsed.body_text(0).unwrap().contains("Total sent: 2"));
    }
}
