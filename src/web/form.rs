//! Multipart form reading for the upload endpoints.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::Multipart;

use crate::diploma::NameOffset;
use crate::error::ValidationError;

/// An uploaded file part.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name as sent by the browser (may include directories).
    pub file_name: String,
    pub bytes: Bytes,
}

/// A fully buffered multipart form: text fields and file parts by name.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl MultipartForm {
    /// Buffer every part. Parts with a non-empty file name are files;
    /// everything else is a text field. Empty file inputs are dropped.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ValidationError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(malformed)?;

            match file_name {
                Some(file_name) if !file_name.is_empty() => {
                    form.files.insert(name, Upload { file_name, bytes });
                }
                Some(_) => {}
                None => {
                    form.fields
                        .insert(name, String::from_utf8_lossy(&bytes).into_owned());
                }
            }
        }
        Ok(form)
    }

    /// A text field, empty when absent.
    pub fn text(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }

    /// A text field, `default` when absent or blank.
    pub fn text_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.text(key).trim() {
            "" => default,
            value => value,
        }
    }

    /// An integer field; absent or blank is 0.
    pub fn int(&self, key: &str) -> Result<i32, ValidationError> {
        let raw = self.text(key).trim();
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse().map_err(|_| ValidationError::InvalidField {
            field: key.to_string(),
            reason: format!("expected an integer, got {raw:?}"),
        })
    }

    /// The `name_x_offset` / `name_y_offset` pair.
    pub fn name_offset(&self) -> Result<NameOffset, ValidationError> {
        Ok(NameOffset {
            x: self.int("name_x_offset")?,
            y: self.int("name_y_offset")?,
        })
    }

    pub fn file(&self, key: &str) -> Option<&Upload> {
        self.files.get(key)
    }

    #[cfg(test)]
    pub(crate) fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }
}

fn malformed(e: axum::extract::multipart::MultipartError) -> ValidationError {
    ValidationError::InvalidField {
        field: "form".into(),
        reason: e.body_text(),
    }
}
