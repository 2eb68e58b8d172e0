//! Diploma personalization — stamps a recipient's name onto a PDF or image
//! template and writes the result into a run directory.

pub mod bitmap;
pub mod font;
pub mod pdf;
pub mod raster;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::PersonalizeError;
use font::DiplomaFont;

/// US Letter width in points.
pub const LETTER_WIDTH: f32 = 612.0;
/// US Letter height in points.
pub const LETTER_HEIGHT: f32 = 792.0;
/// Distance of the name baseline from the page top, in points.
pub const NAME_TOP_OFFSET: f32 = 220.0;
/// Name size in points.
pub const NAME_FONT_SIZE: f32 = 42.0;

const PDF_SUFFIX: &str = "_diploma.pdf";
const JPG_SUFFIX: &str = "_diploma.jpg";

/// Operator nudge applied to the name position (points; +y moves up).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NameOffset {
    pub x: i32,
    pub y: i32,
}

/// Hebrew block (U+0590–U+05FF).
pub fn is_hebrew(text: &str) -> bool {
    text.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c))
}

/// Character order to draw in a PDF.
///
/// The PDF writer has no bidi support, so right-to-left names are reversed
/// into visual order before drawing.
pub fn visual_order(text: &str) -> String {
    if is_hebrew(text) {
        text.chars().rev().collect()
    } else {
        text.to_string()
    }
}

/// Base file name for a recipient, without suffix.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// `<Name_With_Underscores>_diploma.pdf`
pub fn pdf_file_name(name: &str) -> String {
    format!("{}{PDF_SUFFIX}", file_stem(name))
}

/// `<Name_With_Underscores>_diploma.jpg`
pub fn jpg_file_name(name: &str) -> String {
    format!("{}{JPG_SUFFIX}", file_stem(name))
}

/// Templates uploaded for a run. At least one is expected to be set.
#[derive(Debug, Clone, Default)]
pub struct DiplomaTemplates {
    pub pdf: Option<PathBuf>,
    pub jpg: Option<PathBuf>,
}

impl DiplomaTemplates {
    pub fn is_empty(&self) -> bool {
        self.pdf.is_none() && self.jpg.is_none()
    }
}

/// Files generated for one recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiplomaArtifacts {
    pub pdf: Option<PathBuf>,
    pub jpg: Option<PathBuf>,
}

/// Stamps names onto templates using an explicitly provided font.
#[derive(Debug, Clone)]
pub struct Personalizer {
    font: Arc<DiplomaFont>,
    offset: NameOffset,
    rasterize_pdf: bool,
}

impl Personalizer {
    pub fn new(font: Arc<DiplomaFont>) -> Self {
        Self {
            font,
            offset: NameOffset::default(),
            rasterize_pdf: false,
        }
    }

    pub fn with_offset(mut self, offset: NameOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Also rasterize stamped PDFs to JPG when no image template is given.
    pub fn with_rasterize(mut self, enabled: bool) -> Self {
        self.rasterize_pdf = enabled;
        self
    }

    pub fn font(&self) -> &DiplomaFont {
        &self.font
    }

    /// Stamp `name` onto page 1 of a PDF template. Overwrites any prior
    /// artifact for the same name in `out_dir`.
    pub fn stamp_pdf(
        &self,
        template: &Path,
        name: &str,
        out_dir: &Path,
    ) -> Result<PathBuf, PersonalizeError> {
        let template_bytes = std::fs::read(template)?;
        let stamped = pdf::stamp_first_page(
            &template_bytes,
            &visual_order(name),
            &self.font,
            self.offset,
        )?;

        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join(pdf_file_name(name));
        std::fs::write(&path, stamped)?;

        tracing::debug!(path = %path.display(), "PDF diploma written");
        Ok(path)
    }

    /// Stamp `name` onto an image template and write it as JPEG.
    pub fn stamp_image(
        &self,
        template: &Path,
        name: &str,
        out_dir: &Path,
    ) -> Result<PathBuf, PersonalizeError> {
        let template_bytes = std::fs::read(template)?;
        let stamped = bitmap::stamp_image(&template_bytes, name, &self.font, self.offset)?;

        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join(jpg_file_name(name));
        std::fs::write(&path, stamped)?;

        tracing::debug!(path = %path.display(), "JPG diploma written");
        Ok(path)
    }

    /// Generate every artifact the templates call for.
    pub fn personalize(
        &self,
        templates: &DiplomaTemplates,
        name: &str,
        out_dir: &Path,
    ) -> Result<DiplomaArtifacts, PersonalizeError> {
        let pdf = templates
            .pdf
            .as_deref()
            .map(|t| self.stamp_pdf(t, name, out_dir))
            .transpose()?;

        let mut jpg = templates
            .jpg
            .as_deref()
            .map(|t| self.stamp_image(t, name, out_dir))
            .transpose()?;

        if jpg.is_none()
            && self.rasterize_pdf
            && let Some(pdf) = &pdf
        {
            jpg = raster::rasterize_first_page(pdf)?;
        }

        Ok(DiplomaArtifacts { pdf, jpg })
    }
}
