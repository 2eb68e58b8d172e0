//! Font selection for stamping names.
//!
//! Candidates are checked in priority order; the first candidate with an
//! existing file becomes the active font unless `DIPLOMA_FONT` names another
//! located candidate. The loaded font is memoized in a [`FontCache`] and
//! handed to the personalizer explicitly.

use std::path::PathBuf;
use std::sync::Arc;

use ab_glyph::{Font, FontVec, GlyphId};
use tokio::sync::OnceCell;

use crate::error::ConfigError;

/// A named font with the file locations to check for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontCandidate {
    pub name: String,
    pub paths: Vec<PathBuf>,
}

impl FontCandidate {
    pub fn new(name: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            paths,
        }
    }
}

/// The candidate chosen for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontSelection {
    pub name: String,
    pub path: PathBuf,
}

/// Probe candidates and pick the active font.
pub fn resolve_font(
    candidates: &[FontCandidate],
    preferred: Option<&str>,
) -> Result<FontSelection, ConfigError> {
    let located: Vec<FontSelection> = candidates
        .iter()
        .filter_map(|candidate| {
            candidate
                .paths
                .iter()
                .find(|p| p.is_file())
                .map(|path| FontSelection {
                    name: candidate.name.clone(),
                    path: path.clone(),
                })
        })
        .collect();

    if let Some(preferred) = preferred {
        if let Some(hit) = located.iter().find(|s| s.name == preferred) {
            return Ok(hit.clone());
        }
        tracing::warn!(preferred, "Preferred font was not located; using priority order");
    }

    located
        .into_iter()
        .next()
        .ok_or_else(|| ConfigError::FontNotFound {
            checked: describe_candidates(candidates),
        })
}

fn describe_candidates(candidates: &[FontCandidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            let paths: Vec<String> = c.paths.iter().map(|p| p.display().to_string()).collect();
            format!("{} [{}]", c.name, paths.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// A loaded TrueType font, usable for both PDF embedding and raster drawing.
pub struct DiplomaFont {
    name: String,
    path: PathBuf,
    data: Vec<u8>,
    font: FontVec,
}

impl std::fmt::Debug for DiplomaFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiplomaFont")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DiplomaFont {
    /// Parse font bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        path: PathBuf,
        data: Vec<u8>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let font = FontVec::try_from_vec(data.clone()).map_err(|e| ConfigError::FontLoad {
            name: name.clone(),
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name,
            path,
            data,
            font,
        })
    }

    /// Read and parse the selected font file.
    pub async fn load(selection: &FontSelection) -> Result<Self, ConfigError> {
        let data = tokio::fs::read(&selection.path)
            .await
            .map_err(|e| ConfigError::FontLoad {
                name: selection.name.clone(),
                path: selection.path.clone(),
                reason: e.to_string(),
            })?;
        Self::from_bytes(selection.name.clone(), selection.path.clone(), data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Raw font file bytes (embedded into PDFs).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Glyph renderer for raster output.
    pub fn glyphs(&self) -> &FontVec {
        &self.font
    }

    pub fn units_per_em(&self) -> f32 {
        self.font.units_per_em().unwrap_or(1000.0)
    }

    pub fn glyph_id(&self, c: char) -> GlyphId {
        self.font.glyph_id(c)
    }

    /// Advance width of a glyph in 1/1000 em (PDF glyph space).
    pub fn advance_milli_em(&self, glyph: GlyphId) -> f32 {
        self.font.h_advance_unscaled(glyph) * 1000.0 / self.units_per_em()
    }

    /// Ascent in 1/1000 em.
    pub fn ascent_milli_em(&self) -> f32 {
        self.font.ascent_unscaled() * 1000.0 / self.units_per_em()
    }

    /// Descent in 1/1000 em (negative).
    pub fn descent_milli_em(&self) -> f32 {
        self.font.descent_unscaled() * 1000.0 / self.units_per_em()
    }
}

/// Single-initialization cache for the process font.
///
/// Resolution and loading happen on first use; concurrent first callers
/// wait on the same initialization. A failed resolution is not cached.
pub struct FontCache {
    candidates: Vec<FontCandidate>,
    preferred: Option<String>,
    cell: OnceCell<Arc<DiplomaFont>>,
}

impl FontCache {
    pub fn new(candidates: Vec<FontCandidate>, preferred: Option<String>) -> Self {
        Self {
            candidates,
            preferred,
            cell: OnceCell::new(),
        }
    }

    /// Return the loaded font, resolving it on first call.
    pub async fn get(&self) -> Result<Arc<DiplomaFont>, ConfigError> {
        self.cell
            .get_or_try_init(|| async {
                let selection = resolve_font(&self.candidates, self.preferred.as_deref())?;
                let font = DiplomaFont::load(&selection).await?;
                tracing::info!(
                    font = %selection.name,
                    path = %selection.path.display(),
                    "Diploma font resolved"
                );
                Ok(Arc::new(font))
            })
            .await
            .cloned()
    }
}
