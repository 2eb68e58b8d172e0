//! Optional PDF → JPG rasterization of page 1 via poppler's `pdftoppm`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::PersonalizeError;

const PDFTOPPM: &str = "pdftoppm";

/// Rasterize page 1 of `pdf` next to it, as `<stem>.jpg`.
///
/// Returns `Ok(None)` when `pdftoppm` is not installed.
pub fn rasterize_first_page(pdf: &Path) -> Result<Option<PathBuf>, PersonalizeError> {
    let prefix = pdf.with_extension("");

    let output = match Command::new(PDFTOPPM)
        .args(["-jpeg", "-f", "1", "-l", "1", "-singlefile"])
        .arg(pdf)
        .arg(&prefix)
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!("pdftoppm not installed; skipping JPG conversion");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        return Err(PersonalizeError::Raster(format!(
            "{PDFTOPPM} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let jpg = pdf.with_extension("jpg");
    if !jpg.is_file() {
        return Err(PersonalizeError::Raster(format!(
            "{PDFTOPPM} produced no output at {}",
            jpg.display()
        )));
    }
    Ok(Some(jpg))
}
