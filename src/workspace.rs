//! Output workspace — the directory tree holding every run's uploads and
//! generated diplomas.
//!
//! Layout:
//! - `<root>/<mode>-<YYYYmmdd-HHMMSS>/` one directory per preview, test send
//!   or batch run, holding the uploaded templates and the stamped artifacts
//! - `<root>/<file>.csv` rosters saved back from the browser
//!
//! The root is served at `/output`, so an artifact's URL is derived from its
//! run directory name and file name.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs;
use tracing::info;

/// URL prefix the workspace root is served under.
pub const OUTPUT_URL_PREFIX: &str = "/output";

/// What a run directory was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Preview,
    Test,
    Batch,
}

impl RunMode {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Test => "test",
            Self::Batch => "batch",
        }
    }
}

/// Strip any client-supplied directory components from an upload name.
///
/// Returns `fallback` when nothing usable remains.
pub fn upload_file_name(raw: &str, fallback: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// A run's dedicated output directory.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    name: String,
    path: PathBuf,
}

impl RunDirectory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write uploaded bytes into the run directory under their base name.
    pub async fn save_upload(
        &self,
        file_name: &str,
        fallback: &str,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        let path = self.path.join(upload_file_name(file_name, fallback));
        fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// `/output/<run>/<file>` for a file inside this run directory.
    pub fn artifact_url(&self, artifact: &Path) -> Option<String> {
        let file_name = artifact.file_name()?.to_str()?;
        Some(format!("{OUTPUT_URL_PREFIX}/{}/{file_name}", self.name))
    }
}

/// Root directory of all runs.
#[derive(Debug, Clone)]
pub struct OutputWorkspace {
    base_path: PathBuf,
}

impl OutputWorkspace {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Ensure the root exists.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    /// Create a fresh `<mode>-<timestamp>` directory.
    ///
    /// Two runs of the same mode within one second share a directory.
    pub async fn create_run(&self, mode: RunMode) -> std::io::Result<RunDirectory> {
        let name = format!("{}-{}", mode.prefix(), Local::now().format("%Y%m%d-%H%M%S"));
        let path = self.base_path.join(&name);
        fs::create_dir_all(&path).await?;
        info!(run = %name, path = %path.display(), "Run directory created");
        Ok(RunDirectory { name, path })
    }

    /// Write text content to `<root>/<file_name>` (base name only).
    pub async fn save_text(
        &self,
        file_name: &str,
        fallback: &str,
        content: &str,
    ) -> std::io::Result<PathBuf> {
        self.ensure_dirs().await?;
        let path = self.base_path.join(upload_file_name(file_name, fallback));
        fs::write(&path, content).await?;
        Ok(path)
    }
}
