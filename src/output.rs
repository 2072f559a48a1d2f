//! Result types returned by a snapshot run and by local file processing.

use serde::Serialize;
use std::path::PathBuf;

/// Counters for one asset-fetch batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// Unique asset URLs found in the page.
    pub requested: usize,
    /// Assets written to disk.
    pub saved: usize,
    /// Assets refused by type or size policy.
    pub rejected: usize,
    /// Assets that could not be downloaded.
    pub failed: usize,
}

/// A generated description for one captured image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDescription {
    /// Image file in the final assets directory.
    pub image: PathBuf,
    /// File name as listed in the Markdown description section.
    pub name: String,
    pub description: String,
}

/// Everything a successful [`crate::snapshot::capture_url`] produced.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResult {
    /// The address the caller asked for.
    pub requested_url: String,
    /// The address the browser ended up on (after redirects).
    pub resolved_url: String,
    /// Filesystem-safe name derived from `resolved_url`.
    pub slug: String,
    /// `<output_dir>/<slug>.md`.
    pub document_path: PathBuf,
    /// The Markdown written to `document_path`.
    pub markdown: String,
    /// `<output_dir>/<slug>_assets`.
    pub assets_dir: PathBuf,
    /// Every asset in `assets_dir`, in URL order.
    pub assets: Vec<PathBuf>,
    /// The image subset of `assets`.
    pub images: Vec<PathBuf>,
    /// Descriptions that succeeded; empty when captioning is off.
    pub descriptions: Vec<ImageDescription>,
    /// Page source as captured, when HTML copies are kept.
    pub raw_markup_path: Option<PathBuf>,
    /// Page source with local asset paths, when HTML copies are kept.
    pub rewritten_markup_path: Option<PathBuf>,
    pub stats: FetchStats,
    pub duration_ms: u64,
}

/// What happened to one input of [`crate::files::process_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// A Markdown document was written.
    Converted { input: PathBuf, output: PathBuf },
    /// The input was not attempted.
    Skipped { input: PathBuf, reason: String },
    /// The input was attempted and failed.
    Failed { input: PathBuf, error: String },
}

impl FileOutcome {
    pub fn input(&self) -> &std::path::Path {
        match self {
            FileOutcome::Converted { input, .. }
            | FileOutcome::Skipped { input, .. }
            | FileOutcome::Failed { input, .. } => input,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, FileOutcome::Converted { .. })
    }
}
