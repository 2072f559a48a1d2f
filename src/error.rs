//! Error types for the snap2md library.
//!
//! Two families of errors reflect two distinct failure modes:
//!
//! * [`SnapshotError`]: **Fatal**. The run cannot proceed at all (browser
//!   would not load the page, the converter failed, the output directory is
//!   not writable). Returned as `Err(SnapshotError)` from
//!   [`crate::snapshot::capture_url`].
//!
//! * Per-item failures: a single asset was rejected or could not be
//!   downloaded ([`crate::pipeline::fetch::FetchResult`]), or a single image
//!   could not be described ([`CaptionError`]). These are logged and only
//!   shrink the result lists; the run continues.
//!
//! [`ConvertError`] sits in between: it aborts a capture, but inside
//! [`crate::files::process_files`] it only fails the one file it concerns.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by a snapshot run.
#[derive(Debug, Error)]
pub enum SnapshotError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The caller-supplied address is not an absolute HTTP/HTTPS URL.
    #[error("Invalid URL '{input}': not an absolute HTTP/HTTPS URL")]
    InvalidUrl { input: String },

    // ── Browser errors ────────────────────────────────────────────────────
    /// The page did not load or become ready within the bounded wait.
    #[error("Timed out after {secs}s waiting for {stage}")]
    Timeout { stage: &'static str, secs: u64 },

    /// The browser session reported an error. The message is the driver's own.
    #[error("Browser driver failure: {0}")]
    DriverFailure(String),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The document converter could not produce Markdown.
    #[error("Document conversion failed: {0}")]
    ConversionFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, copy or write a file or directory.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error reported by a [`crate::browser::BrowserDriver`].
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BrowserError {
    pub message: String,
}

impl BrowserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<BrowserError> for SnapshotError {
    fn from(e: BrowserError) -> Self {
        SnapshotError::DriverFailure(e.message)
    }
}

/// A document converter failure.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The converter does not handle this kind of input.
    #[error("Unsupported input '{path}': no converter for this format")]
    Unsupported { path: PathBuf },

    /// The input could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The converter ran but failed.
    #[error("{0}")]
    Failed(String),
}

impl From<ConvertError> for SnapshotError {
    fn from(e: ConvertError) -> Self {
        SnapshotError::ConversionFailed(e.to_string())
    }
}

/// A non-fatal error for a single image description.
///
/// The caller logs it and moves on to the next image.
#[derive(Debug, Error)]
pub enum CaptionError {
    /// No credential or provider is available for captioning.
    #[error("Captioning is not configured: {hint}")]
    NotConfigured { hint: String },

    /// The image file could not be read.
    #[error("Failed to read image '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image could not be decoded or re-encoded for upload.
    #[error("Failed to encode image '{path}': {detail}")]
    Encode { path: PathBuf, detail: String },

    /// The captioning API returned an error after all retries.
    #[error("Captioning API error after {retries} retries: {message}")]
    Api { retries: u32, message: String },

    /// The API answered but the description was empty.
    #[error("Captioning API returned an empty description")]
    EmptyResponse,
}
