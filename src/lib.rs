//! # snap2md
//!
//! Capture a live web page as a self-contained Markdown document.
//!
//! ## Why this crate?
//!
//! Saving a page's HTML is not enough to read it later: images, stylesheets
//! and scripts still point at the origin, which may change, vanish or require
//! the session that rendered the page. This crate drives a real browser so
//! dynamic content is present, downloads every referenced asset next to the
//! document, rewrites the links to point at the local copies, converts the
//! result to Markdown and, optionally, asks a vision model to describe each
//! image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Browse    load, wait for readyState, auto-scroll, read DOM + cookies
//!  ├─ 2. Locate    absolute asset URLs from src/href/data/srcset attributes
//!  ├─ 3. Fetch     download with the browser's UA and cookies (type + size limits)
//!  ├─ 4. Relocate  staging dir → <output>/<slug>_assets/
//!  ├─ 5. Rewrite   attributes → paths relative to the output directory
//!  ├─ 6. Convert   HTML → Markdown
//!  └─ 7. Describe  optional vision-model captions appended to the document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "chromium")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use snap2md::{capture_url, browser::chromium::ChromiumLauncher, SnapshotConfig};
//!
//! let config = SnapshotConfig::builder().output_dir("snapshots").build()?;
//! let result = capture_url("https://example.com/", &ChromiumLauncher, &config).await?;
//! println!("{} ({} assets)", result.document_path.display(), result.assets.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cli`      | on      | Enables the `snap2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `chromium` | on      | [`browser::chromium::ChromiumLauncher`] over the DevTools protocol |
//!
//! Disable both when embedding the library with your own [`BrowserLauncher`]:
//! ```toml
//! snap2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod browser;
pub mod config;
pub mod error;
pub mod files;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod snapshot;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use browser::{BrowserDriver, BrowserLauncher, BrowserOptions, Cookie};
pub use config::{SnapshotConfig, SnapshotConfigBuilder};
pub use error::{BrowserError, CaptionError, ConvertError, SnapshotError};
pub use files::process_files;
pub use output::{FetchStats, FileOutcome, ImageDescription, SnapshotResult};
pub use pipeline::describe::{openai_provider, ImageDescriber, ProviderDescriber};
pub use pipeline::fetch::FetchResult;
pub use pipeline::markdown::{DocumentConverter, MarkdownConverter};
pub use progress::{NoopProgressCallback, ProgressCallback, SnapshotProgressCallback};
pub use snapshot::{capture_url, capture_url_sync, SnapshotState};
