//! Snapshot orchestration: one URL in, one Markdown document plus its
//! assets out.
//!
//! ```text
//! Idle ─▶ Loading ─▶ Ready ─▶ Scraping ─▶ Fetching ─▶ Relocating
//!                                                        │
//!          Done ◀─ (Describing) ◀─ Converting ◀─ Rewriting
//!
//! any state ──error──▶ Failed
//! ```
//!
//! The browser is needed only up to `Scraping`; it is quit as soon as the
//! page has been captured, whatever the outcome of the browser phase. All
//! intermediate files live in a `TempDir` that is removed when the run
//! returns, fails, or is dropped.

use crate::browser::{BrowserDriver, BrowserLauncher, BrowserOptions, Cookie};
use crate::config::SnapshotConfig;
use crate::error::SnapshotError;
use crate::output::{ImageDescription, SnapshotResult};
use crate::pipeline::describe::resolve_describer;
use crate::pipeline::fetch::{fetch, AssetSession, FALLBACK_USER_AGENT};
use crate::pipeline::locate::locate;
use crate::pipeline::markup::Markup;
use crate::pipeline::naming::slugify_url;
use crate::pipeline::relocate::{relocate, FinalAssets};
use crate::pipeline::rewrite::rewrite;
use crate::prompts::descriptions_section;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

/// Interval between `document.readyState` checks.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The states a snapshot run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SnapshotState {
    Idle,
    Loading,
    Ready,
    Scraping,
    Fetching,
    Relocating,
    Rewriting,
    Converting,
    Describing,
    Done,
    Failed,
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotState::Idle => "idle",
            SnapshotState::Loading => "loading",
            SnapshotState::Ready => "ready",
            SnapshotState::Scraping => "scraping",
            SnapshotState::Fetching => "fetching assets",
            SnapshotState::Relocating => "relocating assets",
            SnapshotState::Rewriting => "rewriting markup",
            SnapshotState::Converting => "converting",
            SnapshotState::Describing => "describing images",
            SnapshotState::Done => "done",
            SnapshotState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the browser phase hands to the rest of the pipeline.
struct PageCapture {
    html: String,
    resolved_url: String,
    user_agent: String,
    cookies: Vec<Cookie>,
}

struct Run<'a> {
    config: &'a SnapshotConfig,
}

impl Run<'_> {
    fn enter(&self, state: SnapshotState) {
        info!("Snapshot state: {}", state);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_state(state);
        }
    }
}

/// Capture `url` into `<output_dir>/<slug>.md` and `<output_dir>/<slug>_assets/`.
///
/// # Errors
/// Fatal problems only: an invalid URL, a browser failure or timeout, a
/// converter failure, or an unwritable output directory. Individual assets
/// and image descriptions that fail are logged and left out of the result.
pub async fn capture_url(
    url: &str,
    launcher: &dyn BrowserLauncher,
    config: &SnapshotConfig,
) -> Result<SnapshotResult, SnapshotError> {
    let run = Run { config };
    run.enter(SnapshotState::Idle);
    let result = capture(url, launcher, &run).await;
    if let Err(ref e) = result {
        warn!("Snapshot of {} failed: {}", url, e);
        run.enter(SnapshotState::Failed);
    }
    result
}

/// Synchronous wrapper around [`capture_url`].
///
/// Creates a temporary tokio runtime internally.
pub fn capture_url_sync(
    url: &str,
    launcher: &dyn BrowserLauncher,
    config: &SnapshotConfig,
) -> Result<SnapshotResult, SnapshotError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SnapshotError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(capture_url(url, launcher, config))
}

/// Parse `input` as an absolute http(s) URL with a host.
pub fn validate_url(input: &str) -> Result<Url, SnapshotError> {
    let invalid = || SnapshotError::InvalidUrl {
        input: input.to_string(),
    };
    let url = Url::parse(input.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

async fn capture(
    url: &str,
    launcher: &dyn BrowserLauncher,
    run: &Run<'_>,
) -> Result<SnapshotResult, SnapshotError> {
    let config = run.config;
    let start = Instant::now();
    let requested = validate_url(url)?;
    let tmp = create_temp_dir(config.work_dir.as_deref()).await?;
    debug!("Working directory: {}", tmp.path().display());

    // ── Browser phase ────────────────────────────────────────────────────
    run.enter(SnapshotState::Loading);
    let options = BrowserOptions {
        headless: config.headless,
        executable: config.browser_executable.clone(),
    };
    let mut driver = launcher.launch(&options).await?;
    let captured = capture_page(driver.as_mut(), requested.as_str(), run).await;
    if let Err(e) = driver.quit().await {
        warn!("Browser did not shut down cleanly: {}", e);
    }
    let page = captured?;

    let base = match Url::parse(&page.resolved_url) {
        Ok(u) => u,
        Err(_) => {
            warn!(
                "Browser reported an unparseable URL '{}'; resolving against {}",
                page.resolved_url, requested
            );
            requested.clone()
        }
    };

    // ── Asset phase ──────────────────────────────────────────────────────
    run.enter(SnapshotState::Fetching);
    let urls = locate(&Markup::parse(&page.html), &base);
    let session = AssetSession::from_browser(
        &page.user_agent,
        &page.cookies,
        &base,
        config.asset_timeout(),
    )?;
    let staged = fetch(&urls, &tmp.path().join("assets"), &session, &config.fetch_policy()).await?;
    if let Some(ref cb) = config.progress_callback {
        for (asset_url, outcome) in &staged.outcomes {
            cb.on_asset(asset_url, outcome);
        }
    }
    let stats = staged.stats;

    run.enter(SnapshotState::Relocating);
    let output_dir = prepare_output_dir(&config.output_dir).await?;
    let slug = slugify_url(base.as_str());
    let final_assets = relocate(staged, &output_dir.join(format!("{slug}_assets"))).await?;

    // ── Document phase ───────────────────────────────────────────────────
    run.enter(SnapshotState::Rewriting);
    let rewritten = rewrite(&page.html, &base, &final_assets.map, &output_dir);

    run.enter(SnapshotState::Converting);
    let mut markdown = config.converter.convert_markup(&rewritten).await?;

    let mut descriptions = Vec::new();
    if config.caption_images && !final_assets.images.is_empty() {
        run.enter(SnapshotState::Describing);
        descriptions = describe_images(&final_assets, config).await;
        let section = descriptions_section(
            descriptions
                .iter()
                .map(|d| (d.name.as_str(), d.description.as_str())),
        );
        if !section.is_empty() {
            markdown = format!("{}\n\n{}", markdown.trim_end(), section);
        }
    }

    let document_path = output_dir.join(format!("{slug}.md"));
    write_atomic(&document_path, &markdown).await?;

    let (raw_markup_path, rewritten_markup_path) = if config.save_html {
        let raw = output_dir.join(format!("{slug}.raw.html"));
        let html = output_dir.join(format!("{slug}.html"));
        write_atomic(&raw, &page.html).await?;
        write_atomic(&html, &rewritten).await?;
        (Some(raw), Some(html))
    } else {
        (None, None)
    };

    run.enter(SnapshotState::Done);
    info!(
        "Snapshot written to {} ({} assets, {} descriptions, {}ms)",
        document_path.display(),
        final_assets.files.len(),
        descriptions.len(),
        start.elapsed().as_millis()
    );

    Ok(SnapshotResult {
        requested_url: requested.to_string(),
        resolved_url: base.to_string(),
        slug,
        document_path,
        markdown,
        assets_dir: final_assets.dir,
        assets: final_assets.files,
        images: final_assets.images,
        descriptions,
        raw_markup_path,
        rewritten_markup_path,
        stats,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

async fn create_temp_dir(work_dir: Option<&Path>) -> Result<TempDir, SnapshotError> {
    let builder = {
        let mut b = tempfile::Builder::new();
        b.prefix("snap2md-");
        b
    };
    match work_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SnapshotError::io(dir, e))?;
            builder.tempdir_in(dir).map_err(|e| SnapshotError::io(dir, e))
        }
        None => builder
            .tempdir()
            .map_err(|e| SnapshotError::io(std::env::temp_dir(), e)),
    }
}

/// Create the output directory and return its absolute form, so relative
/// links are computed between two absolute paths.
async fn prepare_output_dir(dir: &Path) -> Result<PathBuf, SnapshotError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SnapshotError::io(dir, e))?;
    tokio::fs::canonicalize(dir)
        .await
        .map_err(|e| SnapshotError::io(dir, e))
}

/// Load, settle and read the page. Does not quit the driver.
async fn capture_page(
    driver: &mut dyn BrowserDriver,
    url: &str,
    run: &Run<'_>,
) -> Result<PageCapture, SnapshotError> {
    let config = run.config;

    let load_secs = config.page_load_timeout_secs;
    timeout(Duration::from_secs(load_secs), driver.navigate(url))
        .await
        .map_err(|_| SnapshotError::Timeout {
            stage: "page load",
            secs: load_secs,
        })??;

    let ready_secs = config.ready_timeout_secs;
    timeout(Duration::from_secs(ready_secs), wait_until_complete(driver))
        .await
        .map_err(|_| SnapshotError::Timeout {
            stage: "document ready",
            secs: ready_secs,
        })??;

    run.enter(SnapshotState::Ready);
    auto_scroll(driver, config).await;

    run.enter(SnapshotState::Scraping);
    let user_agent = match driver.execute_script("return navigator.userAgent").await {
        Ok(serde_json::Value::String(ua)) if !ua.trim().is_empty() => ua,
        _ => FALLBACK_USER_AGENT.to_string(),
    };
    let cookies = driver.cookies().await.unwrap_or_else(|e| {
        debug!("Could not read cookies: {}", e);
        Vec::new()
    });
    let html = driver.page_source().await?;
    let resolved_url = driver.current_url().await?;
    debug!(
        "Captured {} bytes of markup from {} ({} cookies)",
        html.len(),
        resolved_url,
        cookies.len()
    );

    Ok(PageCapture {
        html,
        resolved_url,
        user_agent,
        cookies,
    })
}

async fn wait_until_complete(driver: &mut dyn BrowserDriver) -> Result<(), SnapshotError> {
    loop {
        let state = driver.execute_script("return document.readyState").await?;
        if state.as_str() == Some("complete") {
            return Ok(());
        }
        sleep(READY_POLL_INTERVAL).await;
    }
}

async fn scroll_height(driver: &mut dyn BrowserDriver) -> Option<f64> {
    match driver
        .execute_script("return document.body ? document.body.scrollHeight : 0")
        .await
    {
        Ok(v) => v.as_f64(),
        Err(e) => {
            warn!("Could not read scroll height: {}", e);
            None
        }
    }
}

/// Scroll to the bottom until the page stops growing, so lazy content loads.
///
/// Best effort: a script error ends scrolling but not the run.
async fn auto_scroll(driver: &mut dyn BrowserDriver, config: &SnapshotConfig) {
    let Some(mut last) = scroll_height(driver).await else {
        return;
    };
    for step in 1..=config.max_scroll_steps {
        if let Err(e) = driver
            .execute_script("window.scrollTo(0, document.body.scrollHeight);")
            .await
        {
            warn!("Scrolling stopped: {}", e);
            return;
        }
        sleep(Duration::from_millis(config.scroll_pause_ms)).await;
        let Some(height) = scroll_height(driver).await else {
            return;
        };
        if height == last {
            debug!("Page height settled at {} after {} scroll steps", height, step);
            return;
        }
        last = height;
    }
    debug!("Stopped scrolling after {} steps", config.max_scroll_steps);
}

async fn describe_images(assets: &FinalAssets, config: &SnapshotConfig) -> Vec<ImageDescription> {
    let describer = match resolve_describer(config) {
        Ok(d) => d,
        Err(e) => {
            warn!("Skipping image descriptions: {}", e);
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(assets.images.len());
    for image in &assets.images {
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match describer.describe(image, &config.prompt, &config.model).await {
            Ok(description) => {
                debug!("Described {}", name);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_described(&name, None);
                }
                out.push(ImageDescription {
                    image: image.clone(),
                    name,
                    description,
                });
            }
            Err(e) => {
                warn!("Could not describe {}: {}", name, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_described(&name, Some(&e.to_string()));
                }
            }
        }
    }
    out
}

/// Write via a sibling temp file and rename, so readers never see a
/// half-written document.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), SnapshotError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| SnapshotError::io(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| SnapshotError::io(path, e))
}
