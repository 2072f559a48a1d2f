//! Configuration for a snapshot run.
//!
//! Every knob lives in [`SnapshotConfig`], built through
//! [`SnapshotConfigBuilder`]. The builder lets callers set only what they care
//! about and rely on documented defaults for the rest; `build()` rejects
//! values that would make a run hang or do nothing.

use crate::error::SnapshotError;
use crate::pipeline::fetch::{FetchPolicy, DEFAULT_MAX_ASSET_BYTES};
use crate::pipeline::describe::{ImageDescriber, OPENAI_API_BASE};
use crate::pipeline::markdown::{DocumentConverter, MarkdownConverter};
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_CAPTION_PROMPT;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default captioning model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for [`crate::snapshot::capture_url`] and
/// [`crate::files::process_files`].
///
/// # Example
/// ```rust
/// use snap2md::SnapshotConfig;
///
/// let config = SnapshotConfig::builder()
///     .output_dir("snapshots")
///     .caption_images(true)
///     .api_key("sk-...")
///     .fetch_concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct SnapshotConfig {
    /// Where `<slug>.md` and `<slug>_assets/` are written. Default: `.`.
    pub output_dir: PathBuf,

    /// Parent directory for the per-run temporary directory.
    /// Default: the system temp directory.
    pub work_dir: Option<PathBuf>,

    /// Run the browser without a window. Default: true.
    pub headless: bool,

    /// Browser binary to launch instead of the auto-detected one.
    pub browser_executable: Option<PathBuf>,

    /// Describe captured images and append a description section. Default: false.
    pub caption_images: bool,

    /// Captioning model identifier. Default: `gpt-4o-mini`.
    pub model: String,

    /// Instruction sent with every image. Default: [`DEFAULT_CAPTION_PROMPT`].
    pub prompt: String,

    /// API key for the OpenAI-compatible describer. Never read from the
    /// environment by the library.
    pub api_key: Option<String>,

    /// Root of the OpenAI-compatible API. Default: `https://api.openai.com/v1`.
    pub api_base_url: String,

    /// `edgequake_llm` provider name (e.g. "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed `edgequake_llm` provider. Takes precedence over
    /// `provider_name` and `api_key`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed describer. Takes precedence over every other
    /// captioning setting.
    pub describer: Option<Arc<dyn ImageDescriber>>,

    /// Turns the rewritten page into Markdown. Default: [`MarkdownConverter`].
    pub converter: Arc<dyn DocumentConverter>,

    /// Largest accepted asset, declared or streamed. Default: 8 MiB.
    pub max_asset_bytes: u64,

    /// Per-asset request timeout in seconds. Default: 30.
    pub asset_timeout_secs: u64,

    /// Asset downloads in flight at once. Default: 1.
    ///
    /// Naming stays deterministic at any value: downloads overlap, but files
    /// are named in URL order.
    pub fetch_concurrency: usize,

    /// Bound on the initial navigation in seconds. Default: 60.
    pub page_load_timeout_secs: u64,

    /// Bound on waiting for `document.readyState == "complete"`. Default: 30.
    pub ready_timeout_secs: u64,

    /// Pause after each scroll step in milliseconds. Default: 800.
    pub scroll_pause_ms: u64,

    /// Scroll steps before giving up on a growing page. Default: 20.
    pub max_scroll_steps: u32,

    /// Keep `<slug>.html` (rewritten) and `<slug>.raw.html` next to the
    /// document. Default: false.
    pub save_html: bool,

    /// Retries per image on transient API failures. Default: 2.
    pub caption_max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Token cap for each description. Default: 300.
    pub caption_max_tokens: usize,

    /// Receives state and per-item events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            work_dir: None,
            headless: true,
            browser_executable: None,
            caption_images: false,
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_CAPTION_PROMPT.to_string(),
            api_key: None,
            api_base_url: OPENAI_API_BASE.to_string(),
            provider_name: None,
            provider: None,
            describer: None,
            converter: Arc::new(MarkdownConverter),
            max_asset_bytes: DEFAULT_MAX_ASSET_BYTES,
            asset_timeout_secs: 30,
            fetch_concurrency: 1,
            page_load_timeout_secs: 60,
            ready_timeout_secs: 30,
            scroll_pause_ms: 800,
            max_scroll_steps: 20,
            save_html: false,
            caption_max_retries: 2,
            retry_backoff_ms: 500,
            caption_max_tokens: 300,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SnapshotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotConfig")
            .field("output_dir", &self.output_dir)
            .field("work_dir", &self.work_dir)
            .field("headless", &self.headless)
            .field("browser_executable", &self.browser_executable)
            .field("caption_images", &self.caption_images)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("describer", &self.describer.as_ref().map(|_| "<dyn ImageDescriber>"))
            .field("max_asset_bytes", &self.max_asset_bytes)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("page_load_timeout_secs", &self.page_load_timeout_secs)
            .field("ready_timeout_secs", &self.ready_timeout_secs)
            .field("save_html", &self.save_html)
            .finish()
    }
}

impl SnapshotConfig {
    /// Create a new builder for `SnapshotConfig`.
    pub fn builder() -> SnapshotConfigBuilder {
        SnapshotConfigBuilder {
            config: Self::default(),
        }
    }

    /// The fetch limits this configuration implies.
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_bytes: self.max_asset_bytes,
            concurrency: self.fetch_concurrency.max(1),
        }
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_timeout_secs)
    }
}

/// Builder for [`SnapshotConfig`].
#[derive(Debug)]
pub struct SnapshotConfigBuilder {
    config: SnapshotConfig,
}

impl SnapshotConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_executable = Some(path.into());
        self
    }

    pub fn caption_images(mut self, v: bool) -> Self {
        self.config.caption_images = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.config.describer = Some(describer);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.config.converter = converter;
        self
    }

    pub fn max_asset_bytes(mut self, n: u64) -> Self {
        self.config.max_asset_bytes = n;
        self
    }

    pub fn asset_timeout_secs(mut self, secs: u64) -> Self {
        self.config.asset_timeout_secs = secs;
        self
    }

    pub fn fetch_concurrency(mut self, n: usize) -> Self {
        self.config.fetch_concurrency = n.max(1);
        self
    }

    pub fn page_load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_load_timeout_secs = secs;
        self
    }

    pub fn ready_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ready_timeout_secs = secs;
        self
    }

    pub fn scroll_pause_ms(mut self, ms: u64) -> Self {
        self.config.scroll_pause_ms = ms;
        self
    }

    pub fn max_scroll_steps(mut self, n: u32) -> Self {
        self.config.max_scroll_steps = n;
        self
    }

    pub fn save_html(mut self, v: bool) -> Self {
        self.config.save_html = v;
        self
    }

    pub fn caption_max_retries(mut self, n: u32) -> Self {
        self.config.caption_max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn caption_max_tokens(mut self, n: usize) -> Self {
        self.config.caption_max_tokens = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SnapshotConfig, SnapshotError> {
        let c = &self.config;
        if c.max_asset_bytes == 0 {
            return Err(SnapshotError::InvalidConfig(
                "max_asset_bytes must be ≥ 1".into(),
            ));
        }
        for (name, secs) in [
            ("asset_timeout_secs", c.asset_timeout_secs),
            ("page_load_timeout_secs", c.page_load_timeout_secs),
            ("ready_timeout_secs", c.ready_timeout_secs),
        ] {
            if secs == 0 {
                return Err(SnapshotError::InvalidConfig(format!("{name} must be ≥ 1")));
            }
        }
        if c.fetch_concurrency > 64 {
            return Err(SnapshotError::InvalidConfig(format!(
                "fetch_concurrency must be 1–64, got {}",
                c.fetch_concurrency
            )));
        }
        if c.caption_images && c.model.trim().is_empty() {
            return Err(SnapshotError::InvalidConfig(
                "a model is required when captioning is enabled".into(),
            ));
        }
        Ok(self.config)
    }
}
