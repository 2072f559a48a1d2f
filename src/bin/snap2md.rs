//! CLI binary for snap2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `SnapshotConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use snap2md::browser::chromium::ChromiumLauncher;
use snap2md::{
    capture_url, process_files, FetchResult, FileOutcome, ProgressCallback, SnapshotConfig,
    SnapshotProgressCallback, SnapshotState,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner naming the current state, with one log line
/// per asset problem, described image and processed file.
struct CliProgressCallback {
    bar: ProgressBar,
    saved: AtomicUsize,
    problems: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            saved: AtomicUsize::new(0),
            problems: AtomicUsize::new(0),
        })
    }
}

impl SnapshotProgressCallback for CliProgressCallback {
    fn on_state(&self, state: SnapshotState) {
        match state {
            SnapshotState::Done | SnapshotState::Failed => {
                self.bar.finish_and_clear();
                let problems = self.problems.load(Ordering::SeqCst);
                if problems > 0 {
                    eprintln!("{} {} items skipped or failed", cyan("⚠"), problems);
                }
            }
            SnapshotState::Fetching => {
                self.bar.set_prefix("Fetching");
                self.bar.set_message("assets…");
            }
            other => {
                self.bar.set_prefix(other.to_string());
                self.bar.set_message("");
            }
        }
    }

    fn on_asset(&self, url: &str, result: &FetchResult) {
        match result {
            FetchResult::Saved { .. } => {
                let n = self.saved.fetch_add(1, Ordering::SeqCst) + 1;
                self.bar.set_message(format!("{n} saved"));
            }
            FetchResult::Rejected(reason) => {
                self.problems.fetch_add(1, Ordering::SeqCst);
                self.bar.println(format!(
                    "  {} {}  {}",
                    cyan("⚠"),
                    truncate(url, 70),
                    dim(&reason.to_string())
                ));
            }
            FetchResult::Failed(error) => {
                self.problems.fetch_add(1, Ordering::SeqCst);
                self.bar.println(format!(
                    "  {} {}  {}",
                    red("✗"),
                    truncate(url, 70),
                    red(&truncate(error, 60))
                ));
            }
        }
    }

    fn on_image_described(&self, name: &str, error: Option<&str>) {
        match error {
            None => self.bar.println(format!("  {} {}", green("✓"), name)),
            Some(e) => {
                self.problems.fetch_add(1, Ordering::SeqCst);
                self.bar
                    .println(format!("  {} {}  {}", red("✗"), name, red(&truncate(e, 80))));
            }
        }
    }

    fn on_file_processed(&self, outcome: &FileOutcome) {
        let input = outcome.input().display().to_string();
        let line = match outcome {
            FileOutcome::Converted { output, .. } => {
                format!("  {} {}  →  {}", green("✓"), input, output.display())
            }
            FileOutcome::Skipped { reason, .. } => {
                format!("  {} {}  {}", cyan("–"), input, dim(reason))
            }
            FileOutcome::Failed { error, .. } => {
                self.problems.fetch_add(1, Ordering::SeqCst);
                format!("  {} {}  {}", red("✗"), input, red(&truncate(error, 80)))
            }
        };
        self.bar.println(line);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Snapshot a page into ./snapshots
  snap2md capture https://example.com/article -o snapshots

  # Snapshot and describe every image with a vision model
  OPENAI_API_KEY=sk-... snap2md capture --describe https://example.com/

  # Use another provider through edgequake-llm
  snap2md capture --describe --provider anthropic --model claude-sonnet-4-20250514 https://example.com/

  # Keep the rewritten and raw HTML next to the Markdown
  snap2md capture --save-html https://example.com/

  # Convert local files
  snap2md convert page.html chart.png -o notes

OUTPUT:
  <output>/<slug>.md           the Markdown document
  <output>/<slug>_assets/      downloaded images, stylesheets and scripts
  <output>/<slug>.html         rewritten HTML (with --save-html)
  <output>/<slug>.raw.html     HTML as captured (with --save-html)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Key for the default OpenAI-compatible describer
  SNAP2MD_OUTPUT          Output directory
  SNAP2MD_MODEL           Vision model ID
  SNAP2MD_PROVIDER        edgequake-llm provider name
  SNAP2MD_BROWSER         Chrome/Chromium binary
  RUST_LOG                Log filter (overrides --verbose)
"#;

/// Snapshot web pages with their assets and convert them to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "snap2md",
    version,
    about = "Snapshot web pages with their assets and convert them to Markdown",
    long_about = "Load a page in a real browser, download every image, stylesheet and script it \
references, rewrite the links to the local copies and convert the page to Markdown. Optionally \
describe each image with a vision model (OpenAI, Anthropic, Gemini, Ollama, …).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SNAP2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SNAP2MD_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "SNAP2MD_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot a URL.
    Capture(CaptureArgs),
    /// Convert local HTML, document and image files.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// HTTP/HTTPS URL to capture.
    url: String,

    #[command(flatten)]
    common: CommonArgs,

    /// Show the browser window.
    #[arg(long, env = "SNAP2MD_HEADFUL")]
    headful: bool,

    /// Chrome/Chromium binary to launch.
    #[arg(long, env = "SNAP2MD_BROWSER")]
    browser: Option<PathBuf>,

    /// Directory for the per-run temporary directory.
    #[arg(long, env = "SNAP2MD_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Also write the rewritten and raw HTML.
    #[arg(long, env = "SNAP2MD_SAVE_HTML")]
    save_html: bool,

    /// Largest asset to keep, in bytes.
    #[arg(long, env = "SNAP2MD_MAX_ASSET_BYTES", default_value_t = 8 * 1024 * 1024)]
    max_asset_bytes: u64,

    /// Simultaneous asset downloads (1 = sequential).
    #[arg(short, long, env = "SNAP2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Per-asset download timeout in seconds.
    #[arg(long, env = "SNAP2MD_ASSET_TIMEOUT", default_value_t = 30)]
    asset_timeout: u64,

    /// Page load timeout in seconds.
    #[arg(long, env = "SNAP2MD_PAGE_TIMEOUT", default_value_t = 60)]
    page_timeout: u64,

    /// Print the result as JSON instead of a summary.
    #[arg(long, env = "SNAP2MD_JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Files to convert.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,

    /// Print the per-file outcomes as JSON.
    #[arg(long, env = "SNAP2MD_JSON")]
    json: bool,
}

/// Flags shared by both subcommands.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Output directory.
    #[arg(short, long, env = "SNAP2MD_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Describe images with a vision model.
    #[arg(long, env = "SNAP2MD_DESCRIBE")]
    describe: bool,

    /// Vision model ID.
    #[arg(long, env = "SNAP2MD_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider: openai, anthropic, gemini, ollama, azure, …
    #[arg(
        long,
        env = "SNAP2MD_PROVIDER",
        long_help = "Caption through an edgequake-llm provider instead of the built-in \
          OpenAI-compatible client. The provider reads its own credential from the environment."
    )]
    provider: Option<String>,

    /// API key for the OpenAI-compatible describer.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "SNAP2MD_API_BASE")]
    api_base: Option<String>,

    /// Path to a text file containing a custom caption prompt.
    #[arg(long, env = "SNAP2MD_PROMPT")]
    prompt: Option<PathBuf>,

    /// Retries per image on transient API failures.
    #[arg(long, env = "SNAP2MD_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; library INFO logs
    // would only interleave with it.
    let json = match &cli.command {
        Command::Capture(a) => a.json,
        Command::Convert(a) => a.json,
    };
    let show_progress = !cli.quiet && !cli.no_progress && !json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn SnapshotProgressCallback>)
    } else {
        None
    };

    match cli.command {
        Command::Capture(ref args) => run_capture(args, &cli, progress).await,
        Command::Convert(ref args) => run_convert(args, &cli, progress).await,
    }
}

async fn run_capture(args: &CaptureArgs, cli: &Cli, progress: Option<ProgressCallback>) -> Result<()> {
    let mut builder = common_builder(&args.common, progress).await?
        .headless(!args.headful)
        .save_html(args.save_html)
        .max_asset_bytes(args.max_asset_bytes)
        .fetch_concurrency(args.concurrency)
        .asset_timeout_secs(args.asset_timeout)
        .page_load_timeout_secs(args.page_timeout);
    if let Some(ref exe) = args.browser {
        builder = builder.browser_executable(exe);
    }
    if let Some(ref dir) = args.work_dir {
        builder = builder.work_dir(dir);
    }
    let config = builder.build().context("Invalid configuration")?;

    let result = capture_url(&args.url, &ChromiumLauncher, &config)
        .await
        .with_context(|| format!("Snapshot of {} failed", args.url))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        let s = result.stats;
        eprintln!(
            "{}  {}  →  {}",
            if s.rejected + s.failed == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            result.resolved_url,
            bold(&result.document_path.display().to_string()),
        );
        eprintln!(
            "   {} assets saved  /  {} rejected  /  {} failed  —  {}ms",
            dim(&s.saved.to_string()),
            dim(&s.rejected.to_string()),
            dim(&s.failed.to_string()),
            result.duration_ms,
        );
        if !result.descriptions.is_empty() {
            eprintln!(
                "   {} of {} images described",
                dim(&result.descriptions.len().to_string()),
                result.images.len()
            );
        }
    }
    Ok(())
}

async fn run_convert(args: &ConvertArgs, cli: &Cli, progress: Option<ProgressCallback>) -> Result<()> {
    let config = common_builder(&args.common, progress)
        .await?
        .build()
        .context("Invalid configuration")?;

    let outcomes = process_files(&args.files, &config).await;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcomes).context("Failed to serialise outcomes")?
        );
    } else if !cli.quiet {
        let converted = outcomes.iter().filter(|o| o.is_converted()).count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Failed { .. }))
            .count();
        eprintln!(
            "{} {}/{} files converted{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&converted.to_string()),
            outcomes.len(),
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        );
    }

    if !outcomes.is_empty() && outcomes.iter().all(|o| matches!(o, FileOutcome::Failed { .. })) {
        anyhow::bail!("No file could be converted");
    }
    Ok(())
}

/// Map the shared flags onto a config builder.
async fn common_builder(
    args: &CommonArgs,
    progress: Option<ProgressCallback>,
) -> Result<snap2md::SnapshotConfigBuilder> {
    let mut builder = SnapshotConfig::builder()
        .output_dir(&args.output)
        .caption_images(args.describe)
        .caption_max_retries(args.max_retries);

    if let Some(ref path) = args.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt.trim());
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref base) = args.api_base {
        builder = builder.api_base_url(base);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    Ok(builder)
}
