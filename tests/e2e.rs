//! End-to-end tests against a real Chrome/Chromium.
//!
//! They launch a browser and, for the captioning test, call a live vision
//! API, so they are gated behind the `E2E_ENABLED` environment variable and
//! do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! Captioning additionally needs `OPENAI_API_KEY`.

#![cfg(feature = "chromium")]

mod common;

use common::{AssetServer, Route, PNG_BYTES};
use snap2md::browser::chromium::ChromiumLauncher;
use snap2md::{capture_url, SnapshotConfig, SnapshotState};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    };
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("snap2md=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn browser_executable() -> Option<PathBuf> {
    std::env::var_os("SNAP2MD_BROWSER").map(PathBuf::from)
}

fn site() -> AssetServer {
    AssetServer::start(vec![
        (
            "/",
            Route::ok(
                "text/html; charset=utf-8",
                r#"<!doctype html><html><head><title>E2E</title>
                <link rel="stylesheet" href="/style.css"></head>
                <body><h1>Snapshot test</h1>
                <p>Rendered <em>by a browser</em>.</p>
                <img src="/red.png" alt="red dot">
                <div id="late"></div>
                <script>
                  document.getElementById('late').innerHTML = '<p>Added by script</p>';
                  document.cookie = 'visited=yes; path=/';
                </script>
                </body></html>"#,
            ),
        ),
        ("/style.css", Route::ok("text/css", "h1 { color: red; }")),
        ("/red.png", Route::ok("image/png", PNG_BYTES)),
    ])
}

#[derive(Default)]
struct States(Mutex<Vec<SnapshotState>>);

impl snap2md::SnapshotProgressCallback for States {
    fn on_state(&self, state: SnapshotState) {
        self.0.lock().unwrap().push(state);
    }
}

#[tokio::test]
async fn e2e_capture_local_site() {
    e2e_skip_unless_enabled!();
    init_tracing();

    let server = site();
    let out = tempfile::tempdir().unwrap();
    let states = Arc::new(States::default());
    let mut builder = SnapshotConfig::builder()
        .output_dir(out.path())
        .save_html(true)
        .progress_callback(states.clone());
    if let Some(exe) = browser_executable() {
        builder = builder.browser_executable(exe);
    }
    let config = builder.build().unwrap();

    let result = capture_url(&server.url("/"), &ChromiumLauncher, &config)
        .await
        .expect("capture should succeed");

    println!("{}", result.markdown);
    assert!(result.markdown.contains("# Snapshot test"));
    assert!(
        result.markdown.contains("Added by script"),
        "script-generated content missing"
    );
    assert_eq!(result.stats.saved, 2);
    assert_eq!(result.images.len(), 1);
    assert!(result.rewritten_markup_path.unwrap().is_file());
    assert_eq!(server.hits("/red.png"), 1);
    assert!(server
        .request_headers("/red.png")
        .iter()
        .any(|h| h.starts_with("cookie:") && h.contains("visited=yes")));
    assert_eq!(
        states.0.lock().unwrap().last(),
        Some(&SnapshotState::Done)
    );
}

#[tokio::test]
async fn e2e_capture_with_descriptions() {
    e2e_skip_unless_enabled!();
    let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
        println!("SKIP — OPENAI_API_KEY not set");
        return;
    };
    init_tracing();

    let server = site();
    let out = tempfile::tempdir().unwrap();
    let mut builder = SnapshotConfig::builder()
        .output_dir(out.path())
        .caption_images(true)
        .api_key(api_key);
    if let Some(exe) = browser_executable() {
        builder = builder.browser_executable(exe);
    }
    let config = builder.build().unwrap();

    let result = capture_url(&server.url("/"), &ChromiumLauncher, &config)
        .await
        .expect("capture should succeed");

    println!("{}", result.markdown);
    assert_eq!(result.descriptions.len(), 1);
    assert!(result.markdown.contains("## Image descriptions"));
}
