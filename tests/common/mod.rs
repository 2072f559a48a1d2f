//! Shared fixtures for the integration tests: a tiny HTTP server for assets
//! and an in-memory browser.

#![allow(dead_code)]

use async_trait::async_trait;
use snap2md::{BrowserDriver, BrowserError, BrowserLauncher, BrowserOptions, Cookie};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// ── Asset server ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Send `Content-Length`; without it the body ends when the connection closes.
    pub declare_length: bool,
}

impl Route {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
            declare_length: true,
        }
    }

    pub fn undeclared(mut self) -> Self {
        self.declare_length = false;
        self
    }

    pub fn status(code: u16) -> Self {
        Self {
            status: code,
            content_type: Some("text/plain".into()),
            body: b"nope".to_vec(),
            declare_length: true,
        }
    }
}

#[derive(Default)]
struct ServerState {
    routes: HashMap<String, Route>,
    hits: HashMap<String, usize>,
    headers: HashMap<String, Vec<String>>,
}

/// Serves fixed routes on 127.0.0.1 from a background thread, one thread per
/// connection, always with `Connection: close`.
pub struct AssetServer {
    pub base: String,
    state: Arc<Mutex<ServerState>>,
}

impl AssetServer {
    pub fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(ServerState {
            routes: routes
                .into_iter()
                .map(|(p, r)| (p.to_string(), r))
                .collect(),
            ..ServerState::default()
        }));

        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let shared = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &shared));
            }
        });

        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.lock().unwrap().hits.get(path).copied().unwrap_or(0)
    }

    /// Raw header lines received for `path` (last request), lower-cased names.
    pub fn request_headers(&self, path: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .headers
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

fn handle(mut stream: TcpStream, state: &Mutex<ServerState>) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let request = String::from_utf8_lossy(&buf).into_owned();
    let mut lines = request.split("\r\n");
    let path = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let header_lines: Vec<String> = lines
        .take_while(|l| !l.is_empty())
        .map(|l| match l.split_once(':') {
            Some((k, v)) => format!("{}:{}", k.to_ascii_lowercase(), v),
            None => l.to_string(),
        })
        .collect();

    let route = {
        let mut s = state.lock().unwrap();
        *s.hits.entry(path.clone()).or_default() += 1;
        s.headers.insert(path.clone(), header_lines);
        s.routes.get(&path).cloned()
    };
    let route = route.unwrap_or_else(|| Route::status(404));

    let mut head = format!("HTTP/1.1 {} X\r\nConnection: close\r\n", route.status);
    if let Some(ct) = &route.content_type {
        head.push_str(&format!("Content-Type: {ct}\r\n"));
    }
    if route.declare_length {
        head.push_str(&format!("Content-Length: {}\r\n", route.body.len()));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&route.body);
    let _ = stream.flush();
}

/// 1x1 transparent PNG.
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

// ── Fake browser ─────────────────────────────────────────────────────────────

/// How the fake page behaves.
#[derive(Clone, Default)]
pub struct FakePage {
    pub html: String,
    /// URL reported after navigation; defaults to the requested one.
    pub final_url: Option<String>,
    pub cookies: Vec<Cookie>,
    /// `navigate` never returns.
    pub hang_on_navigate: bool,
    /// `document.readyState` never becomes `complete`.
    pub never_ready: bool,
    /// `page_source` fails with this message.
    pub source_error: Option<String>,
    /// `scrollHeight` grows by 500 after every scroll instead of staying put.
    pub endless_scroll: bool,
}

/// Counts sessions and quits so tests can check cleanup.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub page: FakePage,
    pub launches: Arc<AtomicUsize>,
    pub quits: Arc<AtomicUsize>,
    /// `window.scrollTo` calls across all sessions.
    pub scrolls: Arc<AtomicUsize>,
    pub fail_launch: bool,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &BrowserOptions) -> Result<Box<dyn BrowserDriver>, BrowserError> {
        if self.fail_launch {
            return Err(BrowserError::new("no browser here"));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDriver {
            page: self.page.clone(),
            current: String::new(),
            quits: Arc::clone(&self.quits),
            scrolls: Arc::clone(&self.scrolls),
            height: 1000,
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeDriver {
    page: FakePage,
    current: String,
    quits: Arc<AtomicUsize>,
    scrolls: Arc<AtomicUsize>,
    height: u64,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        if self.page.hang_on_navigate {
            std::future::pending::<()>().await;
        }
        self.current = self.page.final_url.clone().unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.current.clone())
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        match &self.page.source_error {
            Some(msg) => Err(BrowserError::new(msg.clone())),
            None => Ok(self.page.html.clone()),
        }
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, BrowserError> {
        if script.contains("readyState") {
            let state = if self.page.never_ready { "loading" } else { "complete" };
            return Ok(serde_json::json!(state));
        }
        if script.contains("userAgent") {
            return Ok(serde_json::json!("snap2md-test-agent"));
        }
        if script.contains("scrollTo") {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            if self.page.endless_scroll {
                self.height += 500;
            }
            return Ok(serde_json::Value::Null);
        }
        if script.contains("scrollHeight") {
            return Ok(serde_json::json!(self.height));
        }
        Ok(serde_json::Value::Null)
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>, BrowserError> {
        Ok(self.page.cookies.clone())
    }

    async fn quit(&mut self) -> Result<(), BrowserError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.quits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
