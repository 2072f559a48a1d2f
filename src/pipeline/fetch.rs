//! Asset download: the staging generation of the URL→path map.
//!
//! Every URL is streamed into a private part file under `<dest>/.incoming/`.
//! Downloads may overlap (`FetchPolicy::concurrency`), but the results are
//! consumed strictly in URL order and only then named, so collision suffixes
//! are assigned exactly as a sequential run would assign them.
//!
//! ```text
//! urls (sorted) ──▶ GET ──▶ type/size policy ──▶ .incoming/N.part
//!                                                     │ (in URL order)
//!                                       claim name ◀──┘
//!                                           │
//!                                        rename ──▶ UrlMap<Staged>
//! ```
//!
//! A single URL can only ever shrink the result; the batch aborts solely
//! when the staging directory itself cannot be created.

use crate::browser::Cookie;
use crate::error::SnapshotError;
use crate::output::FetchStats;
use crate::pipeline::naming::{
    claim_unique_path, content_type_essence, derive_filename, is_image_path,
};
use futures::stream::{self, StreamExt};
use reqwest::cookie::Jar;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Default per-asset byte ceiling: 8 MiB.
pub const DEFAULT_MAX_ASSET_BYTES: u64 = 8 * 1024 * 1024;

/// User agent sent when the browser does not report one.
pub const FALLBACK_USER_AGENT: &str = "Mozilla/5.0";

const INCOMING_DIR: &str = ".incoming";

const SCRIPT_CONTENT_TYPES: &[&str] = &[
    "application/javascript",
    "text/javascript",
    "application/x-javascript",
    "application/ecmascript",
    "text/ecmascript",
];

// ── URL map ─────────────────────────────────────────────────────────────────

/// Marker: paths point into the temporary staging directory.
#[derive(Debug, Clone, Copy)]
pub struct Staged;

/// Marker: paths point into the final `<slug>_assets` directory.
#[derive(Debug, Clone, Copy)]
pub struct Final;

/// Absolute asset URL → local file path, tagged with the generation it
/// belongs to.
///
/// A `UrlMap<Staged>` is only produced by [`fetch`] and a `UrlMap<Final>` only
/// by [`crate::pipeline::relocate::relocate`], so the rewriter cannot be
/// handed paths that are about to disappear with the temp directory.
#[derive(Debug, Clone)]
pub struct UrlMap<P> {
    entries: BTreeMap<String, PathBuf>,
    _phase: PhantomData<P>,
}

impl<P> UrlMap<P> {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            _phase: PhantomData,
        }
    }

    pub(crate) fn insert(&mut self, url: String, path: PathBuf) {
        self.entries.insert(url, path);
    }

    pub fn get(&self, url: &str) -> Option<&Path> {
        self.entries.get(url).map(PathBuf::as_path)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in URL order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(u, p)| (u.as_str(), p.as_path()))
    }
}

// ── Per-URL outcome ─────────────────────────────────────────────────────────

/// Why an asset was refused by policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The declared type is not an image, stylesheet or script. Empty when
    /// the server sent no `Content-Type`.
    DisallowedType { content_type: String },
    /// The body is larger than the configured ceiling.
    Oversize { limit: u64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::DisallowedType { content_type } if content_type.is_empty() => {
                write!(f, "missing content type")
            }
            RejectReason::DisallowedType { content_type } => {
                write!(f, "content type '{content_type}' not allowed")
            }
            RejectReason::Oversize { limit } => write!(f, "larger than {limit} bytes"),
        }
    }
}

/// Outcome of downloading one asset URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Saved {
        path: PathBuf,
        bytes: u64,
        content_type: String,
    },
    Rejected(RejectReason),
    Failed(String),
}

impl FetchResult {
    pub fn is_saved(&self) -> bool {
        matches!(self, FetchResult::Saved { .. })
    }
}

// ── Policy & session ────────────────────────────────────────────────────────

/// Limits applied to every asset download.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Largest accepted body, declared or streamed. Default: 8 MiB.
    pub max_bytes: u64,
    /// Downloads in flight at once. Default: 1.
    pub concurrency: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_ASSET_BYTES,
            concurrency: 1,
        }
    }
}

/// Whether a content-type essence is on the asset allowlist.
pub fn is_allowed_content_type(essence: &str) -> bool {
    essence.starts_with("image/") || essence == "text/css" || SCRIPT_CONTENT_TYPES.contains(&essence)
}

/// HTTP client that presents itself like the browser which rendered the page.
///
/// Carries the browser's user agent as a default header and a cookie jar
/// seeded with the browser's cookies, so assets behind a session or a
/// consent wall come back the same way the page saw them.
#[derive(Clone)]
pub struct AssetSession {
    client: reqwest::Client,
}

impl AssetSession {
    /// A session without cookies.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, SnapshotError> {
        Self::build(user_agent, Jar::default(), timeout)
    }

    /// A session seeded with cookies captured from the browser.
    ///
    /// Cookies without a domain are scoped to `page_url`'s host.
    pub fn from_browser(
        user_agent: &str,
        cookies: &[Cookie],
        page_url: &Url,
        timeout: Duration,
    ) -> Result<Self, SnapshotError> {
        let jar = Jar::default();
        for cookie in cookies {
            match cookie_scope_url(cookie, page_url) {
                Some(scope) => jar.add_cookie_str(&cookie.to_set_cookie(), &scope),
                None => debug!("Skipping cookie '{}': unusable domain", cookie.name),
            }
        }
        debug!("Asset session seeded with {} cookies", cookies.len());
        Self::build(user_agent, jar, timeout)
    }

    fn build(user_agent: &str, jar: Jar, timeout: Duration) -> Result<Self, SnapshotError> {
        let user_agent = if user_agent.trim().is_empty() {
            FALLBACK_USER_AGENT
        } else {
            user_agent
        };
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_provider(Arc::new(jar))
            .timeout(timeout)
            .build()
            .map_err(|e| SnapshotError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl fmt::Debug for AssetSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetSession").finish_non_exhaustive()
    }
}

fn cookie_scope_url(cookie: &Cookie, page_url: &Url) -> Option<Url> {
    let domain = match cookie.domain.as_deref() {
        Some(d) if !d.trim_start_matches('.').is_empty() => d.trim_start_matches('.'),
        _ => return Some(page_url.clone()),
    };
    Url::parse(&format!("{}://{}/", page_url.scheme(), domain)).ok()
}

// ── Fetch ───────────────────────────────────────────────────────────────────

/// Everything the fetcher produced in the staging directory.
#[derive(Debug)]
pub struct StagedAssets {
    /// The staging directory the files live in.
    pub dir: PathBuf,
    /// Saved files, in URL order.
    pub saved: Vec<PathBuf>,
    /// The subset of `saved` with an image extension.
    pub images: Vec<PathBuf>,
    pub map: UrlMap<Staged>,
    /// Outcome for every requested URL.
    pub outcomes: BTreeMap<String, FetchResult>,
    pub stats: FetchStats,
}

/// Download every URL in `urls` into `dest_dir`.
///
/// URLs are processed in the set's (lexicographic) order. Each gets a
/// [`FetchResult`]; only saved files enter the map. Returns `Err` only when
/// `dest_dir` cannot be created.
pub async fn fetch(
    urls: &BTreeSet<String>,
    dest_dir: &Path,
    session: &AssetSession,
    policy: &FetchPolicy,
) -> Result<StagedAssets, SnapshotError> {
    let incoming = dest_dir.join(INCOMING_DIR);
    tokio::fs::create_dir_all(&incoming)
        .await
        .map_err(|e| SnapshotError::io(&incoming, e))?;

    info!(
        "Fetching {} assets into {} (concurrency {})",
        urls.len(),
        dest_dir.display(),
        policy.concurrency.max(1)
    );

    let mut staged = StagedAssets {
        dir: dest_dir.to_path_buf(),
        saved: Vec::new(),
        images: Vec::new(),
        map: UrlMap::new(),
        outcomes: BTreeMap::new(),
        stats: FetchStats {
            requested: urls.len(),
            ..FetchStats::default()
        },
    };

    let mut downloads = stream::iter(urls.iter().enumerate())
        .map(|(idx, url)| {
            let part = incoming.join(format!("{idx}.part"));
            async move { (url, download(url, part, session, policy).await) }
        })
        .buffered(policy.concurrency.max(1));

    while let Some((url, attempt)) = downloads.next().await {
        let result = match attempt {
            Attempt::Downloaded(body) => place(url, body, dest_dir).await,
            Attempt::Finished(result) => result,
        };
        record(&mut staged, url, result);
    }

    if let Err(e) = tokio::fs::remove_dir_all(&incoming).await {
        warn!("Could not remove {}: {}", incoming.display(), e);
    }

    info!(
        "Fetched {}/{} assets ({} rejected, {} failed)",
        staged.stats.saved, staged.stats.requested, staged.stats.rejected, staged.stats.failed
    );
    Ok(staged)
}

fn record(staged: &mut StagedAssets, url: &str, result: FetchResult) {
    match &result {
        FetchResult::Saved { path, bytes, .. } => {
            debug!("Saved {} → {} ({} bytes)", url, path.display(), bytes);
            staged.stats.saved += 1;
            staged.map.insert(url.to_string(), path.clone());
            if is_image_path(path) {
                staged.images.push(path.clone());
            }
            staged.saved.push(path.clone());
        }
        FetchResult::Rejected(reason) => {
            debug!("Rejected {}: {}", url, reason);
            staged.stats.rejected += 1;
        }
        FetchResult::Failed(msg) => {
            warn!("Failed to fetch {}: {}", url, msg);
            staged.stats.failed += 1;
        }
    }
    staged.outcomes.insert(url.to_string(), result);
}

/// A body that passed policy and sits in its part file.
struct Body {
    part: PathBuf,
    bytes: u64,
    content_type: String,
}

enum Attempt {
    Downloaded(Body),
    Finished(FetchResult),
}

async fn download(url: &str, part: PathBuf, session: &AssetSession, policy: &FetchPolicy) -> Attempt {
    match Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {}
        Ok(u) => {
            return Attempt::Finished(FetchResult::Failed(format!(
                "unsupported scheme '{}'",
                u.scheme()
            )))
        }
        Err(e) => return Attempt::Finished(FetchResult::Failed(e.to_string())),
    }

    let response = match session.client.get(url).send().await {
        Ok(r) => r,
        Err(e) => return Attempt::Finished(FetchResult::Failed(e.to_string())),
    };

    if !response.status().is_success() {
        return Attempt::Finished(FetchResult::Failed(format!("HTTP {}", response.status())));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(content_type_essence)
        .unwrap_or_default();
    if !is_allowed_content_type(&content_type) {
        return Attempt::Finished(FetchResult::Rejected(RejectReason::DisallowedType {
            content_type,
        }));
    }

    let limit = policy.max_bytes;
    if response.content_length().is_some_and(|n| n > limit) {
        return Attempt::Finished(FetchResult::Rejected(RejectReason::Oversize { limit }));
    }

    match stream_body(response, &part, limit).await {
        Ok(Some(bytes)) => Attempt::Downloaded(Body {
            part,
            bytes,
            content_type,
        }),
        Ok(None) => {
            discard(&part).await;
            Attempt::Finished(FetchResult::Rejected(RejectReason::Oversize { limit }))
        }
        Err(msg) => {
            discard(&part).await;
            Attempt::Finished(FetchResult::Failed(msg))
        }
    }
}

/// Stream the body into `part`, counting bytes.
///
/// `Ok(None)` means the ceiling was crossed and the write stopped.
async fn stream_body(
    response: reqwest::Response,
    part: &Path,
    limit: u64,
) -> Result<Option<u64>, String> {
    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| format!("create {}: {e}", part.display()))?;
    let mut body = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        written += chunk.len() as u64;
        if written > limit {
            return Ok(None);
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("write {}: {e}", part.display()))?;
    }
    file.flush()
        .await
        .map_err(|e| format!("flush {}: {e}", part.display()))?;
    Ok(Some(written))
}

/// Claim the final staging name for a downloaded body and move it there.
async fn place(url: &str, body: Body, dest_dir: &Path) -> FetchResult {
    let name = derive_filename(url, &body.content_type);
    let path = match claim_unique_path(dest_dir, &name).await {
        Ok(p) => p,
        Err(e) => {
            discard(&body.part).await;
            return FetchResult::Failed(format!("claim {name}: {e}"));
        }
    };
    if let Err(e) = tokio::fs::rename(&body.part, &path).await {
        discard(&body.part).await;
        discard(&path).await;
        return FetchResult::Failed(format!("move into {}: {e}", path.display()));
    }
    FetchResult::Saved {
        path,
        bytes: body.bytes,
        content_type: body.content_type,
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist() {
        assert!(is_allowed_content_type("image/png"));
        assert!(is_allowed_content_type("image/svg+xml"));
        assert!(is_allowed_content_type("text/css"));
        assert!(is_allowed_content_type("application/x-javascript"));
        assert!(!is_allowed_content_type("application/pdf"));
        assert!(!is_allowed_content_type("text/html"));
        assert!(!is_allowed_content_type(""));
    }

    #[test]
    fn reject_reason_display() {
        let r = RejectReason::DisallowedType {
            content_type: String::new(),
        };
        assert_eq!(r.to_string(), "missing content type");
        let r = RejectReason::Oversize { limit: 10 };
        assert!(r.to_string().contains("10 bytes"));
    }

    #[test]
    fn cookie_scope_uses_cookie_domain() {
        let page = Url::parse("https://www.example.com/a/b").unwrap();
        let c = Cookie {
            name: "sid".into(),
            value: "1".into(),
            domain: Some(".example.com".into()),
            path: Some("/".into()),
            secure: true,
        };
        assert_eq!(
            cookie_scope_url(&c, &page).unwrap().as_str(),
            "https://example.com/"
        );

        let hostless = Cookie {
            domain: None,
            ..c
        };
        assert_eq!(cookie_scope_url(&hostless, &page).unwrap(), page);
    }

    #[test]
    fn url_map_iterates_in_url_order() {
        let mut m: UrlMap<Staged> = UrlMap::new();
        m.insert("http://x/b".into(), PathBuf::from("/t/b"));
        m.insert("http://x/a".into(), PathBuf::from("/t/a"));
        let keys: Vec<_> = m.iter().map(|(u, _)| u.to_string()).collect();
        assert_eq!(keys, vec!["http://x/a", "http://x/b"]);
        assert_eq!(m.get("http://x/a"), Some(Path::new("/t/a")));
        assert!(!m.contains("http://x/c"));
    }

    #[tokio::test]
    async fn unsupported_scheme_fails_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let session = AssetSession::new("test", Duration::from_secs(5)).unwrap();
        let urls: BTreeSet<String> = ["data:image/png;base64,AAAA".to_string()].into();

        let staged = fetch(&urls, dir.path(), &session, &FetchPolicy::default())
            .await
            .unwrap();

        assert!(staged.map.is_empty());
        assert_eq!(staged.stats.failed, 1);
        assert!(matches!(
            staged.outcomes.values().next(),
            Some(FetchResult::Failed(m)) if m.contains("data")
        ));
        assert!(!dir.path().join(INCOMING_DIR).exists());
    }
}
