//! Local naming: filenames for fetched assets, collision suffixes, page slugs.
//!
//! Every name produced here is restricted to `[A-Za-z0-9._-]`, so the
//! relative paths written back into the page (and from there into Markdown
//! links) never need percent-encoding.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::OpenOptions;

/// Filename used when the URL path yields nothing usable.
pub const PLACEHOLDER_FILENAME: &str = "index";

/// Slug used when the resolved URL yields nothing usable.
pub const PLACEHOLDER_SLUG: &str = "page";

/// Extensions treated as images (lower-case, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff", "tif", "svg",
];

/// Longest stem kept from a URL path segment, leaving room for `_N.ext`.
const MAX_STEM_BYTES: usize = 120;

/// Derive the local filename for an asset.
///
/// Takes the last non-empty path segment of `url`, replaces characters
/// outside `[A-Za-z0-9._-]` with `_`, falls back to [`PLACEHOLDER_FILENAME`],
/// and appends an extension inferred from `content_type` when the name has
/// none.
///
/// # Examples
///
/// - `("https://x/img/logo.png", "image/png")` → `"logo.png"`
/// - `("https://x/", "text/css")` → `"index.css"`
/// - `("https://x/pixel?id=3", "image/gif")` → `"pixel.gif"`
pub fn derive_filename(url: &str, content_type: &str) -> String {
    let segment = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path()
                .split('/')
                .filter(|s| !s.is_empty())
                .last()
                .map(str::to_string)
        })
        .unwrap_or_default();

    let sanitized = sanitize_component(&segment);
    let mut name = if sanitized.is_empty() {
        PLACEHOLDER_FILENAME.to_string()
    } else {
        sanitized
    };

    if Path::new(&name).extension().is_none() {
        if let Some(ext) = extension_for_content_type(content_type) {
            name.push('.');
            name.push_str(ext);
        }
    }
    name
}

/// Keep `[A-Za-z0-9._-]`, map everything else to `_`, strip leading dots.
fn sanitize_component(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = mapped.trim_start_matches('.');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        return String::new();
    }

    let path = Path::new(trimmed);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(trimmed);
    if stem.len() <= MAX_STEM_BYTES {
        return trimmed.to_string();
    }
    // ASCII-only at this point, so any byte index is a char boundary.
    let ext = path.extension().and_then(|e| e.to_str());
    match ext {
        Some(ext) => format!("{}.{}", &stem[..MAX_STEM_BYTES], ext),
        None => stem[..MAX_STEM_BYTES].to_string(),
    }
}

/// The MIME essence: lower-cased, parameters removed.
pub fn content_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// File extension for a declared content type, if one is known.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let ext = match content_type_essence(content_type).as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/avif" => "avif",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "text/css" => "css",
        "application/javascript"
        | "text/javascript"
        | "application/x-javascript"
        | "application/ecmascript"
        | "text/ecmascript" => "js",
        _ => return None,
    };
    Some(ext)
}

/// Whether `path` has one of the [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// The `n`-th collision candidate for `name`: `stem_n.ext` (or `name` itself for 0).
pub fn suffixed_name(name: &str, n: u64) -> String {
    if n == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{n}.{ext}"),
        None => format!("{stem}_{n}"),
    }
}

/// Reserve a free filename in `dir` derived from `name`.
///
/// Tries `name`, then `stem_1.ext`, `stem_2.ext`, … and atomically creates
/// the first one that does not exist yet (`create_new`), so a file that is
/// already there (from this run or an earlier one) is never overwritten.
/// The returned path exists as an empty file owned by the caller.
pub async fn claim_unique_path(dir: &Path, name: &str) -> io::Result<PathBuf> {
    let mut n: u64 = 0;
    loop {
        let candidate = dir.join(suffixed_name(name, n));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

static RE_SLUG_INVALID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_-]+").unwrap());

/// Filesystem-safe slug for a page address: host + path, lower-cased.
///
/// Runs of characters outside `[a-z0-9_-]` collapse to a single `_`; leading
/// and trailing underscores are trimmed. Query and fragment are ignored.
///
/// `http://Ex.com/a b?x=1` → `ex_com_a_20b` (the space is percent-encoded
/// by URL parsing before slugging).
pub fn slugify_url(url: &str) -> String {
    let text = match url::Url::parse(url) {
        Ok(u) => {
            let host = u.host_str().unwrap_or("");
            let port = u.port().map(|p| format!(":{p}")).unwrap_or_default();
            format!("{host}{port}{}", u.path())
        }
        Err(_) => url.to_string(),
    };
    let lowered = text.to_lowercase();
    let slug = RE_SLUG_INVALID.replace_all(&lowered, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        PLACEHOLDER_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// `target` expressed relative to directory `base`, joined with `/`.
///
/// Both paths should be absolute (or both relative to the same directory).
pub fn relative_path(target: &Path, base: &Path) -> String {
    let target: Vec<Component<'_>> = target.components().collect();
    let base: Vec<Component<'_>> = base.components().collect();
    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for c in &base[common..] {
        if !matches!(c, Component::CurDir) {
            parts.push("..".to_string());
        }
    }
    for c in &target[common..] {
        if let Component::Normal(s) = c {
            parts.push(s.to_string_lossy().into_owned());
        }
    }
    parts.join("/")
}
