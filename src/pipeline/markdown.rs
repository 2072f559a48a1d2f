//! Document conversion: the [`DocumentConverter`] seam and the built-in
//! HTML → Markdown converter.
//!
//! [`MarkdownConverter`] hands the page to `htmd` with non-content subtrees
//! (`<script>`, `<style>`, `<svg>` and friends) skipped, then normalises the
//! result with [`super::postprocess::clean_markdown`].
//!
//! Relative `src`/`href` values are emitted verbatim, so a page rewritten by
//! [`super::rewrite`] yields Markdown whose image links resolve next to the
//! document.

use crate::error::ConvertError;
use crate::pipeline::markup::Markup;
use crate::pipeline::postprocess::clean_markdown;
use async_trait::async_trait;
use htmd::options::{BulletListMarker, CodeBlockStyle, HeadingStyle, Options};
use htmd::HtmlToMarkdown;
use std::path::Path;
use tracing::warn;

/// Elements nested deeper than this are collapsed to their text before
/// conversion, keeping the converter's stack use bounded.
pub const MAX_NESTING_DEPTH: usize = 256;

const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "canvas", "iframe", "object",
];

/// Converts documents to Markdown.
///
/// `convert_markup` receives a complete HTML document; `convert_file`
/// receives a path to a local document of any format the implementation
/// understands.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert_markup(&self, html: &str) -> Result<String, ConvertError>;

    async fn convert_file(&self, path: &Path) -> Result<String, ConvertError>;
}

/// Built-in HTML → Markdown converter.
///
/// Handles `.html`/`.htm` files; any other format is reported as
/// [`ConvertError::Unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownConverter;

#[async_trait]
impl DocumentConverter for MarkdownConverter {
    async fn convert_markup(&self, html: &str) -> Result<String, ConvertError> {
        html_to_markdown(html)
    }

    async fn convert_file(&self, path: &Path) -> Result<String, ConvertError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("html") | Some("htm") => {
                let bytes = tokio::fs::read(path).await.map_err(|e| ConvertError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                html_to_markdown(&String::from_utf8_lossy(&bytes))
            }
            _ => Err(ConvertError::Unsupported {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Convert an HTML document to cleaned Markdown.
pub fn html_to_markdown(html: &str) -> Result<String, ConvertError> {
    let doc = Markup::parse(html);
    let flattened = doc.flatten_deeper_than(MAX_NESTING_DEPTH);
    let converted = if flattened > 0 {
        warn!(
            "Collapsed {} subtrees nested deeper than {} elements",
            flattened, MAX_NESTING_DEPTH
        );
        converter().convert(&doc.to_html())
    } else {
        converter().convert(html)
    };
    converted
        .map(|md| clean_markdown(&md))
        .map_err(|e| ConvertError::Failed(format!("HTML to Markdown: {e}")))
}

fn converter() -> HtmlToMarkdown {
    HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .options(Options {
            heading_style: HeadingStyle::Atx,
            code_block_style: CodeBlockStyle::Fenced,
            bullet_list_marker: BulletListMarker::Dash,
            ..Default::default()
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_and_paragraphs() {
        let md = html_to_markdown("<h1>Title</h1><p>First para</p><h2>Sub</h2><p>Two</p>").unwrap();
        assert!(md.starts_with("# Title\n\nFirst para"), "got: {md}");
        assert!(md.contains("## Sub\n\nTwo"), "got: {md}");
        assert!(md.ends_with('\n') && !md.ends_with("\n\n"));
    }

    #[test]
    fn scripts_styles_and_head_are_dropped() {
        let md = html_to_markdown(
            "<html><head><title>T</title><style>p{}</style></head>\
             <body><script>var a=1;</script><p>kept</p><svg><text>chart</text></svg></body></html>",
        )
        .unwrap();
        assert_eq!(md.trim(), "kept");
    }

    #[test]
    fn links_and_images_keep_their_targets() {
        let md = html_to_markdown(
            r#"<p>See <a href="https://x.org/a">the docs</a>.</p>
               <p><img src="page_assets/logo.png" alt="Logo"></p>"#,
        )
        .unwrap();
        assert!(md.contains("[the docs](https://x.org/a)"), "got: {md}");
        assert!(md.contains("![Logo](page_assets/logo.png)"), "got: {md}");
    }

    #[test]
    fn code_blocks_are_fenced() {
        let md = html_to_markdown("<pre><code>fn main() {}\n</code></pre>").unwrap();
        assert!(md.contains("```\nfn main() {}"), "got: {md}");
    }

    #[test]
    fn deeply_nested_markup_converts() {
        let depth = 5_000;
        let html = format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let md = html_to_markdown(&html).unwrap();
        assert_eq!(md.trim(), "deep");
    }

    #[tokio::test]
    async fn deeply_nested_file_converts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.html");
        let depth = 5_000;
        let html = format!(
            "<h1>Top</h1>{}<p>bottom</p>{}",
            "<section>".repeat(depth),
            "</section>".repeat(depth)
        );
        std::fs::write(&path, html).unwrap();
        let md = MarkdownConverter.convert_file(&path).await.unwrap();
        assert!(md.contains("# Top"), "got: {md}");
        assert!(md.contains("bottom"), "got: {md}");
    }

    #[tokio::test]
    async fn convert_file_rejects_unknown_formats() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("a.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let err = MarkdownConverter.convert_file(&pdf).await.unwrap_err();
        assert!(matches!(err, ConvertError::Unsupported { .. }));

        let html = dir.path().join("a.HTML");
        std::fs::write(&html, "<h3>Hi</h3>").unwrap();
        assert_eq!(MarkdownConverter.convert_file(&html).await.unwrap(), "### Hi\n");
    }
}
