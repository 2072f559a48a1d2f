//! Point the page's asset references at the relocated local copies.

use crate::pipeline::fetch::{Final, UrlMap};
use crate::pipeline::locate::resolve;
use crate::pipeline::markup::{Markup, RESOURCE_TAG_ATTRS};
use crate::pipeline::naming::relative_path;
use std::path::Path;
use tracing::debug;
use url::Url;

/// Rewrite `markup` so every mapped reference is a path relative to
/// `output_dir`.
///
/// References are resolved against `base_url` exactly as the locator does.
/// Anything absent from `final_map` (rejected, failed, or never fetched)
/// keeps its original value.
pub fn rewrite(markup: &str, base_url: &Url, final_map: &UrlMap<Final>, output_dir: &Path) -> String {
    let doc = Markup::parse(markup);
    let rewritten = rewrite_tree(&doc, base_url, final_map, output_dir);
    debug!("Rewrote {} asset references", rewritten);
    doc.to_html()
}

/// In-place variant over an already parsed tree. Returns how many
/// attributes changed.
pub fn rewrite_tree(doc: &Markup, base_url: &Url, final_map: &UrlMap<Final>, output_dir: &Path) -> usize {
    let mut count = 0;
    for (tag, attr) in RESOURCE_TAG_ATTRS {
        for node in doc.find_all(tag) {
            let Some(value) = node.attr(attr) else { continue };
            let Some(abs) = resolve(base_url, &value) else { continue };
            if let Some(local) = final_map.get(&abs) {
                if node.set_attr(attr, &relative_path(local, output_dir)) {
                    count += 1;
                }
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn final_map(entries: &[(&str, &str)]) -> UrlMap<Final> {
        let mut m = UrlMap::new();
        for (u, p) in entries {
            m.insert(u.to_string(), PathBuf::from(p));
        }
        m
    }

    #[test]
    fn mapped_references_become_relative() {
        let base = Url::parse("http://x/blog/post").unwrap();
        let map = final_map(&[
            ("http://x/img/a.png", "/out/x_blog_post_assets/a.png"),
            ("http://x/blog/app.js", "/out/x_blog_post_assets/app.js"),
        ]);
        let html = r#"<img src="/img/a.png"><script src="app.js"></script>"#;

        let out = rewrite(html, &base, &map, Path::new("/out"));

        assert!(out.contains(r#"src="x_blog_post_assets/a.png""#), "got: {out}");
        assert!(out.contains(r#"src="x_blog_post_assets/app.js""#), "got: {out}");
    }

    #[test]
    fn unmapped_references_are_untouched() {
        let base = Url::parse("http://x/").unwrap();
        let map = final_map(&[("http://x/a.png", "/out/s_assets/a.png")]);
        let html = r#"<img src="a.png"><img src="missing.png"><link rel="icon" href="fav.ico">"#;

        let out = rewrite(html, &base, &map, Path::new("/out"));

        assert!(out.contains(r#"src="s_assets/a.png""#));
        assert!(out.contains(r#"src="missing.png""#));
        assert!(out.contains(r#"href="fav.ico""#));
    }

    #[test]
    fn srcset_is_left_alone() {
        let base = Url::parse("http://x/").unwrap();
        let map = final_map(&[("http://x/m.png", "/out/s_assets/m.png")]);
        let out = rewrite(r#"<img srcset="m.png 1x">"#, &base, &map, Path::new("/out"));
        assert!(out.contains(r#"srcset="m.png 1x""#));
    }

    #[test]
    fn rewrite_is_pure() {
        let base = Url::parse("http://x/").unwrap();
        let map = final_map(&[("http://x/a.png", "/out/s_assets/a.png")]);
        let html = r#"<p>hi <img src="a.png"></p>"#;
        let a = rewrite(html, &base, &map, Path::new("/out"));
        let b = rewrite(html, &base, &map, Path::new("/out"));
        assert_eq!(a, b);
    }
}
