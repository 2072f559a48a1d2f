//! Asset discovery: the unique set of absolute URLs a page references.

use crate::pipeline::markup::{Markup, RESOURCE_TAG_ATTRS};
use std::collections::BTreeSet;
use tracing::debug;
use url::Url;

/// Collect every asset URL referenced by `markup`, resolved against `base_url`.
///
/// `base_url` must be the page's address *after* redirects, as reported by
/// the browser. Values that are empty or cannot be resolved are skipped one
/// by one; the scan itself never fails.
///
/// For `<img srcset>` only the first candidate is taken. A malformed list
/// yields no extra URL.
///
/// The returned set is ordered lexicographically, which is the order the
/// fetcher downloads in.
pub fn locate(markup: &Markup, base_url: &Url) -> BTreeSet<String> {
    let mut found = BTreeSet::new();

    for (tag, attr) in RESOURCE_TAG_ATTRS {
        for node in markup.find_all(tag) {
            if let Some(abs) = node.attr(attr).and_then(|v| resolve(base_url, &v)) {
                found.insert(abs);
            }
        }
    }

    for node in markup.find_all("img") {
        if let Some(abs) = node
            .attr("srcset")
            .and_then(|s| first_srcset_candidate(&s))
            .and_then(|c| resolve(base_url, &c))
        {
            found.insert(abs);
        }
    }

    debug!("Located {} unique asset URLs", found.len());
    found
}

/// Parse `html` and `base_url`, then [`locate`].
///
/// An unparseable base URL yields an empty set.
pub fn locate_html(html: &str, base_url: &str) -> BTreeSet<String> {
    match Url::parse(base_url) {
        Ok(base) => locate(&Markup::parse(html), &base),
        Err(_) => BTreeSet::new(),
    }
}

/// Resolve an attribute value to an absolute URL string.
///
/// Shared with the rewriter so both stages produce identical keys.
pub(crate) fn resolve(base_url: &Url, value: &str) -> Option<String> {
    if value.trim().is_empty() {
        return None;
    }
    base_url.join(value).ok().map(String::from)
}

/// First URL token of a `srcset` list: `"a.png 1x, b.png 2x"` → `"a.png"`.
pub(crate) fn first_srcset_candidate(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .next()?
        .split_whitespace()
        .next()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://x/dir/page.html";

    #[test]
    fn collects_all_tag_attribute_pairs() {
        let html = r#"
            <link rel="stylesheet" href="/css/site.css">
            <script src="app.js"></script>
            <img src="img/a.png">
            <video><source src="https://cdn.y/v.webm"></video>"#;
        let urls = locate_html(html, BASE);
        let expected: BTreeSet<String> = [
            "http://x/css/site.css",
            "http://x/dir/app.js",
            "http://x/dir/img/a.png",
            "https://cdn.y/v.webm",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(urls, expected);
    }

    #[test]
    fn duplicates_collapse() {
        let urls = locate_html(r#"<img src="a.png"><img src="a.png">"#, "http://x/");
        assert_eq!(urls.len(), 1);
        assert!(urls.contains("http://x/a.png"));
    }

    #[test]
    fn empty_and_missing_values_are_skipped() {
        let urls = locate_html(r#"<img src=""><img><script>1</script><link rel="x">"#, BASE);
        assert!(urls.is_empty(), "got: {urls:?}");
    }

    #[test]
    fn first_srcset_candidate_is_added() {
        let html = r#"<img src="small.png" srcset="medium.png 1x, large.png 2x">"#;
        let urls = locate_html(html, "http://x/");
        assert!(urls.contains("http://x/small.png"));
        assert!(urls.contains("http://x/medium.png"));
        assert!(!urls.contains("http://x/large.png"));
    }

    #[test]
    fn malformed_srcset_adds_nothing() {
        assert_eq!(first_srcset_candidate(""), None);
        assert_eq!(first_srcset_candidate("   , b.png 2x"), None);
        let urls = locate_html(r#"<img srcset=" , ">"#, "http://x/");
        assert!(urls.is_empty());
    }

    #[test]
    fn unresolvable_values_are_skipped_individually() {
        let html = r#"<img src="http://[bad"><img src="ok.png">"#;
        let urls = locate_html(html, "http://x/");
        assert_eq!(urls.len(), 1);
        assert!(urls.contains("http://x/ok.png"));
    }

    #[test]
    fn locate_is_deterministic() {
        let html = r#"<img src="b.png"><script src="a.js"></script><img srcset="c.png 2x">"#;
        let first = locate_html(html, BASE);
        let second = locate_html(html, BASE);
        assert_eq!(first, second);
        assert_eq!(
            first.iter().cloned().collect::<Vec<_>>(),
            vec!["http://x/dir/a.js", "http://x/dir/b.png", "http://x/dir/c.png"]
        );
    }

    #[test]
    fn bad_base_yields_empty_set() {
        assert!(locate_html(r#"<img src="a.png">"#, "not a url").is_empty());
    }
}
