//! Post-processing: deterministic cleanup of converter-generated Markdown.
//!
//! The HTML walker in [`super::markdown`] emits block separators generously
//! and copies whatever invisible characters the page carried. These passes
//! normalise the result so two captures of the same page produce the same
//! bytes.
//!
//! Line-based rules skip the inside of fenced code blocks: a `# comment` in a
//! shell snippet is not a heading, and blank lines in code are content.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule can split on `\n`;
//! empty links are removed before blank-line collapsing because removing one
//! can leave a blank line behind.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to converter output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 3. Remove links with no visible text (`[](...)`, icon-only anchors)
/// 4. Trim trailing whitespace per line
/// 5. Collapse runs of blank lines to a single blank line
/// 6. Ensure heading lines have a blank line before them
/// 7. Ensure the file ends with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = remove_empty_links(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = normalise_heading_spacing(&s);
    ensure_final_newline(&s)
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Remove empty links ───────────────────────────────────────────────

// Not preceded by `!`: `![](x)` is an image without alt text and stays.
static RE_EMPTY_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^!\]])\[\s*\]\([^)]*\)").unwrap());

fn remove_empty_links(input: &str) -> String {
    RE_EMPTY_LINK.replace_all(input, "$1").into_owned()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse blank lines ─────────────────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut blank_run = 0usize;

    for line in input.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        if !in_fence && line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }
    out.join("\n")
}

// ── Rule 6: Normalise heading spacing ────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} ").unwrap());

fn normalise_heading_spacing(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 64);
    let mut in_fence = false;
    for (i, line) in input.lines().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        if !in_fence && i > 0 && RE_HEADING.is_match(line) {
            let trimmed = result.trim_end_matches('\n');
            result.truncate(trimmed.len());
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

// ── Rule 7: Ensure file ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_remove_empty_links_keeps_images() {
        assert_eq!(remove_empty_links("a [](/home) b"), "a  b");
        assert_eq!(remove_empty_links("[ ](x)"), "");
        assert_eq!(remove_empty_links("![](s_assets/a.png)"), "![](s_assets/a.png)");
        assert_eq!(remove_empty_links("[text](x)"), "[text](x)");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("\n\na\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_blank_lines_inside_fence_are_kept() {
        let input = "```\nx\n\n\n\ny\n```";
        assert_eq!(collapse_blank_lines(input), input);
    }

    #[test]
    fn test_heading_spacing() {
        let result = normalise_heading_spacing("some text\n# Heading\nmore text");
        assert!(result.contains("\n\n# Heading\n"));
    }

    #[test]
    fn test_heading_spacing_ignores_code() {
        let input = "```sh\necho hi\n# not a heading\n```";
        let result = normalise_heading_spacing(input);
        assert!(result.contains("echo hi\n# not a heading"));
    }

    #[test]
    fn test_hashtag_is_not_a_heading() {
        let result = normalise_heading_spacing("text\n#hashtag");
        assert_eq!(result, "text\n#hashtag\n");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("hello"), "hello\n");
        assert_eq!(ensure_final_newline("hello\n\n\n"), "hello\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn test_clean_markdown_full_pipeline() {
        let input = "\n\n# Title\r\n\r\nSome text [](x)  \n\n\n\n\n\n## Section\nbody";
        let result = clean_markdown(input);
        assert_eq!(result, "# Title\n\nSome text\n\n## Section\nbody\n");
    }
}
