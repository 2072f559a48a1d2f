//! Captioning prompts and the fixed text the pipeline writes around them.
//!
//! Callers can override the prompt via [`crate::config::SnapshotConfig::prompt`];
//! the constants here are used only when no override is provided.

/// Default instruction sent with every captured image.
pub const DEFAULT_CAPTION_PROMPT: &str = "Describe this image from a web page in one or two \
sentences. Mention any visible text verbatim. If it is a chart or diagram, state what it shows. \
Do not speculate about content you cannot see.";

/// Heading of the section appended to a captured page's Markdown.
pub const DESCRIPTIONS_HEADING: &str = "## Image descriptions";

/// Build the description section: one `` - `name`: text `` entry per image.
///
/// Returns an empty string when there is nothing to list.
pub fn descriptions_section<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let lines: Vec<String> = entries
        .into_iter()
        .map(|(name, text)| format!("- `{}`: {}", name, text.split_whitespace().collect::<Vec<_>>().join(" ")))
        .collect();
    if lines.is_empty() {
        return String::new();
    }
    format!("{}\n\n{}\n", DESCRIPTIONS_HEADING, lines.join("\n"))
}

/// Footer for a document produced from a single image.
pub fn generated_footer(model: &str, timestamp: &str) -> String {
    format!("---\n\n*Description generated by `{model}` on {timestamp}.*\n")
}
