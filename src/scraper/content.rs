//! Item content normalisation and identity

use crate::pipeline::content_hash;

/// Convert element HTML to normalised markdown
pub fn html_to_markdown(html: &str) -> String {
    normalize_markdown(&html2md::parse_html(html))
}

/// Trim trailing whitespace, collapse runs of blank lines and trim the whole text
pub fn normalize_markdown(markdown: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank = false;
    for line in markdown.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            if !blank && !out.is_empty() {
                out.push("");
            }
            blank = true;
        } else {
            out.push(line);
            blank = false;
        }
    }
    while out.last() == Some(&"") {
        out.pop();
    }
    out.join("\n")
}

/// Identity of an item: digest of its normalised markdown
pub fn item_hash(markdown: &str) -> String {
    content_hash(markdown)
}
