//! Markdown → HTML conversion.
//!
//! Thin wrapper around pulldown-cmark so the rest of the pipeline treats
//! conversion as an opaque capability. A fresh parser is constructed per
//! call — footnote numbering and heading ids never leak from one document
//! into the next.

use pulldown_cmark::{Options, Parser, html};

/// Convert a markdown body into an HTML fragment.
pub fn convert(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(text, options));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_paragraph() {
        assert_eq!(convert("hello *world*"), "<p>hello <em>world</em></p>\n");
    }

    #[test]
    fn tables_enabled() {
        let html = convert("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
    }

    #[test]
    fn footnote_state_does_not_leak_between_documents() {
        let first = convert("text[^1]\n\n[^1]: note one");
        let second = convert("text[^1]\n\n[^1]: note one");
        assert_eq!(first, second);
    }

    #[test]
    fn heading_attributes_enabled() {
        let html = convert("# Title {#custom-id}");
        assert!(html.contains("id=\"custom-id\""));
    }
}
