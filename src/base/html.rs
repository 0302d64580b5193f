//! Plain-text extraction from post HTML.

use std::sync::OnceLock;

use scraper::{Html, Selector};

static PARAGRAPH_SELECTOR: OnceLock<Selector> = OnceLock::new();

fn paragraph_selector() -> &'static Selector {
    PARAGRAPH_SELECTOR.get_or_init(|| Selector::parse("p").expect("static selector is valid"))
}

/// Extract the text of every paragraph in an HTML fragment.
///
/// Paragraph text is trimmed and empty paragraphs are dropped. A fragment that
/// contains no `<p>` at all yields its whole text as a single entry.
pub fn extract_paragraph_text(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);

    let mut paragraphs = fragment.select(paragraph_selector()).peekable();

    if paragraphs.peek().is_none() {
        let text = fragment.root_element().text().collect::<String>();
        let text = text.trim();

        return if text.is_empty() { Vec::new() } else { vec![text.to_string()] };
    }

    paragraphs
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

// Tests.
