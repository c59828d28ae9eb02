use crate::utils::{collapse_whitespace, truncate_chars};
use scraper::{ElementRef, Html, Node, Selector};

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Human-visible text of an HTML snapshot, whitespace-collapsed.
///
/// Used when the live page cannot answer `innerText` (context gone) and for
/// the `.txt` checkpoint variants.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = match Selector::parse("body") {
        Ok(selector) => document
            .select(&selector)
            .next()
            .unwrap_or_else(|| document.root_element()),
        Err(_) => document.root_element(),
    };

    let mut chunks = Vec::new();
    collect_text(root, &mut chunks);
    collapse_whitespace(&chunks.join(" "))
}

/// Bounded page excerpt for classifier prompts.
pub fn page_excerpt(html: &str, max_chars: usize) -> String {
    truncate_chars(&visible_text(html), max_chars)
}

fn collect_text(element: ElementRef, out: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let value: &str = text;
                if !value.trim().is_empty() {
                    out.push(value.to_string());
                }
            }
            Node::Element(el) => {
                if SKIPPED_TAGS.contains(&el.name()) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_skips_scripts_and_styles() {
        let html = r#"<html><head><title>T</title><style>.a{}</style></head>
            <body><h1>Vielen   Dank</h1><script>var error = 1;</script>
            <p>Ihre Bewerbung wurde gesendet.</p></body></html>"#;
        assert_eq!(
            visible_text(html),
            "Vielen Dank Ihre Bewerbung wurde gesendet."
        );
    }

    #[test]
    fn test_page_excerpt_is_bounded() {
        let body = "word ".repeat(1000);
        let html = format!("<body><p>{}</p></body>", body);
        let excerpt = page_excerpt(&html, 50);
        assert!(excerpt.chars().count() <= 53);
        assert!(excerpt.ends_with("..."));
    }
}
