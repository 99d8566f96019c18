//! Link and visible-text extraction from fetched documents.

use std::collections::HashSet;

use scraper::{Html, Node, Selector};

use crate::url_utils;

/// Collect the outgoing links of a page as normalized absolute URLs.
///
/// Empty, fragment-only, `javascript:` and `mailto:` hrefs are skipped.
/// Malformed markup never fails; the parser recovers what it can.
pub fn extract_links(html: &str, base_url: &str) -> HashSet<String> {
    let mut links = HashSet::new();
    if html.is_empty() {
        return links;
    }

    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return links,
    };

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            continue;
        }
        links.insert(url_utils::make_absolute(base_url, href));
    }

    links
}

/// Visible text of a page: everything outside `<script>` and `<style>`,
/// with tags replaced by single spaces and whitespace collapsed.
pub fn extract_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let document = Html::parse_document(html);
    let mut raw = String::new();
    for node in document.tree.nodes() {
        if let Node::Text(text) = node.value() {
            let skipped = node.ancestors().any(|ancestor| match ancestor.value() {
                Node::Element(element) => {
                    let name = element.name();
                    name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style")
                }
                _ => false,
            });
            if !skipped {
                raw.push_str(text);
                raw.push(' ');
            }
        }
    }

    let words: Vec<&str> = raw.split_whitespace().collect();
    words.join(" ")
}
