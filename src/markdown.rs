//! Markdown extraction and same-tree link discovery for a fetched page
//! (§4.7 steps 7-8). Grounded on the teacher's own `rust_scraper` pipeline:
//! `readability::extractor` for the main-content pass, `html2md::parse_html`
//! to render it down to markdown, and a content-area-first link selector
//! list borrowed from `scraping/rust_scraper/parse.rs`'s
//! `extract_content_links`, generalized here to the full document since the
//! crawler (unlike the teacher's single-page scrape) wants every same-site
//! link the page carries, not just the ones inside the article body.

use scraper::{Html, Selector};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Best-effort markdown rendering of one fetched page. Readability failures
/// (malformed HTML, no identifiable article body) fall back to a direct
/// `html2md` pass over the raw document rather than producing empty content.
pub fn extract_markdown(html: &str, page_url: &Url) -> String {
    match readability::extractor::extract(&mut html.as_bytes(), page_url) {
        Ok(product) => html2md::parse_html(&product.content),
        Err(e) => {
            debug!(url = %page_url, error = %e, "readability extraction failed, falling back to raw html2md");
            html2md::parse_html(html)
        }
    }
}

fn title_selector() -> &'static Selector {
    static CACHE: OnceLock<Selector> = OnceLock::new();
    CACHE.get_or_init(|| Selector::parse("title").unwrap())
}

fn anchor_selector() -> &'static Selector {
    static CACHE: OnceLock<Selector> = OnceLock::new();
    CACHE.get_or_init(|| Selector::parse("a[href]").unwrap())
}

/// The page's `<title>` text, trimmed; empty if absent.
pub fn extract_title(document: &Html) -> String {
    document
        .select(title_selector())
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Every `<a href>` in the document tree (§4.7 step 8), resolved to an
/// absolute URL against `base_url`. Non-http(s) schemes and bare fragments
/// are skipped; duplicates are not deduplicated here, that is the frontier's
/// (seen-set) job once these are canonicalized.
pub fn extract_raw_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();
    for el in document.select(anchor_selector()) {
        let Some(href) = el.value().attr("href") else { continue };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with("tel:") || href.starts_with("data:") {
            continue;
        }
        match base_url.join(href) {
            Ok(resolved) if resolved.scheme() == "http" || resolved.scheme() == "https" => {
                links.push(resolved.to_string());
            }
            _ => {}
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_title_reads_title_tag() {
        let doc = Html::parse_document("<html><head><title>  Hello World  </title></head><body></body></html>");
        assert_eq!(extract_title(&doc), "Hello World");
    }

    #[test]
    fn extract_title_empty_when_absent() {
        let doc = Html::parse_document("<html><body><p>no title here</p></body></html>");
        assert_eq!(extract_title(&doc), "");
    }

    #[test]
    fn extract_raw_links_resolves_relative_and_skips_non_http() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="https://other.example.com/x">Other</a>
            <a href="#section">Anchor</a>
            <a href="mailto:a@example.com">Mail</a>
            <a href="javascript:void(0)">JS</a>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/blog/post").unwrap();
        let links = extract_raw_links(&doc, &base);
        assert_eq!(links, vec!["https://example.com/about", "https://other.example.com/x"]);
    }

    #[test]
    fn extract_markdown_falls_back_when_readability_finds_no_article() {
        let html = "<html><body><p>short</p></body></html>";
        let base = Url::parse("https://example.com/").unwrap();
        let md = extract_markdown(html, &base);
        assert!(md.to_lowercase().contains("short"));
    }
}
