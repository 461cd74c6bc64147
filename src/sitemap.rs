//! Sitemap Analyzer (C5): candidate sitemap discovery, `quick_xml` parsing of
//! `sitemapindex`/`urlset` documents, and robots.txt intelligence extraction.
//! Fetching follows the teacher's own `reqwest::Client` + stealth-header
//! pattern from `scraping/rust_scraper/mod.rs`.

use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::{debug, warn};

const CANDIDATE_SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap-index.xml", "/sitemaps/sitemap.xml"];

const MAX_CRAWL_DELAY_SECS: u64 = 2;
const MAX_SITEMAP_RECURSION: usize = 3;

/// §4.5's three-tier complexity bucket, used to decide how aggressively the
/// planner should lean on sitemap URLs versus progressive discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapComplexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone)]
pub struct RobotsIntelligence {
    pub sitemap_urls: Vec<String>,
    pub crawl_delay: Option<Duration>,
    pub interesting_disallowed_paths: Vec<String>,
}

impl Default for RobotsIntelligence {
    fn default() -> Self {
        Self {
            sitemap_urls: Vec::new(),
            crawl_delay: None,
            interesting_disallowed_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SitemapAnalysis {
    pub urls: Vec<String>,
    pub complexity: SitemapComplexity,
    pub source_sitemaps: Vec<String>,
    pub robots: RobotsIntelligence,
}

/// Fetch robots.txt, follow any `Sitemap:` entries plus a handful of
/// conventional paths, and merge every discovered `<loc>` into one list.
pub async fn analyze(client: &reqwest::Client, origin: &str) -> SitemapAnalysis {
    let robots = fetch_robots(client, origin).await.unwrap_or_default();

    let mut sitemap_candidates: Vec<String> = robots.sitemap_urls.clone();
    for path in CANDIDATE_SITEMAP_PATHS {
        let candidate = format!("{}{}", origin.trim_end_matches('/'), path);
        if !sitemap_candidates.contains(&candidate) {
            sitemap_candidates.push(candidate);
        }
    }

    let mut urls = Vec::new();
    let mut source_sitemaps = Vec::new();
    for candidate in sitemap_candidates {
        match fetch_sitemap_urls(client, &candidate, 0).await {
            Ok(found) if !found.is_empty() => {
                debug!(candidate, count = found.len(), "sitemap yielded urls");
                source_sitemaps.push(candidate);
                urls.extend(found);
            }
            Ok(_) => {}
            Err(e) => debug!(candidate, error = %e, "sitemap candidate not usable"),
        }
    }

    urls.sort();
    urls.dedup();

    let complexity = classify_complexity(robots.interesting_disallowed_paths.len());

    SitemapAnalysis {
        urls,
        complexity,
        source_sitemaps,
        robots,
    }
}

/// §4.5 buckets sitemap complexity by how much a site's robots.txt disallows
/// out of the "interesting" (non-admin/asset) paths — more gated sections
/// suggest a larger, more structured site even before the sitemap itself is
/// walked.
fn classify_complexity(interesting_disallow_count: usize) -> SitemapComplexity {
    if interesting_disallow_count > 10 {
        SitemapComplexity::Complex
    } else if interesting_disallow_count > 2 {
        SitemapComplexity::Medium
    } else {
        SitemapComplexity::Simple
    }
}

async fn fetch_robots(client: &reqwest::Client, origin: &str) -> anyhow::Result<RobotsIntelligence> {
    let url = format!("{}/robots.txt", origin.trim_end_matches('/'));
    let response = client
        .get(&url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("robots.txt request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!("robots.txt returned status {}", response.status()));
    }

    let body = response.text().await.map_err(|e| anyhow::anyhow!("robots.txt read failed: {e}"))?;
    Ok(parse_robots(&body))
}

/// Parse robots.txt: collect `Sitemap:` lines, the minimum `Crawl-delay` seen
/// (capped at [`MAX_CRAWL_DELAY_SECS`] so a hostile robots.txt can't stall the
/// whole run), and `Disallow:` paths that look like they gate real content
/// rather than admin/asset noise.
fn parse_robots(body: &str) -> RobotsIntelligence {
    let mut sitemap_urls = Vec::new();
    let mut crawl_delay: Option<Duration> = None;
    let mut interesting_disallowed_paths = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = case_insensitive_strip(line, "sitemap:") {
            sitemap_urls.push(rest.trim().to_string());
        } else if let Some(rest) = case_insensitive_strip(line, "crawl-delay:") {
            if let Ok(secs) = rest.trim().parse::<f64>() {
                let capped = secs.min(MAX_CRAWL_DELAY_SECS as f64).max(0.0);
                let duration = Duration::from_millis((capped * 1000.0) as u64);
                crawl_delay = Some(match crawl_delay {
                    Some(existing) => existing.min(duration),
                    None => duration,
                });
            }
        } else if let Some(rest) = case_insensitive_strip(line, "disallow:") {
            let path = rest.trim();
            if is_interesting_disallow(path) {
                interesting_disallowed_paths.push(path.to_string());
            }
        }
    }

    RobotsIntelligence {
        sitemap_urls,
        crawl_delay,
        interesting_disallowed_paths,
    }
}

fn case_insensitive_strip<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// A disallowed path is "interesting" when it isn't the usual admin/asset
/// noise every site disallows — these are the paths most likely to gate
/// content a crawl would otherwise want.
fn is_interesting_disallow(path: &str) -> bool {
    if path.is_empty() || path == "/" {
        return false;
    }
    const NOISE: &[&str] = &["/admin", "/wp-admin", "/cgi-bin", "/tmp", "/cache", "/assets", "/static", "/_next", "/api/internal"];
    !NOISE.iter().any(|n| path.starts_with(n))
}

/// Fetch and parse one sitemap document, recursing into `<sitemapindex>`
/// children up to [`MAX_SITEMAP_RECURSION`] levels deep.
async fn fetch_sitemap_urls(client: &reqwest::Client, url: &str, depth: usize) -> anyhow::Result<Vec<String>> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(15))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("sitemap request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!("sitemap returned status {}", response.status()));
    }

    let body = response.text().await.map_err(|e| anyhow::anyhow!("sitemap read failed: {e}"))?;
    let parsed = parse_sitemap_document(&body);

    match parsed {
        SitemapDocument::UrlSet(urls) => Ok(urls),
        SitemapDocument::Index(child_urls) => {
            if depth >= MAX_SITEMAP_RECURSION {
                warn!(url, "sitemap index recursion limit reached, stopping here");
                return Ok(Vec::new());
            }
            let mut collected = Vec::new();
            for child in child_urls {
                match Box::pin(fetch_sitemap_urls(client, &child, depth + 1)).await {
                    Ok(urls) => collected.extend(urls),
                    Err(e) => debug!(child, error = %e, "child sitemap not usable"),
                }
            }
            Ok(collected)
        }
    }
}

enum SitemapDocument {
    UrlSet(Vec<String>),
    Index(Vec<String>),
}

/// A sitemap document is either a flat `<urlset>` of page `<loc>`s or a
/// `<sitemapindex>` of other sitemap `<loc>`s; both share the `<loc>` leaf
/// shape, so one streaming pass collects locs and a second check on the root
/// element name decides which bucket they belong to.
fn parse_sitemap_document(xml: &str) -> SitemapDocument {
    let mut reader = Reader::from_str(xml);
    let mut locs = Vec::new();
    let mut in_loc = false;
    let mut is_index = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                let local = name.as_ref();
                if local == b"sitemapindex" {
                    is_index = true;
                } else if local == b"loc" {
                    in_loc = true;
                }
            }
            Ok(Event::Text(ref e)) if in_loc => {
                if let Ok(text) = e.unescape() {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        locs.push(trimmed.to_string());
                    }
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"loc" => {
                in_loc = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "sitemap xml parse error, using urls collected so far");
                break;
            }
            _ => {}
        }
    }

    if is_index {
        SitemapDocument::Index(locs)
    } else {
        SitemapDocument::UrlSet(locs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_urlset() {
        let xml = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/a</loc></url>
              <url><loc>https://example.com/b</loc></url>
            </urlset>"#;
        match parse_sitemap_document(xml) {
            SitemapDocument::UrlSet(urls) => {
                assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
            }
            SitemapDocument::Index(_) => panic!("expected urlset"),
        }
    }

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<?xml version="1.0"?>
            <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
              <sitemap><loc>https://example.com/sitemap-2.xml</loc></sitemap>
            </sitemapindex>"#;
        match parse_sitemap_document(xml) {
            SitemapDocument::Index(urls) => assert_eq!(urls.len(), 2),
            SitemapDocument::UrlSet(_) => panic!("expected index"),
        }
    }

    #[test]
    fn robots_collects_sitemap_lines_and_caps_crawl_delay() {
        let body = "User-agent: *\nSitemap: https://example.com/sitemap.xml\nCrawl-delay: 10\nDisallow: /checkout\nDisallow: /admin\n";
        let parsed = parse_robots(body);
        assert_eq!(parsed.sitemap_urls, vec!["https://example.com/sitemap.xml"]);
        assert_eq!(parsed.crawl_delay, Some(Duration::from_secs(MAX_CRAWL_DELAY_SECS)));
        assert_eq!(parsed.interesting_disallowed_paths, vec!["/checkout"]);
    }

    #[test]
    fn complexity_scales_with_disallow_count() {
        assert_eq!(classify_complexity(0), SitemapComplexity::Simple);
        assert_eq!(classify_complexity(2), SitemapComplexity::Simple);
        assert_eq!(classify_complexity(5), SitemapComplexity::Medium);
        assert_eq!(classify_complexity(15), SitemapComplexity::Complex);
    }
}
