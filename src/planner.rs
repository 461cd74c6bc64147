//! Hybrid Strategy Planner (C10): decides whether a run seeds from the
//! sitemap or discovers progressively, attaches site-type quality
//! thresholds, and (when a sitemap is available) ranks candidate URLs by a
//! cheap URL-only classification pass so the orchestrator's frontier starts
//! with the most promising pages rather than sitemap order.

use tracing::info;
use url::Url;

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::domain::site_type::{detect, SiteType, SiteTypeDetection};
use crate::domain::url::{canonicalize, CanonicalUrl};
use crate::quality::SiteTypeThresholds;
use crate::sitemap::{self, SitemapAnalysis};

const SITEMAP_SEED_TOP_N: usize = 50;
/// §4.10's progressive-strategy default when the caller hasn't overridden
/// `max_pages`; the "conservative estimate of 150 URLs" §4.7 also mentions
/// describes the coverage tracker's discovery expectation, not this cap.
const PROGRESSIVE_DEFAULT_MAX_PAGES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SitemapFirst,
    Progressive,
}

/// The plan the orchestrator initializes a run from (§4.7 step 1, §4.10).
pub struct CrawlPlan {
    pub strategy: Strategy,
    pub priority_urls: Vec<CanonicalUrl>,
    pub max_pages: usize,
    pub site_type: SiteTypeDetection,
    pub thresholds: SiteTypeThresholds,
    pub sitemap: SitemapAnalysis,
    /// Sitemap URLs the classifier scored as worthy during seeding, kept
    /// around for reporting — this is the `ai_classified_urls` figure §4.5
    /// describes, computed here rather than inside `SitemapAnalysis` since
    /// only the planner has a `Classifier` available.
    pub ai_classified_urls: usize,
}

/// Build a plan for crawling `seed_url`. Fetches robots.txt/sitemap via C5,
/// detects site type via C3 (using `homepage_content` when the caller has
/// already fetched the homepage, otherwise falling back to host-based
/// heuristics only), and prioritizes sitemap URLs via the classifier's
/// URL-only mode.
pub async fn plan(
    client: &reqwest::Client,
    classifier: &Classifier,
    config: &EngineConfig,
    seed_url: &CanonicalUrl,
    homepage_title: Option<&str>,
    homepage_content: Option<&str>,
) -> anyhow::Result<CrawlPlan> {
    let parsed = Url::parse(seed_url.as_str())?;
    let origin = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or_default());
    let host = parsed.host_str().unwrap_or_default().to_string();

    let sitemap = sitemap::analyze(client, &origin).await;

    let site_type = detect(&host, seed_url.as_str(), homepage_title.unwrap_or(""), homepage_content.unwrap_or(""));
    let thresholds = config.thresholds_for(site_type.site_type);

    if sitemap.urls.is_empty() {
        info!(seed = %seed_url, "no sitemap found, planning progressive discovery");
        return Ok(CrawlPlan {
            strategy: Strategy::Progressive,
            priority_urls: vec![seed_url.clone()],
            max_pages: config.max_pages.unwrap_or(PROGRESSIVE_DEFAULT_MAX_PAGES),
            site_type,
            thresholds,
            sitemap,
            ai_classified_urls: 0,
        });
    }

    let (priority_urls, ai_classified_urls) = rank_sitemap_urls(classifier, &host, &sitemap.urls).await;
    let max_pages = config.max_pages.unwrap_or_else(|| sitemap.urls.len() * 3);

    info!(
        seed = %seed_url,
        sitemap_urls = sitemap.urls.len(),
        ai_classified_urls,
        max_pages,
        "planned sitemap_first strategy"
    );

    Ok(CrawlPlan {
        strategy: Strategy::SitemapFirst,
        priority_urls,
        max_pages,
        site_type,
        thresholds,
        sitemap,
        ai_classified_urls,
    })
}

/// Score every sitemap URL in URL-only mode, keep the worthy ones, and
/// return the top `SITEMAP_SEED_TOP_N` (else raw sitemap order when nothing
/// scored worthy) together with the count the classifier marked worthy.
async fn rank_sitemap_urls(classifier: &Classifier, site_domain: &str, raw_urls: &[String]) -> (Vec<CanonicalUrl>, usize) {
    let mut scored: Vec<(CanonicalUrl, f64)> = Vec::with_capacity(raw_urls.len());
    let mut worthy_count = 0usize;

    for raw in raw_urls {
        let Ok(canonical) = canonicalize(raw, None) else { continue };
        let verdict = classifier.classify_url_only(&canonical, Some(site_domain)).await;
        if verdict.is_worthy {
            worthy_count += 1;
            scored.push((canonical, verdict.confidence));
        }
    }

    if scored.is_empty() {
        let fallback: Vec<CanonicalUrl> = raw_urls.iter().filter_map(|u| canonicalize(u, None).ok()).take(SITEMAP_SEED_TOP_N).collect();
        return (fallback, worthy_count);
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let top: Vec<CanonicalUrl> = scored.into_iter().take(SITEMAP_SEED_TOP_N).map(|(url, _)| url).collect();
    (top, worthy_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn ranks_sitemap_urls_by_worthiness_and_caps_at_top_n() {
        let classifier = Classifier::new(None, "gpt-4o-mini".to_string(), Duration::from_secs(5));
        let urls: Vec<String> = (0..60).map(|i| format!("https://example.com/products/item-{i}")).collect();
        let (ranked, worthy_count) = rank_sitemap_urls(&classifier, "example.com", &urls).await;
        assert!(ranked.len() <= SITEMAP_SEED_TOP_N);
        assert_eq!(worthy_count, 60);
    }

    #[tokio::test]
    async fn falls_back_to_raw_order_when_nothing_scores_worthy() {
        let classifier = Classifier::new(None, "gpt-4o-mini".to_string(), Duration::from_secs(5));
        let urls: Vec<String> = (0..5).map(|i| format!("https://example.com/admin/internal/page-{i}")).collect();
        let (ranked, worthy_count) = rank_sitemap_urls(&classifier, "example.com", &urls).await;
        assert_eq!(worthy_count, 0);
        assert_eq!(ranked.len(), 5);
    }
}
