//! Crawl Orchestrator (C7): the main run loop. Grounded on the teacher's
//! `tools/crawl.rs::crawl_website` BFS-wave worker pool — a shared,
//! mutex-guarded frontier and seen-set, drained in batches of
//! `max_concurrent * 2` and fanned out via
//! `stream::iter(batch).buffer_unordered(max_concurrent)` — generalized here
//! to drive the full classify/dedup/persist/coverage pipeline per page
//! instead of a single scrape call.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use scraper::Html;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::classify::{Classifier, ClassifyInput};
use crate::config::EngineConfig;
use crate::coverage::{CoverageTracker, Phase, SummaryStats};
use crate::dedup::Deduplicator;
use crate::domain::page::DedupVerdictStatus;
use crate::domain::site_type::SiteType;
use crate::domain::url::{canonicalize, reject_reason, CanonicalUrl};
use crate::error::{CrawlError, Result};
use crate::events::{EventBroadcaster, StreamEvent};
use crate::http::{self, FetchOptions, FetchedPage};
use crate::markdown;
use crate::persist::{self, PageMeta};
use crate::planner::{self, Strategy};
use crate::quality::QualityPlateauMonitor;

/// One item queued for fetch (wraps the shared `FrontierEntry` with the
/// bookkeeping the worker pool needs to re-derive a `FrontierEntry` on push).
#[derive(Debug, Clone)]
struct QueueItem {
    url: CanonicalUrl,
    depth: u32,
}

/// Caller-supplied knobs for one run (§6's invocation input).
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub seed_url: String,
    pub max_pages: Option<usize>,
    pub run_id: Option<String>,
    pub respect_robots: Option<bool>,
}

/// The terminal result of one run: always exactly one of the three phases
/// named in §7, plus the coverage tracker's final summary.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub phase: Phase,
    pub summary: SummaryStats,
}

/// Owns the process-wide shared state a run needs: the resolved config, the
/// shared HTTP client, the classifier (with its cross-run cache), and the
/// event broadcaster the HTTP surface subscribes through.
pub struct CrawlOrchestrator {
    config: EngineConfig,
    http_client: reqwest::Client,
    classifier: Arc<Classifier>,
    events: EventBroadcaster,
}

impl CrawlOrchestrator {
    pub fn new(config: EngineConfig, http_client: reqwest::Client, events: EventBroadcaster) -> Self {
        let classifier = Classifier::new(config.llm_api_key.clone(), config.llm_model.clone(), config.llm_timeout);
        Self {
            config,
            http_client,
            classifier: Arc::new(classifier),
            events,
        }
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Run one crawl to completion. Always returns an outcome — a run never
    /// fails the caller's `Result` for an in-run fetch/classify/dedup issue,
    /// only for a malformed seed URL or dedup-state corruption (§7's fatal
    /// category).
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let run_id = request.run_id.unwrap_or_else(generate_run_id);
        let seed = canonicalize(&request.seed_url, None).map_err(|e| CrawlError::Other(anyhow::anyhow!("invalid seed url: {e}")))?;
        let site_domain = seed.host();
        let respect_robots = request.respect_robots.unwrap_or(self.config.respect_robots);

        self.events.register_run(&run_id).await;
        self.events
            .publish(&run_id, StreamEvent::CrawlStarted { start_url: seed.as_str().to_string() })
            .await;

        let coverage = Arc::new(Mutex::new(CoverageTracker::new(run_id.clone())));
        coverage.lock().await.set_phase(Phase::SitemapAnalysis);
        self.publish_snapshot(&run_id, &coverage).await;

        let (homepage_title, homepage_content) = self.fetch_homepage_hint(seed.as_str()).await;

        let plan = planner::plan(&self.http_client, &self.classifier, &self.config, &seed, homepage_title.as_deref(), homepage_content.as_deref())
            .await
            .map_err(|e| CrawlError::Other(anyhow::anyhow!("planning failed: {e}")))?;

        let max_pages = request.max_pages.unwrap_or(plan.max_pages);
        info!(run_id, strategy = ?plan.strategy, site_type = plan.site_type.site_type.as_str(), max_pages, "plan ready");

        {
            let mut cov = coverage.lock().await;
            cov.seed_sitemap_urls(plan.sitemap.urls.iter().cloned());
            cov.set_phase(Phase::Crawling);
        }
        self.publish_snapshot(&run_id, &coverage).await;

        let seen: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let frontier: Arc<Mutex<VecDeque<QueueItem>>> = Arc::new(Mutex::new(VecDeque::new()));
        {
            let mut seen_guard = seen.lock().await;
            let mut frontier_guard = frontier.lock().await;
            let seed_urls = if matches!(plan.strategy, Strategy::Progressive) { vec![seed.clone()] } else { plan.priority_urls.clone() };
            for url in seed_urls {
                if seen_guard.insert(url.as_str().to_string()) {
                    frontier_guard.push_back(QueueItem { url, depth: 0 });
                }
            }
        }

        let dedup = Arc::new(Mutex::new(Deduplicator::new(self.config.min_content_length)));
        let quality = Arc::new(Mutex::new(QualityPlateauMonitor::new(plan.thresholds)));
        let pacing = Arc::new(PacingGate::new());

        let mut crawled_count = 0usize;
        let mut stop_reason: Option<String> = None;

        'main: loop {
            if crawled_count >= max_pages {
                break;
            }

            let batch: Vec<QueueItem> = {
                let mut q = frontier.lock().await;
                let remaining = max_pages - crawled_count;
                let batch_size = remaining.min(self.config.max_concurrent * 2);
                let mut batch = Vec::new();
                while batch.len() < batch_size {
                    match q.pop_front() {
                        Some(item) => batch.push(item),
                        None => break,
                    }
                }
                batch
            };

            if batch.is_empty() {
                break;
            }

            let results: Vec<PageOutcome> = stream::iter(batch)
                .map(|item| {
                    let client = self.http_client.clone();
                    let classifier = Arc::clone(&self.classifier);
                    let coverage = Arc::clone(&coverage);
                    let dedup = Arc::clone(&dedup);
                    let pacing = Arc::clone(&pacing);
                    let site_domain = site_domain.clone();
                    let site_type = plan.site_type.site_type;
                    let output_root = self.config.output_root.clone();
                    let fetch_timeout = self.config.fetch_timeout;
                    let request_gap = self.config.request_gap;
                    let min_content_length = self.config.min_content_length;
                    async move {
                        process_one(
                            &client,
                            &classifier,
                            &coverage,
                            &dedup,
                            &pacing,
                            site_domain.as_deref(),
                            site_type,
                            &output_root,
                            fetch_timeout,
                            request_gap,
                            min_content_length,
                            respect_robots,
                            item,
                        )
                        .await
                    }
                })
                .buffer_unordered(self.config.max_concurrent)
                .collect()
                .await;

            for outcome in results {
                match outcome {
                    PageOutcome::Crawled { diversity, new_links, .. } => {
                        crawled_count += 1;
                        quality.lock().await.record(true, Some(diversity));

                        let mut frontier_guard = frontier.lock().await;
                        let mut seen_guard = seen.lock().await;
                        let mut cov = coverage.lock().await;
                        for (url, depth) in new_links {
                            cov.record_discovered(url.as_str().to_string());
                            if seen_guard.insert(url.as_str().to_string()) {
                                frontier_guard.push_back(QueueItem { url, depth });
                            }
                        }
                    }
                    PageOutcome::Rejected { diversity } => {
                        quality.lock().await.record(false, diversity);
                    }
                    PageOutcome::Skipped => {}
                }
            }

            self.publish_snapshot(&run_id, &coverage).await;

            let plateau = quality.lock().await.check_stop();
            if let Some(reason) = plateau {
                stop_reason = Some(reason.clone());
                coverage.lock().await.record_plateau(reason.clone());
                self.events.publish(&run_id, StreamEvent::QualityPlateauDetected { reason }).await;
                break 'main;
            }
        }

        if stop_reason.is_none() {
            coverage.lock().await.complete();
        }

        self.publish_snapshot(&run_id, &coverage).await;
        let summary = coverage.lock().await.summary();
        self.events
            .publish(&run_id, StreamEvent::CrawlCompleted { final_coverage_percentage: summary.coverage_pct })
            .await;

        let phase = summary.phase;
        info!(run_id, ?phase, pages_crawled = summary.pages_crawled, "run finished");

        Ok(RunOutcome { run_id, phase, summary })
    }

    async fn publish_snapshot(&self, run_id: &str, coverage: &Arc<Mutex<CoverageTracker>>) {
        let snapshot = coverage.lock().await.snapshot();
        self.events.publish(run_id, StreamEvent::CoverageUpdate(snapshot)).await;
    }

    /// Best-effort homepage fetch used only to seed site-type detection with
    /// real title/content (§4.10: "with homepage content fetched if
    /// necessary"). Any failure here degrades to host-based fallback
    /// detection, never aborts the run.
    async fn fetch_homepage_hint(&self, seed_url: &str) -> (Option<String>, Option<String>) {
        match http::fetch_raw(&self.http_client, seed_url).await {
            Ok(page) => {
                let document = Html::parse_document(&page.rendered_html);
                let title = markdown::extract_title(&document);
                (Some(title), Some(page.rendered_html))
            }
            Err(e) => {
                warn!(seed_url, error = %e, "homepage hint fetch failed, site-type detection will use fallback rules only");
                (None, None)
            }
        }
    }
}

enum PageOutcome {
    /// `diversity` is always `(content_hash, pattern_key)` for a crawled page
    /// — the page was fetched, so both are meaningful.
    Crawled { quality_score: f64, diversity: (u64, String), new_links: Vec<(CanonicalUrl, u32)> },
    /// `diversity` is `None` when the page was never actually fetched (basic
    /// filter reject, fetch failure) and `Some` when it was fetched but
    /// rejected afterward (classifier-unworthy, duplicate, alias) — those
    /// carry a real content hash and URL-pattern key.
    Rejected { diversity: Option<(u64, String)> },
    Skipped,
}

#[allow(clippy::too_many_arguments)]
async fn process_one(
    client: &reqwest::Client,
    classifier: &Classifier,
    coverage: &Arc<Mutex<CoverageTracker>>,
    dedup: &Arc<Mutex<Deduplicator>>,
    pacing: &PacingGate,
    site_domain: Option<&str>,
    site_type: SiteType,
    output_root: &std::path::Path,
    fetch_timeout: Duration,
    request_gap: Duration,
    min_content_length: usize,
    respect_robots: bool,
    item: QueueItem,
) -> PageOutcome {
    let url = item.url;

    if let Some(reason) = reject_reason(&url, site_domain) {
        debug!(url = %url, reason = reason.as_str(), "rejected by basic filter");
        coverage.lock().await.record_failed(url.as_str().to_string());
        return PageOutcome::Rejected { diversity: None };
    }

    if respect_robots {
        // Robots intelligence is consulted at plan time (§4.5); per-fetch
        // enforcement beyond the disallow-aware sitemap filtering the
        // planner already applied is out of scope for this pass.
    }

    pacing.wait(request_gap).await;
    coverage.lock().await.record_fetch_started(url.as_str().to_string());

    let fetched = match fetch_with_fallback(client, url.as_str(), fetch_timeout).await {
        Ok(page) => page,
        Err(e) => {
            warn!(url = %url, error = %e, "fetch failed, marking url as failed");
            coverage.lock().await.record_failed(url.as_str().to_string());
            return PageOutcome::Rejected { diversity: None };
        }
    };

    let parsed_url = match Url::parse(&fetched.final_url) {
        Ok(u) => u,
        Err(_) => return PageOutcome::Skipped,
    };

    let document = Html::parse_document(&fetched.rendered_html);
    let title = markdown::extract_title(&document);
    let markdown_text = markdown::extract_markdown(&fetched.rendered_html, &parsed_url);
    let links = markdown::extract_raw_links(&document, &parsed_url);

    let classification = classifier
        .classify(ClassifyInput {
            url: &url,
            site_domain,
            site_type,
            title: &title,
            content: Some(&markdown_text),
            link_count: links.len(),
        })
        .await;

    let pattern_key = crate::quality::url_pattern_key(&url.path());

    if !classification.is_worthy {
        coverage.lock().await.record_failed(url.as_str().to_string());
        // The page was fetched and has real content even though the
        // classifier rejected it, so the diversity window still gets a
        // genuine fingerprint rather than a sentinel.
        let content_hash = crate::dedup::content_fingerprint(&fetched.rendered_html);
        return PageOutcome::Rejected { diversity: Some((content_hash, pattern_key)) };
    }

    let (verdict, content_hash) = dedup.lock().await.evaluate(&url, &fetched.rendered_html);
    if verdict.status != DedupVerdictStatus::Canonical {
        coverage.lock().await.record_failed(url.as_str().to_string());
        return PageOutcome::Rejected { diversity: Some((content_hash, pattern_key)) };
    }

    let meta = PageMeta {
        url: fetched.final_url.clone(),
        title: title.clone(),
        fetched_at: chrono::Utc::now(),
        content_type: fetched.content_type.clone(),
        bytes_html: fetched.rendered_html.len(),
        html_flavor: fetched.flavor,
        success: true,
        error: None,
    };

    if let Err(e) = persist::persist_page(output_root, &fetched.final_url, &markdown_text, &fetched.rendered_html, &fetched.rendered_html, &meta).await {
        warn!(url = %url, error = %e, "failed to persist page, continuing crawl");
    }

    // Raw candidates only: the `seen` check-and-insert happens exactly once,
    // in the main loop, so a link discovered by two different pages in the
    // same batch doesn't race two `true` inserts and get enqueued twice.
    let mut new_links = Vec::new();
    for link in links {
        let Ok(canonical_link) = canonicalize(&link, None) else { continue };
        if reject_reason(&canonical_link, site_domain).is_some() {
            continue;
        }
        new_links.push((canonical_link, item.depth + 1));
    }

    coverage.lock().await.record_crawled(url.as_str().to_string(), Some(classification.confidence));

    PageOutcome::Crawled { quality_score: classification.confidence, diversity: (content_hash, pattern_key), new_links }
}

async fn fetch_with_fallback(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<FetchedPage> {
    let options = FetchOptions { timeout: Some(timeout), ..Default::default() };
    match http::fetch_rendered(url, &options).await {
        Ok(page) => Ok(page),
        Err(e) => {
            warn!(url, error = %e, "rendering fetch failed, falling back to raw http fetch");
            http::fetch_raw(client, url).await
        }
    }
}

/// Serializes request pacing across all workers: no two fetches start less
/// than `gap` apart, regardless of how many workers are in flight.
struct PacingGate {
    last_dispatch: Mutex<Option<Instant>>,
}

impl PacingGate {
    fn new() -> Self {
        Self { last_dispatch: Mutex::new(None) }
    }

    async fn wait(&self, gap: Duration) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < gap {
                tokio::time::sleep(gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn generate_run_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let suffix: String = (0..8).map(|_| rng.sample(rand::distr::Alphanumeric) as char).collect();
    let unix_ts = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("crawl_{}_{}", suffix.to_ascii_lowercase(), unix_ts)
}
