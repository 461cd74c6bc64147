//! Coverage Tracker (C8): per-run live state — growing URL sets, a bounded
//! quality-score history, and the derived metrics (`coverage_pct`,
//! `velocity_per_min`, `eta_seconds`, `quality_trend`) a subscriber reads off
//! every [`CoverageSnapshot`].

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Serialize;

const QUALITY_HISTORY_CAP: usize = 20;
const TREND_WINDOW: usize = 5;
const TREND_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    SitemapAnalysis,
    Crawling,
    QualityPlateau,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTrend {
    Improving,
    Stable,
    Declining,
    Insufficient,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageSnapshot {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub phase: Phase,
    pub coverage_pct: f64,
    pub pages_crawled: usize,
    pub total_known_urls: usize,
    pub initial_sitemap_urls: usize,
    pub discovered_urls: usize,
    pub recent_quality: Option<f64>,
    pub quality_trend: QualityTrend,
    pub velocity_per_min: f64,
    pub eta_seconds: Option<f64>,
    pub current_url: Option<String>,
    pub plateau_detected: bool,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub run_id: String,
    pub coverage_pct: f64,
    pub pages_crawled: usize,
    pub total_known_urls: usize,
    pub quality_trend: QualityTrend,
    pub elapsed_secs: f64,
    pub stop_reason: Option<String>,
    pub phase: Phase,
}

/// One run's mutable coverage state. Owned by the orchestrator behind a
/// `tokio::sync::Mutex`; every mutating method also recomputes and returns a
/// fresh snapshot so callers never read stale derived fields.
pub struct CoverageTracker {
    run_id: String,
    phase: Phase,
    started_at: Instant,

    initial_sitemap_urls: HashSet<String>,
    discovered_urls: HashSet<String>,
    crawled_urls: HashSet<String>,
    failed_urls: HashSet<String>,

    quality_history: Vec<f64>,
    current_url: Option<String>,
    plateau_detected: bool,
    stop_reason: Option<String>,
}

impl CoverageTracker {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            phase: Phase::Initializing,
            started_at: Instant::now(),
            initial_sitemap_urls: HashSet::new(),
            discovered_urls: HashSet::new(),
            crawled_urls: HashSet::new(),
            failed_urls: HashSet::new(),
            quality_history: Vec::new(),
            current_url: None,
            plateau_detected: false,
            stop_reason: None,
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn seed_sitemap_urls(&mut self, urls: impl IntoIterator<Item = String>) {
        self.initial_sitemap_urls.extend(urls);
    }

    pub fn record_discovered(&mut self, url: String) {
        self.discovered_urls.insert(url);
    }

    pub fn record_fetch_started(&mut self, url: String) {
        self.current_url = Some(url);
    }

    pub fn record_crawled(&mut self, url: String, quality_score: Option<f64>) {
        self.crawled_urls.insert(url);
        if let Some(score) = quality_score {
            self.quality_history.push(score);
            if self.quality_history.len() > QUALITY_HISTORY_CAP {
                self.quality_history.remove(0);
            }
        }
    }

    pub fn record_failed(&mut self, url: String) {
        self.failed_urls.insert(url);
    }

    pub fn record_plateau(&mut self, reason: String) {
        self.plateau_detected = true;
        self.stop_reason = Some(reason);
        self.phase = Phase::QualityPlateau;
    }

    pub fn record_failure_reason(&mut self, reason: String) {
        self.phase = Phase::Failed;
        self.stop_reason = Some(reason);
    }

    pub fn complete(&mut self) {
        if self.phase != Phase::QualityPlateau && self.phase != Phase::Failed {
            self.phase = Phase::Completed;
        }
    }

    fn total_known(&self) -> usize {
        self.initial_sitemap_urls.union(&self.discovered_urls).count()
    }

    fn coverage_pct(&self) -> f64 {
        let total = self.total_known();
        if total == 0 {
            0.0
        } else {
            100.0 * self.crawled_urls.len() as f64 / total as f64
        }
    }

    fn velocity_per_min(&self) -> f64 {
        let elapsed_min = self.started_at.elapsed().as_secs_f64() / 60.0;
        if elapsed_min <= 0.0 {
            0.0
        } else {
            self.crawled_urls.len() as f64 / elapsed_min
        }
    }

    fn eta_seconds(&self, velocity: f64) -> Option<f64> {
        if velocity <= 0.0 {
            return None;
        }
        let remaining = self.total_known().saturating_sub(self.crawled_urls.len()) as f64;
        Some(remaining / velocity * 60.0)
    }

    /// Compare the mean of the first half vs second half of the last
    /// `TREND_WINDOW` quality scores. Fewer than 3 scores is `insufficient`.
    fn quality_trend(&self) -> QualityTrend {
        let recent: &[f64] = if self.quality_history.len() > TREND_WINDOW {
            &self.quality_history[self.quality_history.len() - TREND_WINDOW..]
        } else {
            &self.quality_history
        };

        if recent.len() < 3 {
            return QualityTrend::Insufficient;
        }

        let mid = recent.len() / 2;
        let first_half = mean(&recent[..mid]);
        let second_half = mean(&recent[mid..]);
        let delta = second_half - first_half;

        if delta > TREND_EPSILON {
            QualityTrend::Improving
        } else if delta < -TREND_EPSILON {
            QualityTrend::Declining
        } else {
            QualityTrend::Stable
        }
    }

    pub fn snapshot(&self) -> CoverageSnapshot {
        let velocity = self.velocity_per_min();
        CoverageSnapshot {
            run_id: self.run_id.clone(),
            timestamp: chrono::Utc::now(),
            phase: self.phase,
            coverage_pct: self.coverage_pct(),
            pages_crawled: self.crawled_urls.len(),
            total_known_urls: self.total_known(),
            initial_sitemap_urls: self.initial_sitemap_urls.len(),
            discovered_urls: self.discovered_urls.len(),
            recent_quality: self.quality_history.last().copied(),
            quality_trend: self.quality_trend(),
            velocity_per_min: velocity,
            eta_seconds: self.eta_seconds(velocity),
            current_url: self.current_url.clone(),
            plateau_detected: self.plateau_detected,
            stop_reason: self.stop_reason.clone(),
        }
    }

    pub fn summary(&self) -> SummaryStats {
        SummaryStats {
            run_id: self.run_id.clone(),
            coverage_pct: self.coverage_pct(),
            pages_crawled: self.crawled_urls.len(),
            total_known_urls: self.total_known(),
            quality_trend: self.quality_trend(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
            stop_reason: self.stop_reason.clone(),
            phase: self.phase,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_pct_is_zero_with_no_known_urls() {
        let tracker = CoverageTracker::new("run1".to_string());
        assert_eq!(tracker.coverage_pct(), 0.0);
    }

    #[test]
    fn coverage_pct_reflects_crawled_over_known() {
        let mut tracker = CoverageTracker::new("run1".to_string());
        tracker.seed_sitemap_urls(["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]);
        tracker.record_crawled("a".to_string(), None);
        assert_eq!(tracker.coverage_pct(), 25.0);
    }

    #[test]
    fn coverage_never_decreases_as_pages_are_crawled() {
        let mut tracker = CoverageTracker::new("run1".to_string());
        tracker.seed_sitemap_urls(["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]);
        let mut last = tracker.coverage_pct();
        for url in ["a", "b", "c"] {
            tracker.record_crawled(url.to_string(), None);
            let next = tracker.coverage_pct();
            assert!(next >= last);
            last = next;
        }
    }

    #[test]
    fn quality_trend_insufficient_below_three_scores() {
        let mut tracker = CoverageTracker::new("run1".to_string());
        tracker.record_crawled("a".to_string(), Some(0.9));
        tracker.record_crawled("b".to_string(), Some(0.8));
        assert_eq!(tracker.quality_trend(), QualityTrend::Insufficient);
    }

    #[test]
    fn quality_trend_detects_decline() {
        let mut tracker = CoverageTracker::new("run1".to_string());
        for score in [0.9, 0.85, 0.4, 0.3, 0.2] {
            tracker.record_crawled(format!("url-{score}"), Some(score));
        }
        assert_eq!(tracker.quality_trend(), QualityTrend::Declining);
    }

    #[test]
    fn quality_trend_detects_improvement() {
        let mut tracker = CoverageTracker::new("run1".to_string());
        for score in [0.2, 0.3, 0.6, 0.85, 0.9] {
            tracker.record_crawled(format!("url-{score}"), Some(score));
        }
        assert_eq!(tracker.quality_trend(), QualityTrend::Improving);
    }

    #[test]
    fn plateau_sets_phase_and_reason() {
        let mut tracker = CoverageTracker::new("run1".to_string());
        tracker.record_plateau("quality plateau: diversity collapsed".to_string());
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, Phase::QualityPlateau);
        assert!(snapshot.plateau_detected);
        assert_eq!(snapshot.stop_reason.unwrap(), "quality plateau: diversity collapsed");
    }
}
