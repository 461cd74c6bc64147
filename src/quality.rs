//! Quality Plateau Monitor (C6): two sliding windows — worthiness and content
//! diversity — that together decide when a crawl has stopped finding anything
//! new worth keeping.

use std::collections::VecDeque;

use crate::domain::SiteType;

/// Per-site-type stop thresholds and window sizes (§4.6). `diversity_threshold`
/// is a *similarity* ceiling: the monitor requires the unique-hash ratio to stay
/// above `1.0 - diversity_threshold`.
#[derive(Debug, Clone, Copy)]
pub struct SiteTypeThresholds {
    pub worthy_threshold: f64,
    pub diversity_threshold: f64,
    pub worthy_window_size: usize,
    pub diversity_window_size: usize,
}

impl SiteTypeThresholds {
    const fn new(worthy_threshold: f64, diversity_threshold: f64, worthy_window_size: usize, diversity_window_size: usize) -> Self {
        Self {
            worthy_threshold,
            diversity_threshold,
            worthy_window_size,
            diversity_window_size,
        }
    }
}

/// The built-in per-site-type threshold table. `config::EngineConfig` may merge
/// overrides on top of this rather than replacing it.
pub fn default_thresholds(site_type: SiteType) -> SiteTypeThresholds {
    match site_type {
        SiteType::Ecommerce => SiteTypeThresholds::new(0.15, 0.95, 15, 12),
        SiteType::Banking => SiteTypeThresholds::new(0.30, 0.80, 25, 18),
        SiteType::News => SiteTypeThresholds::new(0.40, 0.70, 20, 15),
        SiteType::Healthcare => SiteTypeThresholds::new(0.25, 0.85, 20, 15),
        SiteType::Government => SiteTypeThresholds::new(0.25, 0.85, 20, 15),
        SiteType::Educational => SiteTypeThresholds::new(0.20, 0.90, 20, 15),
        SiteType::Legal => SiteTypeThresholds::new(0.30, 0.80, 20, 15),
        _ => SiteTypeThresholds::new(0.30, 0.80, 20, 15),
    }
}

/// Replace runs of ASCII digits with `#`, collapsing e.g. `/products/1029` and
/// `/products/4471` to the same pattern key so paginated/ID-keyed URLs don't
/// masquerade as diverse content.
pub fn url_pattern_key(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_digits = false;
    for c in path.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                out.push('#');
                in_digits = true;
            }
        } else {
            in_digits = false;
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct QualityStats {
    pub worthy_ratio: Option<f64>,
    pub worthy_window_len: usize,
    pub unique_hash_ratio: Option<f64>,
    pub unique_pattern_ratio: Option<f64>,
    pub plateau_detected: bool,
    pub stop_reason: Option<String>,
}

/// The combined worthiness + diversity monitor for one crawl run.
pub struct QualityPlateauMonitor {
    thresholds: SiteTypeThresholds,
    worthy_window: VecDeque<bool>,
    hash_window: VecDeque<u64>,
    pattern_window: VecDeque<String>,
}

impl QualityPlateauMonitor {
    pub fn new(thresholds: SiteTypeThresholds) -> Self {
        Self {
            thresholds,
            worthy_window: VecDeque::with_capacity(thresholds.worthy_window_size),
            hash_window: VecDeque::with_capacity(thresholds.diversity_window_size),
            pattern_window: VecDeque::with_capacity(thresholds.diversity_window_size),
        }
    }

    /// Record one page decision. The worthiness bit is pushed for every
    /// decision, fetched or not. `diversity` is `None` for pages that were
    /// never actually fetched (basic-filter rejects, fetch failures) — there
    /// is no real content hash or URL-pattern to speak of for those, and
    /// stacking the diversity windows with a sentinel value for them would
    /// manufacture a false diversity collapse.
    pub fn record(&mut self, is_worthy: bool, diversity: Option<(u64, String)>) {
        push_bounded(&mut self.worthy_window, is_worthy, self.thresholds.worthy_window_size);
        if let Some((content_hash, pattern_key)) = diversity {
            push_bounded(&mut self.hash_window, content_hash, self.thresholds.diversity_window_size);
            push_bounded(&mut self.pattern_window, pattern_key, self.thresholds.diversity_window_size);
        }
    }

    fn worthy_ratio(&self) -> Option<f64> {
        if self.worthy_window.len() < self.thresholds.worthy_window_size {
            return None;
        }
        let worthy = self.worthy_window.iter().filter(|w| **w).count();
        Some(worthy as f64 / self.worthy_window.len() as f64)
    }

    fn diversity_ratios(&self) -> Option<(f64, f64)> {
        if self.hash_window.len() < self.thresholds.diversity_window_size {
            return None;
        }
        let unique_hashes: std::collections::HashSet<_> = self.hash_window.iter().collect();
        let unique_patterns: std::collections::HashSet<_> = self.pattern_window.iter().collect();
        let n = self.hash_window.len() as f64;
        Some((unique_hashes.len() as f64 / n, unique_patterns.len() as f64 / n))
    }

    /// Evaluate the combined stop condition. Returns the human-readable
    /// `stop_reason` the moment either window triggers.
    pub fn check_stop(&self) -> Option<String> {
        if let Some(ratio) = self.worthy_ratio() {
            if ratio < self.thresholds.worthy_threshold {
                return Some(format!(
                    "quality plateau: {:.0}% worthy in last {} pages (threshold {:.0}%)",
                    ratio * 100.0,
                    self.thresholds.worthy_window_size,
                    self.thresholds.worthy_threshold * 100.0
                ));
            }
        }

        if let Some((hash_ratio, pattern_ratio)) = self.diversity_ratios() {
            let min_unique_hash_ratio = 1.0 - self.thresholds.diversity_threshold;
            if hash_ratio < min_unique_hash_ratio || pattern_ratio < 0.3 {
                return Some(format!(
                    "quality plateau: content diversity collapsed (unique content {:.0}%, unique url patterns {:.0}%)",
                    hash_ratio * 100.0,
                    pattern_ratio * 100.0
                ));
            }
        }

        None
    }

    pub fn stats(&self) -> QualityStats {
        let worthy_ratio = self.worthy_ratio();
        let diversity = self.diversity_ratios();
        let stop_reason = self.check_stop();
        QualityStats {
            worthy_ratio,
            worthy_window_len: self.worthy_window.len(),
            unique_hash_ratio: diversity.map(|(h, _)| h),
            unique_pattern_ratio: diversity.map(|(_, p)| p),
            plateau_detected: stop_reason.is_some(),
            stop_reason,
        }
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, item: T, cap: usize) {
    if window.len() == cap {
        window.pop_front();
    }
    window.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_stop_before_window_full() {
        let mut monitor = QualityPlateauMonitor::new(default_thresholds(SiteType::News));
        for _ in 0..10 {
            monitor.record(false, Some((1, "p".to_string())));
        }
        assert!(monitor.check_stop().is_none());
    }

    #[test]
    fn stops_after_window_size_consecutive_unworthy() {
        let thresholds = default_thresholds(SiteType::News);
        let mut monitor = QualityPlateauMonitor::new(thresholds);
        for i in 0..thresholds.worthy_window_size {
            monitor.record(false, Some((i as u64, format!("pattern-{i}"))));
        }
        let reason = monitor.check_stop();
        assert!(reason.is_some());
        assert!(reason.unwrap().contains("quality plateau"));
    }

    #[test]
    fn no_stop_after_window_size_consecutive_worthy() {
        let thresholds = default_thresholds(SiteType::News);
        let mut monitor = QualityPlateauMonitor::new(thresholds);
        for i in 0..thresholds.worthy_window_size {
            monitor.record(true, Some((i as u64, format!("pattern-{i}"))));
        }
        assert!(monitor.check_stop().is_none());
    }

    #[test]
    fn no_stop_from_basic_filter_rejects_with_no_content() {
        // Basic-filter rejects and fetch failures carry no diversity signal;
        // they must not be able to manufacture a diversity-collapse stop by
        // themselves.
        let thresholds = default_thresholds(SiteType::Ecommerce);
        let mut monitor = QualityPlateauMonitor::new(thresholds);
        for _ in 0..(thresholds.diversity_window_size * 3) {
            monitor.record(false, None);
        }
        let reason = monitor.check_stop();
        // The worthiness window alone may still trigger (all unworthy), but
        // it must not be attributed to diversity collapse.
        if let Some(reason) = reason {
            assert!(!reason.contains("diversity"));
        }
    }

    #[test]
    fn diversity_window_triggers_on_repeated_pattern() {
        let thresholds = default_thresholds(SiteType::Ecommerce);
        let mut monitor = QualityPlateauMonitor::new(thresholds);
        for i in 0..thresholds.diversity_window_size {
            // All worthy (so the worthiness window doesn't trigger first), but
            // every page reduces to the same url pattern and a repeating set of
            // three content hashes.
            monitor.record(true, Some(((i % 3) as u64, "/products/#".to_string())));
        }
        let reason = monitor.check_stop().unwrap();
        assert!(reason.contains("diversity"));
    }

    #[test]
    fn url_pattern_key_collapses_numeric_ids() {
        assert_eq!(url_pattern_key("/products/1029"), "/products/#");
        assert_eq!(url_pattern_key("/products/4471/reviews/2"), "/products/#/reviews/#");
    }
}
