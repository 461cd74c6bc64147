//! End-to-end exercise of the Quality Plateau Monitor against the two
//! worked scenarios SPEC_FULL describes: a news site whose worthiness ratio
//! stays high through a batch of articles then collapses on tag pages, and a
//! brochure site whose progressive crawl collapses on URL-pattern diversity.

use crawlmind::domain::SiteType;
use crawlmind::quality::{default_thresholds, url_pattern_key, QualityPlateauMonitor};

#[test]
fn news_site_tolerates_mixed_batch_then_stops_on_tag_page_flood() {
    let thresholds = default_thresholds(SiteType::News);
    assert_eq!(thresholds.worthy_window_size, 20);
    let mut monitor = QualityPlateauMonitor::new(thresholds);

    // 30 articles: 24 worthy, 6 tag/archive pages not worthy. Only the last
    // `worthy_window_size` (20) decisions are in view once the window fills.
    let decisions: Vec<bool> = (0..30).map(|i| i % 5 != 0).collect();
    assert_eq!(decisions.iter().filter(|d| **d).count(), 24);

    for (i, worthy) in decisions.iter().enumerate() {
        monitor.record(*worthy, Some((i as u64, format!("article-{i}"))));
    }
    assert!(monitor.check_stop().is_none(), "mixed batch with mostly-worthy pages should not trigger a plateau stop");

    // 20 additional tag-page fetches, all unworthy: the window is now entirely
    // unworthy and must cross below the News threshold (0.40).
    for i in 30..50 {
        monitor.record(false, Some((i as u64, format!("tag-page-{i}"))));
    }
    let reason = monitor.check_stop();
    assert!(reason.is_some());
    assert!(reason.unwrap().contains("quality plateau"));
}

#[test]
fn brochure_site_progressive_crawl_stops_on_pattern_collapse() {
    // Progressive strategy has no site-type signal beyond the generic
    // fallback thresholds (diversity_window_size = 15).
    let thresholds = default_thresholds(SiteType::Unknown);
    let mut monitor = QualityPlateauMonitor::new(thresholds);

    // 40 pages, all "worthy" (so the worthiness window never triggers), but
    // the URL-pattern diversity collapses: only a handful of distinct
    // patterns recur across a window of 15.
    let patterns = ["/about", "/team", "/about", "/contact", "/about"];
    for i in 0..40u64 {
        let pattern = url_pattern_key(patterns[i as usize % patterns.len()]);
        monitor.record(true, Some((i % 3, pattern)));
    }

    let reason = monitor.check_stop();
    assert!(reason.is_some());
    assert!(reason.unwrap().contains("diversity"));
}

#[test]
fn url_pattern_key_groups_numeric_ids_the_same_way_the_monitor_relies_on() {
    assert_eq!(url_pattern_key("/brochure/services/42"), url_pattern_key("/brochure/services/7"));
    assert_ne!(url_pattern_key("/brochure/services/42"), url_pattern_key("/brochure/team/42"));
}
