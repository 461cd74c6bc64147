//! Scenario 6: a subscriber watching one run's coverage snapshots never
//! observes a decrease, and the terminal `crawl_completed` event's
//! `final_coverage_percentage` is at least the last streamed snapshot.

use crawlmind::coverage::{CoverageTracker, Phase};
use crawlmind::events::{EventBroadcaster, StreamEvent};

#[tokio::test]
async fn subscriber_never_observes_a_coverage_decrease_and_final_event_matches_or_exceeds_last_snapshot() {
    let bus = EventBroadcaster::new();
    let run_id = "run-monotonic";
    bus.register_run(run_id).await;
    let (mut rx, _) = bus.subscribe(run_id).await.unwrap();

    let mut tracker = CoverageTracker::new(run_id.to_string());
    tracker.set_phase(Phase::Crawling);
    tracker.seed_sitemap_urls(["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"].map(String::from));

    let mut observed = Vec::new();
    for url in ["a", "b"] {
        tracker.record_crawled(url.to_string(), Some(0.9));
        let snapshot = tracker.snapshot();
        observed.push(snapshot.coverage_pct);
        bus.publish(run_id, StreamEvent::CoverageUpdate(snapshot)).await;
    }

    // Discovery grows the denominator; coverage can only move with crawled
    // count for a fixed denominator, but it must never regress outright.
    tracker.record_discovered("k".to_string());
    tracker.record_discovered("l".to_string());
    for url in ["c", "d", "e", "f", "g"] {
        tracker.record_crawled(url.to_string(), Some(0.85));
        let snapshot = tracker.snapshot();
        observed.push(snapshot.coverage_pct);
        bus.publish(run_id, StreamEvent::CoverageUpdate(snapshot)).await;
    }

    for pair in observed.windows(2) {
        assert!(pair[1] >= pair[0], "coverage regressed: {} -> {}", pair[0], pair[1]);
    }

    tracker.complete();
    let last_streamed = *observed.last().unwrap();
    let summary = tracker.summary();
    bus.publish(run_id, StreamEvent::CrawlCompleted { final_coverage_percentage: summary.coverage_pct }).await;

    assert!(summary.coverage_pct >= last_streamed);

    let mut received_completion = false;
    while let Ok(event) = rx.try_recv() {
        if let StreamEvent::CrawlCompleted { final_coverage_percentage } = event {
            assert!(final_coverage_percentage >= last_streamed);
            received_completion = true;
        }
    }
    assert!(received_completion, "subscriber should have observed the terminal crawl_completed event");
}

#[test]
fn coverage_denominator_never_shrinks_as_new_urls_are_discovered() {
    let mut tracker = CoverageTracker::new("run-denominator".to_string());
    tracker.seed_sitemap_urls(["a", "b"].map(String::from));
    let first_total = tracker.snapshot().total_known_urls;

    tracker.record_discovered("c".to_string());
    let second_total = tracker.snapshot().total_known_urls;
    assert!(second_total >= first_total);

    tracker.record_discovered("a".to_string()); // already known, must not inflate the set
    let third_total = tracker.snapshot().total_known_urls;
    assert_eq!(third_total, second_total);
}
