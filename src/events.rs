//! Event Broadcaster (C9): a per-run subscriber registry. Grounded on the
//! `tokio::sync::broadcast`-based event bus of the `citescrape` crawl engine
//! (`crawl_events/bus.rs`), trimmed to what this crate's coverage surface
//! actually needs: one channel per run, snapshot-on-connect, and silent
//! removal of subscribers a broadcast failed to reach.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::coverage::CoverageSnapshot;

const CHANNEL_CAPACITY: usize = 256;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// The three event kinds a subscriber sees on the same channel (§4.9),
/// tagged so a `GET .../stream` SSE consumer can dispatch on `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    CoverageUpdate(CoverageSnapshot),
    CrawlStarted { start_url: String },
    CrawlCompleted { final_coverage_percentage: f64 },
    QualityPlateauDetected { reason: String },
    CrawlError { message: String },
    RunCleanup,
    Heartbeat,
}

struct RunChannel {
    sender: broadcast::Sender<StreamEvent>,
    latest_snapshot: Option<CoverageSnapshot>,
}

/// Owns one broadcast channel per active `run_id`. Shared across the
/// orchestrator and the axum router via `Arc`.
#[derive(Clone)]
pub struct EventBroadcaster {
    runs: Arc<Mutex<HashMap<String, RunChannel>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn register_run(&self, run_id: &str) {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.runs.lock().await.insert(
            run_id.to_string(),
            RunChannel {
                sender,
                latest_snapshot: None,
            },
        );
        info!(run_id, "registered new run for event broadcast");
    }

    /// Publish to a run's channel. A missing run (never registered, or
    /// already cleaned up) is a silent no-op: the orchestrator shouldn't have
    /// to check before every publish.
    pub async fn publish(&self, run_id: &str, event: StreamEvent) {
        let mut runs = self.runs.lock().await;
        if let Some(channel) = runs.get_mut(run_id) {
            if let StreamEvent::CoverageUpdate(ref snapshot) = event {
                channel.latest_snapshot = Some(snapshot.clone());
            }
            // `send` only errors when there are zero receivers; that's not a
            // failure worth logging, every publish is fire-and-forget.
            let _ = channel.sender.send(event);
        }
    }

    /// Subscribe to a run's channel. Returns the receiver plus the current
    /// snapshot (if any) so the caller can emit it immediately per §4.9's
    /// "on connect, the current snapshot is sent" rule.
    pub async fn subscribe(&self, run_id: &str) -> Option<(broadcast::Receiver<StreamEvent>, Option<CoverageSnapshot>)> {
        let runs = self.runs.lock().await;
        let channel = runs.get(run_id)?;
        Some((channel.sender.subscribe(), channel.latest_snapshot.clone()))
    }

    pub async fn list_active(&self) -> Vec<(String, usize)> {
        let runs = self.runs.lock().await;
        runs.iter().map(|(run_id, channel)| (run_id.clone(), channel.sender.receiver_count())).collect()
    }

    /// Drop subscribers and per-run state for `run_id` (§6 `cleanup`).
    pub async fn cleanup(&self, run_id: &str) {
        self.publish(run_id, StreamEvent::RunCleanup).await;
        self.runs.lock().await.remove(run_id);
        debug!(run_id, "cleaned up run event channel");
    }

    /// Spawn a background task that emits a `Heartbeat` to every active run
    /// on a fixed interval, so a connected-but-idle subscriber still sees
    /// periodic traffic even when nothing crawl-relevant is happening.
    pub fn spawn_heartbeat(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                let run_ids: Vec<String> = self.runs.lock().await.keys().cloned().collect();
                for run_id in run_ids {
                    self.publish(&run_id, StreamEvent::Heartbeat).await;
                }
            }
        });
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageTracker, Phase};

    #[tokio::test]
    async fn subscriber_receives_snapshot_sent_before_it_connected() {
        let bus = EventBroadcaster::new();
        bus.register_run("run1").await;

        let mut tracker = CoverageTracker::new("run1".to_string());
        tracker.set_phase(Phase::Crawling);
        bus.publish("run1", StreamEvent::CoverageUpdate(tracker.snapshot())).await;

        let (_, snapshot) = bus.subscribe("run1").await.unwrap();
        assert!(snapshot.is_some());
    }

    #[tokio::test]
    async fn publish_to_unregistered_run_is_a_silent_no_op() {
        let bus = EventBroadcaster::new();
        bus.publish("nonexistent", StreamEvent::Heartbeat).await;
        assert!(bus.subscribe("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn subscriber_receives_events_published_after_connecting() {
        let bus = EventBroadcaster::new();
        bus.register_run("run1").await;
        let (mut rx, _) = bus.subscribe("run1").await.unwrap();

        bus.publish(
            "run1",
            StreamEvent::CrawlStarted {
                start_url: "https://example.com".to_string(),
            },
        )
        .await;

        let event = rx.recv().await.unwrap();
        matches!(event, StreamEvent::CrawlStarted { .. });
    }

    #[tokio::test]
    async fn cleanup_removes_the_run() {
        let bus = EventBroadcaster::new();
        bus.register_run("run1").await;
        bus.cleanup("run1").await;
        assert!(bus.subscribe("run1").await.is_none());
    }

    #[tokio::test]
    async fn list_active_reports_subscriber_counts() {
        let bus = EventBroadcaster::new();
        bus.register_run("run1").await;
        let _rx = bus.subscribe("run1").await.unwrap();
        let active = bus.list_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "run1");
        assert_eq!(active[0].1, 1);
    }
}
