//! Batch-mode crawl binary: parses a seed URL and the run knobs of §6,
//! spawns the coverage HTTP surface on a background task, and drives one
//! crawl run to completion on the main task. Exit code matches the run's
//! terminal phase.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crawlmind::coverage::{CoverageSnapshot, SummaryStats};
use crawlmind::events::{EventBroadcaster, StreamEvent};
use crawlmind::orchestrator::{CrawlOrchestrator, RunOutcome, RunRequest};
use crawlmind::EngineConfig;

struct CliArgs {
    seed_url: String,
    max_pages: Option<usize>,
    run_id: Option<String>,
    respect_robots: Option<bool>,
    output: Option<String>,
    port: Option<u16>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut seed_url = None;
    let mut max_pages = None;
    let mut run_id = None;
    let mut respect_robots = None;
    let mut output = None;
    let mut port = None;

    let mut args = std::env::args().skip(1).peekable();
    while let Some(a) = args.next() {
        match a.as_str() {
            "--max-pages" => max_pages = args.next().and_then(|v| v.parse().ok()),
            "--run-id" => run_id = args.next(),
            "--respect-robots" => respect_robots = Some(true),
            "--output" => output = args.next(),
            "--port" => port = args.next().and_then(|v| v.parse().ok()),
            other if other.starts_with("--") => {
                warn!(flag = other, "ignoring unrecognized flag");
            }
            other => seed_url = Some(other.to_string()),
        }
    }

    let seed_url = seed_url.ok_or_else(|| anyhow::anyhow!("usage: crawlmind <seed_url> [--max-pages N] [--run-id ID] [--respect-robots] [--output DIR] [--port N]"))?;

    Ok(CliArgs { seed_url, max_pages, run_id, respect_robots, output, port })
}

fn port_from_env() -> Option<u16> {
    std::env::var("CRAWLMIND_PORT").ok().and_then(|v| v.trim().parse().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crawlmind=info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = parse_args()?;

    let mut config = EngineConfig::load();
    if let Some(max_pages) = cli.max_pages {
        config.max_pages = Some(max_pages);
    }
    if let Some(respect_robots) = cli.respect_robots {
        config.respect_robots = respect_robots;
    }
    if let Some(output) = &cli.output {
        config.output_root = output.into();
    }

    let http_timeout = std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse::<u64>().ok()).unwrap_or(30);
    let connect_timeout = std::env::var("HTTP_CONNECT_TIMEOUT_SECS").ok().and_then(|v| v.parse::<u64>().ok()).unwrap_or(10);
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(http_timeout))
        .connect_timeout(Duration::from_secs(connect_timeout))
        .user_agent(concat!("crawlmind/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let events = EventBroadcaster::new();
    let state = Arc::new(AppState {
        events: events.clone(),
        summaries: Arc::new(Mutex::new(HashMap::new())),
    });
    Arc::new(events.clone()).spawn_heartbeat();

    let port = cli.port.or_else(port_from_env).unwrap_or(8787);
    let app = build_router(state.clone());
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!("address already in use: {bind_addr}. Stop the existing process or pass --port {}", port.saturating_add(1))
        }
        Err(e) => return Err(e.into()),
    };
    info!("coverage surface listening on http://{bind_addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("coverage http server exited: {e}");
        }
    });

    let orchestrator = CrawlOrchestrator::new(config, http_client, events);
    let request = RunRequest {
        seed_url: cli.seed_url.clone(),
        max_pages: cli.max_pages,
        run_id: cli.run_id,
        respect_robots: cli.respect_robots,
    };

    let outcome: RunOutcome = match orchestrator.run(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(seed_url = %cli.seed_url, error = %e, "crawl run failed to start");
            std::process::exit(1);
        }
    };

    state.summaries.lock().await.insert(outcome.run_id.clone(), outcome.summary.clone());
    info!(run_id = %outcome.run_id, phase = ?outcome.phase, pages = outcome.summary.pages_crawled, coverage_pct = outcome.summary.coverage_pct, "crawl finished");

    match outcome.phase {
        crawlmind::coverage::Phase::Completed | crawlmind::coverage::Phase::QualityPlateau => Ok(()),
        _ => std::process::exit(1),
    }
}

#[derive(Clone)]
struct AppState {
    events: EventBroadcaster,
    summaries: Arc<Mutex<HashMap<String, SummaryStats>>>,
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/coverage/active", get(active_handler))
        .route("/coverage/{run_id}", get(snapshot_handler).delete(delete_handler))
        .route("/coverage/{run_id}/summary", get(summary_handler))
        .route("/coverage/{run_id}/stream", get(stream_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn snapshot_handler(State(state): State<Arc<AppState>>, Path(run_id): Path<String>) -> Result<Json<CoverageSnapshot>, StatusCode> {
    let (_, snapshot) = state.events.subscribe(&run_id).await.ok_or(StatusCode::NOT_FOUND)?;
    snapshot.map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn summary_handler(State(state): State<Arc<AppState>>, Path(run_id): Path<String>) -> Result<Json<SummaryStats>, StatusCode> {
    if let Some(summary) = state.summaries.lock().await.get(&run_id).cloned() {
        return Ok(Json(summary));
    }

    // Run still in progress: synthesize a partial summary from the latest
    // broadcast snapshot rather than 404ing a run that simply hasn't finished.
    let (_, snapshot) = state.events.subscribe(&run_id).await.ok_or(StatusCode::NOT_FOUND)?;
    let snapshot = snapshot.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(SummaryStats {
        run_id: snapshot.run_id,
        coverage_pct: snapshot.coverage_pct,
        pages_crawled: snapshot.pages_crawled,
        total_known_urls: snapshot.total_known_urls,
        quality_trend: snapshot.quality_trend,
        elapsed_secs: 0.0,
        stop_reason: snapshot.stop_reason,
        phase: snapshot.phase,
    }))
}

async fn active_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let active = state.events.list_active().await;
    Json(serde_json::json!(active
        .into_iter()
        .map(|(run_id, subscribers)| serde_json::json!({ "run_id": run_id, "subscribers": subscribers }))
        .collect::<Vec<_>>()))
}

async fn delete_handler(State(state): State<Arc<AppState>>, Path(run_id): Path<String>) -> StatusCode {
    state.events.cleanup(&run_id).await;
    state.summaries.lock().await.remove(&run_id);
    StatusCode::NO_CONTENT
}

async fn stream_handler(State(state): State<Arc<AppState>>, Path(run_id): Path<String>) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let (rx, snapshot) = state.events.subscribe(&run_id).await.ok_or(StatusCode::NOT_FOUND)?;

    let initial = stream::iter(snapshot.into_iter().map(|s| to_sse_event(&StreamEvent::CoverageUpdate(s))));
    let rest = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(event) => Some((to_sse_event(&event), rx)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "sse subscriber lagged, dropping oldest events");
                Some((Event::default().event("lagged").data(skipped.to_string()), rx))
            }
        }
    });

    Ok(Sse::new(initial.chain(rest).map(Ok)).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &StreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => Event::default().event("error").data(format!("{{\"serialize_error\":\"{e}\"}}")),
    }
}

