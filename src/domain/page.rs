//! Shared value types produced as pages move through the pipeline (§3).
//!
//! Everything here is a plain value object: construct, read, discard. None of
//! these types carry behavior beyond small accessors — the logic that produces
//! them lives in `dedup`, `classify`, `sitemap`, and `orchestrator`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::url::CanonicalUrl;

/// A link discovered but not yet fetched. Created once, consumed at most once.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub canonical_url: CanonicalUrl,
    pub discovered_from: Option<CanonicalUrl>,
    pub depth: u32,
    pub priority_score: f64,
}

impl FrontierEntry {
    pub fn seed(url: CanonicalUrl) -> Self {
        Self {
            canonical_url: url,
            discovered_from: None,
            depth: 0,
            priority_score: 1.0,
        }
    }
}

/// Whether a fetch returned the browser's post-JS DOM or the raw HTTP body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HtmlFlavor {
    Raw,
    Rendered,
}

/// An immutable record of one successful fetch. `discovered_links` are the
/// canonical, same-site links extracted from the page — the orchestrator
/// enqueues any that are unseen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub canonical_url: CanonicalUrl,
    pub final_url: String,
    pub http_status: u16,
    pub content_type: String,
    pub rendered_html: String,
    pub extracted_markdown: String,
    pub title: String,
    pub discovered_links: Vec<CanonicalUrl>,
    pub fetched_at: DateTime<Utc>,
    pub html_flavor: HtmlFlavor,
}

/// Which cascade tier produced a `ClassificationResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Basic,
    Heuristic,
    Llm,
    Cache,
}

/// The verdict of the content classifier cascade (C4). `confidence` is
/// certainty of the verdict, not "how worthy" — see the open question in §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_worthy: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub method: ClassificationMethod,
    pub token_usage: Option<u32>,
    pub estimated_cost: Option<f64>,
}

impl ClassificationResult {
    pub fn basic_reject(reason: &str) -> Self {
        Self {
            is_worthy: false,
            confidence: 1.0,
            reasoning: reason.to_string(),
            method: ClassificationMethod::Basic,
            token_usage: None,
            estimated_cost: None,
        }
    }
}

/// The outcome of running a fetched page through the deduplicator (C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupVerdictStatus {
    Canonical,
    Duplicate,
    Alias,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupVerdict {
    pub status: DedupVerdictStatus,
    pub canonical_url: String,
    pub reason: String,
}

impl DedupVerdict {
    pub fn canonical(url: &CanonicalUrl) -> Self {
        Self {
            status: DedupVerdictStatus::Canonical,
            canonical_url: url.as_str().to_string(),
            reason: "unique".to_string(),
        }
    }
}
