//! Content Classifier Cascade (C4): three tiers run in order on every fetched
//! page — C1's free structural reject filters, a free keyword-weighted
//! heuristic scorer, and (only when both of those are inconclusive and a
//! provider credential is configured) a paid LLM call. Verdicts are cached
//! per run so a repeated `(url, title)` pair never pays for the LLM tier
//! twice.
//!
//! Modeled as a strategy object per §9's design note: each tier is a step
//! that may produce a definite `ClassificationResult`, and the cascade
//! short-circuits on the first one that does.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::page::{ClassificationMethod, ClassificationResult};
use crate::domain::site_type::SiteType;
use crate::domain::url::{reject_reason, CanonicalUrl};

const HEURISTIC_WORTHY_THRESHOLD: f64 = 0.5;
/// Below this certainty, the heuristic tier's verdict is not treated as
/// definite and the cascade falls through to the LLM tier (when available).
const HEURISTIC_CONFIDENT_LOW: f64 = 0.30;

/// Cost-per-1k-token pricing for the models the LLM tier is allowed to call.
/// Unknown models fall back to the first entry's rate so cost tracking never
/// panics on a misconfigured `llm_model`.
const PRICING_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.00015, 0.00060),
    ("gpt-4o", 0.0025, 0.0100),
    ("gpt-4-turbo", 0.0100, 0.0300),
];

fn pricing_for(model: &str) -> (f64, f64) {
    PRICING_TABLE
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or((PRICING_TABLE[0].1, PRICING_TABLE[0].2))
}

/// Cache key: URL-only pages (no title/content supplied, e.g. sitemap
/// pre-classification) hash just the path; everything else hashes
/// `(path, title)` so a changed headline re-runs the cascade.
fn cache_key(path: &str, title: &str, url_only: bool) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    if !url_only {
        title.hash(&mut hasher);
    }
    hasher.finish()
}

/// Minimal shape of an OpenAI-compatible chat completion the LLM tier needs:
/// the first choice's message content and, when present, token usage.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

/// One page to classify. `content` is `None` for URL-only pre-classification
/// (§4.5's sitemap priority ranking); the LLM tier is skipped in that mode
/// since there is nothing substantive to put in its prompt.
pub struct ClassifyInput<'a> {
    pub url: &'a CanonicalUrl,
    pub site_domain: Option<&'a str>,
    pub site_type: SiteType,
    pub title: &'a str,
    pub content: Option<&'a str>,
    pub link_count: usize,
}

/// Runs the three-tier cascade and owns the in-process verdict cache. One
/// instance per crawl run; cheap to clone (the cache is an `Arc` internally).
pub struct Classifier {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    cache: Cache<u64, Arc<ClassificationResult>>,
}

impl Classifier {
    pub fn new(api_key: Option<String>, model: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            timeout,
            cache: Cache::builder().max_capacity(10_000).build(),
        }
    }

    /// Run the cascade for one page.
    pub async fn classify(&self, input: ClassifyInput<'_>) -> ClassificationResult {
        let path = input.url.path();

        if let Some(reason) = reject_reason(input.url, input.site_domain) {
            return ClassificationResult::basic_reject(reason.as_str());
        }

        let content = input.content.unwrap_or("");
        let heuristic = heuristic_score(&path, input.title, content);
        if heuristic.confidence >= HEURISTIC_CONFIDENT_LOW || input.content.is_none() {
            return heuristic;
        }

        let url_only = false;
        let key = cache_key(&path, input.title, url_only);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(path = %path, "classification cache hit");
            let mut result = (*cached).clone();
            result.method = ClassificationMethod::Cache;
            return result;
        }

        let result = match self.classify_via_llm(input.site_type, input.title, content).await {
            Ok(result) => result,
            Err(e) => {
                warn!(path = %path, error = %e, "LLM classification failed, falling back to heuristic verdict");
                heuristic
            }
        };

        self.cache.insert(key, Arc::new(result.clone())).await;
        result
    }

    /// URL-only convenience wrapper for §4.5's sitemap pre-classification.
    pub async fn classify_url_only(&self, url: &CanonicalUrl, site_domain: Option<&str>) -> ClassificationResult {
        self.classify(ClassifyInput {
            url,
            site_domain,
            site_type: SiteType::Unknown,
            title: "",
            content: None,
            link_count: 0,
        })
        .await
    }

    async fn classify_via_llm(&self, site_type: SiteType, title: &str, content: &str) -> anyhow::Result<ClassificationResult> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no LLM_API_KEY configured"))?;

        let snippet: String = content.chars().take(800).collect();
        let prompt = build_prompt(site_type, title, &snippet);

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a content worthiness classifier for a web crawler building a product demo mirror."},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.0,
        });

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("LLM request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("LLM returned status {}", response.status()));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("LLM response was not valid JSON: {e}"))?;

        let raw = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow::anyhow!("LLM response had no choices"))?;

        let (is_worthy, confidence, reasoning) = parse_llm_response(raw);
        let token_usage = parsed.usage.map(|u| u.total_tokens);
        let estimated_cost = token_usage.map(|tokens| {
            let (input_rate, output_rate) = pricing_for(&self.model);
            (tokens as f64 / 1000.0) * ((input_rate + output_rate) / 2.0)
        });

        Ok(ClassificationResult {
            is_worthy,
            confidence,
            reasoning,
            method: ClassificationMethod::Llm,
            token_usage,
            estimated_cost,
        })
    }
}

fn build_prompt(site_type: SiteType, title: &str, content: &str) -> String {
    format!(
        "This page belongs to a {site} website. Decide whether it is worth \
         keeping in a product-demo crawl archive (substantive, demo-worthy \
         content vs. boilerplate, admin, legal, or placeholder pages).\n\
         Title: {title}\n\
         Content:\n{content}\n\n\
         Respond in exactly this format:\n\
         WORTHY: true|false\n\
         CONFIDENCE: 0.0-1.0\n\
         REASONING: <one sentence>",
        site = site_type.as_str(),
    )
}

/// Tolerant parser for the `WORTHY:`/`CONFIDENCE:`/`REASONING:` response
/// format (§4.4, §9). The `WORTHY` token controls the verdict with a safety
/// default of `false` on ambiguous parses; a numeric confidence is extracted
/// anywhere after `CONFIDENCE:` and divided by 100 if it reads as a
/// percentage (> 1). The parser never panics on adversarial output.
fn parse_llm_response(raw: &str) -> (bool, f64, String) {
    let mut is_worthy = false;
    let mut confidence = 0.5;
    let mut reasoning = String::new();

    for line in raw.lines() {
        let line = line.trim();
        if let Some(rest) = strip_prefix_ci(line, "WORTHY:") {
            is_worthy = rest.trim().to_ascii_lowercase().starts_with('y') || rest.trim().eq_ignore_ascii_case("true");
        } else if let Some(rest) = strip_prefix_ci(line, "CONFIDENCE:") {
            if let Ok(mut v) = rest.trim().trim_end_matches('%').parse::<f64>() {
                if v > 1.0 {
                    v /= 100.0;
                }
                confidence = v.clamp(0.0, 1.0);
            }
        } else if let Some(rest) = strip_prefix_ci(line, "REASONING:") {
            reasoning = rest.trim().to_string();
        }
    }

    if reasoning.is_empty() {
        reasoning = "llm classification (unparsed reasoning)".to_string();
    }

    (is_worthy, confidence, reasoning)
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

const BUSINESS_TERMS: &[&str] = &["product", "service", "solution", "pricing", "feature", "customer", "platform", "about", "team", "case-study", "documentation", "guide"];
const VALUABLE_PDF_TERMS: &[&str] = &["report", "whitepaper", "brochure", "datasheet"];
const JUNK_PDF_TERMS: &[&str] = &["debug", "cache", "temp", "backup", "draft"];
const JUNK_INDICATORS: &[&str] = &["admin", "api/v", "internal"];
const BUSINESS_PATH_SEGMENTS: &[&str] = &["/business/", "/commercial/", "/corporate/"];
const ERROR_PATH_SEGMENTS: &[&str] = &["/404", "/error", "/test", "/dev"];

/// Tier 2 (§4.4): a keyword-weighted scorer starting at a neutral 0.5 and
/// adjusted by hits across the URL path, title, and content. Clamped to
/// `[0, 1]`; worthy iff the final score is at least 0.5. `confidence` here is
/// certainty of the verdict — distance from the 0.5 decision boundary — per
/// §9's open-question resolution, not "how worthy" the page is.
fn heuristic_score(path: &str, title: &str, content: &str) -> ClassificationResult {
    let path_lower = path.to_ascii_lowercase();
    let haystack = format!("{} {} {}", path_lower, title.to_ascii_lowercase(), content.to_ascii_lowercase());
    let is_pdf = path_lower.ends_with(".pdf");

    let mut score = 0.5;
    let mut hits: Vec<&str> = Vec::new();

    if BUSINESS_TERMS.iter().any(|t| haystack.contains(t)) {
        score += 0.15;
        hits.push("business_term(+0.15)");
    }
    if is_pdf && VALUABLE_PDF_TERMS.iter().any(|t| haystack.contains(t)) {
        score += 0.3;
        hits.push("valuable_pdf(+0.30)");
    }
    if is_pdf && JUNK_PDF_TERMS.iter().any(|t| haystack.contains(t)) {
        score -= 0.4;
        hits.push("junk_pdf(-0.40)");
    }
    if JUNK_INDICATORS.iter().any(|t| haystack.contains(t)) {
        score -= 0.3;
        hits.push("junk_indicator(-0.30)");
    }
    if BUSINESS_PATH_SEGMENTS.iter().any(|seg| path_lower.contains(seg)) {
        score += 0.2;
        hits.push("business_path(+0.20)");
    }
    if ERROR_PATH_SEGMENTS.iter().any(|seg| path_lower.contains(seg)) {
        score -= 0.5;
        hits.push("error_path(-0.50)");
    }

    let score = score.clamp(0.0, 1.0);
    let is_worthy = score >= HEURISTIC_WORTHY_THRESHOLD;
    let confidence = ((score - 0.5).abs() * 2.0).clamp(0.0, 1.0);

    ClassificationResult {
        is_worthy,
        confidence,
        reasoning: format!("heuristic score {score:.2} [{}]", hits.join(", ")),
        method: ClassificationMethod::Heuristic,
        token_usage: None,
        estimated_cost: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::url::canonicalize;

    fn url(s: &str) -> CanonicalUrl {
        canonicalize(s, None).unwrap()
    }

    #[test]
    fn heuristic_rewards_recognized_business_terms() {
        let verdict = heuristic_score("/products", "Our Products", "");
        assert!(verdict.is_worthy);
        assert_eq!(verdict.method, ClassificationMethod::Heuristic);
    }

    #[test]
    fn heuristic_penalizes_error_paths() {
        let verdict = heuristic_score("/404", "Not Found", "");
        assert!(!verdict.is_worthy);
    }

    #[test]
    fn heuristic_penalizes_junk_indicators() {
        let verdict = heuristic_score("/internal/api/v2/status", "", "");
        assert!(!verdict.is_worthy);
    }

    #[test]
    fn heuristic_rewards_business_path_segment() {
        let verdict = heuristic_score("/corporate/overview", "", "");
        assert!(verdict.is_worthy);
    }

    #[test]
    fn heuristic_rewards_valuable_pdf_over_junk_pdf() {
        let valuable = heuristic_score("/downloads/annual-report.pdf", "", "");
        let junk = heuristic_score("/downloads/debug-cache.pdf", "", "");
        assert!(valuable.is_worthy);
        assert!(!junk.is_worthy);
    }

    #[test]
    fn confidence_is_zero_at_the_decision_boundary() {
        let verdict = heuristic_score("/some/neutral/path", "", "");
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn tier1_rejects_non_content_path_before_heuristic_runs() {
        let result = futures::executor::block_on(async {
            let classifier = Classifier::new(None, "gpt-4o-mini".to_string(), Duration::from_secs(5));
            classifier
                .classify(ClassifyInput {
                    url: &url("https://site.example.com/admin/logs"),
                    site_domain: None,
                    site_type: SiteType::Unknown,
                    title: "",
                    content: Some("plenty of substantive content about our business products and services"),
                    link_count: 0,
                })
                .await
        });
        assert!(!result.is_worthy);
        assert_eq!(result.method, ClassificationMethod::Basic);
        assert_eq!(result.reasoning, "non_content_path");
    }

    #[test]
    fn cache_key_url_only_ignores_title() {
        let a = cache_key("/same/path", "Title A", true);
        let b = cache_key("/same/path", "Title B", true);
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_full_distinguishes_title() {
        let a = cache_key("/same/path", "Title A", false);
        let b = cache_key("/same/path", "Title B", false);
        assert_ne!(a, b);
    }

    #[test]
    fn parses_well_formed_llm_response() {
        let raw = "WORTHY: true\nCONFIDENCE: 0.92\nREASONING: substantive product documentation";
        let (worthy, confidence, reasoning) = parse_llm_response(raw);
        assert!(worthy);
        assert!((confidence - 0.92).abs() < 1e-9);
        assert_eq!(reasoning, "substantive product documentation");
    }

    #[test]
    fn parses_percentage_style_confidence() {
        let (worthy, confidence, _) = parse_llm_response("WORTHY: yes\nCONFIDENCE: 85");
        assert!(worthy);
        assert!((confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn falls_back_gracefully_on_malformed_llm_response() {
        let (worthy, confidence, reasoning) = parse_llm_response("not the expected format at all");
        assert!(!worthy);
        assert_eq!(confidence, 0.5);
        assert!(!reasoning.is_empty());
    }

    #[test]
    fn pricing_falls_back_to_first_entry_for_unknown_model() {
        let (input, output) = pricing_for("some-future-model");
        assert_eq!((input, output), (PRICING_TABLE[0].1, PRICING_TABLE[0].2));
    }
}
