//! Engine configuration: a cascading resolver in the style of the teacher's
//! own `ShadowConfig` loader (§10.1) — each field tries, in order, an optional
//! JSON config file, then a same-named environment variable, then a hardcoded
//! default.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::SiteType;
use crate::quality::{default_thresholds, SiteTypeThresholds};

const ENV_CONFIG_PATH: &str = "CRAWLMIND_CONFIG";

/// Raw, all-optional shape of `crawlmind.json`. Every field mirrors one
/// `EngineConfig` field; absence means "fall through to env var, then default".
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawEngineConfig {
    pub max_pages: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub request_gap_ms: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub respect_robots: Option<bool>,
    pub min_content_length: Option<usize>,
    pub output_root: Option<String>,
    pub llm_model: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub site_type_thresholds: Option<HashMap<String, ThresholdOverride>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdOverride {
    pub worthy_threshold: Option<f64>,
    pub diversity_threshold: Option<f64>,
}

/// Resolved configuration for one process. Cheap to clone; every field has
/// already been through the cascade by the time this exists.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_pages: Option<usize>,
    pub max_concurrent: usize,
    pub request_gap: Duration,
    pub fetch_timeout: Duration,
    pub respect_robots: bool,
    pub min_content_length: usize,
    pub output_root: PathBuf,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout: Duration,
    site_type_thresholds: HashMap<&'static str, SiteTypeThresholds>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::resolve(RawEngineConfig::default())
    }
}

impl EngineConfig {
    pub fn thresholds_for(&self, site_type: SiteType) -> SiteTypeThresholds {
        self.site_type_thresholds
            .get(site_type.as_str())
            .copied()
            .unwrap_or_else(|| default_thresholds(site_type))
    }

    /// Load `crawlmind.json` from `./crawlmind.json`, `../crawlmind.json`, or
    /// the path named by `CRAWLMIND_CONFIG`, then resolve every field through
    /// the env-var/default cascade. Never fails: a missing or unparsable file
    /// just means every field falls through.
    pub fn load() -> Self {
        let raw = load_raw_config();
        Self::resolve(raw)
    }

    fn resolve(raw: RawEngineConfig) -> Self {
        let max_concurrent = raw.max_concurrent.unwrap_or_else(|| env_parsed("CRAWLMIND_MAX_CONCURRENT").unwrap_or(5));
        let request_gap_ms = raw.request_gap_ms.unwrap_or_else(|| env_parsed("CRAWLMIND_REQUEST_GAP_MS").unwrap_or(600));
        let fetch_timeout_secs = raw.fetch_timeout_secs.unwrap_or_else(|| env_parsed("CRAWLMIND_FETCH_TIMEOUT_SECS").unwrap_or(30));
        let respect_robots = raw.respect_robots.unwrap_or_else(|| env_bool("CRAWLMIND_RESPECT_ROBOTS").unwrap_or(false));
        let min_content_length = raw.min_content_length.unwrap_or_else(|| env_parsed("CRAWLMIND_MIN_CONTENT_LENGTH").unwrap_or(100));
        let output_root = raw
            .output_root
            .or_else(|| std::env::var("CRAWLMIND_OUTPUT_ROOT").ok())
            .unwrap_or_else(|| "./output".to_string());
        let llm_model = raw
            .llm_model
            .or_else(|| std::env::var("LLM_MODEL").ok())
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let llm_timeout_secs = raw.llm_timeout_secs.unwrap_or_else(|| env_parsed("CRAWLMIND_LLM_TIMEOUT_SECS").unwrap_or(15));
        let llm_api_key = std::env::var("LLM_API_KEY").ok().filter(|v| !v.trim().is_empty());

        let mut site_type_thresholds: HashMap<&'static str, SiteTypeThresholds> = HashMap::new();
        if let Some(overrides) = raw.site_type_thresholds {
            for (key, ov) in overrides {
                if let Some(site_type) = site_type_from_key(&key) {
                    let mut base = default_thresholds(site_type);
                    if let Some(w) = ov.worthy_threshold {
                        base.worthy_threshold = w;
                    }
                    if let Some(d) = ov.diversity_threshold {
                        base.diversity_threshold = d;
                    }
                    site_type_thresholds.insert(site_type.as_str(), base);
                } else {
                    tracing::warn!("crawlmind config: unknown site_type key '{key}' in site_type_thresholds, ignoring");
                }
            }
        }

        Self {
            max_pages: raw.max_pages.or_else(|| env_parsed("CRAWLMIND_MAX_PAGES")),
            max_concurrent,
            request_gap: Duration::from_millis(request_gap_ms),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            respect_robots,
            min_content_length,
            output_root: PathBuf::from(output_root),
            llm_api_key,
            llm_model,
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            site_type_thresholds,
        }
    }
}

fn site_type_from_key(key: &str) -> Option<SiteType> {
    use SiteType::*;
    Some(match key {
        "banking" => Banking,
        "ecommerce" => Ecommerce,
        "news" => News,
        "corporate" => Corporate,
        "educational" => Educational,
        "healthcare" => Healthcare,
        "government" => Government,
        "non_profit" => NonProfit,
        "entertainment" => Entertainment,
        "real_estate" => RealEstate,
        "legal" => Legal,
        "restaurant" => Restaurant,
        "technology" => Technology,
        "unknown" => Unknown,
        _ => return None,
    })
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn load_raw_config() -> RawEngineConfig {
    let mut candidates = vec![PathBuf::from("crawlmind.json"), PathBuf::from("../crawlmind.json")];
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(p));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawEngineConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("crawlmind.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!("crawlmind.json parse error at {}: {e} — using defaults/env", path.display());
                    return RawEngineConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    tracing::info!("no crawlmind.json found; resolving configuration from environment and defaults");
    RawEngineConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::resolve(RawEngineConfig::default());
        assert_eq!(cfg.max_concurrent, 5);
        assert_eq!(cfg.min_content_length, 100);
        assert!(cfg.max_pages.is_none());
    }

    #[test]
    fn site_type_override_merges_over_default() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "news".to_string(),
            ThresholdOverride {
                worthy_threshold: Some(0.5),
                diversity_threshold: None,
            },
        );
        let raw = RawEngineConfig {
            site_type_thresholds: Some(overrides),
            ..Default::default()
        };
        let cfg = EngineConfig::resolve(raw);
        let t = cfg.thresholds_for(SiteType::News);
        assert_eq!(t.worthy_threshold, 0.5);
        // diversity_threshold wasn't overridden, so it keeps the built-in default.
        assert_eq!(t.diversity_threshold, default_thresholds(SiteType::News).diversity_threshold);
    }
}
