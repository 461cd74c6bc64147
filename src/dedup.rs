//! Content Deduplicator (C2): three-tier duplicate detection over fetched
//! HTML — redirect-stub detection, exact hash, and fuzzy SimHash buckets.
//!
//! Text extraction follows the teacher's own `clean.rs` approach (strip
//! script/style/noscript/template, walk `main`/`article` falling back to
//! `body`, skip noise-flagged subtrees) but scoped to the specific elements
//! §4.2 names: headings, paragraphs, lists, tables, figures.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};

use crate::domain::url::CanonicalUrl;
use crate::domain::page::{DedupVerdict, DedupVerdictStatus};

const SIMHASH_DISTANCE_THRESHOLD: u32 = 4;

#[derive(Debug, Clone, Default)]
pub struct DedupStats {
    pub processed: usize,
    pub exact: usize,
    pub near: usize,
    pub redirect_stub: usize,
    pub unique_kept: usize,
}

/// Per-run dedup state (§3's `DedupState`): exact hash map, fuzzy buckets, and
/// the SimHash fingerprint recorded per kept canonical page.
pub struct Deduplicator {
    min_content_length: usize,
    exact_hash: HashMap<String, String>,
    fuzzy_buckets: HashMap<String, Vec<(String, u64)>>,
    stats: DedupStats,
}

impl Deduplicator {
    pub fn new(min_content_length: usize) -> Self {
        Self {
            min_content_length,
            exact_hash: HashMap::new(),
            fuzzy_buckets: HashMap::new(),
            stats: DedupStats::default(),
        }
    }

    pub fn stats(&self) -> &DedupStats {
        &self.stats
    }

    /// Evaluate one fetched page's HTML against everything seen so far in
    /// this run, and fold its fingerprints into the dedup state if it turns
    /// out to be canonical. Returns the verdict and, for canonical/duplicate
    /// pages, the 64-bit SimHash of the normalized content (used by C6's
    /// diversity window).
    pub fn evaluate(&mut self, canonical_url: &CanonicalUrl, html: &str) -> (DedupVerdict, u64) {
        self.stats.processed += 1;

        let (title, text) = extract_meaningful_text(html);

        if let Some(redirect_url) = detect_redirect_stub(html, &text) {
            self.stats.redirect_stub += 1;
            return (
                DedupVerdict {
                    status: DedupVerdictStatus::Alias,
                    canonical_url: redirect_url,
                    reason: "redirect_stub".to_string(),
                },
                0,
            );
        }

        if text.chars().count() < self.min_content_length {
            self.stats.unique_kept += 1;
            return (DedupVerdict::canonical(canonical_url), 0);
        }

        let exact_key = sha256_hex(&normalize_exact(&text));
        if let Some(existing) = self.exact_hash.get(&exact_key) {
            self.stats.exact += 1;
            return (
                DedupVerdict {
                    status: DedupVerdictStatus::Duplicate,
                    canonical_url: existing.clone(),
                    reason: "exact_hash".to_string(),
                },
                simhash64(&normalize_fuzzy(&text, &title)),
            );
        }

        let fuzzy_text = normalize_fuzzy(&text, &title);
        let fuzzy_key = sha256_hex(&fuzzy_text);
        let simhash = simhash64(&fuzzy_text);

        if let Some(bucket) = self.fuzzy_buckets.get(&fuzzy_key) {
            for (existing_url, existing_hash) in bucket {
                let distance = hamming_distance(simhash, *existing_hash);
                if distance <= SIMHASH_DISTANCE_THRESHOLD {
                    self.stats.near += 1;
                    return (
                        DedupVerdict {
                            status: DedupVerdictStatus::Duplicate,
                            canonical_url: existing_url.clone(),
                            reason: format!("near_dup_simhash<={SIMHASH_DISTANCE_THRESHOLD}"),
                        },
                        simhash,
                    );
                }
            }
        }

        // Canonical: fold into both state maps.
        self.exact_hash.insert(exact_key, canonical_url.as_str().to_string());
        self.fuzzy_buckets
            .entry(fuzzy_key)
            .or_default()
            .push((canonical_url.as_str().to_string(), simhash));
        self.stats.unique_kept += 1;
        (DedupVerdict::canonical(canonical_url), simhash)
    }
}

/// Content fingerprint for a fetched page that never reaches [`Deduplicator::evaluate`]
/// (e.g. rejected by the classifier before dedup runs) but still needs a real
/// signal for C6's diversity window — the same SimHash the dedup tiers use,
/// computed without touching any run-scoped dedup state.
pub fn content_fingerprint(html: &str) -> u64 {
    let (title, text) = extract_meaningful_text(html);
    simhash64(&normalize_fuzzy(&text, &title))
}

// ── Text extraction ──────────────────────────────────────────────────────

fn selector(cache: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cache.get_or_init(|| Selector::parse(css).unwrap())
}

fn title_selector() -> &'static Selector {
    static CACHE: OnceLock<Selector> = OnceLock::new();
    selector(&CACHE, "title")
}
fn main_selector() -> &'static Selector {
    static CACHE: OnceLock<Selector> = OnceLock::new();
    selector(&CACHE, "main, article")
}
fn body_selector() -> &'static Selector {
    static CACHE: OnceLock<Selector> = OnceLock::new();
    selector(&CACHE, "body")
}
fn content_tag_selector() -> &'static Selector {
    static CACHE: OnceLock<Selector> = OnceLock::new();
    selector(&CACHE, "h1, h2, h3, h4, h5, h6, p, li, table, figure")
}

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Title plus normalized visible text of the heading/paragraph/list/table/
/// figure elements under `main`/`article` (falling back to `body`).
fn extract_meaningful_text(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let title = document
        .select(title_selector())
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let root = document
        .select(main_selector())
        .next()
        .or_else(|| document.select(body_selector()).next());

    let mut parts = vec![title.clone()];
    if let Some(root) = root {
        for el in root.select(content_tag_selector()) {
            if has_skipped_ancestor(&el) {
                continue;
            }
            let text = el.text().collect::<String>();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    let text = parts.join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (title, text)
}

fn has_skipped_ancestor(el: &ElementRef) -> bool {
    let mut node = Some(el.clone());
    while let Some(current) = node {
        if SKIPPED_TAGS.contains(&current.value().name()) {
            return true;
        }
        node = current.parent().and_then(ElementRef::wrap);
    }
    false
}

// ── Normalization ────────────────────────────────────────────────────────

fn normalize_exact(text: &str) -> String {
    text.to_ascii_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn regex(cache: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cache.get_or_init(|| Regex::new(pattern).unwrap())
}

fn date_iso_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r"\b\d{4}-\d{2}-\d{2}\b")
}
fn date_numeric_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r"\b\d{1,2}[/.]\d{1,2}[/.]\d{2,4}\b")
}
fn date_word_month_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(
        &CACHE,
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?\b",
    )
}
fn time_of_day_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?\s*(?:am|pm)?\b")
}
fn last_updated_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r"(?i)last\s+updated[^.\n]*[.\n]?")
}
fn number_with_unit_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r"[$€£]?\b\d[\d,]*(?:\.\d+)?%?\b")
}

const STOPWORDS: &[&str] = &["the", "a", "an", "and", "or", "of", "in", "on", "at", "to", "for", "is", "are", "was", "were", "it", "this", "that"];

/// Neutralize volatile substrings (dates, times, "last updated" clauses,
/// numbers) so near-identical pages with cosmetic differences bucket
/// together, then drop a small stopword set.
fn normalize_fuzzy(text: &str, title: &str) -> String {
    let mut s = format!("{title} {text}").to_ascii_lowercase();
    s = last_updated_re().replace_all(&s, " <date> ").to_string();
    s = date_word_month_re().replace_all(&s, " <date> ").to_string();
    s = date_iso_re().replace_all(&s, " <date> ").to_string();
    s = date_numeric_re().replace_all(&s, " <date> ").to_string();
    s = time_of_day_re().replace_all(&s, " <time> ").to_string();
    s = number_with_unit_re().replace_all(&s, " <num> ").to_string();

    s.split_whitespace()
        .filter(|w| !STOPWORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ── SimHash ──────────────────────────────────────────────────────────────

/// 64-bit SimHash over 3-gram word tokens, weighted by term frequency.
fn simhash64(normalized_text: &str) -> u64 {
    let tokens: Vec<&str> = normalized_text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0;
    }

    let mut trigram_weights: HashMap<String, u32> = HashMap::new();
    if tokens.len() < 3 {
        *trigram_weights.entry(tokens.join(" ")).or_insert(0) += 1;
    } else {
        for window in tokens.windows(3) {
            *trigram_weights.entry(window.join(" ")).or_insert(0) += 1;
        }
    }

    let mut bit_sums = [0i64; 64];
    for (trigram, weight) in trigram_weights {
        let hash = hash64(&trigram);
        for (bit, sum) in bit_sums.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *sum += weight as i64;
            } else {
                *sum -= weight as i64;
            }
        }
    }

    let mut out: u64 = 0;
    for (bit, sum) in bit_sums.iter().enumerate() {
        if *sum > 0 {
            out |= 1 << bit;
        }
    }
    out
}

fn hash64(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

// ── Redirect-stub detection ──────────────────────────────────────────────

fn meta_refresh_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r#"(?is)<meta[^>]*http-equiv=["']?refresh["']?[^>]*content=["']?\s*\d+\s*;\s*url=([^"'>\s]+)"#)
}
fn canonical_link_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r#"(?is)<link[^>]*rel=["']?canonical["']?[^>]*href=["']([^"']+)["']"#)
}
fn js_redirect_hint_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r"window\.location|location\.replace")
}
fn moved_phrases_re() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    regex(&CACHE, r"(?i)this page has (?:been )?moved|page moved permanently|redirecting\.{0,3}|you are being redirected")
}

/// Tier 1 (§4.2): meta-refresh, a JS redirect hint on a near-empty page, or a
/// short "this page has moved" page. Returns the canonical target when one is
/// discoverable, else `"unknown"`.
fn detect_redirect_stub(html: &str, body_text: &str) -> Option<String> {
    if let Some(caps) = meta_refresh_re().captures(html) {
        return Some(caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_else(|| "unknown".to_string()));
    }

    let char_count = body_text.chars().count();
    let has_js_hint = js_redirect_hint_re().is_match(html);
    let looks_moved = char_count < 180 && moved_phrases_re().is_match(body_text);

    if (has_js_hint && char_count < 240) || looks_moved {
        let canonical = canonical_link_re()
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        return Some(canonical);
    }

    None
}
