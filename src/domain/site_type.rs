//! Site-type detection (C3): a hybrid phrase+keyword scorer over
//! `(url, title, content)`. Pure function of its inputs and the lexicon table
//! below — callers are free to cache the result per domain, but correctness
//! never depends on that cache.

use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use serde::{Deserialize, Serialize};

/// The closed set of business domains the crawler can classify a site as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteType {
    Banking,
    Ecommerce,
    News,
    Corporate,
    Educational,
    Healthcare,
    Government,
    NonProfit,
    Entertainment,
    RealEstate,
    Legal,
    Restaurant,
    Technology,
    Unknown,
}

impl SiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteType::Banking => "banking",
            SiteType::Ecommerce => "ecommerce",
            SiteType::News => "news",
            SiteType::Corporate => "corporate",
            SiteType::Educational => "educational",
            SiteType::Healthcare => "healthcare",
            SiteType::Government => "government",
            SiteType::NonProfit => "non_profit",
            SiteType::Entertainment => "entertainment",
            SiteType::RealEstate => "real_estate",
            SiteType::Legal => "legal",
            SiteType::Restaurant => "restaurant",
            SiteType::Technology => "technology",
            SiteType::Unknown => "unknown",
        }
    }
}

/// How the final `SiteType` was arrived at — reported alongside the winner so
/// downstream consumers (the coverage tracker, mostly) can decide how much to
/// trust the site-type-derived plateau thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionConfidence {
    High,
    Medium,
    Low,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteTypeDetection {
    pub site_type: SiteType,
    pub confidence: DetectionConfidence,
    pub score: u32,
    pub phrase_matches: u32,
}

struct Lexicon {
    site_type: SiteType,
    phrases: &'static [&'static str],
    keywords: &'static [&'static str],
}

/// High-confidence (multi-word, specific) phrases and supporting single-word
/// keywords per site type, in first-seen order for tie-breaking.
const LEXICON: &[Lexicon] = &[
    Lexicon {
        site_type: SiteType::Banking,
        phrases: &["online banking", "routing number", "savings account", "checking account", "wire transfer", "fdic insured"],
        keywords: &["bank", "loan", "mortgage", "deposit", "interest", "atm", "credit"],
    },
    Lexicon {
        site_type: SiteType::Ecommerce,
        phrases: &["add to cart", "shopping cart", "free shipping", "secure checkout", "track your order", "money back guarantee"],
        keywords: &["shop", "cart", "checkout", "price", "sku", "discount", "shipping"],
    },
    Lexicon {
        site_type: SiteType::News,
        phrases: &["breaking news", "latest headlines", "op ed", "editorial board", "by our correspondent"],
        keywords: &["news", "article", "reporter", "headline", "journalist", "bulletin"],
    },
    Lexicon {
        site_type: SiteType::Educational,
        phrases: &["admissions office", "financial aid", "degree program", "course catalog", "academic calendar"],
        keywords: &["university", "college", "faculty", "curriculum", "enrollment", "campus", "tuition"],
    },
    Lexicon {
        site_type: SiteType::Healthcare,
        phrases: &["patient portal", "book an appointment", "accepted insurance", "urgent care", "medical records"],
        keywords: &["clinic", "hospital", "physician", "diagnosis", "treatment", "patient"],
    },
    Lexicon {
        site_type: SiteType::Government,
        phrases: &["public records request", "city council meeting", "department of", "file a permit"],
        keywords: &["ordinance", "municipal", "citizen", "permit", "agency", "statute"],
    },
    Lexicon {
        site_type: SiteType::NonProfit,
        phrases: &["donate now", "tax deductible", "volunteer opportunities", "our mission"],
        keywords: &["nonprofit", "charity", "donation", "volunteer", "fundraiser"],
    },
    Lexicon {
        site_type: SiteType::Entertainment,
        phrases: &["now streaming", "box office", "ticket prices", "showtimes near you"],
        keywords: &["movie", "concert", "festival", "streaming", "episode", "venue"],
    },
    Lexicon {
        site_type: SiteType::RealEstate,
        phrases: &["square footage", "open house", "listing agent", "price per square foot"],
        keywords: &["listing", "realtor", "mortgage", "bedroom", "mls", "escrow"],
    },
    Lexicon {
        site_type: SiteType::Legal,
        phrases: &["free consultation", "attorney client privilege", "practice areas", "personal injury"],
        keywords: &["lawyer", "attorney", "litigation", "counsel", "law firm"],
    },
    Lexicon {
        site_type: SiteType::Restaurant,
        phrases: &["view our menu", "make a reservation", "order online", "happy hour specials"],
        keywords: &["menu", "reservation", "cuisine", "dine", "takeout", "catering"],
    },
    Lexicon {
        site_type: SiteType::Technology,
        phrases: &["api documentation", "developer docs", "open source", "system status page"],
        keywords: &["api", "sdk", "software", "platform", "integration", "cloud"],
    },
    Lexicon {
        site_type: SiteType::Corporate,
        phrases: &["our company", "about our business", "corporate headquarters", "investor relations"],
        keywords: &["company", "business", "services", "corporate", "enterprise", "solutions"],
    },
];

struct CompiledLexicon {
    site_type: SiteType,
    phrases: AhoCorasick,
    phrase_count: usize,
    keywords: AhoCorasick,
}

static COMPILED: OnceLock<Vec<CompiledLexicon>> = OnceLock::new();

fn compiled() -> &'static [CompiledLexicon] {
    COMPILED.get_or_init(|| {
        LEXICON
            .iter()
            .map(|lex| CompiledLexicon {
                site_type: lex.site_type,
                phrases: build_matcher(lex.phrases),
                phrase_count: lex.phrases.len(),
                keywords: build_matcher(lex.keywords),
            })
            .collect()
    })
}

fn build_matcher(patterns: &[&str]) -> AhoCorasick {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build(patterns)
        .expect("static lexicon patterns always compile")
}

fn count_matches(ac: &AhoCorasick, haystack: &str) -> u32 {
    ac.find_iter(haystack).count() as u32
}

/// Score one candidate type against the three text fields, per §4.3's point table.
fn score_candidate(lex: &CompiledLexicon, url: &str, title: &str, content: &str) -> (u32, u32) {
    let phrase_url = count_matches(&lex.phrases, url);
    let phrase_title = count_matches(&lex.phrases, title);
    let phrase_content = count_matches(&lex.phrases, content);
    let phrase_matches = phrase_url + phrase_title + phrase_content;

    let keyword_url = count_matches(&lex.keywords, url);
    let keyword_title = count_matches(&lex.keywords, title);
    let keyword_content = count_matches(&lex.keywords, content);

    let score = phrase_url * 15 + phrase_title * 10 + phrase_content * 5 + keyword_url * 3 + keyword_title * 2 + keyword_content;

    let _ = lex.phrase_count; // reserved for future lexicon-size-normalized scoring
    (score, phrase_matches)
}

/// Domain-extension / generic-language fallback chain applied when no
/// candidate clears the minimum score (§4.3).
fn fallback(host: &str, content: &str) -> (SiteType, DetectionConfidence) {
    let host = host.to_ascii_lowercase();
    if host.ends_with(".edu") {
        return (SiteType::Educational, DetectionConfidence::Fallback);
    }
    if host.ends_with(".gov") {
        return (SiteType::Government, DetectionConfidence::Fallback);
    }
    if host.ends_with(".org") {
        return (SiteType::NonProfit, DetectionConfidence::Fallback);
    }
    let lower = content.to_ascii_lowercase();
    if lower.contains("company") || lower.contains("business") || lower.contains("services") {
        return (SiteType::Corporate, DetectionConfidence::Fallback);
    }
    (SiteType::Unknown, DetectionConfidence::Fallback)
}

fn confidence_label(score: u32, phrase_matches: u32) -> DetectionConfidence {
    if phrase_matches >= 2 || score >= 20 {
        DetectionConfidence::High
    } else if phrase_matches >= 1 || score >= 10 {
        DetectionConfidence::Medium
    } else {
        DetectionConfidence::Low
    }
}

const MIN_WINNING_SCORE: u32 = 3;

/// Detect the site type of `(url, title, content)`. `host` is used only for
/// the domain-extension fallback chain when no lexicon candidate wins.
pub fn detect(host: &str, url: &str, title: &str, content: &str) -> SiteTypeDetection {
    let mut best: Option<(usize, u32, u32)> = None; // (lexicon index, score, phrase_matches)

    for (idx, lex) in compiled().iter().enumerate() {
        let (score, phrase_matches) = score_candidate(lex, url, title, content);
        if score < MIN_WINNING_SCORE {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, best_score, best_phrases)) => {
                score > *best_score || (score == *best_score && phrase_matches > *best_phrases)
            }
        };
        if better {
            best = Some((idx, score, phrase_matches));
        }
    }

    match best {
        Some((idx, score, phrase_matches)) => SiteTypeDetection {
            site_type: compiled()[idx].site_type,
            confidence: confidence_label(score, phrase_matches),
            score,
            phrase_matches,
        },
        None => {
            let (site_type, confidence) = fallback(host, content);
            SiteTypeDetection {
                site_type,
                confidence,
                score: 0,
                phrase_matches: 0,
            }
        }
    }
}
