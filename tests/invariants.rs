//! Black-box invariants from SPEC_FULL §8, exercised over a small hand-built
//! frontier loop that wires the real canonicalizer, reject filter and
//! deduplicator together the way the orchestrator does, without any network
//! access (no `tokio`/chromiumoxide fetch involved — pages are synthetic
//! fixtures supplied directly).

use std::collections::HashSet;

use crawlmind::dedup::Deduplicator;
use crawlmind::domain::page::DedupVerdictStatus;
use crawlmind::domain::url::{canonicalize, reject_reason};

struct Fixture {
    url: &'static str,
    html: &'static str,
}

const SITE_DOMAIN: &str = "fixtures.example.com";

const FIXTURES: &[Fixture] = &[
    Fixture {
        url: "https://fixtures.example.com/",
        html: "<html><body><main><h1>Home</h1><p>Welcome to our fixtures example business with several products and services.</p></main></body></html>",
    },
    Fixture {
        url: "https://fixtures.example.com/about",
        html: "<html><body><main><h1>About</h1><p>We have been building fixtures for demonstration purposes for many years now.</p></main></body></html>",
    },
    // Exact duplicate of the homepage content at a different URL.
    Fixture {
        url: "https://fixtures.example.com/home-alias",
        html: "<html><body><main><h1>Home</h1><p>Welcome to our fixtures example business with several products and services.</p></main></body></html>",
    },
    // Admin path: rejected by C1 before ever reaching the deduplicator.
    Fixture {
        url: "https://fixtures.example.com/admin/dashboard",
        html: "<html><body>dashboard</body></html>",
    },
];

#[test]
fn crawled_and_failed_sets_stay_disjoint_and_both_are_subsets_of_seen() {
    let mut seen: HashSet<String> = HashSet::new();
    let mut crawled: HashSet<String> = HashSet::new();
    let mut failed: HashSet<String> = HashSet::new();
    let mut dedup = Deduplicator::new(10);

    for fixture in FIXTURES {
        let url = canonicalize(fixture.url, None).unwrap();
        seen.insert(url.as_str().to_string());

        if reject_reason(&url, Some(SITE_DOMAIN)).is_some() {
            failed.insert(url.as_str().to_string());
            continue;
        }

        let (verdict, _) = dedup.evaluate(&url, fixture.html);
        match verdict.status {
            DedupVerdictStatus::Canonical => {
                crawled.insert(url.as_str().to_string());
            }
            DedupVerdictStatus::Duplicate | DedupVerdictStatus::Alias => {
                failed.insert(url.as_str().to_string());
            }
        }
    }

    assert!(crawled.intersection(&failed).next().is_none(), "crawled and failed must be disjoint");
    assert!(crawled.is_subset(&seen));
    assert!(failed.is_subset(&seen));

    // The admin path was rejected pre-fetch; the aliased duplicate homepage
    // never became a second canonical entry.
    assert_eq!(crawled.len(), 2);
    assert_eq!(failed.len(), 2);
}

#[test]
fn a_url_whose_canonical_form_matches_an_already_seen_url_is_never_refetched() {
    let mut seen: HashSet<String> = HashSet::new();
    let mut fetch_count = 0usize;

    let links = [
        "https://fixtures.example.com/products",
        "https://fixtures.example.com/products/",
        "https://Fixtures.Example.com/products?utm_source=newsletter",
    ];

    for link in links {
        let url = canonicalize(link, None).unwrap();
        if seen.insert(url.as_str().to_string()) {
            fetch_count += 1;
        }
    }

    assert_eq!(fetch_count, 1, "all three links canonicalize to the same URL and must be fetched only once");
}

#[test]
fn a_page_below_min_content_length_is_always_canonical_even_if_textually_identical_to_another() {
    let mut dedup = Deduplicator::new(500);
    let short_html = "<html><body><main><p>hi</p></main></body></html>";

    let url_a = canonicalize("https://fixtures.example.com/a", None).unwrap();
    let url_b = canonicalize("https://fixtures.example.com/b", None).unwrap();

    let (first, _) = dedup.evaluate(&url_a, short_html);
    let (second, _) = dedup.evaluate(&url_b, short_html);

    assert_eq!(first.status, DedupVerdictStatus::Canonical);
    assert_eq!(second.status, DedupVerdictStatus::Canonical);
}
