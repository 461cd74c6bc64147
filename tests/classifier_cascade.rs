//! Scenario 5: the classifier cascade. Tier 1 rejects an admin path before
//! ever looking at content; Tier 2's heuristic scorer settles a product page
//! confidently; a page where the heuristic is inconclusive falls through
//! towards the LLM tier, which this test exercises without a credential
//! configured (matching "C4 degrades gracefully to Tier 2" from §6) since no
//! live network access is available in this environment.

use std::time::Duration;

use crawlmind::classify::{ClassifyInput, Classifier};
use crawlmind::domain::page::ClassificationMethod;
use crawlmind::domain::url::canonicalize;
use crawlmind::domain::SiteType;

fn classifier() -> Classifier {
    Classifier::new(None, "gpt-4o-mini".to_string(), Duration::from_secs(5))
}

#[tokio::test]
async fn tier1_rejects_admin_path_before_any_content_inspection() {
    let url = canonicalize("https://site.example.com/admin/logs", None).unwrap();
    let result = classifier()
        .classify(ClassifyInput {
            url: &url,
            site_domain: Some("site.example.com"),
            site_type: SiteType::Unknown,
            title: "Internal Log Viewer",
            content: Some("raw server logs, not for public consumption"),
            link_count: 0,
        })
        .await;

    assert!(!result.is_worthy);
    assert_eq!(result.method, ClassificationMethod::Basic);
    assert_eq!(result.reasoning, "non_content_path");
}

#[tokio::test]
async fn tier2_heuristic_confidently_accepts_a_business_products_url_with_no_content() {
    let url = canonicalize("https://site.example.com/products", None).unwrap();
    let result = classifier().classify_url_only(&url, Some("site.example.com")).await;

    assert!(result.is_worthy);
    assert_eq!(result.method, ClassificationMethod::Heuristic);
}

#[tokio::test]
async fn inconclusive_heuristic_falls_through_to_llm_tier_and_degrades_to_heuristic_without_a_credential() {
    // A path with no heuristic signal at all settles near the 0.5 midpoint,
    // which is below HEURISTIC_CONFIDENT_LOW — the cascade should then try
    // the LLM tier and, finding no LLM_API_KEY configured, fall back to
    // returning that same inconclusive heuristic verdict rather than failing
    // the page outright.
    let url = canonicalize("https://site.example.com/blog/post-1", None).unwrap();
    let result = classifier()
        .classify(ClassifyInput {
            url: &url,
            site_domain: Some("site.example.com"),
            site_type: SiteType::News,
            title: "Untitled",
            content: Some("a perfectly ordinary paragraph with no distinguishing vocabulary at all"),
            link_count: 3,
        })
        .await;

    // Whatever the heuristic decided, the method reported must be Heuristic
    // (the LLM tier failed silently and did not overwrite it with Llm/Cache).
    assert_eq!(result.method, ClassificationMethod::Heuristic);
}

#[tokio::test]
async fn repeated_identical_page_is_served_from_cache_on_second_call() {
    // Only reachable once the heuristic tier is inconclusive and an LLM call
    // is attempted; caching is keyed on (path, title) and the cascade inserts
    // whatever verdict it settles on, including a degraded-to-heuristic one.
    let url = canonicalize("https://site.example.com/blog/post-2", None).unwrap();
    let input = || ClassifyInput {
        url: &url,
        site_domain: Some("site.example.com"),
        site_type: SiteType::News,
        title: "Untitled Two",
        content: Some("another perfectly ordinary paragraph with no distinguishing vocabulary"),
        link_count: 1,
    };

    let classifier = classifier();
    let first = classifier.classify(input()).await;
    let second = classifier.classify(input()).await;

    assert_eq!(first.method, ClassificationMethod::Heuristic);
    assert_eq!(second.method, ClassificationMethod::Cache);
    assert_eq!(first.is_worthy, second.is_worthy);
}
