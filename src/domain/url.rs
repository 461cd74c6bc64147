//! URL canonicalization and cheap structural reject filters (C1).
//!
//! Canonicalization is pure and total: any parseable absolute URL reduces to a
//! single normalized string. Two URLs are "the same" for the purposes of a crawl
//! run iff their canonical forms are byte-for-byte identical.

use std::fmt;

use url::Url;

/// A URL after normalization. Cheap to clone; comparisons are just string
/// comparisons on the inner value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&self.0).ok().and_then(|u| u.host_str().map(str::to_string))
    }

    pub fn path(&self) -> String {
        Url::parse(&self.0).map(|u| u.path().to_string()).unwrap_or_default()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

const TRACKING_PREFIXES: &[&str] = &["utm_"];
const TRACKING_EXACT: &[&str] = &["gclid", "fbclid", "_ga", "_gl", "ver"];

/// Normalize `raw`, resolving it against `base` first if it is relative.
///
/// Rules (spec §3): scheme and host lowercased, default ports removed, path
/// slashes collapsed, fragment stripped, tracking query keys removed, remaining
/// query keys sorted, trailing slash removed except on root.
pub fn canonicalize(raw: &str, base: Option<&Url>) -> anyhow::Result<CanonicalUrl> {
    let parsed = match base {
        Some(b) => b.join(raw)?,
        None => Url::parse(raw)?,
    };
    Ok(canonicalize_url(&parsed))
}

pub fn canonicalize_url(parsed: &Url) -> CanonicalUrl {
    let mut url = parsed.clone();

    let _ = url.set_scheme(&url.scheme().to_ascii_lowercase());
    if let Some(host) = url.host_str() {
        let lower = host.to_ascii_lowercase();
        let _ = url.set_host(Some(&lower));
    }

    let default_port = match url.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if url.port() == default_port {
        let _ = url.set_port(None);
    }

    url.set_fragment(None);

    // Collapse duplicate path slashes.
    let collapsed_path = collapse_slashes(url.path());
    url.set_path(&collapsed_path);

    // Strip tracking params, sort the remainder.
    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let qs = kept
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&qs));
    }

    let mut s = url.to_string();
    // Remove a single trailing slash unless the path is just "/".
    if s.ends_with('/') {
        let path_only = url.path();
        if path_only != "/" {
            s.pop();
        }
    }

    CanonicalUrl(s)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    if out.is_empty() {
        "/".to_string()
    } else {
        out
    }
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    TRACKING_PREFIXES.iter().any(|p| lower.starts_with(p)) || TRACKING_EXACT.contains(&lower.as_str())
}

/// Why a candidate URL was rejected before ever being fetched (C1 cheap filters).
/// Variant order is the match order: the first rule that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BinaryFile,
    ExternalDomain,
    PathTooLong,
    ComplexQuery,
    NonContentPath,
    TrackingParams,
    UselessFileType,
    TooDeepNesting,
    TooManySpecialChars,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::BinaryFile => "binary_file",
            RejectReason::ExternalDomain => "external_domain",
            RejectReason::PathTooLong => "path_too_long",
            RejectReason::ComplexQuery => "complex_query",
            RejectReason::NonContentPath => "non_content_path",
            RejectReason::TrackingParams => "tracking_params",
            RejectReason::UselessFileType => "useless_file_type",
            RejectReason::TooDeepNesting => "too_deep_nesting",
            RejectReason::TooManySpecialChars => "too_many_special_chars",
        }
    }
}

const BINARY_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".svg", ".webp", ".pdf", ".zip", ".tar",
    ".gz", ".rar", ".7z", ".exe", ".dmg", ".mp3", ".mp4", ".avi", ".mov", ".wav", ".woff",
    ".woff2", ".ttf", ".eot", ".otf",
];

const USELESS_EXTENSIONS: &[&str] = &[".xml", ".json", ".csv", ".map", ".woff2", ".rss", ".atom"];

const NON_CONTENT_SEGMENTS: &[&str] = &[
    "/api/", "/admin/", "/_", "/tracking/", "/oauth/", "/login/", "/logout/", "/wp-admin/",
    "/wp-json/", "/cgi-bin/",
];

const TRACKING_QUERY_KEYS: &[&str] = &["session=", "token=", "timestamp=", "sid=", "sessionid="];

const SPECIAL_CHARS: &[char] = &['-', '_', '=', '&', '%', '?', '#'];

/// Apply the cheap structural reject filters of §4.1, in rule order. `site_domain`
/// is the host the crawl is scoped to; pass `None` to skip the external-domain check.
pub fn reject_reason(url: &CanonicalUrl, site_domain: Option<&str>) -> Option<RejectReason> {
    let parsed = Url::parse(url.as_str()).ok()?;
    let path = parsed.path().to_ascii_lowercase();
    let query = parsed.query().unwrap_or("").to_ascii_lowercase();

    if BINARY_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return Some(RejectReason::BinaryFile);
    }

    if let Some(domain) = site_domain {
        if let Some(host) = parsed.host_str() {
            if !host.eq_ignore_ascii_case(domain) && !host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase())) {
                return Some(RejectReason::ExternalDomain);
            }
        }
    }

    if parsed.path().len() > 300 {
        return Some(RejectReason::PathTooLong);
    }

    if query.len() > 100 {
        return Some(RejectReason::ComplexQuery);
    }

    if NON_CONTENT_SEGMENTS.iter().any(|seg| path.contains(seg)) {
        return Some(RejectReason::NonContentPath);
    }

    if TRACKING_QUERY_KEYS.iter().any(|k| query.contains(k)) {
        return Some(RejectReason::TrackingParams);
    }

    if USELESS_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return Some(RejectReason::UselessFileType);
    }

    let segment_count = parsed.path_segments().map(|s| s.filter(|seg| !seg.is_empty()).count()).unwrap_or(0);
    if segment_count > 8 {
        return Some(RejectReason::TooDeepNesting);
    }

    let special_count = path.chars().filter(|c| SPECIAL_CHARS.contains(c)).count();
    if special_count > 15 {
        return Some(RejectReason::TooManySpecialChars);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_lowercases_scheme_and_host() {
        let a = canonicalize("HTTP://Example.COM/Foo", None).unwrap();
        assert_eq!(a.as_str(), "http://example.com/Foo");
    }

    #[test]
    fn canonicalize_strips_default_port_and_fragment() {
        let a = canonicalize("https://example.com:443/foo#section", None).unwrap();
        assert_eq!(a.as_str(), "https://example.com/foo");
    }

    #[test]
    fn canonicalize_removes_trailing_slash_except_root() {
        let a = canonicalize("https://example.com/foo/", None).unwrap();
        assert_eq!(a.as_str(), "https://example.com/foo");
        let root = canonicalize("https://example.com/", None).unwrap();
        assert_eq!(root.as_str(), "https://example.com/");
    }

    #[test]
    fn canonicalize_drops_tracking_params_and_sorts_rest() {
        let a = canonicalize("https://example.com/foo?utm_source=x&b=2&a=1&gclid=y", None).unwrap();
        assert_eq!(a.as_str(), "https://example.com/foo?a=1&b=2");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let a = canonicalize("https://Example.com//foo//bar/?utm_campaign=z&b=1", None).unwrap();
        let b = canonicalize(a.as_str(), None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn equal_urls_compare_equal_under_canonicalization() {
        let a = canonicalize("HTTPS://example.com:443/foo/?utm_source=x", None).unwrap();
        let b = canonicalize("https://example.com/foo", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_binary_file() {
        let u = canonicalize("https://example.com/image.png", None).unwrap();
        assert_eq!(reject_reason(&u, None), Some(RejectReason::BinaryFile));
    }

    #[test]
    fn rejects_non_content_path() {
        let u = canonicalize("https://example.com/admin/logs", None).unwrap();
        assert_eq!(reject_reason(&u, None), Some(RejectReason::NonContentPath));
    }

    #[test]
    fn rejects_external_domain() {
        let u = canonicalize("https://other.com/foo", None).unwrap();
        assert_eq!(reject_reason(&u, Some("example.com")), Some(RejectReason::ExternalDomain));
    }

    #[test]
    fn allows_content_page() {
        let u = canonicalize("https://example.com/blog/post-1", None).unwrap();
        assert_eq!(reject_reason(&u, Some("example.com")), None);
    }

    #[test]
    fn rejects_too_deep_nesting() {
        let u = canonicalize("https://example.com/a/b/c/d/e/f/g/h/i", None).unwrap();
        assert_eq!(reject_reason(&u, None), Some(RejectReason::TooDeepNesting));
    }
}
