//! Page persistence (§4.7 step 7, §6): one directory per URL under
//! `output_root`, written atomically (temp file + rename) per §5's "page
//! persistence is per-URL atomic" ordering guarantee. A filesystem error for
//! one page is logged and swallowed per §7 — it never aborts the run.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha1::{Digest, Sha1};
use tracing::warn;
use url::Url;

use crate::domain::page::HtmlFlavor;

const MAX_SEGMENT_LEN: usize = 40;
const MAX_TOTAL_PATH_LEN: usize = 250;

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub url: String,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
    pub content_type: String,
    pub bytes_html: usize,
    pub html_flavor: HtmlFlavor,
    pub success: bool,
    pub error: Option<String>,
}

/// Sanitize one path segment: lowercase, collapse anything non-alphanumeric
/// to `-`, truncate to [`MAX_SEGMENT_LEN`].
fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut prev_dash = false;
    for c in segment.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    let truncated: String = trimmed.chars().take(MAX_SEGMENT_LEN).collect();
    if truncated.is_empty() {
        "root".to_string()
    } else {
        truncated
    }
}

/// Derive the on-disk directory for one URL: `<host>/<path-segments>/_q_<sorted-query>`,
/// each segment sanitized, collapsing to a SHA-1 fallback name when the
/// combined path would exceed [`MAX_TOTAL_PATH_LEN`] (the Windows-safe cap §6
/// calls for).
pub fn page_dir(output_root: &Path, final_url: &str) -> PathBuf {
    let parsed = Url::parse(final_url).ok();
    let host = parsed.as_ref().and_then(|u| u.host_str()).unwrap_or("unknown-host").to_ascii_lowercase();

    let mut segments: Vec<String> = parsed
        .as_ref()
        .map(|u| u.path_segments().map(|s| s.filter(|seg| !seg.is_empty()).map(sanitize_segment).collect()).unwrap_or_default())
        .unwrap_or_default();

    if let Some(query) = parsed.as_ref().and_then(|u| u.query()) {
        let mut pairs: Vec<&str> = query.split('&').collect();
        pairs.sort();
        segments.push(format!("_q_{}", sanitize_segment(&pairs.join("_"))));
    }

    if segments.is_empty() {
        segments.push("root".to_string());
    }

    let candidate = std::iter::once(host.clone()).chain(segments.iter().cloned()).collect::<Vec<_>>().join("/");

    if candidate.len() <= MAX_TOTAL_PATH_LEN {
        let mut path = output_root.to_path_buf();
        path.push(host);
        for seg in segments {
            path.push(seg);
        }
        path
    } else {
        let mut hasher = Sha1::new();
        hasher.update(final_url.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let mut path = output_root.to_path_buf();
        path.push(host);
        path.push(digest);
        path
    }
}

/// Write `index.md`, `index.html`, `raw.html`, and `meta.json` into the
/// directory derived by [`page_dir`]. Each file is written to a `.tmp`
/// sibling and renamed into place so a reader never observes a partial file.
pub async fn persist_page(
    output_root: &Path,
    final_url: &str,
    markdown: &str,
    rendered_html: &str,
    raw_html: &str,
    meta: &PageMeta,
) -> std::io::Result<PathBuf> {
    let dir = page_dir(output_root, final_url);
    tokio::fs::create_dir_all(&dir).await?;

    write_atomic(&dir.join("index.md"), markdown.as_bytes()).await?;
    write_atomic(&dir.join("index.html"), rendered_html.as_bytes()).await?;
    write_atomic(&dir.join("raw.html"), raw_html.as_bytes()).await?;

    let meta_json = serde_json::to_vec_pretty(meta).unwrap_or_default();
    write_atomic(&dir.join("meta.json"), &meta_json).await?;

    Ok(dir)
}

async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp-{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("out"),
        SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default()
    ));
    tokio::fs::write(&tmp_path, contents).await?;
    match tokio::fs::rename(&tmp_path, path).await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "atomic rename failed, cleaning up temp file");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            Err(e)
        }
    }
}
