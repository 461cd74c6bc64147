//! Rendering fetch client (§4.7 step 4): a `chromiumoxide` headless browser
//! wrapper grounded on the teacher's `scraping/browser_manager.rs` (browser
//! discovery + launch config) and `scraping/rust_scraper/stealth.rs`
//! (anti-fingerprinting init script), generalized from the teacher's
//! one-shot "fetch and close" helper into a fetch options struct covering
//! §4.7's auto-scroll / wait-for-selector / custom-JS / post-idle-wait knobs.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::{CrawlError, Result};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POST_NAVIGATE_WAIT_MS: u64 = 800;

/// Per-page options for one rendering fetch (§4.7 step 4's optional list).
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub wait_for_selector: Option<String>,
    pub auto_scroll: bool,
    pub custom_js: Option<String>,
    pub post_network_idle_wait_ms: Option<u64>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub final_url: String,
    pub content_type: String,
    pub rendered_html: String,
    pub flavor: crate::domain::page::HtmlFlavor,
}

/// Find a usable Chromium-family executable: `CHROME_EXECUTABLE` env var,
/// then a `PATH` scan, matching the teacher's resolution order without the
/// OS-specific well-known-path fallbacks (those assume a desktop install this
/// crate isn't targeting).
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = ["brave-browser", "brave", "google-chrome", "chromium", "chromium-browser", "chrome"];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    None
}

fn build_headless_config(exe: &str) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1280,
            height: 900,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1280, 900)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--mute-audio")
        .build()
        .map_err(|e| CrawlError::Other(anyhow::anyhow!("failed to build browser config: {e}")))
}

const STEALTH_INIT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {get: () => undefined, configurable: true});
Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3, 4, 5]});
Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']});
if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) {
    window.chrome.runtime = {
        connect: function() { return { onDisconnect: { addListener: function() {} } }; },
        sendMessage: function() {},
    };
}
delete window.__playwright;
delete window.__puppeteer;
delete window.__selenium;
"#;

/// Launch a fresh headless browser, navigate to `url`, run the requested
/// stealth/scroll/wait steps, capture the post-JS DOM, then close. One
/// browser per fetch mirrors the teacher's `fetch_html_native`: simpler to
/// reason about than a shared long-lived browser, at the cost of launch
/// latency the worker pool already tolerates.
pub async fn fetch_rendered(url: &str, options: &FetchOptions) -> Result<FetchedPage> {
    let exe = find_chrome_executable()
        .ok_or_else(|| CrawlError::Other(anyhow::anyhow!("no chromium-family browser found; set CHROME_EXECUTABLE")))?;

    let timeout = options.timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT);
    let fetch = fetch_rendered_inner(&exe, url, options);

    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(CrawlError::Transient {
            url: url.to_string(),
            source: anyhow::anyhow!("rendering fetch exceeded {:?}", timeout),
        }),
    }
}

async fn fetch_rendered_inner(exe: &str, url: &str, options: &FetchOptions) -> Result<FetchedPage> {
    let config = build_headless_config(exe)?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| CrawlError::Other(anyhow::anyhow!("failed to launch browser ({exe}): {e}")))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                error!("CDP handler error: {e}");
            }
        }
    });

    let result = drive_page(&browser, url, options).await;

    if let Err(e) = browser.close().await {
        warn!("browser close error (non-fatal): {e}");
    }
    handler_task.abort();

    result
}

async fn drive_page(browser: &Browser, url: &str, options: &FetchOptions) -> Result<FetchedPage> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| CrawlError::Transient { url: url.to_string(), source: anyhow::anyhow!("failed to open page: {e}") })?;

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_INIT_SCRIPT))
        .await
        .map_err(|e| CrawlError::Other(anyhow::anyhow!("failed to inject stealth script: {e}")))?;

    page.goto(url)
        .await
        .map_err(|e| CrawlError::Transient { url: url.to_string(), source: anyhow::anyhow!("navigation failed: {e}") })?;

    tokio::time::sleep(Duration::from_millis(DEFAULT_POST_NAVIGATE_WAIT_MS)).await;

    if let Some(selector) = &options.wait_for_selector {
        if let Err(e) = wait_for_selector(&page, selector, Duration::from_secs(5)).await {
            debug!(url, selector, error = %e, "wait_for_selector timed out, continuing anyway");
        }
    }

    if options.auto_scroll {
        auto_scroll(&page).await;
    }

    if let Some(js) = &options.custom_js {
        if let Err(e) = page.evaluate(js.as_str()).await {
            warn!(url, error = %e, "custom_js evaluation failed, continuing");
        }
    }

    if let Some(extra_wait) = options.post_network_idle_wait_ms {
        tokio::time::sleep(Duration::from_millis(extra_wait)).await;
    }

    let final_url = page.url().await.ok().flatten().unwrap_or_else(|| url.to_string());

    let html = page
        .content()
        .await
        .map_err(|e| CrawlError::PermanentFetch { url: url.to_string(), reason: format!("failed to read page content: {e}") })?;

    info!(url, bytes = html.len(), "rendering fetch succeeded");

    Ok(FetchedPage {
        status: 200,
        final_url,
        content_type: "text/html".to_string(),
        rendered_html: html,
        flavor: crate::domain::page::HtmlFlavor::Rendered,
    })
}

/// Plain HTTP GET, used when no browser is available or rendering failed
/// non-fatally (§4.7 step 4: "prefer the post-JS rendered HTML; fall back to
/// raw"). Shares the orchestrator's `reqwest::Client` so connection pooling
/// and header defaults stay consistent across both fetch paths.
pub async fn fetch_raw(client: &reqwest::Client, url: &str) -> Result<FetchedPage> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CrawlError::Transient { url: url.to_string(), source: anyhow::anyhow!("raw fetch failed: {e}") })?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .to_string();

    if !response.status().is_success() {
        return Err(CrawlError::PermanentFetch { url: url.to_string(), reason: format!("raw fetch returned status {status}") });
    }

    let html = response
        .text()
        .await
        .map_err(|e| CrawlError::Transient { url: url.to_string(), source: anyhow::anyhow!("failed to read raw response body: {e}") })?;

    info!(url, bytes = html.len(), "raw fetch succeeded");

    Ok(FetchedPage {
        status,
        final_url,
        content_type,
        rendered_html: html,
        flavor: crate::domain::page::HtmlFlavor::Raw,
    })
}

async fn wait_for_selector(page: &chromiumoxide::Page, selector: &str, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let found = page
            .evaluate(format!("document.querySelector({:?}) !== null", selector))
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(false);
        if found {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow::anyhow!("selector '{selector}' did not appear within {timeout:?}"));
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}

/// Scroll to the bottom in increments so lazy-loaded content (infinite
/// scroll, below-the-fold images) has a chance to mount before capture.
async fn auto_scroll(page: &chromiumoxide::Page) {
    const SCROLL_STEP_PX: u32 = 600;
    const MAX_STEPS: u32 = 12;

    for _ in 0..MAX_STEPS {
        let finished = page
            .evaluate(format!(
                "(() => {{ const before = window.scrollY; window.scrollBy(0, {SCROLL_STEP_PX}); return window.scrollY === before; }})()"
            ))
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(true);
        tokio::time::sleep(Duration::from_millis(200)).await;
        if finished {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_options_default_has_no_scroll_or_selector() {
        let options = FetchOptions::default();
        assert!(!options.auto_scroll);
        assert!(options.wait_for_selector.is_none());
        assert!(options.custom_js.is_none());
    }

    #[test]
    fn find_chrome_executable_respects_env_override() {
        let dir = std::env::temp_dir().join(format!("crawlmind-fake-chrome-{}", std::process::id()));
        std::fs::write(&dir, b"").unwrap();
        std::env::set_var("CHROME_EXECUTABLE", &dir);
        let found = find_chrome_executable();
        std::env::remove_var("CHROME_EXECUTABLE");
        std::fs::remove_file(&dir).ok();
        assert_eq!(found.as_deref(), dir.to_str());
    }
}
