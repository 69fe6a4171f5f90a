//! chromiumoxide-backed implementation of the [`BrowserEngine`] seam

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetBlockedUrLsParams, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::traits::{BrowserEngine, ResourceKind, WaitUntil};

/// Resolves once the DOM is constructed, without waiting for sub-resources.
const DOM_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// How long to let in-flight responses drain after the load event when a
/// caller asked for network idle.
const NETWORK_SETTLE: Duration = Duration::from_millis(1000);

/// One headless Chrome instance driving one page.
pub struct ChromiumEngine {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumEngine {
    /// Launch a browser (or attach to a remote one) and open a blank page.
    pub async fn launch(settings: &Settings) -> Result<Self> {
        let (browser, handler) = match settings.remote_chrome_url.as_deref() {
            Some(url) => Self::connect_remote(url).await?,
            None => Self::launch_local(settings).await?,
        };

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser page")?;

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn launch_local(settings: &Settings) -> Result<(Browser, JoinHandle<()>)> {
        debug!("Launching browser (headless={})", settings.headless);

        let mut builder = BrowserConfig::builder();
        if !settings.headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        let config = builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }

    /// Attach to an already-running Chrome by resolving its WebSocket
    /// debugger URL from the DevTools `/json/version` endpoint.
    async fn connect_remote(url: &str) -> Result<(Browser, JoinHandle<()>)> {
        debug!("Connecting to remote browser at {}", url);

        let http_url = url.replace("ws://", "http://").replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let client = reqwest::Client::new();
        let resp: serde_json::Value = client
            .get(&version_url)
            .send()
            .await
            .context("Failed to reach remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("No webSocketDebuggerUrl in response"))?;

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .context("Failed to connect to remote browser")?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn navigate(&self, url: &str, wait: WaitUntil, timeout: Duration) -> Result<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow!("Invalid URL {}: {}", url, e))?;

        let settle = async {
            self.page.execute(params).await?;
            match wait {
                WaitUntil::DomContentLoaded => {
                    self.page.evaluate(DOM_READY_SCRIPT.to_string()).await?;
                }
                WaitUntil::NetworkIdle => {
                    // CDP exposes no first-class network-idle event; the load
                    // lifecycle plus a settle pause approximates it, and
                    // listing callers additionally gate on a content selector.
                    self.page.wait_for_navigation().await?;
                    tokio::time::sleep(NETWORK_SETTLE).await;
                }
            }
            anyhow::Ok(())
        };

        tokio::time::timeout(timeout, settle)
            .await
            .map_err(|_| anyhow!("Navigation timed out: {}", url))?
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    async fn set_headers(&self, headers: &[(&str, &str)]) -> Result<()> {
        let mut map = serde_json::Map::new();
        for (name, value) in headers {
            map.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        }
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::Value::Object(map),
            )))
            .await?;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await?;
        Ok(())
    }

    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()> {
        let mut patterns: Vec<String> = Vec::new();
        for kind in kinds {
            let globs: &[&str] = match kind {
                ResourceKind::Image => {
                    &["*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico"]
                }
                ResourceKind::Font => &["*.woff", "*.woff2", "*.ttf", "*.otf"],
                ResourceKind::Stylesheet => &["*.css"],
                ResourceKind::Media => &["*.mp4", "*.webm", "*.ogg", "*.mp3", "*.avi"],
            };
            patterns.extend(globs.iter().map(|g| g.to_string()));
        }
        // Replaces any previously installed block list.
        self.page
            .execute(SetBlockedUrLsParams::new(patterns))
            .await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn query_text(&self, selector: &str) -> Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => {
                let text = element.inner_text().await?;
                Ok(text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
            }
            Err(_) => Ok(None),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self {
            mut browser,
            page,
            handler,
        } = *self;

        let _ = page.close().await;
        if let Err(e) = browser.close().await {
            warn!("Error closing browser: {}", e);
        }
        handler.abort();
        Ok(())
    }
}
