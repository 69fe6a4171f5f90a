//! Page fetching with retries, throttling, and request shaping

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::config::{BASE_HEADERS, Settings};
use crate::traits::{BrowserEngine, ResourceKind, WaitUntil};

/// Marker element of a rendered product grid on listing pages.
pub const LISTING_CONTENT_SELECTOR: &str = "div.ItemList_collectionContent__aqxzo";

/// Total-result count on search pages. Front-end class names churn, so a
/// missing element is normal, not an error.
const TOTAL_COUNT_SELECTOR: &str =
    "div.ItemList_itemTitleWarpper__NZhXV span.ItemList_bold__Anzr9";

const LISTING_WAIT_RETRIES: u32 = 3;
const LISTING_WAIT_TIMEOUT: Duration = Duration::from_millis(4000);
const LISTING_WAIT_PAUSE: Duration = Duration::from_millis(2000);

/// What the caller expects at the URL, driving wait strategy and shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// A single product page.
    Detail,
    /// A keyword search results page; carries a total-count hint.
    Search,
    /// A category listing page; must wait out the client-side catalog fetch.
    Listing,
}

/// A successfully rendered page.
pub struct FetchedPage {
    pub html: String,
    /// Best-effort total-result count, search pages only.
    pub total_count: Option<u64>,
}

/// Fetches rendered pages through a [`BrowserEngine`], absorbing transient
/// failures. Exhausted retries surface as `None`, never as an error.
pub struct PageFetcher<'a> {
    engine: &'a dyn BrowserEngine,
    settings: &'a Settings,
}

impl<'a> PageFetcher<'a> {
    pub fn new(engine: &'a dyn BrowserEngine, settings: &'a Settings) -> Self {
        Self { engine, settings }
    }

    /// Fetch `url`, retrying on timeout or transport error with a fixed
    /// delay between attempts, and throttling after each success.
    pub async fn fetch(&self, url: &str, kind: PageKind) -> Option<FetchedPage> {
        for attempt in 1..=self.settings.retry_attempts {
            debug!(
                "Fetching {} (attempt {}/{})",
                url, attempt, self.settings.retry_attempts
            );

            match self.fetch_once(url, kind).await {
                Ok(page) => {
                    tokio::time::sleep(self.settings.request_delay).await;
                    return Some(page);
                }
                Err(e) => {
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}",
                        url, attempt, self.settings.retry_attempts, e
                    );
                    if attempt < self.settings.retry_attempts {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        error!(
            "Giving up on {} after {} attempts",
            url, self.settings.retry_attempts
        );
        None
    }

    async fn fetch_once(&self, url: &str, kind: PageKind) -> Result<FetchedPage> {
        // Re-applied per fetch; the engine replaces prior rules rather than
        // stacking them, so repeated setup on a reused page is safe.
        self.engine.set_headers(BASE_HEADERS).await?;
        self.engine
            .set_user_agent(self.settings.random_user_agent())
            .await?;
        let blocked: &[ResourceKind] = match kind {
            PageKind::Listing => &[
                ResourceKind::Image,
                ResourceKind::Font,
                ResourceKind::Stylesheet,
                ResourceKind::Media,
            ],
            PageKind::Detail | PageKind::Search => &[ResourceKind::Image],
        };
        self.engine.block_resources(blocked).await?;

        let wait = match kind {
            PageKind::Listing => WaitUntil::NetworkIdle,
            PageKind::Detail | PageKind::Search => WaitUntil::DomContentLoaded,
        };
        self.engine
            .navigate(url, wait, self.settings.navigation_timeout)
            .await?;

        if kind == PageKind::Listing {
            self.await_listing_content(url).await?;
        }

        let total_count = if kind == PageKind::Search {
            self.read_total_count(url).await
        } else {
            None
        };

        let html = self.engine.content().await?;
        Ok(FetchedPage { html, total_count })
    }

    /// Bounded wait for the product grid. Absence after all retries means
    /// "likely empty", not failure.
    async fn await_listing_content(&self, url: &str) -> Result<()> {
        for _ in 0..LISTING_WAIT_RETRIES {
            if self
                .engine
                .wait_for_selector(LISTING_CONTENT_SELECTOR, LISTING_WAIT_TIMEOUT)
                .await?
            {
                return Ok(());
            }
            tokio::time::sleep(LISTING_WAIT_PAUSE).await;
        }
        warn!("No listing content appeared at {}, page likely empty", url);
        Ok(())
    }

    async fn read_total_count(&self, url: &str) -> Option<u64> {
        match self.engine.query_text(TOTAL_COUNT_SELECTOR).await {
            Ok(Some(text)) => match text.parse::<u64>() {
                Ok(count) => Some(count),
                Err(_) => {
                    debug!("Total-count text '{}' at {} is not numeric", text, url);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!("Reading total count at {} failed: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ScriptedEngine, test_settings};

    #[tokio::test]
    async fn returns_html_for_mapped_url() {
        let engine = ScriptedEngine::new().with_page("https://x.test/p", "<html>ok</html>");
        let settings = test_settings();
        let fetcher = PageFetcher::new(&engine, &settings);

        let page = fetcher.fetch("https://x.test/p", PageKind::Detail).await.unwrap();
        assert_eq!(page.html, "<html>ok</html>");
        assert!(page.total_count.is_none());
    }

    #[tokio::test]
    async fn exhausted_retries_yield_none() {
        let engine = ScriptedEngine::new();
        let settings = test_settings();
        let fetcher = PageFetcher::new(&engine, &settings);

        assert!(fetcher.fetch("https://x.test/missing", PageKind::Detail).await.is_none());
        // One navigation per attempt, no more.
        assert_eq!(
            engine.visits().len(),
            settings.retry_attempts as usize
        );
    }

    #[tokio::test]
    async fn search_pages_carry_numeric_count_hint() {
        let engine = ScriptedEngine::new()
            .with_page("https://x.test/search", "<html></html>")
            .with_text(
                "div.ItemList_itemTitleWarpper__NZhXV span.ItemList_bold__Anzr9",
                "2415",
            );
        let settings = test_settings();
        let fetcher = PageFetcher::new(&engine, &settings);

        let page = fetcher.fetch("https://x.test/search", PageKind::Search).await.unwrap();
        assert_eq!(page.total_count, Some(2415));
    }

    #[tokio::test]
    async fn non_numeric_count_is_unknown_not_fatal() {
        let engine = ScriptedEngine::new()
            .with_page("https://x.test/search", "<html></html>")
            .with_text(
                "div.ItemList_itemTitleWarpper__NZhXV span.ItemList_bold__Anzr9",
                "2,415 results",
            );
        let settings = test_settings();
        let fetcher = PageFetcher::new(&engine, &settings);

        let page = fetcher.fetch("https://x.test/search", PageKind::Search).await.unwrap();
        assert!(page.total_count.is_none());
    }
}
