//! Traits and interfaces for engine-agnostic page automation

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Navigation settle strategy.
///
/// Listing pages populate their product grid from a client-side data fetch,
/// so they must wait for the network to go quiet; detail and search pages
/// only need the DOM built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// DOM constructed; client-side data fetches may still be in flight.
    DomContentLoaded,
    /// No outstanding network activity.
    NetworkIdle,
}

/// Sub-resource classes a page load can skip to cut transfer time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Font,
    Stylesheet,
    Media,
}

/// Abstract headless-browser capability consumed by the crawl core.
///
/// One engine instance serves one unit of work (one category or one product
/// URL) and is torn down with [`BrowserEngine::close`] on every exit path.
/// Header installation and resource blocking replace any previous rule set,
/// so re-applying them on a reused page never stacks duplicate handlers.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Navigate to `url` and wait for the given settle strategy.
    async fn navigate(&self, url: &str, wait: WaitUntil, timeout: Duration) -> Result<()>;

    /// Rendered HTML of the current page.
    async fn content(&self) -> Result<String>;

    /// Install extra request headers for subsequent navigations.
    async fn set_headers(&self, headers: &[(&str, &str)]) -> Result<()>;

    /// Override the User-Agent for subsequent navigations.
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Abort sub-resource requests of the given kinds.
    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()>;

    /// Wait until an element matching `selector` exists.
    ///
    /// # Returns
    /// * `Ok(true)` when the element appeared within the timeout
    /// * `Ok(false)` when the wait timed out
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Inner text of the first element matching `selector`, if any.
    async fn query_text(&self, selector: &str) -> Result<Option<String>>;

    /// Shut the engine down, releasing the underlying browser.
    async fn close(self: Box<Self>) -> Result<()>;
}
