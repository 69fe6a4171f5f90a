//! In-memory browser engine fake for exercising the crawl core in tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::config::Settings;
use crate::traits::{BrowserEngine, ResourceKind, WaitUntil};

/// Settings tuned for tests: no delays, two attempts.
pub fn test_settings() -> Settings {
    Settings {
        retry_attempts: 2,
        retry_delay: Duration::ZERO,
        request_delay: Duration::ZERO,
        navigation_timeout: Duration::from_secs(1),
        ..Settings::default()
    }
}

/// Serves canned HTML per URL and canned text per selector. Navigating to an
/// unmapped URL makes the subsequent content read fail, which is how fetch
/// errors are scripted.
pub struct ScriptedEngine {
    pages: HashMap<String, String>,
    texts: HashMap<String, String>,
    current: Mutex<String>,
    visited: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            texts: HashMap::new(),
            current: Mutex::new(String::new()),
            visited: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    /// Every URL navigated to, in order.
    pub fn visits(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserEngine for ScriptedEngine {
    async fn navigate(&self, url: &str, _wait: WaitUntil, _timeout: Duration) -> Result<()> {
        self.visited.lock().unwrap().push(url.to_string());
        *self.current.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        let current = self.current.lock().unwrap().clone();
        self.pages
            .get(&current)
            .cloned()
            .ok_or_else(|| anyhow!("no page scripted for {current}"))
    }

    async fn set_headers(&self, _headers: &[(&str, &str)]) -> Result<()> {
        Ok(())
    }

    async fn set_user_agent(&self, _user_agent: &str) -> Result<()> {
        Ok(())
    }

    async fn block_resources(&self, _kinds: &[ResourceKind]) -> Result<()> {
        Ok(())
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn query_text(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.texts.get(selector).cloned())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
