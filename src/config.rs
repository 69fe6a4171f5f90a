//! Crawl configuration, built once at startup and passed into each component

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Static request headers sent with every navigation. The User-Agent is
/// layered on top per fetch from the rotating pool.
pub const BASE_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("Pragma", "no-cache"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Upgrade-Insecure-Requests", "1"),
];

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/124.0.0.0",
];

/// Runtime configuration for both crawl variants and the viewer.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Site root, without a trailing slash.
    pub base_url: String,
    /// Directory holding snapshots and the log file.
    pub data_dir: PathBuf,
    /// Keywords the incremental crawl filters products against.
    pub target_keywords: Vec<String>,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Fixed pause after every successful fetch.
    pub request_delay: Duration,
    pub navigation_timeout: Duration,
    pub headless: bool,
    /// Attach to an already-running Chrome at this DevTools URL instead of
    /// launching one.
    pub remote_chrome_url: Option<String>,
    pub catalog_workers: usize,
    pub keyword_workers: usize,
    pub detail_workers: usize,
    /// Products requested per listing/search page.
    pub page_size: usize,
    pub user_agents: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://a-premium.com".to_string(),
            data_dir: PathBuf::from("data"),
            target_keywords: vec!["Oil Level Sensor".to_string()],
            retry_attempts: 3,
            retry_delay: Duration::from_millis(2500),
            request_delay: Duration::from_millis(2500),
            navigation_timeout: Duration::from_millis(90_000),
            headless: true,
            remote_chrome_url: None,
            catalog_workers: 8,
            keyword_workers: 10,
            detail_workers: 2,
            page_size: 1000,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Build settings from the environment, falling back to defaults for
    /// anything unset or unparsable. `dotenvy::dotenv()` should run first.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(url) = env::var("HARVESTER_BASE_URL") {
            settings.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(dir) = env::var("HARVESTER_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Ok(keywords) = env::var("HARVESTER_KEYWORDS") {
            let parsed: Vec<String> = keywords
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            if !parsed.is_empty() {
                settings.target_keywords = parsed;
            }
        }
        if let Some(attempts) = parse_var("HARVESTER_RETRY_ATTEMPTS") {
            settings.retry_attempts = attempts;
        }
        if let Some(ms) = parse_var("HARVESTER_RETRY_DELAY_MS") {
            settings.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var("HARVESTER_REQUEST_DELAY_MS") {
            settings.request_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var("HARVESTER_NAV_TIMEOUT_MS") {
            settings.navigation_timeout = Duration::from_millis(ms);
        }
        if let Ok(headless) = env::var("HARVESTER_HEADLESS") {
            settings.headless = headless != "false" && headless != "0";
        }
        if let Ok(url) = env::var("HARVESTER_REMOTE_CHROME") {
            if !url.is_empty() {
                settings.remote_chrome_url = Some(url);
            }
        }
        if let Some(n) = parse_var("HARVESTER_CATALOG_WORKERS") {
            settings.catalog_workers = n;
        }
        if let Some(n) = parse_var("HARVESTER_KEYWORD_WORKERS") {
            settings.keyword_workers = n;
        }
        if let Some(n) = parse_var("HARVESTER_DETAIL_WORKERS") {
            settings.detail_workers = n;
        }
        if let Some(n) = parse_var("HARVESTER_PAGE_SIZE") {
            settings.page_size = n;
        }

        settings
    }

    /// One User-Agent drawn from the pool, a fresh pick per fetch.
    pub fn random_user_agent(&self) -> &str {
        &self.user_agents[fastrand::usize(..self.user_agents.len())]
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
