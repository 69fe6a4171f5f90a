//! Keyword-filtered incremental crawl
//!
//! Harvests candidate product URLs from keyword searches, scrapes only the
//! ones not already in the persisted snapshot, keeps records whose text
//! matches a target keyword, and merges the result back into the snapshot.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::engine::ChromiumEngine;
use crate::extract;
use crate::fetcher::{PageFetcher, PageKind};
use crate::models::ProductRecord;
use crate::snapshot;
use crate::traits::BrowserEngine;

/// Case-insensitive substring match against any target keyword.
pub fn matches_any_keyword(text: &str, keywords: &[String]) -> bool {
    if text.is_empty() {
        return false;
    }
    let text = text.to_lowercase();
    keywords
        .iter()
        .any(|keyword| text.contains(&keyword.to_lowercase()))
}

/// Product-page links on a search results page, absolutized and deduplicated
/// in document order. Links inside the recommendation strip are unrelated to
/// the query and skipped.
pub fn extract_product_urls(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse(r#"a[href^="/product/"]"#).unwrap();

    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    for anchor in document.select(&anchor_selector) {
        if in_recommend_section(&anchor) {
            continue;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let url = format!("{base_url}{href}");
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    }
    urls
}

fn in_recommend_section(anchor: &ElementRef) -> bool {
    anchor.ancestors().any(|node| {
        ElementRef::wrap(node).is_some_and(|el| {
            el.value().name() == "section"
                && el
                    .value()
                    .attr("class")
                    .is_some_and(|class| class.contains("ProductRecommend_container"))
        })
    })
}

/// Newly scraped records replace existing entries under the same key.
pub fn merge_run_results(
    mut existing: BTreeMap<String, ProductRecord>,
    scraped: impl IntoIterator<Item = (String, ProductRecord)>,
) -> BTreeMap<String, ProductRecord> {
    for (url, record) in scraped {
        existing.insert(url, record);
    }
    existing
}

/// Run the incremental crawl end to end and persist the merged snapshot.
pub async fn run_keyword_crawl(settings: Settings) -> Result<()> {
    std::fs::create_dir_all(&settings.data_dir)?;
    let snapshot_path = snapshot::keyword_snapshot_path(&settings.data_dir);

    let existing = snapshot::load_record_map(&snapshot_path);
    info!("Loaded {} existing products", existing.len());

    let settings = Arc::new(settings);

    // Stage 1: harvest candidate URLs, one keyword per worker.
    let semaphore = Arc::new(Semaphore::new(settings.keyword_workers));
    let mut tasks = JoinSet::new();
    for keyword in settings.target_keywords.clone() {
        let semaphore = semaphore.clone();
        let settings = settings.clone();
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (keyword, Vec::new()),
            };
            let urls = keyword_unit(&settings, &keyword).await;
            (keyword, urls)
        });
    }

    let mut candidate_urls: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((keyword, urls)) => {
                if urls.is_empty() {
                    warn!("Keyword '{}' yielded no product URLs", keyword);
                }
                for url in urls {
                    if seen.insert(url.clone()) {
                        candidate_urls.push(url);
                    }
                }
            }
            Err(e) => error!("Keyword worker failed: {}", e),
        }
    }
    info!("Found {} unique product URLs", candidate_urls.len());

    // Skip anything a previous run already captured.
    let to_scrape: Vec<String> = candidate_urls
        .into_iter()
        .filter(|url| !existing.contains_key(url))
        .collect();
    info!("{} URLs are new and will be scraped", to_scrape.len());

    // Stage 2: scrape details, one product URL per worker.
    let semaphore = Arc::new(Semaphore::new(settings.detail_workers));
    let mut tasks = JoinSet::new();
    for url in to_scrape {
        let semaphore = semaphore.clone();
        let settings = settings.clone();
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (url, None),
            };
            let record = detail_unit(&settings, &url).await;
            (url, record)
        });
    }

    let mut scraped: Vec<(String, ProductRecord)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((url, Some(record))) => scraped.push((url, record)),
            Ok((_, None)) => {}
            Err(e) => error!("Detail worker failed: {}", e),
        }
    }
    info!("Matched {} new products this run", scraped.len());

    let new_count = scraped.len();
    let merged = merge_run_results(existing, scraped);
    snapshot::write_record_map(&snapshot_path, &merged)?;
    info!(
        "Saved {} products ({} new) to {}",
        merged.len(),
        new_count,
        snapshot_path.display()
    );
    Ok(())
}

/// One stage-1 unit: a dedicated browser harvesting every product URL the
/// keyword's search results reveal.
async fn keyword_unit(settings: &Settings, keyword: &str) -> Vec<String> {
    let engine = match ChromiumEngine::launch(settings).await {
        Ok(engine) => Box::new(engine),
        Err(e) => {
            error!("Could not launch browser for keyword '{}': {}", keyword, e);
            return Vec::new();
        }
    };

    let urls = harvest_keyword_urls(engine.as_ref(), settings, keyword).await;

    if let Err(e) = engine.close().await {
        warn!("Error closing browser for keyword '{}': {}", keyword, e);
    }
    urls
}

async fn harvest_keyword_urls(
    engine: &dyn BrowserEngine,
    settings: &Settings,
    keyword: &str,
) -> Vec<String> {
    let fetcher = PageFetcher::new(engine, settings);
    let encoded = urlencoding::encode(keyword);
    let mut urls: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let first_url = format!(
        "{}/search?keyword={}&size={}",
        settings.base_url, encoded, settings.page_size
    );
    let Some(first) = fetcher.fetch(&first_url, PageKind::Search).await else {
        warn!("Could not fetch first search page for '{}'", keyword);
        return urls;
    };
    for url in extract_product_urls(&first.html, &settings.base_url) {
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    }
    info!(
        "Keyword '{}' page 1 yielded {} product URLs",
        keyword,
        urls.len()
    );

    // Pagination only proceeds on a known total; without the count hint the
    // first page is taken as the whole result set.
    let Some(total) = first.total_count else {
        debug!("Total count unknown for '{}', keeping page 1 only", keyword);
        return urls;
    };
    if total as usize <= urls.len() {
        return urls;
    }

    let max_pages = (total as usize).div_ceil(settings.page_size);
    for page_num in 2..=max_pages {
        let page_url = format!(
            "{}/search?keyword={}&page={}&size={}",
            settings.base_url, encoded, page_num, settings.page_size
        );
        let Some(page) = fetcher.fetch(&page_url, PageKind::Search).await else {
            warn!(
                "Could not fetch search page {} for '{}', stopping",
                page_num, keyword
            );
            break;
        };
        let found = extract_product_urls(&page.html, &settings.base_url);
        if found.is_empty() {
            info!(
                "Search page {} for '{}' had no product URLs, stopping",
                page_num, keyword
            );
            break;
        }
        for url in found {
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
    }

    info!(
        "Keyword '{}' resolved to {} product URLs",
        keyword,
        urls.len()
    );
    urls
}

/// One stage-2 unit: a dedicated browser scraping a single product page,
/// with the whole fetch-and-extract sequence retried before giving up.
async fn detail_unit(settings: &Settings, url: &str) -> Option<ProductRecord> {
    let engine = match ChromiumEngine::launch(settings).await {
        Ok(engine) => Box::new(engine),
        Err(e) => {
            error!("Could not launch browser for {}: {}", url, e);
            return None;
        }
    };

    let record = scrape_product_detail(engine.as_ref(), settings, url).await;

    if let Err(e) = engine.close().await {
        warn!("Error closing browser for {}: {}", url, e);
    }
    record
}

async fn scrape_product_detail(
    engine: &dyn BrowserEngine,
    settings: &Settings,
    url: &str,
) -> Option<ProductRecord> {
    let mut record = None;
    let fetcher = PageFetcher::new(engine, settings);

    for attempt in 1..=settings.retry_attempts {
        if let Some(page) = fetcher.fetch(url, PageKind::Detail).await {
            if let Some(extracted) = extract::extract_detail(&page.html, url) {
                record = Some(extracted);
                break;
            }
            warn!(
                "No product data extracted from {} (attempt {}/{})",
                url, attempt, settings.retry_attempts
            );
        }
        if attempt < settings.retry_attempts {
            tokio::time::sleep(settings.retry_delay).await;
        }
    }

    let record = record?;
    if matches_any_keyword(&record.search_text(), &settings.target_keywords) {
        info!("{} matched target keywords", url);
        Some(record)
    } else {
        debug!("{} did not match any target keyword", url);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ScriptedEngine, test_settings};

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let keywords = vec!["Oil Level Sensor".to_string()];
        assert!(matches_any_keyword(
            "A-Premium OIL LEVEL SENSOR for 2019 Camry",
            &keywords
        ));
        assert!(matches_any_keyword("oil level sensor", &keywords));
        assert!(!matches_any_keyword("Ignition Coil", &keywords));
        assert!(!matches_any_keyword("", &keywords));
    }

    #[test]
    fn product_urls_are_absolutized_and_deduped() {
        let html = r#"<html><body>
            <a href="/product/sensor-a">A</a>
            <a href="/product/sensor-b">B</a>
            <a href="/product/sensor-a">A again</a>
            <a href="/category/sensors">not a product</a>
            </body></html>"#;
        let urls = extract_product_urls(html, "https://a-premium.com");
        assert_eq!(
            urls,
            vec![
                "https://a-premium.com/product/sensor-a",
                "https://a-premium.com/product/sensor-b"
            ]
        );
    }

    #[test]
    fn recommendation_strip_links_are_skipped() {
        let html = r#"<html><body>
            <a href="/product/wanted">wanted</a>
            <section class="ProductRecommend_container__8_uKx">
              <div><a href="/product/unrelated">unrelated</a></div>
            </section>
            </body></html>"#;
        let urls = extract_product_urls(html, "https://a-premium.com");
        assert_eq!(urls, vec!["https://a-premium.com/product/wanted"]);
    }

    #[test]
    fn merge_keeps_disjoint_entries_and_overwrites_same_key() {
        let rec = |name: &str| ProductRecord {
            name: name.to_string(),
            ..Default::default()
        };

        let mut existing = BTreeMap::new();
        existing.insert("A".to_string(), rec("first"));

        let merged = merge_run_results(existing.clone(), [("B".to_string(), rec("second"))]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["A"].name, "first");
        assert_eq!(merged["B"].name, "second");

        let overwritten = merge_run_results(existing, [("A".to_string(), rec("fresher"))]);
        assert_eq!(overwritten.len(), 1);
        assert_eq!(overwritten["A"].name, "fresher");
    }

    #[tokio::test]
    async fn harvest_paginates_with_known_total() {
        let mut settings = test_settings();
        settings.page_size = 2;

        let page1 = r#"<html><body>
            <a href="/product/p1">1</a><a href="/product/p2">2</a>
            </body></html>"#;
        let page2 = r#"<html><body>
            <a href="/product/p3">3</a>
            </body></html>"#;

        let first_url = format!(
            "{}/search?keyword=Oil%20Level%20Sensor&size=2",
            settings.base_url
        );
        let second_url = format!(
            "{}/search?keyword=Oil%20Level%20Sensor&page=2&size=2",
            settings.base_url
        );
        let engine = ScriptedEngine::new()
            .with_page(&first_url, page1)
            .with_page(&second_url, page2)
            .with_text(
                "div.ItemList_itemTitleWarpper__NZhXV span.ItemList_bold__Anzr9",
                "3",
            );

        let urls = harvest_keyword_urls(&engine, &settings, "Oil Level Sensor").await;
        assert_eq!(urls.len(), 3);
        assert_eq!(engine.visits().len(), 2);
    }

    #[tokio::test]
    async fn harvest_stays_on_first_page_without_count() {
        let mut settings = test_settings();
        settings.page_size = 2;

        let page1 = r#"<html><body><a href="/product/p1">1</a></body></html>"#;
        let first_url = format!(
            "{}/search?keyword=Oil%20Level%20Sensor&size=2",
            settings.base_url
        );
        let engine = ScriptedEngine::new().with_page(&first_url, page1);

        let urls = harvest_keyword_urls(&engine, &settings, "Oil Level Sensor").await;
        assert_eq!(urls, vec!["https://a-premium.com/product/p1"]);
        assert_eq!(engine.visits().len(), 1);
    }

    #[tokio::test]
    async fn detail_scrape_rejects_non_matching_records() {
        let mut settings = test_settings();
        settings.target_keywords = vec!["Oil Level Sensor".to_string()];

        let matching = r#"<html><head><meta property="og:title" content="Oil Level Sensor"></head><body></body></html>"#;
        let other = r#"<html><head><meta property="og:title" content="Ignition Coil"></head><body></body></html>"#;
        let engine = ScriptedEngine::new()
            .with_page("https://x.test/product/match", matching)
            .with_page("https://x.test/product/other", other);

        let accepted =
            scrape_product_detail(&engine, &settings, "https://x.test/product/match").await;
        assert_eq!(accepted.unwrap().name, "Oil Level Sensor");

        let rejected =
            scrape_product_detail(&engine, &settings, "https://x.test/product/other").await;
        assert!(rejected.is_none());
    }
}
