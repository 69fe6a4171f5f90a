//! Full-catalog crawl: category pagination and the fan-out orchestrator

pub mod discovery;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::engine::ChromiumEngine;
use crate::extract;
use crate::fetcher::{PageFetcher, PageKind};
use crate::models::ProductRecord;
use crate::snapshot;
use crate::traits::BrowserEngine;

/// Paginate one category until exhaustion, accumulating records.
///
/// Never fails outright: a page-level error logs and terminates the
/// category, returning whatever was collected so far. Pages are fetched
/// strictly in sequence.
pub async fn crawl_category(
    engine: &dyn BrowserEngine,
    settings: &Settings,
    category_path: &str,
) -> Vec<ProductRecord> {
    let fetcher = PageFetcher::new(engine, settings);
    let mut collected: Vec<ProductRecord> = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut previous_page: Option<Vec<ProductRecord>> = None;
    let mut page_num: usize = 1;

    loop {
        let url = format!(
            "{}{}?page={}&size={}",
            settings.base_url, category_path, page_num, settings.page_size
        );
        let Some(page) = fetcher.fetch(&url, PageKind::Listing).await else {
            warn!(
                "Stopping {} at page {}: page could not be fetched",
                category_path, page_num
            );
            break;
        };

        let products = extract::parse_listing(&page.html, &settings.base_url);

        // The server may ignore the page parameter entirely and listing
        // total-counts are unreliable, so an unchanged consecutive page is
        // the authoritative end-of-category signal.
        if previous_page.as_ref() == Some(&products) {
            break;
        }
        if products.is_empty() {
            break;
        }

        let short_page = products.len() < settings.page_size;
        for product in &products {
            if !product.url.is_empty() && seen_urls.insert(product.url.clone()) {
                collected.push(product.clone());
            }
        }
        if short_page {
            break;
        }

        previous_page = Some(products);
        page_num += 1;
    }

    info!(
        "Category {} yielded {} products",
        category_path,
        collected.len()
    );
    collected
}

/// Global dedup by crawl key: keys keep first-appearance order, the latest
/// record under a key wins, keyless records are dropped.
pub fn dedup_by_crawl_key(records: Vec<ProductRecord>) -> Vec<ProductRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, ProductRecord> = HashMap::new();

    for record in records {
        let Some(key) = record.crawl_key().map(str::to_string) else {
            continue;
        };
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.insert(key, record);
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

/// Crawl every leaf category and persist the deduplicated catalog snapshot.
///
/// Each completed category rewrites the whole snapshot so an interrupted run
/// still leaves the most recent complete save on disk.
pub async fn run_catalog_crawl(settings: Settings) -> Result<()> {
    std::fs::create_dir_all(&settings.data_dir)?;
    let out_path = snapshot::catalog_snapshot_path(&settings.data_dir, Local::now());

    let categories = {
        let engine = Box::new(ChromiumEngine::launch(&settings).await?);
        let discovered = discovery::discover_leaf_categories(engine.as_ref(), &settings).await;
        if let Err(e) = engine.close().await {
            warn!("Error closing discovery browser: {}", e);
        }
        discovered?
    };

    if categories.is_empty() {
        warn!("No leaf categories discovered, nothing to crawl");
        return Ok(());
    }

    let settings = Arc::new(settings);
    let semaphore = Arc::new(Semaphore::new(settings.catalog_workers));
    let mut tasks = JoinSet::new();

    for category in categories {
        let semaphore = semaphore.clone();
        let settings = settings.clone();
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (category, Vec::new()),
            };
            let records = crawl_category_unit(&settings, &category).await;
            (category, records)
        });
    }

    let mut all_products: Vec<ProductRecord> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((category, records)) => {
                all_products.extend(records);
                info!(
                    "{} complete, {} products accumulated",
                    category,
                    all_products.len()
                );
                if let Err(e) = snapshot::write_records(&out_path, &all_products) {
                    error!("Incremental save to {} failed: {}", out_path.display(), e);
                }
            }
            Err(e) => error!("Category worker failed: {}", e),
        }
    }

    let unique = dedup_by_crawl_key(all_products);
    snapshot::write_records(&out_path, &unique)
        .with_context(|| format!("Final save to {} failed", out_path.display()))?;
    info!(
        "Saved {} deduplicated products to {}",
        unique.len(),
        out_path.display()
    );
    Ok(())
}

/// One unit of work: a dedicated browser crawling a single category, closed
/// on every exit path.
async fn crawl_category_unit(settings: &Settings, category: &str) -> Vec<ProductRecord> {
    let engine = match ChromiumEngine::launch(settings).await {
        Ok(engine) => Box::new(engine),
        Err(e) => {
            error!("Could not launch browser for {}: {}", category, e);
            return Vec::new();
        }
    };

    let records = crawl_category(engine.as_ref(), settings, category).await;

    if let Err(e) = engine.close().await {
        warn!("Error closing browser for {}: {}", category, e);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ScriptedEngine, test_settings};

    fn listing_html(handles: &[&str]) -> String {
        let items: Vec<String> = handles
            .iter()
            .map(|h| format!(r#"{{"urlHandle": "{h}", "title": "{h}"}}"#))
            .collect();
        format!(
            r#"<html><body><script id="__NEXT_DATA__" type="application/json">
            {{"props": {{"pageProps": {{"filterData": {{"itemList": {{"data": [{}]}}}}}}}}}}
            </script></body></html>"#,
            items.join(",")
        )
    }

    fn page_url(settings: &Settings, path: &str, page: usize) -> String {
        format!(
            "{}{}?page={}&size={}",
            settings.base_url, path, page, settings.page_size
        )
    }

    #[tokio::test]
    async fn repeated_page_terminates_without_adding() {
        let mut settings = test_settings();
        settings.page_size = 2;

        let full_page = listing_html(&["a", "b"]);
        let engine = ScriptedEngine::new()
            .with_page(&page_url(&settings, "/sensors", 1), &full_page)
            .with_page(&page_url(&settings, "/sensors", 2), &full_page);

        let records = crawl_category(&engine, &settings, "/sensors").await;
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://a-premium.com/product/a",
                "https://a-premium.com/product/b"
            ]
        );
        // Page 2 repeated page 1, so page 3 was never requested.
        assert_eq!(engine.visits().len(), 2);
    }

    #[tokio::test]
    async fn short_page_is_added_then_terminates() {
        let mut settings = test_settings();
        settings.page_size = 2;

        let engine = ScriptedEngine::new()
            .with_page(&page_url(&settings, "/sensors", 1), &listing_html(&["a"]));

        let records = crawl_category(&engine, &settings, "/sensors").await;
        assert_eq!(records.len(), 1);
        assert_eq!(engine.visits().len(), 1);
    }

    #[tokio::test]
    async fn empty_page_terminates_without_records() {
        let mut settings = test_settings();
        settings.page_size = 2;

        let engine = ScriptedEngine::new()
            .with_page(&page_url(&settings, "/sensors", 1), &listing_html(&[]));

        let records = crawl_category(&engine, &settings, "/sensors").await;
        assert!(records.is_empty());
        assert_eq!(engine.visits().len(), 1);
    }

    #[tokio::test]
    async fn urls_deduplicate_within_category() {
        let mut settings = test_settings();
        settings.page_size = 2;

        let engine = ScriptedEngine::new()
            .with_page(&page_url(&settings, "/sensors", 1), &listing_html(&["a", "b"]))
            .with_page(&page_url(&settings, "/sensors", 2), &listing_html(&["b", "c"]))
            .with_page(&page_url(&settings, "/sensors", 3), &listing_html(&["b", "c"]));

        let records = crawl_category(&engine, &settings, "/sensors").await;
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://a-premium.com/product/a",
                "https://a-premium.com/product/b",
                "https://a-premium.com/product/c"
            ]
        );
    }

    #[tokio::test]
    async fn failed_fetch_returns_accumulated_records() {
        let mut settings = test_settings();
        settings.page_size = 2;

        // Page 2 is unmapped, so its fetch exhausts retries and fails.
        let engine = ScriptedEngine::new()
            .with_page(&page_url(&settings, "/sensors", 1), &listing_html(&["a", "b"]));

        let records = crawl_category(&engine, &settings, "/sensors").await;
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn dedup_keeps_latest_record_per_key() {
        let older = ProductRecord {
            item_number: "IT-1".to_string(),
            name: "old".to_string(),
            ..Default::default()
        };
        let newer = ProductRecord {
            item_number: "IT-1".to_string(),
            name: "new".to_string(),
            ..Default::default()
        };
        let other = ProductRecord {
            url: "https://x.test/product/b".to_string(),
            ..Default::default()
        };
        let keyless = ProductRecord::default();

        let unique = dedup_by_crawl_key(vec![older, other.clone(), keyless, newer]);
        assert_eq!(unique.len(), 2);
        // First-appearance order of keys, latest record content.
        assert_eq!(unique[0].name, "new");
        assert_eq!(unique[1], other);
    }

    #[test]
    fn dedup_leaves_no_duplicate_keys() {
        let records: Vec<ProductRecord> = (0..10)
            .map(|i| ProductRecord {
                item_number: format!("IT-{}", i % 3),
                ..Default::default()
            })
            .collect();

        let unique = dedup_by_crawl_key(records);
        let mut keys: Vec<&str> = unique.iter().filter_map(|r| r.crawl_key()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 3);
    }
}
