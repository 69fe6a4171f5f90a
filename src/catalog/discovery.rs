//! Leaf-category discovery from the categories index page

use anyhow::{Result, anyhow};
use regex::Regex;
use tracing::info;

use crate::config::Settings;
use crate::fetcher::{PageFetcher, PageKind};
use crate::traits::BrowserEngine;

/// Fetch the categories index once and return every depth-3 ("leaf")
/// category path, "/"-prefixed, deduplicated and sorted.
pub async fn discover_leaf_categories(
    engine: &dyn BrowserEngine,
    settings: &Settings,
) -> Result<Vec<String>> {
    let url = format!("{}/categories", settings.base_url);
    let fetcher = PageFetcher::new(engine, settings);
    let page = fetcher
        .fetch(&url, PageKind::Detail)
        .await
        .ok_or_else(|| anyhow!("Could not fetch categories index at {}", url))?;

    let paths = extract_leaf_paths(&page.html);
    info!("Discovered {} leaf categories", paths.len());
    Ok(paths)
}

/// Scan raw HTML for category entries tagged with taxonomy level 3. The page
/// state serializes `seoUrlHandle` and `level` in either key order.
pub fn extract_leaf_paths(html: &str) -> Vec<String> {
    let handle_first = Regex::new(r#""seoUrlHandle"\s*:\s*"([^"]+)"\s*,\s*"level"\s*:\s*3"#).unwrap();
    let level_first = Regex::new(r#""level"\s*:\s*3\s*,\s*"seoUrlHandle"\s*:\s*"([^"]+)""#).unwrap();

    let mut paths: Vec<String> = handle_first
        .captures_iter(html)
        .chain(level_first.captures_iter(html))
        .map(|caps| format!("/{}", &caps[1]))
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_level_three_handles_in_both_key_orders() {
        let html = r#"
            {"seoUrlHandle": "ignition-coils", "level": 3}
            {"level": 3, "seoUrlHandle": "oil-level-sensors"}
            {"seoUrlHandle": "engine-parts", "level": 2}
            {"seoUrlHandle": "ignition-coils", "level": 3}
        "#;
        let paths = extract_leaf_paths(html);
        assert_eq!(paths, vec!["/ignition-coils", "/oil-level-sensors"]);
    }

    #[test]
    fn no_leaf_entries_yield_empty_set() {
        assert!(extract_leaf_paths("<html></html>").is_empty());
    }
}
