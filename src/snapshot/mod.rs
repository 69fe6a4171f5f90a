//! JSON snapshot persistence, owned exclusively by the run orchestrators

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::models::ProductRecord;

/// Fixed-path snapshot of the keyword-filtered incremental crawl.
pub const KEYWORD_SNAPSHOT_FILE: &str = "products_latest.json";

/// Timestamped output path for one full-catalog run. The timestamp format
/// sorts lexicographically in chronological order.
pub fn catalog_snapshot_path(data_dir: &Path, now: DateTime<Local>) -> PathBuf {
    data_dir.join(format!("all_products_{}.json", now.format("%Y%m%d_%H%M%S")))
}

pub fn keyword_snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(KEYWORD_SNAPSHOT_FILE)
}

/// Rewrite a catalog snapshot whole, pretty-printed.
pub fn write_records(path: &Path, records: &[ProductRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json).with_context(|| format!("Could not write {}", path.display()))
}

pub fn load_records(path: &Path) -> Result<Vec<ProductRecord>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid snapshot {}", path.display()))
}

/// The newest `all_products_*.json` in the data directory, if any.
pub fn latest_catalog_snapshot(data_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(data_dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("all_products_") && name.ends_with(".json"))
        })
        .max()
}

/// Load the keyword-crawl snapshot. A missing or corrupt file starts the run
/// from an empty state, never fails.
pub fn load_record_map(path: &Path) -> BTreeMap<String, ProductRecord> {
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "Existing snapshot {} is corrupt, starting empty: {}",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No previous snapshot at {}", path.display());
            BTreeMap::new()
        }
        Err(e) => {
            warn!(
                "Could not read snapshot {}, starting empty: {}",
                path.display(),
                e
            );
            BTreeMap::new()
        }
    }
}

pub fn write_record_map(path: &Path, map: &BTreeMap<String, ProductRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(map)?;
    fs::write(path, json).with_context(|| format!("Could not write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(url: &str) -> ProductRecord {
        ProductRecord {
            url: url.to_string(),
            name: "Sensor".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn catalog_path_embeds_sortable_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 14, 30, 5).unwrap();
        let path = catalog_snapshot_path(Path::new("data"), now);
        assert_eq!(
            path,
            PathBuf::from("data/all_products_20240307_143005.json")
        );
    }

    #[test]
    fn records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_products_20240101_000000.json");

        let records = vec![record("https://x.test/a"), record("https://x.test/b")];
        write_records(&path, &records).unwrap();
        assert_eq!(load_records(&path).unwrap(), records);
    }

    #[test]
    fn record_map_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = keyword_snapshot_path(dir.path());

        let mut map = BTreeMap::new();
        map.insert("https://x.test/a".to_string(), record("https://x.test/a"));
        write_record_map(&path, &map).unwrap();
        assert_eq!(load_record_map(&path), map);
    }

    #[test]
    fn missing_map_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_record_map(&keyword_snapshot_path(dir.path())).is_empty());
    }

    #[test]
    fn corrupt_map_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = keyword_snapshot_path(dir.path());
        fs::write(&path, "{not json").unwrap();
        assert!(load_record_map(&path).is_empty());
    }

    #[test]
    fn latest_snapshot_is_newest_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "all_products_20240101_000000.json",
            "all_products_20240301_120000.json",
            "all_products_20231231_235959.json",
            "products_latest.json",
        ] {
            fs::write(dir.path().join(name), "[]").unwrap();
        }

        let latest = latest_catalog_snapshot(dir.path()).unwrap();
        assert_eq!(
            latest.file_name().unwrap().to_str().unwrap(),
            "all_products_20240301_120000.json"
        );
    }

    #[test]
    fn empty_dir_has_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_catalog_snapshot(dir.path()).is_none());
    }
}
