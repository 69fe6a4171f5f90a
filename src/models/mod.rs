//! Data models for scraped product records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A product listing scraped from the catalog.
///
/// Every field carries an empty default so partially populated payloads and
/// older snapshots deserialize without nulls; a finalized record never holds
/// an absent field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRecord {
    pub url: String,
    pub name: String,
    pub sku: String,
    pub item_number: String,
    pub brand: String,
    pub category: String,
    pub price: String,
    pub original_price: String,
    pub image_url: String,
    pub availability: String,
    pub description: String,
    pub fitment: String,
    pub oe_number: Vec<String>,
    pub interchange_number: Vec<String>,
    pub specifications: BTreeMap<String, String>,
}

impl ProductRecord {
    /// Stable dedup key: the site-assigned item number when present, falling
    /// back to the product URL. A record with neither cannot be merged.
    pub fn crawl_key(&self) -> Option<&str> {
        if !self.item_number.is_empty() {
            Some(&self.item_number)
        } else if !self.url.is_empty() {
            Some(&self.url)
        } else {
            None
        }
    }

    /// Flattened text of the descriptive fields, used for keyword matching.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<&str> = vec![
            &self.name,
            &self.description,
            &self.sku,
            &self.brand,
        ];
        parts.extend(self.specifications.values().map(String::as_str));
        parts.push(&self.fitment);
        parts.extend(self.oe_number.iter().map(String::as_str));
        parts.extend(self.interchange_number.iter().map(String::as_str));
        parts.join(" ")
    }
}
