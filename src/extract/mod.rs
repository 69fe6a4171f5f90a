//! Product record extraction from rendered pages
//!
//! Pages embed the same JSON the storefront UI renders from, in a
//! `script#__NEXT_DATA__` tag. That payload is the primary extraction source;
//! detail pages fall back to meta tags and DOM patterns when it is absent or
//! empty.

use std::collections::BTreeSet;

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::ProductRecord;

/// Listing fitment is capped to avoid combinatorial blow-up on items
/// compatible with many vehicles.
const LISTING_FITMENT_CAP: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PricePayload {
    currency: Option<String>,
    cent: Option<i64>,
    precision: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SpecEntry {
    label: Option<String>,
    name: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ImagePayload {
    url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SeoPayload {
    description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FitmentEntry {
    year: Value,
    make: Value,
    model: Value,
}

/// Product-detail object at `props.pageProps.detail`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DetailPayload {
    title: Option<String>,
    part_number: Option<String>,
    discount_price: Option<PricePayload>,
    original_price: Option<PricePayload>,
    item_images: Option<Vec<ImagePayload>>,
    seo: Option<SeoPayload>,
    description_rule: Option<String>,
    brand: Option<String>,
    us_status: Option<String>,
    sku_customs: Option<Vec<SpecEntry>>,
    fixed_customs: Option<Vec<SpecEntry>>,
    compatible_data: Option<Vec<FitmentEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DifferencesPrompt {
    label: Option<String>,
    value: Option<String>,
}

/// One entry of the listing schema at
/// `props.pageProps.filterData.itemList.data`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ListingItem {
    url_handle: Option<String>,
    title: Option<String>,
    part_number: Option<String>,
    item_number: Option<String>,
    discount_price: Option<PricePayload>,
    original_price: Option<PricePayload>,
    image_url: Option<String>,
    front_category_title: Option<String>,
    brand: Option<String>,
    available_total: Option<i64>,
    warranty: Option<String>,
    material: Option<String>,
    color: Option<String>,
    installation: Option<String>,
    sku_customs: Option<Vec<SpecEntry>>,
    differences_prompt: Option<DifferencesPrompt>,
    year_values: Option<Vec<Value>>,
    make_values: Option<Vec<Value>>,
    model_values: Option<Vec<Value>>,
}

/// Extract one product record from a detail page.
///
/// Stage 1 reads the embedded page-state payload; stage 2 falls back to meta
/// tags and DOM patterns and only succeeds if at least one descriptive field
/// came out non-empty.
pub fn extract_detail(html: &str, source_url: &str) -> Option<ProductRecord> {
    if let Some(props) = page_props(html) {
        let detail = props
            .get("detail")
            .filter(|d| d.as_object().is_some_and(|o| !o.is_empty()));
        if let Some(detail) = detail {
            match serde_json::from_value::<DetailPayload>(detail.clone()) {
                Ok(payload) => {
                    debug!("Extracted {} from page state", source_url);
                    return Some(record_from_detail(payload, source_url));
                }
                Err(e) => {
                    warn!("Detail payload at {} did not deserialize: {}", source_url, e);
                }
            }
        } else {
            debug!("No detail object in page state for {}", source_url);
        }
    }

    extract_detail_fallback(html, source_url)
}

/// Parse all product records off a category listing page. A page without the
/// payload (or with a malformed one) parses as empty.
pub fn parse_listing(html: &str, base_url: &str) -> Vec<ProductRecord> {
    let Some(props) = page_props(html) else {
        return Vec::new();
    };
    let Some(items) = props.pointer("/filterData/itemList/data") else {
        return Vec::new();
    };
    let items: Vec<ListingItem> = match serde_json::from_value(items.clone()) {
        Ok(items) => items,
        Err(e) => {
            warn!("Listing payload did not deserialize: {}", e);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .map(|item| record_from_listing(item, base_url))
        .collect()
}

/// The `props.pageProps` object of the embedded page state, if present.
fn page_props(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__").unwrap();
    let raw = document.select(&selector).next()?.inner_html();
    match serde_json::from_str::<Value>(&raw) {
        Ok(data) => data.pointer("/props/pageProps").cloned(),
        Err(e) => {
            warn!("Embedded page state is not valid JSON: {}", e);
            None
        }
    }
}

fn record_from_detail(payload: DetailPayload, source_url: &str) -> ProductRecord {
    let mut record = ProductRecord {
        url: source_url.to_string(),
        ..Default::default()
    };

    record.name = payload.title.unwrap_or_default();
    record.sku = payload.part_number.unwrap_or_default();
    record.price = preferred_price(
        payload.discount_price.as_ref(),
        payload.original_price.as_ref(),
    );
    record.image_url = payload
        .item_images
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|image| image.url)
        .unwrap_or_default();

    let seo_description = payload
        .seo
        .and_then(|seo| seo.description)
        .unwrap_or_default();
    record.description = if seo_description.is_empty() {
        payload.description_rule.unwrap_or_default()
    } else {
        seo_description
    };

    record.brand = payload.brand.unwrap_or_default();
    record.availability = payload.us_status.unwrap_or_default();

    for entry in payload
        .sku_customs
        .unwrap_or_default()
        .into_iter()
        .chain(payload.fixed_customs.unwrap_or_default())
    {
        let label = entry.label.or(entry.name).unwrap_or_default();
        route_spec_entry(&label, &entry.value.unwrap_or_default(), &mut record, false);
    }

    record.fitment = fitment_from_compatibles(&payload.compatible_data.unwrap_or_default());
    record
}

fn record_from_listing(item: ListingItem, base_url: &str) -> ProductRecord {
    let mut record = ProductRecord::default();

    record.url = match item.url_handle.as_deref() {
        Some(handle) if !handle.is_empty() => format!("{base_url}/product/{handle}"),
        _ => String::new(),
    };
    record.name = item.title.unwrap_or_default();
    record.sku = item.part_number.unwrap_or_default();
    record.item_number = item.item_number.unwrap_or_default();
    record.price = item
        .discount_price
        .as_ref()
        .map(format_price)
        .unwrap_or_default();
    record.original_price = item
        .original_price
        .as_ref()
        .map(format_price)
        .unwrap_or_default();
    record.image_url = item.image_url.unwrap_or_default();
    record.category = item.front_category_title.unwrap_or_default();
    record.brand = item.brand.unwrap_or_default();
    record.availability = if item.available_total.unwrap_or(0) > 0 {
        "In Stock".to_string()
    } else {
        "Out of Stock".to_string()
    };

    for entry in item.sku_customs.unwrap_or_default() {
        let label = entry.label.or(entry.name).unwrap_or_default();
        route_spec_entry(&label, &entry.value.unwrap_or_default(), &mut record, false);
    }

    // Listing items surface extra OE references in a comparison prompt.
    if let Some(prompt) = item.differences_prompt {
        let label = prompt.label.unwrap_or_default().trim().to_lowercase();
        if label == "oe number" || label == "replaces part number" {
            record.oe_number.extend(
                prompt
                    .value
                    .unwrap_or_default()
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty()),
            );
        }
    }

    for (label, value) in [
        ("Material", item.material),
        ("Color", item.color),
        ("Installation", item.installation),
        ("Warranty", item.warranty),
    ] {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            record.specifications.insert(label.to_string(), value);
        }
    }

    record.fitment = listing_fitment(
        &item.year_values.unwrap_or_default(),
        &item.make_values.unwrap_or_default(),
        &item.model_values.unwrap_or_default(),
    );

    record
}

/// Route one spec label/value pair: OE and interchange labels land in their
/// lists, anything else in the specifications map (later labels overwrite).
/// The fallback stage de-duplicates list values; the payload stage does not.
fn route_spec_entry(label: &str, value: &str, record: &mut ProductRecord, dedup: bool) {
    let label = label.trim();
    let value = value.trim();
    if label.is_empty() || value.is_empty() {
        return;
    }

    match label.to_lowercase().as_str() {
        "oe number" => {
            if !dedup || !record.oe_number.iter().any(|v| v == value) {
                record.oe_number.push(value.to_string());
            }
        }
        "interchange number" => {
            if !dedup || !record.interchange_number.iter().any(|v| v == value) {
                record.interchange_number.push(value.to_string());
            }
        }
        _ => {
            record
                .specifications
                .insert(label.to_string(), value.to_string());
        }
    }
}

/// `"<currency> <amount>"` with the amount scaled out of minor units;
/// precision defaults to 2 digits. Unpriceable payloads format as empty.
fn format_price(price: &PricePayload) -> String {
    match (price.currency.as_deref(), price.cent) {
        (Some(currency), Some(cent)) if !currency.is_empty() => {
            let precision = price.precision.unwrap_or(2);
            let amount = cent as f64 / 10f64.powi(precision as i32);
            format!("{currency} {amount:.2}")
        }
        _ => String::new(),
    }
}

fn preferred_price(discount: Option<&PricePayload>, original: Option<&PricePayload>) -> String {
    let discounted = discount.map(format_price).unwrap_or_default();
    if !discounted.is_empty() {
        return discounted;
    }
    original.map(format_price).unwrap_or_default()
}

/// Unique sorted "year make model" strings, entries with any missing part
/// skipped, joined with "; ".
fn fitment_from_compatibles(entries: &[FitmentEntry]) -> String {
    let unique: BTreeSet<String> = entries
        .iter()
        .filter_map(|entry| {
            let year = json_text(&entry.year);
            let make = json_text(&entry.make);
            let model = json_text(&entry.model);
            if year.is_empty() || make.is_empty() || model.is_empty() {
                None
            } else {
                Some(format!("{year} {make} {model}"))
            }
        })
        .collect();
    unique.into_iter().collect::<Vec<_>>().join("; ")
}

/// Listing pages carry flat year/make/model value lists instead of explicit
/// compatibility entries; combine the first 3 x 2 x 3 of them, capped.
fn listing_fitment(years: &[Value], makes: &[Value], models: &[Value]) -> String {
    if years.is_empty() || makes.is_empty() || models.is_empty() {
        return String::new();
    }

    let mut combos = Vec::new();
    'outer: for year in years.iter().take(3) {
        for make in makes.iter().take(2) {
            for model in models.iter().take(3) {
                combos.push(format!(
                    "{} {} {}",
                    json_text(year),
                    json_text(make),
                    json_text(model)
                ));
                if combos.len() >= LISTING_FITMENT_CAP {
                    break 'outer;
                }
            }
        }
    }
    combos.join("; ")
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn extract_detail_fallback(html: &str, source_url: &str) -> Option<ProductRecord> {
    let document = Html::parse_document(html);
    let mut record = ProductRecord {
        url: source_url.to_string(),
        ..Default::default()
    };

    record.name = first_non_empty([
        meta_content(&document, r#"meta[property="og:title"]"#),
        select_text(&document, r#"h1[class*="product-title"]"#),
    ]);
    record.description = first_non_empty([
        meta_content(&document, r#"meta[property="og:description"]"#),
        select_text(&document, r#"div[class*="ProductDetail_description__"]"#),
    ]);
    record.image_url = first_non_empty([
        meta_content(&document, r#"meta[property="og:image"]"#),
        select_attr(&document, r#"img[class*="ProductItem_img__"]"#, "src"),
    ]);
    record.price = first_non_empty([
        select_text(&document, r#"span[class*="ProductItem_discountPrice__"]"#),
        select_text(&document, r#"span[class*="ProductItem_infoPrice__"]"#),
    ]);
    record.sku = first_non_empty([
        sku_from_label_pattern(html),
        meta_content(&document, r#"meta[itemprop="sku"]"#),
    ]);
    record.brand = meta_content(&document, r#"meta[itemprop="brand"]"#);

    let item_selector = Selector::parse(r#"li[class*="ProductDetail_attributesItem__"]"#).unwrap();
    let key_selector = Selector::parse(r#"span[class*="ProductDetail_attributesKey__"]"#).unwrap();
    let value_selector =
        Selector::parse(r#"span[class*="ProductDetail_attributesValue__"]"#).unwrap();
    for item in document.select(&item_selector) {
        let key = item
            .select(&key_selector)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let value = item
            .select(&value_selector)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let key = key.trim().trim_end_matches(':');
        route_spec_entry(key, value.trim(), &mut record, true);
    }

    if has_extractable_content(&record) {
        debug!("Extracted {} from meta/DOM fallback", source_url);
        Some(record)
    } else {
        warn!("No extractable content at {}", source_url);
        None
    }
}

fn has_extractable_content(record: &ProductRecord) -> bool {
    !record.name.is_empty()
        || !record.description.is_empty()
        || !record.sku.is_empty()
        || !record.price.is_empty()
        || !record.image_url.is_empty()
        || !record.specifications.is_empty()
        || !record.fitment.is_empty()
        || !record.oe_number.is_empty()
        || !record.interchange_number.is_empty()
}

fn first_non_empty<const N: usize>(candidates: [String; N]) -> String {
    candidates
        .into_iter()
        .find(|c| !c.is_empty())
        .unwrap_or_default()
}

fn meta_content(document: &Html, selector: &str) -> String {
    let selector = Selector::parse(selector).unwrap();
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn select_text(document: &Html, selector: &str) -> String {
    let selector = Selector::parse(selector).unwrap();
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> String {
    let selector = Selector::parse(selector).unwrap();
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// "Part #: <span class=ProductDetail_value..>XYZ</span>" style SKU labels
/// have no stable structural anchor, so they stay a raw-HTML pattern.
fn sku_from_label_pattern(html: &str) -> String {
    let pattern =
        Regex::new(r#"(?is)(?:Part\s*#|SKU):\s*<span[^>]*class="[^"]*ProductDetail_value[^"]*"[^>]*>(.+?)</span>"#)
            .unwrap();
    let tag_strip = Regex::new(r"<[^>]+>").unwrap();
    pattern
        .captures(html)
        .map(|caps| tag_strip.replace_all(&caps[1], "").trim().to_string())
        .unwrap_or_default()
}
