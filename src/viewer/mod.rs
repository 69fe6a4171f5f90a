//! Read-only web viewer over the latest catalog snapshot

mod templates;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::Settings;
use crate::models::ProductRecord;
use crate::snapshot;

/// Columns the free-text search runs over, mirroring what buyers look
/// products up by.
fn search_haystack(record: &ProductRecord) -> String {
    [
        record.name.as_str(),
        record.sku.as_str(),
        record.item_number.as_str(),
        record.brand.as_str(),
        record.category.as_str(),
        &record.oe_number.join("; "),
        &record.interchange_number.join("; "),
        record.fitment.as_str(),
    ]
    .join(" ")
    .to_lowercase()
}

/// Apply the category filter and free-text search, in that order.
pub fn apply_filters<'a>(
    records: &'a [ProductRecord],
    category: &str,
    query: &str,
) -> Vec<&'a ProductRecord> {
    let query = query.trim().to_lowercase();
    records
        .iter()
        .filter(|record| category.is_empty() || record.category == category)
        .filter(|record| query.is_empty() || search_haystack(record).contains(&query))
        .collect()
}

/// Distinct non-empty categories, sorted.
pub fn distinct_categories(records: &[ProductRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.category.trim())
        .filter(|category| !category.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Count of distinct trimmed OE numbers across the given rows.
pub fn unique_oe_count(records: &[&ProductRecord]) -> usize {
    records
        .iter()
        .flat_map(|record| record.oe_number.iter())
        .map(|oe| oe.trim())
        .filter(|oe| !oe.is_empty())
        .collect::<BTreeSet<_>>()
        .len()
}

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
}

#[derive(Debug, Default, Deserialize)]
struct ViewerQuery {
    #[serde(default)]
    category: String,
    #[serde(default)]
    q: String,
}

/// Start the viewer server.
pub async fn serve(settings: Settings, addr: &str) -> Result<()> {
    let state = AppState {
        settings: Arc::new(settings),
    };
    let app = Router::new()
        .route("/", get(product_table))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Viewer listening at http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn product_table(
    State(state): State<AppState>,
    Query(params): Query<ViewerQuery>,
) -> Html<String> {
    let data_dir = &state.settings.data_dir;
    let Some(path) = snapshot::latest_catalog_snapshot(data_dir) else {
        return Html(templates::warning_page(&format!(
            "No catalog snapshot found. Run a catalog crawl to produce an all_products_*.json file in {}.",
            data_dir.display()
        )));
    };

    let records = match snapshot::load_records(&path) {
        Ok(records) => records,
        Err(e) => {
            warn!("Snapshot {} failed to load: {}", path.display(), e);
            return Html(templates::error_page(&format!(
                "Could not load snapshot {}: {}",
                path.display(),
                e
            )));
        }
    };

    if records.is_empty() {
        return Html(templates::warning_page(
            "The latest snapshot contains no products.",
        ));
    }

    let categories = distinct_categories(&records);
    let filtered = apply_filters(&records, &params.category, &params.q);
    let oe_count = unique_oe_count(&filtered);

    Html(templates::table_page(
        &filtered,
        &categories,
        &params.category,
        &params.q,
        oe_count,
    ))
}
