//! HTML templates for the snapshot viewer

use crate::models::ProductRecord;

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn base_page(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Parts Harvester</title>
    <style>
        body {{ font-family: sans-serif; margin: 1.5rem; color: #222; }}
        table {{ border-collapse: collapse; width: 100%; font-size: 0.85rem; }}
        th, td {{ border: 1px solid #ccc; padding: 0.35rem 0.5rem; text-align: left; vertical-align: top; }}
        th {{ background: #f0f0f0; position: sticky; top: 0; }}
        .warning {{ color: #8a6d00; background: #fff6d6; padding: 0.75rem; border-radius: 4px; }}
        .error {{ color: #8a1f11; background: #fbe3e4; padding: 0.75rem; border-radius: 4px; }}
        form {{ margin-bottom: 1rem; }}
        input, select {{ padding: 0.3rem; margin-right: 0.5rem; }}
    </style>
</head>
<body>
    <h1>Product Catalog</h1>
    {body}
</body>
</html>"#
    )
}

pub fn warning_page(message: &str) -> String {
    base_page(&format!(
        r#"<p class="warning">{}</p>"#,
        html_escape(message)
    ))
}

pub fn error_page(message: &str) -> String {
    base_page(&format!(r#"<p class="error">{}</p>"#, html_escape(message)))
}

const COLUMNS: &[&str] = &[
    "Name",
    "SKU",
    "Item Number",
    "Price",
    "Category",
    "Brand",
    "Availability",
    "Fitment",
    "OE Number",
    "Interchange Number",
    "Material",
    "Color",
    "Installation",
    "Product URL",
    "Image",
];

pub fn table_page(
    records: &[&ProductRecord],
    categories: &[String],
    selected_category: &str,
    query: &str,
    unique_oe_count: usize,
) -> String {
    let mut body = String::new();

    body.push_str(&filter_form(categories, selected_category, query));
    body.push_str(&format!(
        "<p>Found {} records. Total unique OE numbers: {}.</p>",
        records.len(),
        unique_oe_count
    ));

    if records.is_empty() {
        body.push_str("<p>No products found matching your criteria.</p>");
        return base_page(&body);
    }

    body.push_str("<table><thead><tr>");
    for column in COLUMNS {
        body.push_str(&format!("<th>{column}</th>"));
    }
    body.push_str("</tr></thead><tbody>");
    for record in records {
        body.push_str(&table_row(record));
    }
    body.push_str("</tbody></table>");

    base_page(&body)
}

fn filter_form(categories: &[String], selected_category: &str, query: &str) -> String {
    let mut options = String::from(r#"<option value="">All categories</option>"#);
    for category in categories {
        let selected = if category == selected_category {
            " selected"
        } else {
            ""
        };
        options.push_str(&format!(
            r#"<option value="{0}"{selected}>{0}</option>"#,
            html_escape(category)
        ));
    }

    format!(
        r#"<form method="get" action="/">
        <select name="category">{options}</select>
        <input type="text" name="q" value="{}" placeholder="Search name, SKU, item no., brand, OE...">
        <button type="submit">Apply</button>
        </form>"#,
        html_escape(query)
    )
}

fn table_row(record: &ProductRecord) -> String {
    let link = |url: &str, label: &str| {
        if url.is_empty() {
            String::new()
        } else {
            format!(r#"<a href="{}" target="_blank">{label}</a>"#, html_escape(url))
        }
    };
    let spec = |key: &str| {
        record
            .specifications
            .get(key)
            .map(|v| html_escape(v))
            .unwrap_or_default()
    };

    let cells = [
        html_escape(&record.name),
        html_escape(&record.sku),
        html_escape(&record.item_number),
        html_escape(&record.price),
        html_escape(&record.category),
        html_escape(&record.brand),
        html_escape(&record.availability),
        html_escape(&record.fitment),
        html_escape(&record.oe_number.join("; ")),
        html_escape(&record.interchange_number.join("; ")),
        spec("Material"),
        spec("Color"),
        spec("Installation"),
        link(&record.url, "open"),
        link(&record.image_url, "image"),
    ];

    let mut row = String::from("<tr>");
    for cell in cells {
        row.push_str(&format!("<td>{cell}</td>"));
    }
    row.push_str("</tr>");
    row
}
