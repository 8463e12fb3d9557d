//! Spreadsheet-friendly CSV renderings.

use std::io;

use feedbuilder_catalog::{PRICE_COLUMNS, PricingModel};
use feedbuilder_shared::{FeedBuilderError, ProductRecord, Result};

use crate::{CATALOG_LIGHT_CSV, CATALOG_PREVIEW_CSV};

/// Empty review column the sheet user fills in.
const REVIEW_COLUMN: &str = "Keep?";

/// Trailing review column showing the product image in Google Sheets.
const IMAGE_PREVIEW_COLUMN: &str = "image_preview";

/// Source fields of `catalog_light.csv`.
const LIGHT_FIELDS: [&str; 8] = [
    "id", "name", "price", "pvd", "ean13", "stock", "image1", "brand",
];

/// Render `catalog_preview.csv`: the schema fields in order, then the pricing
/// columns when `pricing` is set. `review_columns` wraps each row in
/// `Keep?` … `image_preview`.
pub fn render_preview(
    records: &[ProductRecord],
    fields: &[String],
    pricing: Option<&PricingModel>,
    review_columns: bool,
) -> Result<String> {
    let mut header: Vec<String> = Vec::new();
    if review_columns {
        header.push(REVIEW_COLUMN.into());
    }
    header.extend(fields.iter().cloned());
    if pricing.is_some() {
        header.extend(PRICE_COLUMNS.iter().map(|c| c.to_string()));
    }
    if review_columns {
        header.push(IMAGE_PREVIEW_COLUMN.into());
    }

    let rows = records.iter().map(|record| {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        if review_columns {
            row.push(String::new());
        }
        row.extend(fields.iter().map(|f| record.get(f).to_string()));
        if let Some(model) = pricing {
            row.extend(quote_cells(model, record));
        }
        if review_columns {
            row.push(image_formula(record.get("image1")));
        }
        row
    });

    write_table(CATALOG_PREVIEW_CSV, &header, rows)
}

/// Render `catalog_light.csv`: `Keep?`, a fixed subset of fields and the
/// pricing columns when `pricing` is set.
pub fn render_light(records: &[ProductRecord], pricing: Option<&PricingModel>) -> Result<String> {
    let mut header: Vec<String> = vec![REVIEW_COLUMN.into()];
    header.extend(LIGHT_FIELDS.iter().map(|f| f.to_string()));
    if pricing.is_some() {
        header.extend(PRICE_COLUMNS.iter().map(|c| c.to_string()));
    }

    let rows = records.iter().map(|record| {
        let mut row = vec![String::new()];
        row.extend(LIGHT_FIELDS.iter().map(|f| record.get(f).to_string()));
        if let Some(model) = pricing {
            row.extend(quote_cells(model, record));
        }
        row
    });

    write_table(CATALOG_LIGHT_CSV, &header, rows)
}

fn quote_cells(model: &PricingModel, record: &ProductRecord) -> [String; 8] {
    model.quote(record.purchase_price(), record.price()).cells()
}

fn image_formula(url: &str) -> String {
    if url.is_empty() {
        String::new()
    } else {
        format!("=IMAGE(\"{url}\")")
    }
}

fn write_table(
    filename: &str,
    header: &[String],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(header)
        .map_err(|e| FeedBuilderError::write(filename, e.into()))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| FeedBuilderError::write(filename, e.into()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| FeedBuilderError::write(filename, e.into_error()))?;

    String::from_utf8(bytes)
        .map_err(|e| FeedBuilderError::write(filename, io::Error::new(io::ErrorKind::InvalidData, e)))
}
