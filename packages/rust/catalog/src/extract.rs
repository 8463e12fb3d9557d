//! Vendor XML → [`ProductRecord`] extraction.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, instrument};

use feedbuilder_shared::{FeedBuilderError, ProductRecord, Result, SchemaConfig};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Records extracted from one document.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Items carrying every required field, in document order.
    pub records: Vec<ProductRecord>,
    /// Item elements found, kept or not.
    pub candidates: usize,
    /// Items dropped for a missing required field.
    pub skipped: usize,
}

/// Parse a vendor document and extract one record per item element.
///
/// Every element named `schema.item_tag` is an item, at any depth (nested
/// items inside an item are ignored). Its direct children named in
/// `schema.fields` supply the values; text and CDATA are concatenated and
/// trimmed. When a field repeats, its first occurrence wins. Text is decoded
/// with the encoding named in the XML declaration (UTF-8 by default). Items missing a required field are skipped, not reported.
///
/// Malformed XML fails the whole document with [`FeedBuilderError::Parse`].
#[instrument(skip_all, fields(bytes = document.len(), item_tag = %schema.item_tag))]
pub fn extract(document: &[u8], schema: &SchemaConfig) -> Result<Extraction> {
    let document = document.strip_prefix(UTF8_BOM).unwrap_or(document);
    let mut reader = Reader::from_reader(document);
    let mut buf = Vec::new();

    let mut depth = 0usize;
    let mut seen_root = false;
    let mut item: Option<ItemState> = None;
    let mut out = Extraction::default();

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            FeedBuilderError::parse(format!("at byte {}: {e}", reader.error_position()))
        })?;

        match event {
            Event::Start(start) => {
                if depth == 0 {
                    open_root(&mut seen_root)?;
                }
                depth += 1;
                let name = local_name(&start);

                match item.as_mut() {
                    None if name == schema.item_tag => item = Some(ItemState::new(depth)),
                    None => {}
                    Some(state) => {
                        if depth == state.depth + 1
                            && state.field.is_none()
                            && is_field(schema, &name)
                        {
                            state.field = Some((name, String::new()));
                        }
                    }
                }
            }
            Event::Empty(start) => {
                if depth == 0 {
                    open_root(&mut seen_root)?;
                }
                let name = local_name(&start);

                match item.as_mut() {
                    None if name == schema.item_tag => {
                        finish_item(ItemState::new(depth + 1), schema, &mut out);
                    }
                    None => {}
                    Some(state) => {
                        if depth == state.depth && is_field(schema, &name) {
                            state.values.entry(name).or_default();
                        }
                    }
                }
            }
            Event::End(_) => {
                if let Some(state) = item.as_mut() {
                    if depth == state.depth + 1 {
                        // A repeated field keeps its first occurrence.
                        if let Some((name, text)) = state.field.take() {
                            state
                                .values
                                .entry(name)
                                .or_insert_with(|| text.trim().to_string());
                        }
                    } else if depth == state.depth {
                        if let Some(done) = item.take() {
                            finish_item(done, schema, &mut out);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) => {
                if depth == 0 {
                    if !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(FeedBuilderError::parse("text outside the root element"));
                    }
                    continue;
                }
                if let Some(target) = field_buffer(&mut item, depth) {
                    let decoded = text
                        .decode()
                        .map_err(|e| FeedBuilderError::parse(format!("text: {e}")))?;
                    target.push_str(&decoded);
                }
            }
            Event::CData(cdata) => {
                if depth == 0 {
                    return Err(FeedBuilderError::parse("CDATA outside the root element"));
                }
                if let Some(target) = field_buffer(&mut item, depth) {
                    let decoded = cdata
                        .decode()
                        .map_err(|e| FeedBuilderError::parse(format!("CDATA: {e}")))?;
                    target.push_str(&decoded);
                }
            }
            Event::GeneralRef(reference) => {
                if depth == 0 {
                    return Err(FeedBuilderError::parse("reference outside the root element"));
                }
                if let Some(target) = field_buffer(&mut item, depth) {
                    let resolved = reference
                        .resolve_char_ref()
                        .map_err(|e| FeedBuilderError::parse(format!("character reference: {e}")))?;
                    match resolved {
                        Some(ch) => target.push(ch),
                        None => {
                            let name = reference
                                .decode()
                                .map_err(|e| FeedBuilderError::parse(format!("entity: {e}")))?;
                            let value = resolve_predefined_entity(&name).ok_or_else(|| {
                                FeedBuilderError::parse(format!("unknown entity '&{name};'"))
                            })?;
                            target.push_str(value);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(FeedBuilderError::parse(format!(
            "unexpected end of document with {depth} unclosed element(s)"
        )));
    }
    if !seen_root {
        return Err(FeedBuilderError::parse("document has no root element"));
    }

    debug!(
        candidates = out.candidates,
        kept = out.records.len(),
        skipped = out.skipped,
        "extraction complete"
    );

    Ok(out)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An item element being read.
struct ItemState {
    /// Nesting depth of the item element itself.
    depth: usize,
    values: BTreeMap<String, String>,
    /// Field currently open, with its accumulated text.
    field: Option<(String, String)>,
}

impl ItemState {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            values: BTreeMap::new(),
            field: None,
        }
    }
}

fn open_root(seen_root: &mut bool) -> Result<()> {
    if *seen_root {
        return Err(FeedBuilderError::parse("multiple root elements"));
    }
    *seen_root = true;
    Ok(())
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn is_field(schema: &SchemaConfig, name: &str) -> bool {
    schema.fields.iter().any(|f| f == name)
}

/// Text buffer of the open field, when `depth` is directly inside it.
fn field_buffer(item: &mut Option<ItemState>, depth: usize) -> Option<&mut String> {
    let state = item.as_mut()?;
    if depth != state.depth + 1 {
        return None;
    }
    state.field.as_mut().map(|(_, text)| text)
}

fn finish_item(state: ItemState, schema: &SchemaConfig, out: &mut Extraction) {
    out.candidates += 1;
    let record = ProductRecord::from_fields(state.values);

    if let Some(missing) = schema.required.iter().find(|f| !record.has(f)) {
        debug!(id = record.id(), field = %missing, "item missing required field, skipping");
        out.skipped += 1;
        return;
    }

    out.records.push(record);
}
