//! Item-list XML feed.

use std::io;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use feedbuilder_shared::{FeedBuilderError, ProductRecord, Result};

use crate::FEED_XML;

/// Render `feed.xml`: a `root` element holding one `item` element per record,
/// each containing the `fields` in order. Text is escaped; blank values
/// produce empty elements.
pub fn render_feed(
    records: &[ProductRecord],
    fields: &[String],
    root: &str,
    item: &str,
) -> Result<String> {
    let mut writer = Writer::new(Vec::new());

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(&mut writer, Event::Text(BytesText::new("\n")))?;
    emit(&mut writer, Event::Start(BytesStart::new(root)))?;

    for record in records {
        emit(&mut writer, Event::Start(BytesStart::new(item)))?;
        for field in fields {
            emit(&mut writer, Event::Start(BytesStart::new(field.as_str())))?;
            let value = record.get(field);
            if !value.is_empty() {
                emit(&mut writer, Event::Text(BytesText::new(value)))?;
            }
            emit(&mut writer, Event::End(BytesEnd::new(field.as_str())))?;
        }
        emit(&mut writer, Event::End(BytesEnd::new(item)))?;
    }

    emit(&mut writer, Event::End(BytesEnd::new(root)))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| FeedBuilderError::write(FEED_XML, io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| FeedBuilderError::write(FEED_XML, io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_item_layout() {
        let record = ProductRecord::from_fields([
            ("id", "123"),
            ("name", "Widget"),
            ("price", "9.99"),
            ("stock", "5"),
        ]);
        let xml = render_feed(
            &[record],
            &fields(&["id", "name", "price", "stock"]),
            "catalog",
            "item",
        )
        .unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<catalog>"));
        assert!(xml.contains(
            "<item><id>123</id><name>Widget</name><price>9.99</price><stock>5</stock></item>"
        ));
        assert!(xml.ends_with("</catalog>"));
    }

    #[test]
    fn empty_feed_has_no_items() {
        let xml = render_feed(&[], &fields(&["id"]), "catalog", "item").unwrap();
        assert!(xml.ends_with("<catalog></catalog>"));
        assert!(!xml.contains("<item>"));
    }

    #[test]
    fn text_is_escaped_and_blanks_are_empty_elements() {
        let record = ProductRecord::from_fields([("id", "1"), ("name", "Salt & <Pepper>")]);
        let xml =
            render_feed(&[record], &fields(&["id", "name", "ean13"]), "catalog", "product").unwrap();

        assert!(xml.contains("<name>Salt &amp; &lt;Pepper&gt;</name>"));
        assert!(xml.contains("<ean13></ean13>"));
        assert!(xml.contains("<product><id>1</id>"));
    }
}
