//! Small quick-xml helpers shared by the XML-speaking fetchers.

use mdharvest_core::FetchError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

pub(crate) fn xml_err(e: quick_xml::Error) -> FetchError {
    FetchError::Protocol(format!("XML parse error: {e}"))
}

/// Element name with any namespace prefix stripped.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Attribute value by local name.
pub(crate) fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// All attributes as a JSON object.
pub(crate) fn attr_map(e: &BytesStart) -> Map<String, Value> {
    let mut map = Map::new();
    for a in e.attributes().flatten() {
        map.insert(
            String::from_utf8_lossy(local_name(a.key.as_ref())).into_owned(),
            Value::String(String::from_utf8_lossy(&a.value).into_owned()),
        );
    }
    map
}

/// Read the text content of the element whose start tag was just
/// consumed, flattening any nested markup, until its matching end tag.
pub(crate) fn read_text_content(
    reader: &mut Reader<&[u8]>,
    end_tag: &[u8],
) -> Result<String, FetchError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Text(e) => text.push_str(&e.unescape().map_err(xml_err)?),
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && local_name(e.name().as_ref()) == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Skip the remainder of the element whose start tag was just consumed.
pub(crate) fn skip_element(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<(), FetchError> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && local_name(e.name().as_ref()) == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_name_strips_prefix() {
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b"title"), b"title");
        assert_eq!(local_name(b"oai_dc:dc"), b"dc");
    }

    #[test]
    fn read_text_flattens_nested_markup() {
        let xml = "<title>Main <i>Street</i>, Cisko</title>";
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        // consume the start tag
        match reader.read_event_into(&mut buf).unwrap() {
            Event::Start(_) => {}
            other => panic!("unexpected event: {other:?}"),
        }
        let text = read_text_content(&mut reader, b"title").unwrap();
        assert_eq!(text, "Main Street, Cisko");
    }

    #[test]
    fn attr_map_collects_all() {
        let xml = r#"<date q="created" lang="en"/>"#;
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        match reader.read_event_into(&mut buf).unwrap() {
            Event::Empty(e) => {
                let map = attr_map(&e);
                assert_eq!(map["q"], "created");
                assert_eq!(map["lang"], "en");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
