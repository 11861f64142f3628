//! Markup loading for [`Document`]
//!
//! Pages are read with quick-xml in a lenient mode: HTML void elements may be left
//! unclosed, end tags are matched against the nearest open element and HTML entities
//! are decoded by hand so `&nbsp;` and friends do not abort the parse.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::sync::LazyLock;

use super::{Document, NodeId};
use crate::error::{InspectorError, Result};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

static DECIMAL_ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&#(\d+);").unwrap());
static HEX_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#[xX]([0-9A-Fa-f]+);").unwrap());

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Decode common HTML entities in a string
/// Handles: &amp; &lt; &gt; &quot; &apos; &nbsp; &#NNN; (decimal) &#xHHH; (hex)
pub fn decode_html_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let result = DECIMAL_ENTITY.replace_all(s, |caps: &regex::Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });
    let result = HEX_ENTITY.replace_all(&result, |caps: &regex::Captures| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });

    // &amp; last so "&amp;lt;" stays "&lt;"
    result
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}

fn read_element(e: &BytesStart) -> (String, Vec<(String, String)>) {
    let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
    let mut attributes = Vec::new();
    for attr in e.html_attributes().with_checks(false).filter_map(|a| a.ok()) {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = decode_html_entities(&String::from_utf8_lossy(&attr.value));
        attributes.push((key, value));
    }
    (tag, attributes)
}

/// Parse markup into a fresh document
pub fn parse_document(markup: &str) -> Result<Document> {
    let mut doc = Document::new();
    let root = doc.root();
    append_markup(&mut doc, root, markup)?;
    Ok(doc)
}

/// Parse a fragment and append its nodes under `parent`
pub fn append_markup(doc: &mut Document, parent: NodeId, markup: &str) -> Result<Vec<NodeId>> {
    let mut reader = Reader::from_str(markup);
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut stack: Vec<(String, NodeId)> = vec![(String::new(), parent)];
    let mut top_level = Vec::new();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| InspectorError::Markup(format!("{} at byte {}", e, reader.buffer_position())))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let self_closing = matches!(event, Event::Empty(_));
                let (tag, attributes) = read_element(e);
                let node = doc.create_element(&tag, attributes);
                let current = stack.last().map(|(_, id)| *id).unwrap_or(parent);
                doc.append_child(current, node);
                if current == parent {
                    top_level.push(node);
                }
                if !self_closing && !is_void(&tag) {
                    stack.push((tag, node));
                }
            }
            Event::End(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                // Close the nearest matching open element; stray end tags are dropped
                if !is_void(&tag) {
                    if let Some(pos) = stack.iter().rposition(|(open, _)| *open == tag) {
                        if pos > 0 {
                            stack.truncate(pos);
                        }
                    }
                }
            }
            Event::Text(ref e) => {
                let raw = String::from_utf8_lossy(e);
                let text = decode_html_entities(&raw);
                if !text.trim().is_empty() {
                    let node = doc.create_text(&text);
                    let current = stack.last().map(|(_, id)| *id).unwrap_or(parent);
                    doc.append_child(current, node);
                }
            }
            Event::CData(ref e) => {
                let text = String::from_utf8_lossy(e).to_string();
                let node = doc.create_text(&text);
                let current = stack.last().map(|(_, id)| *id).unwrap_or(parent);
                doc.append_child(current, node);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(top_level)
}
