//! XML bytes ⇄ [`Document`] conversion.
//!
//! Parsing keeps every text node verbatim (no trimming) so that run text and
//! `xml:space="preserve"` content survive a round trip.  Comments, processing
//! instructions and the doctype are dropped; serialization always writes a
//! standalone UTF-8 declaration, which is what Word emits for its parts.

use std::borrow::Cow;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::ReportError;
use crate::tree::{Attribute, Document, NodeId, NodeKind, QName};

/// Namespaces declared on the wrapper element used by [`parse_fragment`], so
/// that literal XML snippets may use the usual WordprocessingML prefixes.
const FRAGMENT_NAMESPACES: &[(&str, &str)] = &[
    ("xmlns:w", "http://schemas.openxmlformats.org/wordprocessingml/2006/main"),
    ("xmlns:r", "http://schemas.openxmlformats.org/officeDocument/2006/relationships"),
    ("xmlns:wp", "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"),
    ("xmlns:a", "http://schemas.openxmlformats.org/drawingml/2006/main"),
    ("xmlns:pic", "http://schemas.openxmlformats.org/drawingml/2006/picture"),
];

const FRAGMENT_ROOT: &str = "docplate-fragment";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a complete XML document.
pub fn parse(src: &str) -> Result<Document, ReportError> {
    let mut reader = Reader::from_str(src);
    reader.config_mut().trim_text(false);

    let mut doc: Option<Document> = None;
    let mut open: Vec<NodeId> = Vec::new();
    let mut scopes: Vec<Vec<(String, String)>> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            ReportError::TemplateParse(format!("{e} at byte {}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => {
                let id = open_element(&mut doc, &open, &mut scopes, &e)?;
                open.push(id);
            }
            Event::Empty(e) => {
                open_element(&mut doc, &open, &mut scopes, &e)?;
                scopes.pop();
            }
            Event::End(_) => {
                open.pop();
                scopes.pop();
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| ReportError::TemplateParse(e.to_string()))?;
                append_text(&mut doc, &open, text);
            }
            Event::CData(c) => {
                let bytes = c.into_inner();
                append_text(&mut doc, &open, String::from_utf8_lossy(&bytes));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err(ReportError::TemplateParse(
            "unexpected end of document: unclosed element".into(),
        ));
    }
    doc.ok_or_else(|| ReportError::TemplateParse("document has no root element".into()))
}

/// Parse part bytes, rejecting invalid UTF-8.
pub fn parse_bytes(bytes: &[u8]) -> Result<Document, ReportError> {
    let src = std::str::from_utf8(bytes)
        .map_err(|e| ReportError::TemplateParse(format!("part is not UTF-8: {e}")))?;
    parse(src.trim_start_matches('\u{feff}'))
}

/// Parse an XML fragment (zero or more sibling nodes).  The returned
/// document's root is a wrapper element; its children are the fragment.
pub fn parse_fragment(xml: &str) -> Result<Document, ReportError> {
    let decls: String = FRAGMENT_NAMESPACES
        .iter()
        .map(|(k, v)| format!(" {k}=\"{v}\""))
        .collect();
    parse(&format!("<{FRAGMENT_ROOT}{decls}>{xml}</{FRAGMENT_ROOT}>"))
}

fn open_element(
    doc: &mut Option<Document>,
    open: &[NodeId],
    scopes: &mut Vec<Vec<(String, String)>>,
    e: &BytesStart<'_>,
) -> Result<NodeId, ReportError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

    let mut attrs = Vec::new();
    let mut scope = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ReportError::TemplateParse(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ReportError::TemplateParse(err.to_string()))?
            .into_owned();
        if key == "xmlns" {
            scope.push((String::new(), value.clone()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.push((prefix.to_owned(), value.clone()));
        }
        attrs.push(Attribute {
            name: QName::new(&key),
            value,
        });
    }
    scopes.push(scope);

    let mut tag = QName::new(&name);
    tag.uri = resolve_prefix(scopes, &tag.prefix).unwrap_or_default();
    for a in &mut attrs {
        if !a.name.prefix.is_empty() && a.name.prefix != "xmlns" {
            a.name.uri = resolve_prefix(scopes, &a.name.prefix).unwrap_or_default();
        }
    }

    match (doc.as_mut(), open.last()) {
        (None, _) => {
            *doc = Some(Document::new(tag, attrs));
            doc.as_ref()
                .map(Document::root)
                .ok_or_else(|| ReportError::Internal("root element vanished".into()))
        }
        (Some(d), Some(&parent)) => {
            let id = d.create_node(NodeKind::Element { tag, attrs });
            d.append_child(parent, id);
            Ok(id)
        }
        (Some(_), None) => Err(ReportError::TemplateParse(format!(
            "second root element <{name}>"
        ))),
    }
}

fn append_text(doc: &mut Option<Document>, open: &[NodeId], text: Cow<'_, str>) {
    if text.is_empty() {
        return;
    }
    // Text outside the root element (whitespace after the declaration) is dropped.
    if let (Some(d), Some(&parent)) = (doc.as_mut(), open.last()) {
        let id = d.create_text(text.into_owned());
        d.append_child(parent, id);
    }
}

fn resolve_prefix(scopes: &[Vec<(String, String)>], prefix: &str) -> Option<String> {
    if prefix == "xml" {
        return Some("http://www.w3.org/XML/1998/namespace".into());
    }
    scopes
        .iter()
        .rev()
        .flat_map(|s| s.iter())
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.clone())
}

// ── Serialization ─────────────────────────────────────────────────────────────

/// Serialize the whole document, with XML declaration.
pub fn serialize(doc: &Document) -> Result<String, ReportError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(|e| ReportError::Internal(e.to_string()))?;
    write_node(doc, doc.root(), &mut writer)?;
    String::from_utf8(writer.into_inner()).map_err(|e| ReportError::Internal(e.to_string()))
}

/// Serialize a single subtree without declaration (diagnostics and tests).
pub fn serialize_node(doc: &Document, id: NodeId) -> Result<String, ReportError> {
    let mut writer = Writer::new(Vec::new());
    write_node(doc, id, &mut writer)?;
    String::from_utf8(writer.into_inner()).map_err(|e| ReportError::Internal(e.to_string()))
}

fn write_node(doc: &Document, id: NodeId, writer: &mut Writer<Vec<u8>>) -> Result<(), ReportError> {
    let io = |e: std::io::Error| ReportError::Internal(e.to_string());
    match doc.kind(id) {
        NodeKind::Text(t) => writer
            .write_event(Event::Text(BytesText::new(t)))
            .map_err(io)?,
        NodeKind::Element { tag, attrs } => {
            let mut start = BytesStart::new(tag.name.as_str());
            for a in attrs {
                start.push_attribute((a.name.name.as_str(), a.value.as_str()));
            }
            let children = doc.children(id);
            if children.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(io)?;
            } else {
                writer.write_event(Event::Start(start)).map_err(io)?;
                for &c in children {
                    write_node(doc, c, writer)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(tag.name.as_str())))
                    .map_err(io)?;
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    #[test]
    fn parse_resolves_namespaces() {
        let doc = parse(&format!(
            r#"<w:document xmlns:w="{W}"><w:body><w:p/></w:body></w:document>"#
        ))
        .unwrap();
        let body = doc.first_child(doc.root()).unwrap();
        assert_eq!(doc.tag(body).unwrap().uri, W);
        assert_eq!(doc.tag(body).unwrap().local, "body");
    }

    #[test]
    fn text_and_entities_preserved() {
        let doc = parse(r#"<a><t xml:space="preserve">  x &amp; y  </t></a>"#).unwrap();
        assert_eq!(doc.text_content(doc.root()), "  x & y  ");
    }

    #[test]
    fn round_trip_escapes() {
        let doc = parse(r#"<a k="1 &lt; 2"><b>&lt;tag&gt;</b><c/></a>"#).unwrap();
        let out = serialize_node(&doc, doc.root()).unwrap();
        let again = parse(&out).unwrap();
        assert_eq!(again.text_content(again.root()), "<tag>");
        assert_eq!(again.attr(again.root(), "k"), Some("1 < 2"));
    }

    #[test]
    fn serialize_writes_declaration() {
        let doc = parse("<a/>").unwrap();
        let out = serialize(&doc).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(out.ends_with("<a/>"));
    }

    #[test]
    fn malformed_input_is_template_error() {
        assert!(matches!(parse("<a><b></a>"), Err(ReportError::TemplateParse(_))));
        assert!(matches!(parse("<a><b>"), Err(ReportError::TemplateParse(_))));
        assert!(matches!(parse(""), Err(ReportError::TemplateParse(_))));
    }

    #[test]
    fn fragment_with_prefixes() {
        let frag = parse_fragment("<w:br/><w:t>x</w:t>").unwrap();
        let kids = frag.children(frag.root());
        assert_eq!(kids.len(), 2);
        assert_eq!(frag.tag(kids[0]).unwrap().uri, W);
    }
}
