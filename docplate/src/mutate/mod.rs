//! Tree mutator: rewrites the part tree with command results.
//!
//! Every function here works on one [`Document`] and a command's anchor
//! run.  Nothing is evaluated in this module; the engine hands in finished
//! values (text, image descriptors, link targets, HTML) and the
//! [`MediaRegistry`] through which package relationships are created.

pub mod html;
pub mod image;
pub mod link;
pub mod span;

use tracing::warn;

use crate::error::ReportError;
use crate::scanner::{text_elements, Matcher, Segment};
use crate::tree::{Document, NodeId, NodeKind};
use crate::xml;

pub use html::insert_html;
pub use image::{insert_image, ImageSpec};
pub use link::{insert_link, LinkSpec};
pub use span::{isolate, Span};

/// Elements that never count as visible content.
const IGNORABLE: &[&str] = &["w:proofErr", "w:bookmarkStart", "w:bookmarkEnd", "w:lastRenderedPageBreak"];

/// Inline wrappers whose content decides whether they are visible.
const CONTAINERS: &[&str] = &["w:r", "w:hyperlink", "w:smartTag", "w:ins"];

// ── Media registry ────────────────────────────────────────────────────────────

/// Creates package relationships for inserted media and hyperlinks.
pub trait MediaRegistry: Send {
    /// Store image bytes and return the relationship id.
    fn add_image(&mut self, extension: &str, data: &[u8]) -> Result<String, ReportError>;
    /// Register an external hyperlink target and return the relationship id.
    fn add_hyperlink(&mut self, url: &str) -> Result<String, ReportError>;
}

/// A registry that only remembers what was registered.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelations {
    pub images: Vec<(String, String, Vec<u8>)>,
    pub links: Vec<(String, String)>,
}

impl MediaRegistry for MemoryRelations {
    fn add_image(&mut self, extension: &str, data: &[u8]) -> Result<String, ReportError> {
        let id = format!("rIdImg{}", self.images.len() + 1);
        self.images.push((id.clone(), extension.to_owned(), data.to_vec()));
        Ok(id)
    }

    fn add_hyperlink(&mut self, url: &str) -> Result<String, ReportError> {
        let id = format!("rIdLink{}", self.links.len() + 1);
        self.links.push((id.clone(), url.to_owned()));
        Ok(id)
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Property children (`w:rPr`, `w:pPr`, `w:tcPr`, …).
pub(crate) fn is_props(doc: &Document, id: NodeId) -> bool {
    doc.tag(id).is_some_and(|t| t.local.ends_with("Pr"))
}

/// Whether `id` has anything a reader would see.
pub fn has_content(doc: &Document, id: NodeId) -> bool {
    doc.children(id).iter().any(|&c| match doc.kind(c) {
        // Text outside `w:t` is formatting whitespace.
        NodeKind::Text(_) => false,
        NodeKind::Element { tag, .. } => {
            let name = tag.name.as_str();
            if is_props(doc, c) || IGNORABLE.contains(&name) {
                false
            } else if name == "w:t" {
                !doc.text_content(c).is_empty()
            } else if CONTAINERS.contains(&name) {
                has_content(doc, c)
            } else {
                true
            }
        }
    })
}

/// Remove a paragraph that has become empty, unless it is the only
/// paragraph left in its table cell.
pub fn prune_paragraph(doc: &mut Document, p: NodeId) {
    if !doc.is_live(p) || doc.parent(p).is_none() || has_content(doc, p) {
        return;
    }
    if let Some(cell) = doc.parent(p).filter(|&c| doc.is_element(c, "w:tc")) {
        let paragraphs = doc.children(cell).iter().filter(|&&c| doc.is_element(c, "w:p")).count();
        if paragraphs <= 1 {
            return;
        }
    }
    doc.remove(p);
}

/// Remove a command's run, and its paragraph if nothing visible is left.
pub fn remove_command(doc: &mut Document, anchor: NodeId) {
    if !doc.is_live(anchor) {
        return;
    }
    let paragraph = doc.closest(anchor, "w:p");
    doc.remove(anchor);
    if let Some(p) = paragraph {
        prune_paragraph(doc, p);
    }
}

fn set_element_text(doc: &mut Document, t: NodeId, text: &str) {
    for c in doc.children(t).to_vec() {
        doc.remove(c);
    }
    doc.set_attr(t, "xml:space", "preserve");
    if !text.is_empty() {
        let leaf = doc.create_text(text);
        doc.append_child(t, leaf);
    }
}

/// Replace a command's text with `text`.  With `line_breaks`, every `\n`
/// (or `\r\n`) becomes a `w:br` between `w:t` pieces.
pub fn insert_text(doc: &mut Document, text_node: NodeId, text: &str, line_breaks: bool) {
    let lines: Vec<&str> = if line_breaks {
        text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect()
    } else {
        vec![text]
    };

    set_element_text(doc, text_node, lines[0]);
    let mut cursor = text_node;
    for line in &lines[1..] {
        let br = doc.create_element("w:br");
        doc.insert_after(cursor, br);
        let t = doc.shallow_clone(text_node);
        set_element_text(doc, t, line);
        doc.insert_after(br, t);
        cursor = t;
    }
}

/// Splice every literal segment (`||<w:br/>||`) into its run as XML.
/// Segments that do not parse stay as text.  Returns the number spliced.
pub fn splice_literals(doc: &mut Document, matcher: &Matcher) -> usize {
    let mut spliced = 0;
    for t in text_elements(doc, &[doc.root()]) {
        if !doc.is_live(t) {
            continue;
        }
        let text = doc.text_content(t);
        let Ok(segments) = matcher.segments(&text) else {
            continue;
        };
        if !segments.iter().any(|s| matches!(s, Segment::Literal { .. })) {
            continue;
        }

        let mut nodes = Vec::new();
        let mut pending = String::new();
        for seg in &segments {
            match seg {
                Segment::Literal { outer, inner } => match xml::parse_fragment(&text[inner.clone()]) {
                    Ok(fragment) => {
                        flush_text(doc, t, &mut pending, &mut nodes);
                        for &c in fragment.children(fragment.root()) {
                            nodes.push(doc.import(&fragment, c));
                        }
                        spliced += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "literal XML is not well-formed; keeping it as text");
                        pending.push_str(&text[outer.clone()]);
                    }
                },
                other => pending.push_str(&text[other.outer()]),
            }
        }
        flush_text(doc, t, &mut pending, &mut nodes);
        doc.replace(t, &nodes);
    }
    spliced
}

fn flush_text(doc: &mut Document, template: NodeId, pending: &mut String, nodes: &mut Vec<NodeId>) {
    if pending.is_empty() {
        return;
    }
    let t = doc.shallow_clone(template);
    set_element_text(doc, t, pending);
    nodes.push(t);
    pending.clear();
}

/// Every table cell must end with a paragraph.
pub fn ensure_cell_paragraphs(doc: &mut Document) {
    let cells: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.is_element(n, "w:tc"))
        .collect();
    for cell in cells {
        let ends_with_paragraph = doc
            .children(cell)
            .iter()
            .rev()
            .find(|&&c| doc.tag(c).is_some())
            .is_some_and(|&c| doc.is_element(c, "w:p"));
        if !ends_with_paragraph {
            let p = doc.create_element("w:p");
            doc.append_child(cell, p);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
