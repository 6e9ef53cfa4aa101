//! Span isolation for FOR and IF blocks.
//!
//! A block's span is the run of sibling nodes, under the lowest common
//! ancestor of its two marker runs, that lies between the markers.  Content
//! sharing a paragraph with a marker but lying outside the block is first
//! split off into a twin element, so repeating or deleting the span never
//! touches it.

use crate::error::ReportError;
use crate::tree::{Document, NodeId};

use super::{has_content, is_props, remove_command};

/// Elements that are never split; a span reaching into them takes them whole.
const UNSPLITTABLE: &[&str] = &["w:tc", "w:tr", "w:tbl", "w:body", "w:hdr", "w:ftr"];

/// The nodes a block covers, with markers already removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub container: NodeId,
    pub nodes: Vec<NodeId>,
}

/// Isolate the content between `open` and `close` (marker runs) and remove
/// the markers.
pub fn isolate(doc: &mut Document, open: NodeId, close: NodeId) -> Result<Span, ReportError> {
    let lca = doc
        .common_ancestor(open, close)
        .ok_or_else(|| ReportError::Internal("block markers are not in the same tree".into()))?;

    // Markers in different cells of one row repeat the whole row.
    if doc.is_element(lca, "w:tr") {
        let container = doc
            .parent(lca)
            .ok_or_else(|| ReportError::Internal("table row without a table".into()))?;
        remove_command(doc, open);
        remove_command(doc, close);
        return Ok(Span {
            container,
            nodes: vec![lca],
        });
    }

    split_before(doc, open, lca);
    split_after(doc, close, lca);

    let first = doc.child_toward(lca, open).unwrap_or(open);
    let last = doc.child_toward(lca, close).unwrap_or(close);
    let children = doc.children(lca).to_vec();
    let (Some(from), Some(to)) = (
        children.iter().position(|&c| c == first),
        children.iter().position(|&c| c == last),
    ) else {
        return Err(ReportError::Internal("block markers left their container".into()));
    };
    if from > to {
        return Err(ReportError::Internal("block end precedes block start".into()));
    }
    let nodes = children[from..=to].to_vec();

    remove_command(doc, open);
    remove_command(doc, close);

    let mut nodes: Vec<NodeId> = nodes
        .into_iter()
        .filter(|&n| doc.is_live(n) && doc.parent(n) == Some(lca))
        .collect();

    // A table row that held nothing but a marker is not part of the body.
    for marker_row in [first, last] {
        if nodes.contains(&marker_row) && is_blank_row(doc, marker_row) {
            nodes.retain(|&n| n != marker_row);
            doc.remove(marker_row);
        }
    }
    Ok(Span { container: lca, nodes })
}

fn is_blank_row(doc: &Document, row: NodeId) -> bool {
    let filler = |c: NodeId| is_props(doc, c) || doc.text(c).is_some_and(|t| t.trim().is_empty());
    doc.is_element(row, "w:tr")
        && doc.children(row).iter().all(|&cell| {
            filler(cell)
                || (doc.is_element(cell, "w:tc")
                    && doc
                        .children(cell)
                        .iter()
                        .all(|&c| filler(c) || (doc.is_element(c, "w:p") && !has_content(doc, c))))
        })
}

/// Move everything preceding `node`'s branch into twins, up to `stop`.
fn split_before(doc: &mut Document, node: NodeId, stop: NodeId) {
    split(doc, node, stop, Side::Before);
}

/// Move everything following `node`'s branch into twins, up to `stop`.
fn split_after(doc: &mut Document, node: NodeId, stop: NodeId) {
    split(doc, node, stop, Side::After);
}

#[derive(Clone, Copy)]
enum Side {
    Before,
    After,
}

fn split(doc: &mut Document, node: NodeId, stop: NodeId, side: Side) {
    let mut cur = node;
    while let Some(parent) = doc.parent(cur) {
        if parent == stop || doc.tag_name(parent).is_some_and(|n| UNSPLITTABLE.contains(&n)) {
            break;
        }
        let children = doc.children(parent).to_vec();
        let idx = children.iter().position(|&c| c == cur).unwrap_or(0);
        let outside: Vec<NodeId> = match side {
            Side::Before => children[..idx].to_vec(),
            Side::After => children[idx + 1..].to_vec(),
        }
        .into_iter()
        .filter(|&c| !is_props(doc, c))
        .collect();

        if !outside.is_empty() {
            let twin = doc.shallow_clone(parent);
            for &c in &children {
                if is_props(doc, c) {
                    let copy = doc.deep_clone(c);
                    doc.append_child(twin, copy);
                }
            }
            for c in outside {
                doc.append_child(twin, c);
            }
            match side {
                Side::Before => doc.insert_before(parent, twin),
                Side::After => doc.insert_after(parent, twin),
            }
        }
        cur = parent;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutate::tests::{body, body_xml, find};

    fn runs_with(doc: &Document, text: &str) -> NodeId {
        find(doc, "w:r")
            .into_iter()
            .find(|&r| doc.text_content(r) == text)
            .unwrap()
    }

    #[test]
    fn paragraph_span_between_marker_paragraphs() {
        let mut doc = body(
            "<w:p><w:r><w:t>+++FOR a IN b+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>row</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++END-FOR a+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>after</w:t></w:r></w:p>",
        );
        let open = runs_with(&doc, "+++FOR a IN b+++");
        let close = runs_with(&doc, "+++END-FOR a+++");
        let span = isolate(&mut doc, open, close).unwrap();
        assert_eq!(span.nodes.len(), 1);
        assert_eq!(doc.text_content(span.nodes[0]), "row");
        assert_eq!(find(&doc, "w:p").len(), 2);
    }

    #[test]
    fn text_before_marker_is_split_off() {
        let mut doc = body(
            "<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr><w:r><w:t>Intro </w:t></w:r><w:r><w:t>+++FOR a IN b+++</w:t></w:r><w:r><w:t>body</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++END-FOR a+++</w:t></w:r><w:r><w:t> tail</w:t></w:r></w:p>",
        );
        let open = runs_with(&doc, "+++FOR a IN b+++");
        let close = runs_with(&doc, "+++END-FOR a+++");
        let span = isolate(&mut doc, open, close).unwrap();

        let texts: Vec<String> = span.nodes.iter().map(|&n| doc.text_content(n)).collect();
        assert_eq!(texts, vec!["body"]);
        let all: Vec<String> = find(&doc, "w:p").iter().map(|&p| doc.text_content(p)).collect();
        assert_eq!(all, vec!["Intro ", "body", " tail"]);
        // The split-off twin keeps paragraph properties.
        let intro = find(&doc, "w:p")[0];
        assert!(doc.child_element(intro, "w:pPr").is_some());
    }

    #[test]
    fn inline_span_within_one_paragraph() {
        let mut doc = body(
            "<w:p><w:r><w:t>a</w:t></w:r><w:r><w:t>+++IF x+++</w:t></w:r><w:r><w:t>b</w:t></w:r><w:r><w:t>+++END-IF+++</w:t></w:r><w:r><w:t>c</w:t></w:r></w:p>",
        );
        let open = runs_with(&doc, "+++IF x+++");
        let close = runs_with(&doc, "+++END-IF+++");
        let span = isolate(&mut doc, open, close).unwrap();
        assert!(doc.is_element(span.container, "w:p"));
        assert_eq!(span.nodes.len(), 1);
        assert_eq!(doc.text_content(span.nodes[0]), "b");
        assert_eq!(doc.text_content(span.container), "abc");
    }

    #[test]
    fn markers_in_one_row_lift_to_the_row() {
        let mut doc = body(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>+++FOR r IN rows+++</w:t></w:r><w:r><w:t>x</w:t></w:r></w:p></w:tc>\
             <w:tc><w:p><w:r><w:t>y</w:t></w:r><w:r><w:t>+++END-FOR r+++</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        let open = runs_with(&doc, "+++FOR r IN rows+++");
        let close = runs_with(&doc, "+++END-FOR r+++");
        let span = isolate(&mut doc, open, close).unwrap();
        assert!(doc.is_element(span.container, "w:tbl"));
        assert_eq!(span.nodes.len(), 1);
        assert!(doc.is_element(span.nodes[0], "w:tr"));
        assert_eq!(doc.text_content(span.nodes[0]), "xy");
    }

    #[test]
    fn rows_between_marker_rows() {
        let mut doc = body(
            "<w:tbl>\
             <w:tr><w:tc><w:p><w:r><w:t>+++FOR r IN rows+++</w:t></w:r></w:p></w:tc></w:tr>\
             <w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr>\
             <w:tr><w:tc><w:p><w:r><w:t>+++END-FOR r+++</w:t></w:r></w:p></w:tc></w:tr>\
             </w:tbl>",
        );
        let open = runs_with(&doc, "+++FOR r IN rows+++");
        let close = runs_with(&doc, "+++END-FOR r+++");
        let span = isolate(&mut doc, open, close).unwrap();
        assert_eq!(span.nodes.len(), 1);
        assert_eq!(doc.text_content(span.nodes[0]), "cell");
        assert_eq!(find(&doc, "w:tr").len(), 1);
        assert!(body_xml(&doc).contains("cell"));
    }

    #[test]
    fn marker_row_with_other_cells_stays_in_span() {
        let mut doc = body(
            "<w:tbl>\
             <w:tr><w:tc><w:p><w:r><w:t>+++FOR r IN rows+++</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>label</w:t></w:r></w:p></w:tc></w:tr>\
             <w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr>\
             <w:tr><w:tc><w:p><w:r><w:t>+++END-FOR r+++</w:t></w:r></w:p></w:tc></w:tr>\
             </w:tbl>",
        );
        let open = runs_with(&doc, "+++FOR r IN rows+++");
        let close = runs_with(&doc, "+++END-FOR r+++");
        let span = isolate(&mut doc, open, close).unwrap();
        let texts: Vec<String> = span.nodes.iter().map(|&n| doc.text_content(n)).collect();
        assert_eq!(texts, vec!["label", "cell"]);
        assert_eq!(find(&doc, "w:tr").len(), 2);
    }
}
