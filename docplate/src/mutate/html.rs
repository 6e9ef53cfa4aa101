//! HTML command: converts an HTML snippet into WordprocessingML runs and
//! paragraphs.
//!
//! html5ever's DOM is reference-counted and not `Send`, so conversion happens
//! in two steps: [`convert`] walks the DOM synchronously into plain
//! [`HtmlBlock`]s, and only those touch the document tree.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::error::ReportError;
use crate::tree::{Document, NodeId};

use super::{is_props, prune_paragraph};

const SKIPPED: &[&str] = &["script", "style", "head", "title", "iframe", "object", "template"];

const BULLET: &str = "\u{2022} ";

// ── Intermediate form ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String, RunStyle),
    Break,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlBlock {
    /// Paragraph style id (`Heading1` …).
    pub style: Option<String>,
    pub inlines: Vec<Inline>,
}

/// Converted markup.  `blocks` is empty when the snippet had no block tags,
/// in which case `inline` holds everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Converted {
    pub blocks: Vec<HtmlBlock>,
    pub inline: Vec<Inline>,
}

/// Parse `html` and flatten it.
pub fn convert(html: &str) -> Result<Converted, ReportError> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| ReportError::Internal(format!("HTML parser failed: {e}")))?;

    let mut walker = Walker::default();
    walker.walk(&dom.document, RunStyle::default(), false);
    Ok(walker.finish())
}

#[derive(Default)]
struct Walker {
    blocks: Vec<HtmlBlock>,
    current: HtmlBlock,
    saw_block: bool,
}

impl Walker {
    fn walk(&mut self, handle: &Handle, style: RunStyle, pre: bool) {
        match &handle.data {
            NodeData::Document => self.walk_children(handle, style, pre),
            NodeData::Element { name, .. } => {
                let tag = name.local.as_ref();
                if SKIPPED.contains(&tag) {
                    return;
                }
                match tag {
                    "br" => self.current.inlines.push(Inline::Break),
                    "p" | "div" | "blockquote" => self.block(handle, None, None, style, pre),
                    "pre" => self.block(handle, None, None, style, true),
                    "li" => self.block(handle, None, Some(BULLET), style, pre),
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        let level = &tag[1..];
                        self.block(handle, Some(format!("Heading{level}")), None, style, pre)
                    }
                    "b" | "strong" => self.walk_children(handle, RunStyle { bold: true, ..style }, pre),
                    "i" | "em" => self.walk_children(handle, RunStyle { italic: true, ..style }, pre),
                    "u" | "a" => self.walk_children(handle, RunStyle { underline: true, ..style }, pre),
                    "s" | "strike" | "del" => self.walk_children(handle, RunStyle { strike: true, ..style }, pre),
                    _ => self.walk_children(handle, style, pre),
                }
            }
            NodeData::Text { contents } => self.text(&contents.borrow(), style, pre),
            _ => {}
        }
    }

    fn walk_children(&mut self, handle: &Handle, style: RunStyle, pre: bool) {
        for child in handle.children.borrow().iter() {
            self.walk(child, style, pre);
        }
    }

    fn block(&mut self, handle: &Handle, para_style: Option<String>, prefix: Option<&str>, style: RunStyle, pre: bool) {
        self.saw_block = true;
        self.flush();
        self.current.style = para_style;
        if let Some(p) = prefix {
            self.current.inlines.push(Inline::Text(p.to_owned(), RunStyle::default()));
        }
        self.walk_children(handle, style, pre);
        self.flush();
    }

    fn text(&mut self, text: &str, style: RunStyle, pre: bool) {
        if pre {
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    self.current.inlines.push(Inline::Break);
                }
                if !line.is_empty() {
                    self.push_text(line.to_owned(), style);
                }
            }
            return;
        }
        let collapsed = collapse_whitespace(text);
        // Whitespace between blocks is layout, not content.
        if collapsed.trim().is_empty() && self.current.inlines.is_empty() {
            return;
        }
        self.push_text(collapsed, style);
    }

    fn push_text(&mut self, text: String, style: RunStyle) {
        if let Some(Inline::Text(prev, prev_style)) = self.current.inlines.last_mut() {
            if *prev_style == style {
                prev.push_str(&text);
                return;
            }
        }
        self.current.inlines.push(Inline::Text(text, style));
    }

    fn flush(&mut self) {
        let block = std::mem::take(&mut self.current);
        if block.inlines.is_empty() {
            return;
        }
        self.blocks.push(block);
    }

    fn finish(mut self) -> Converted {
        if self.saw_block {
            self.flush();
            Converted {
                blocks: self.blocks,
                inline: Vec::new(),
            }
        } else {
            Converted {
                blocks: Vec::new(),
                inline: self.current.inlines,
            }
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

// ── Insertion ─────────────────────────────────────────────────────────────────

/// Replace the command run `anchor` with the converted markup.  Inline-only
/// output stays in the host paragraph; block output splits it.
pub fn insert_html(doc: &mut Document, anchor: NodeId, html: &str) -> Result<(), ReportError> {
    let converted = convert(html)?;
    let rpr = doc
        .children(anchor)
        .iter()
        .copied()
        .find(|&c| doc.is_element(c, "w:rPr"));

    if converted.blocks.is_empty() {
        let runs = build_runs(doc, anchor, rpr, &converted.inline);
        doc.replace(anchor, &runs);
        return Ok(());
    }

    let host = doc
        .closest(anchor, "w:p")
        .ok_or_else(|| ReportError::Internal("HTML command outside a paragraph".into()))?;

    // Everything after the command's branch moves into a trailing twin.
    let tail = doc.shallow_clone(host);
    let host_children = doc.children(host).to_vec();
    let branch = doc.child_toward(host, anchor).unwrap_or(anchor);
    let split_at = host_children.iter().position(|&c| c == branch).unwrap_or(host_children.len());
    for &c in &host_children {
        if is_props(doc, c) {
            let copy = doc.deep_clone(c);
            doc.append_child(tail, copy);
        }
    }
    for &c in &host_children[split_at + 1..] {
        doc.append_child(tail, c);
    }
    doc.insert_after(host, tail);

    let mut cursor = host;
    for block in &converted.blocks {
        let p = doc.create_element("w:p");
        if let Some(style) = &block.style {
            let ppr = doc.create_element("w:pPr");
            let ps = doc.create_element_with("w:pStyle", &[("w:val", style.as_str())]);
            doc.append_child(ppr, ps);
            doc.append_child(p, ppr);
        }
        for r in build_runs(doc, anchor, rpr, &block.inlines) {
            doc.append_child(p, r);
        }
        doc.insert_after(cursor, p);
        cursor = p;
    }

    doc.remove(anchor);
    prune_paragraph(doc, host);
    prune_paragraph(doc, tail);
    Ok(())
}

fn build_runs(doc: &mut Document, anchor: NodeId, rpr: Option<NodeId>, inlines: &[Inline]) -> Vec<NodeId> {
    inlines
        .iter()
        .map(|inline| {
            let run = if doc.is_element(anchor, "w:r") {
                doc.shallow_clone(anchor)
            } else {
                doc.create_element("w:r")
            };
            match inline {
                Inline::Break => {
                    if let Some(p) = rpr {
                        let copy = doc.deep_clone(p);
                        doc.append_child(run, copy);
                    }
                    let br = doc.create_element("w:br");
                    doc.append_child(run, br);
                }
                Inline::Text(text, style) => {
                    let props = match rpr {
                        Some(p) => doc.deep_clone(p),
                        None => doc.create_element("w:rPr"),
                    };
                    apply_style(doc, props, *style);
                    if !doc.children(props).is_empty() {
                        doc.append_child(run, props);
                    }
                    let t = doc.create_element_with("w:t", &[("xml:space", "preserve")]);
                    let leaf = doc.create_text(text.as_str());
                    doc.append_child(t, leaf);
                    doc.append_child(run, t);
                }
            }
            run
        })
        .collect()
}

fn apply_style(doc: &mut Document, rpr: NodeId, style: RunStyle) {
    let flags = [
        (style.bold, "w:b", None),
        (style.italic, "w:i", None),
        (style.strike, "w:strike", None),
        (style.underline, "w:u", Some("single")),
    ];
    for (on, tag, val) in flags {
        if !on || doc.child_element(rpr, tag).is_some() {
            continue;
        }
        let el = match val {
            Some(v) => doc.create_element_with(tag, &[("w:val", v)]),
            None => doc.create_element(tag),
        };
        doc.append_child(rpr, el);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutate::tests::{body, body_xml, find};

    #[test]
    fn inline_markup_flattens() {
        let c = convert("Hello <b>bold <i>both</i></b><br>next").unwrap();
        assert!(c.blocks.is_empty());
        assert_eq!(
            c.inline,
            vec![
                Inline::Text("Hello ".into(), RunStyle::default()),
                Inline::Text("bold ".into(), RunStyle { bold: true, ..RunStyle::default() }),
                Inline::Text("both".into(), RunStyle { bold: true, italic: true, ..RunStyle::default() }),
                Inline::Break,
                Inline::Text("next".into(), RunStyle::default()),
            ]
        );
    }

    #[test]
    fn blocks_headings_and_lists() {
        let c = convert("<h2>Title</h2>\n<ul>\n  <li>one</li>\n  <li>two</li>\n</ul><p>end</p>").unwrap();
        let styles: Vec<Option<&str>> = c.blocks.iter().map(|b| b.style.as_deref()).collect();
        assert_eq!(styles, vec![Some("Heading2"), None, None, None]);
        assert_eq!(c.blocks[1].inlines, vec![Inline::Text(format!("{BULLET}one"), RunStyle::default())]);
    }

    #[test]
    fn scripts_are_dropped() {
        let c = convert("<script>alert(1)</script>safe").unwrap();
        assert_eq!(c.inline, vec![Inline::Text("safe".into(), RunStyle::default())]);
    }

    #[test]
    fn inline_html_replaces_run() {
        let mut doc = body("<w:p><w:r><w:t>a</w:t></w:r><w:r><w:t>+++HTML x+++</w:t></w:r></w:p>");
        let run = find(&doc, "w:r")[1];
        insert_html(&mut doc, run, "<b>B</b>").unwrap();
        assert_eq!(
            body_xml(&doc),
            r#"<w:p><w:r><w:t>a</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">B</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn block_html_splits_host_paragraph() {
        let mut doc = body(
            "<w:p><w:r><w:t>before</w:t></w:r><w:r><w:t>+++HTML x+++</w:t></w:r><w:r><w:t>after</w:t></w:r></w:p>",
        );
        let run = find(&doc, "w:r")[1];
        insert_html(&mut doc, run, "<h1>T</h1><p>para</p>").unwrap();
        let texts: Vec<String> = find(&doc, "w:p").iter().map(|&p| doc.text_content(p)).collect();
        assert_eq!(texts, vec!["before", "T", "para", "after"]);
        let heading = find(&doc, "w:pStyle")[0];
        assert_eq!(doc.attr(heading, "w:val"), Some("Heading1"));
    }

    #[test]
    fn block_html_alone_leaves_no_empty_paragraphs() {
        let mut doc = body("<w:p><w:r><w:t>+++HTML x+++</w:t></w:r></w:p>");
        let run = find(&doc, "w:r")[0];
        insert_html(&mut doc, run, "<p>one</p><p>two</p>").unwrap();
        assert_eq!(find(&doc, "w:p").len(), 2);
    }
}
