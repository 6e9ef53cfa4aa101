//! Command scanner.
//!
//! Word splits text into runs wherever formatting, spell-checking or editing
//! history changes, so a command typed as `+++INS name+++` routinely ends up
//! spread over several `w:t` leaves.  Scanning therefore happens in three
//! passes over a part:
//!
//! 1. [`merge_split_commands`]: concatenate all `w:t` text, find delimited
//!    spans, and move every byte of a span into the leaf where it starts.
//! 2. [`isolate_commands`]: split each leaf so that a command never shares
//!    its run with other text or another command.
//! 3. [`scan`] / [`scan_nodes`]: collect the leaves that now hold exactly one
//!    command, in document order.
//!
//! Delimiters are found with a single Aho-Corasick automaton over the start,
//! end and literal delimiters.

use std::ops::Range;

use aho_corasick::{AhoCorasick, MatchKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::RawCommand;
use crate::error::ReportError;
use crate::mutate::is_props;
use crate::tree::{Document, NodeId};

// ── Options ───────────────────────────────────────────────────────────────────

/// Command delimiters.  `start == end` is the common symmetric form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    pub start: String,
    pub end: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters::symmetric("+++")
    }
}

impl Delimiters {
    pub fn symmetric(delim: &str) -> Self {
        Delimiters {
            start: delim.to_owned(),
            end: delim.to_owned(),
        }
    }

    pub fn pair(start: &str, end: &str) -> Self {
        Delimiters {
            start: start.to_owned(),
            end: end.to_owned(),
        }
    }
}

/// Everything the scanner needs to know about a template's syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub delimiters: Delimiters,
    /// Literal-XML delimiter; empty disables literal passthrough.
    pub literal: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            delimiters: Delimiters::default(),
            literal: "||".to_owned(),
        }
    }
}

// ── Segmentation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Start,
    End,
    StartEnd,
    Literal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Command,
    Literal,
}

/// A piece of leaf text.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(Range<usize>),
    /// `outer` includes the delimiters, `inner` is the command text.
    Command { outer: Range<usize>, inner: Range<usize> },
    Literal { outer: Range<usize>, inner: Range<usize> },
}

impl Segment {
    pub fn outer(&self) -> Range<usize> {
        match self {
            Segment::Text(r) => r.clone(),
            Segment::Command { outer, .. } | Segment::Literal { outer, .. } => outer.clone(),
        }
    }
}

/// Compiled delimiter automaton.
#[derive(Debug, Clone)]
pub struct Matcher {
    ac: AhoCorasick,
    roles: Vec<Role>,
}

impl Matcher {
    pub fn new(opts: &ScanOptions) -> Result<Self, ReportError> {
        let Delimiters { start, end } = &opts.delimiters;
        if start.is_empty() || end.is_empty() {
            return Err(ReportError::Internal("command delimiters must not be empty".into()));
        }
        if !opts.literal.is_empty() && (opts.literal == *start || opts.literal == *end) {
            return Err(ReportError::Internal(format!(
                "literal delimiter {:?} clashes with the command delimiters",
                opts.literal
            )));
        }

        let mut patterns: Vec<&str> = Vec::new();
        let mut roles = Vec::new();
        if start == end {
            patterns.push(start);
            roles.push(Role::StartEnd);
        } else {
            patterns.extend([start.as_str(), end.as_str()]);
            roles.extend([Role::Start, Role::End]);
        }
        if !opts.literal.is_empty() {
            patterns.push(&opts.literal);
            roles.push(Role::Literal);
        }

        let ac = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .map_err(|e| ReportError::Internal(format!("delimiter automaton: {e}")))?;
        Ok(Matcher { ac, roles })
    }

    /// Split `text` into plain text, commands and literal segments.
    ///
    /// Returns the offset of the opening delimiter if a command is left
    /// unterminated.  An unterminated literal is treated as plain text.
    pub fn segments(&self, text: &str) -> Result<Vec<Segment>, usize> {
        let mut out = Vec::new();
        let mut cursor = 0;
        let mut open: Option<(usize, usize, Mode)> = None;

        for m in self.ac.find_iter(text) {
            let role = self.roles[m.pattern().as_usize()];
            match (open, role) {
                (None, Role::Start | Role::StartEnd) => {
                    push_text(&mut out, cursor..m.start());
                    open = Some((m.start(), m.end(), Mode::Command));
                }
                (None, Role::Literal) => {
                    push_text(&mut out, cursor..m.start());
                    open = Some((m.start(), m.end(), Mode::Literal));
                }
                (Some((s, inner, Mode::Command)), Role::End | Role::StartEnd) => {
                    out.push(Segment::Command {
                        outer: s..m.end(),
                        inner: inner..m.start(),
                    });
                    cursor = m.end();
                    open = None;
                }
                (Some((s, inner, Mode::Literal)), Role::Literal) => {
                    out.push(Segment::Literal {
                        outer: s..m.end(),
                        inner: inner..m.start(),
                    });
                    cursor = m.end();
                    open = None;
                }
                // Stray end delimiters, and delimiters inside an open
                // command or literal, are content.
                _ => {}
            }
        }

        match open {
            Some((s, _, Mode::Command)) => return Err(s),
            Some((s, _, Mode::Literal)) => cursor = cursor.min(s),
            None => {}
        }
        push_text(&mut out, cursor..text.len());
        Ok(out)
    }

    /// True when `text` is exactly one command and nothing else.
    pub fn single_command<'t>(&self, text: &'t str) -> Option<&'t str> {
        match self.segments(text).ok()?.as_slice() {
            [Segment::Command { inner, .. }] => Some(&text[inner.clone()]),
            _ => None,
        }
    }
}

fn push_text(out: &mut Vec<Segment>, range: Range<usize>) {
    if range.is_empty() {
        return;
    }
    if let Some(Segment::Text(prev)) = out.last_mut() {
        if prev.end == range.start {
            prev.end = range.end;
            return;
        }
    }
    out.push(Segment::Text(range));
}

fn unterminated(text: &str, at: usize) -> ReportError {
    let snippet: String = text[at..].chars().take(40).collect();
    ReportError::syntax(snippet, "unterminated command: no closing delimiter")
}

// ── Leaves ────────────────────────────────────────────────────────────────────

/// `w:t` elements under `roots`, in document order.
pub fn text_elements(doc: &Document, roots: &[NodeId]) -> Vec<NodeId> {
    roots
        .iter()
        .flat_map(|&r| doc.descendants(r))
        .filter(|&n| doc.is_element(n, "w:t"))
        .collect()
}

/// Text nodes directly under `w:t` elements, in document order.
fn text_leaves(doc: &Document, roots: &[NodeId]) -> Vec<NodeId> {
    text_elements(doc, roots)
        .into_iter()
        .flat_map(|t| doc.children(t).to_vec())
        .filter(|&n| doc.text(n).is_some())
        .collect()
}

// ── Pass 1: merge ─────────────────────────────────────────────────────────────

/// Move the text of every delimited span into the leaf where it starts.
pub fn merge_split_commands(doc: &mut Document, matcher: &Matcher) -> Result<(), ReportError> {
    let leaves = text_leaves(doc, &[doc.root()]);
    if leaves.is_empty() {
        return Ok(());
    }

    let mut full = String::new();
    let mut bounds = Vec::with_capacity(leaves.len() + 1);
    for &leaf in &leaves {
        bounds.push(full.len());
        full.push_str(doc.text(leaf).unwrap_or_default());
    }
    bounds.push(full.len());
    let original = bounds.clone();

    let segments = matcher.segments(&full).map_err(|at| unterminated(&full, at))?;
    let owner = |pos: usize, bounds: &[usize]| bounds[1..].partition_point(|&b| b <= pos);

    for seg in &segments {
        let span = match seg {
            Segment::Text(_) => continue,
            Segment::Command { outer, .. } | Segment::Literal { outer, .. } => outer.clone(),
        };
        let first = owner(span.start, &original);
        let last = owner(span.end - 1, &original);
        for b in bounds.iter_mut().take(last + 1).skip(first + 1) {
            *b = (*b).max(span.end);
        }
    }

    let mut moved = 0;
    for (i, &leaf) in leaves.iter().enumerate() {
        if bounds[i] != original[i] || bounds[i + 1] != original[i + 1] {
            doc.set_text(leaf, &full[bounds[i]..bounds[i + 1]]);
            moved += 1;
        }
    }
    if moved > 0 {
        debug!(leaves = moved, "merged split commands");
    }
    Ok(())
}

// ── Pass 2: isolate ───────────────────────────────────────────────────────────

/// Give every command its own run.
pub fn isolate_commands(doc: &mut Document, matcher: &Matcher) -> Result<(), ReportError> {
    for t in text_elements(doc, &[doc.root()]) {
        let text = doc.text_content(t);
        let segments = matcher.segments(&text).map_err(|at| unterminated(&text, at))?;

        // Group consecutive non-command segments into one piece.
        let mut pieces: Vec<(String, bool)> = Vec::new();
        for seg in &segments {
            let is_cmd = matches!(seg, Segment::Command { .. });
            let slice = &text[seg.outer()];
            match pieces.last_mut() {
                Some((prev, false)) if !is_cmd => prev.push_str(slice),
                _ => pieces.push((slice.to_owned(), is_cmd)),
            }
        }

        let has_command = pieces.iter().any(|(_, c)| *c);
        if !has_command {
            continue;
        }
        let run = doc.parent(t).filter(|&p| doc.is_element(p, "w:r"));
        let crowded_run = run.is_some_and(|r| {
            doc.children(r).iter().any(|&c| c != t && !is_props(doc, c))
        });
        if pieces.len() > 1 || crowded_run {
            let texts = pieces.into_iter().map(|(s, _)| s).collect();
            split_leaf(doc, t, run, texts);
        }
    }
    Ok(())
}

/// Replace `t` (and its run, if any) by one run per piece of text.
fn split_leaf(doc: &mut Document, t: NodeId, run: Option<NodeId>, pieces: Vec<String>) {
    let Some(run) = run else {
        let new: Vec<NodeId> = pieces.into_iter().map(|p| new_text_element(doc, t, p)).collect();
        doc.replace(t, &new);
        return;
    };

    let children = doc.children(run).to_vec();
    let pos = children.iter().position(|&c| c == t).unwrap_or(children.len());
    let props: Vec<NodeId> = children.iter().copied().filter(|&c| is_props(doc, c)).collect();
    let before: Vec<NodeId> = children[..pos].iter().copied().filter(|&c| !is_props(doc, c)).collect();
    let after: Vec<NodeId> = children
        .iter()
        .skip(pos + 1)
        .copied()
        .filter(|&c| !is_props(doc, c))
        .collect();

    let mut runs = Vec::new();
    if !before.is_empty() {
        let r = run_shell(doc, run, &props);
        for c in before {
            doc.append_child(r, c);
        }
        runs.push(r);
    }
    for piece in pieces {
        let r = run_shell(doc, run, &props);
        let nt = new_text_element(doc, t, piece);
        doc.append_child(r, nt);
        runs.push(r);
    }
    if !after.is_empty() {
        let r = run_shell(doc, run, &props);
        for c in after {
            doc.append_child(r, c);
        }
        runs.push(r);
    }
    doc.replace(run, &runs);
}

/// An empty copy of `run` that keeps its property children.
pub(crate) fn run_shell(doc: &mut Document, run: NodeId, props: &[NodeId]) -> NodeId {
    let shell = doc.shallow_clone(run);
    for &p in props {
        let copy = doc.deep_clone(p);
        doc.append_child(shell, copy);
    }
    shell
}

fn new_text_element(doc: &mut Document, template: NodeId, text: String) -> NodeId {
    let t = doc.shallow_clone(template);
    doc.set_attr(t, "xml:space", "preserve");
    let leaf = doc.create_text(text);
    doc.append_child(t, leaf);
    t
}

// ── Pass 3: scan ──────────────────────────────────────────────────────────────

/// A command found in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedCommand {
    pub command: RawCommand,
    /// The `w:t` element holding the command text.
    pub text_node: NodeId,
    /// The run to rewrite or remove (the `w:t` itself when it has no run).
    pub anchor: NodeId,
}

/// Commands in the whole part, in document order.
pub fn scan(doc: &Document, matcher: &Matcher) -> Vec<ScannedCommand> {
    scan_nodes(doc, &[doc.root()], matcher)
}

/// Commands under `roots` (e.g. freshly cloned loop bodies).
pub fn scan_nodes(doc: &Document, roots: &[NodeId], matcher: &Matcher) -> Vec<ScannedCommand> {
    let mut out = Vec::new();
    for t in text_elements(doc, roots) {
        let text = doc.text_content(t);
        if let Some(inner) = matcher.single_command(&text) {
            let anchor = doc.parent(t).filter(|&p| doc.is_element(p, "w:r")).unwrap_or(t);
            out.push(ScannedCommand {
                command: RawCommand::parse(inner),
                text_node: t,
                anchor,
            });
        }
    }
    debug!(commands = out.len(), "scanned");
    out
}

/// Merge, isolate and scan a freshly parsed part.
pub fn prepare(doc: &mut Document, matcher: &Matcher) -> Result<Vec<ScannedCommand>, ReportError> {
    merge_split_commands(doc, matcher)?;
    isolate_commands(doc, matcher)?;
    Ok(scan(doc, matcher))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::xml;

    const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn body(inner: &str) -> Document {
        xml::parse(&format!("<w:document {W}><w:body>{inner}</w:body></w:document>")).unwrap()
    }

    fn matcher() -> Matcher {
        Matcher::new(&ScanOptions::default()).unwrap()
    }

    fn texts(doc: &Document) -> Vec<String> {
        text_elements(doc, &[doc.root()])
            .into_iter()
            .map(|t| doc.text_content(t))
            .collect()
    }

    #[test]
    fn segments_basic() {
        let m = matcher();
        let s = m.segments("a +++INS x+++ b").unwrap();
        assert_eq!(
            s,
            vec![
                Segment::Text(0..2),
                Segment::Command { outer: 2..13, inner: 5..10 },
                Segment::Text(13..15),
            ]
        );
    }

    #[test]
    fn segments_unterminated_is_error() {
        assert_eq!(matcher().segments("ok +++INS x"), Err(3));
    }

    #[test]
    fn segments_literal_hides_delimiters() {
        let m = matcher();
        let s = m.segments("||<w:br/>+++||").unwrap();
        assert_eq!(s, vec![Segment::Literal { outer: 0..14, inner: 2..12 }]);
    }

    #[test]
    fn asymmetric_delimiters() {
        let m = Matcher::new(&ScanOptions {
            delimiters: Delimiters::pair("{", "}"),
            literal: String::new(),
        })
        .unwrap();
        assert_eq!(m.single_command("{INS a}"), Some("INS a"));
        // A stray closing delimiter is plain text.
        assert_eq!(m.segments("a}b").unwrap(), vec![Segment::Text(0..3)]);
    }

    #[test]
    fn rejects_clashing_literal() {
        let opts = ScanOptions {
            delimiters: Delimiters::symmetric("||"),
            literal: "||".into(),
        };
        assert!(Matcher::new(&opts).is_err());
    }

    #[test]
    fn merge_moves_split_command_into_first_leaf() {
        let mut doc = body(
            "<w:p><w:r><w:t>Hi +++IN</w:t></w:r><w:r><w:t>S na</w:t></w:r><w:r><w:t>me+++!</w:t></w:r></w:p>",
        );
        merge_split_commands(&mut doc, &matcher()).unwrap();
        assert_eq!(texts(&doc), vec!["Hi +++INS name+++", "", "!"]);
    }

    #[test]
    fn merge_reports_unterminated() {
        let mut doc = body("<w:p><w:r><w:t>+++INS x</w:t></w:r></w:p>");
        let err = merge_split_commands(&mut doc, &matcher()).unwrap_err();
        assert!(matches!(err, ReportError::CommandSyntax { .. }));
    }

    #[test]
    fn isolate_splits_run_and_keeps_properties() {
        let mut doc = body(
            "<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Dear +++INS name+++, hi</w:t></w:r></w:p>",
        );
        isolate_commands(&mut doc, &matcher()).unwrap();
        assert_eq!(texts(&doc), vec!["Dear ", "+++INS name+++", ", hi"]);
        let p = doc.first_child(doc.first_child(doc.root()).unwrap()).unwrap();
        for &r in doc.children(p) {
            assert!(doc.child_element(r, "w:rPr").is_some());
        }
    }

    #[test]
    fn isolate_separates_adjacent_commands() {
        let mut doc = body("<w:p><w:r><w:t>+++a+++ +++b+++</w:t></w:r></w:p>");
        isolate_commands(&mut doc, &matcher()).unwrap();
        assert_eq!(texts(&doc), vec!["+++a+++", " ", "+++b+++"]);
    }

    #[test]
    fn isolate_moves_other_run_content_aside() {
        let mut doc = body("<w:p><w:r><w:t>+++a+++</w:t><w:br/></w:r></w:p>");
        isolate_commands(&mut doc, &matcher()).unwrap();
        let p = doc.first_child(doc.first_child(doc.root()).unwrap()).unwrap();
        let runs = doc.children(p).to_vec();
        assert_eq!(runs.len(), 2);
        assert!(doc.child_element(runs[1], "w:br").is_some());
    }

    #[test]
    fn prepare_finds_commands_in_order() {
        let mut doc = body(
            "<w:p><w:r><w:t>+++FOR x IN xs+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++=</w:t></w:r><w:r><w:t>$x+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++END-FOR x+++</w:t></w:r></w:p>",
        );
        let found = prepare(&mut doc, &matcher()).unwrap();
        let kinds: Vec<CommandKind> = found.iter().map(|c| c.command.kind).collect();
        assert_eq!(kinds, vec![CommandKind::For, CommandKind::Ins, CommandKind::EndFor]);
        assert_eq!(found[1].command.code, "$x");
        assert!(doc.is_element(found[1].anchor, "w:r"));
    }

    #[test]
    fn literal_content_is_not_a_command() {
        let mut doc = body("<w:p><w:r><w:t>||+++x+++||</w:t></w:r></w:p>");
        assert!(prepare(&mut doc, &matcher()).unwrap().is_empty());
    }
}
