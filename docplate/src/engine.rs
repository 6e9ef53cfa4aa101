//! Command execution: walks a linked part depth-first and hands every
//! command result to the tree mutator.

use std::mem;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, info, info_span, Instrument};

use crate::collector::ErrorCollector;
use crate::command::{CommandKind, RawCommand};
use crate::context::Context;
use crate::error::ReportError;
use crate::linker::{link, AliasTable, Block, BlockHeader, CommandNode, Located};
use crate::mutate::image::looks_like_image;
use crate::mutate::link::looks_like_link;
use crate::mutate::{
    ensure_cell_paragraphs, insert_html, insert_image, insert_link, insert_text, isolate, prune_paragraph,
    remove_command, splice_literals, ImageSpec, LinkSpec, MediaRegistry,
};
use crate::report::{ExecOutput, Options};
use crate::scanner::{scan_nodes, Matcher};
use crate::script::{CodeRunner, DirectRunner, Sandbox, SandboxedRunner, Value};
use crate::tree::{Document, NodeId};

const SENTINEL: &str = "docplate:sentinel";

// ── Payloads ──────────────────────────────────────────────────────────────────

/// What an INS (or inserting EXEC) result turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Image(ImageSpec),
    Link(LinkSpec),
}

/// Interpret an INS result.
pub fn ins_payload(v: Value, raw: &str, reject_nullish: bool) -> Result<Payload, ReportError> {
    let command = raw.trim().to_owned();
    match v {
        Value::Undefined | Value::Null if reject_nullish => Err(ReportError::NullishResult { command }),
        Value::Undefined | Value::Null => Ok(Payload::Text(String::new())),
        ref obj @ Value::Object(_) => {
            if looks_like_image(obj) {
                ImageSpec::from_value(obj, &command).map(Payload::Image)
            } else if looks_like_link(obj) {
                LinkSpec::from_value(obj, &command).map(Payload::Link)
            } else {
                Err(ReportError::ObjectResult { command })
            }
        }
        Value::Bytes(_) => Err(ReportError::ObjectResult { command }),
        other => Ok(Payload::Text(other.to_string())),
    }
}

/// Straighten typographic quotes that Word's autocorrect puts into code.
pub fn fix_smart_quotes(code: &str) -> String {
    code.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{201b}' => '\'',
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{201f}' => '"',
            other => other,
        })
        .collect()
}

/// Largest `wp:docPr` id in use.
pub fn max_doc_pr_id(doc: &Document) -> u32 {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.is_element(n, "wp:docPr"))
        .filter_map(|n| doc.attr(n, "id")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// A part being rendered, with the registry for its relationships.
pub struct Part<'m> {
    pub name: String,
    pub doc: Document,
    pub media: &'m mut dyn MediaRegistry,
}

/// Result of evaluating one command's code.
enum Evaluated {
    Value(Value),
    /// Supplied by the error handler; validated but never handled again.
    Substituted(Value),
    /// Error recorded in collect-all mode.
    Skip,
}

pub struct Engine<'o> {
    options: &'o Options,
    matcher: Matcher,
    runner: Arc<dyn CodeRunner>,
    context: Context,
    sandbox: Sandbox,
    collector: ErrorCollector,
    aliases: AliasTable,
    doc_pr_id: u32,
}

impl<'o> Engine<'o> {
    pub fn new(options: &'o Options, matcher: Matcher, context: Context, aliases: AliasTable) -> Self {
        let runner: Arc<dyn CodeRunner> = match (&options.runner, options.sandbox) {
            (Some(r), _) => Arc::clone(r),
            (None, true) => Arc::new(SandboxedRunner::new(options.max_steps)),
            (None, false) => Arc::new(DirectRunner),
        };
        Engine {
            options,
            matcher,
            runner,
            context,
            sandbox: Sandbox::new(),
            collector: ErrorCollector::new(options.fail_fast, options.error_handler.clone()),
            aliases,
            doc_pr_id: 0,
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Execute a linked part, then splice literal XML and repair cells.
    pub async fn render_part(&mut self, part: &mut Part<'_>, nodes: &[CommandNode]) -> Result<(), ReportError> {
        info!(part = %part.name, commands = nodes.len(), runner = self.runner.name(), "rendering part");
        self.doc_pr_id = self.doc_pr_id.max(max_doc_pr_id(&part.doc));
        let span = info_span!("part", name = %part.name);
        self.execute(part, nodes).instrument(span).await?;
        let spliced = splice_literals(&mut part.doc, &self.matcher);
        if spliced > 0 {
            debug!(spliced, "literal XML spliced");
        }
        ensure_cell_paragraphs(&mut part.doc);
        Ok(())
    }

    /// Recorded errors, if any, as `Multiple`.
    pub fn finish(self) -> Result<Sandbox, ReportError> {
        let Engine { collector, sandbox, .. } = self;
        collector.finish()?;
        Ok(sandbox)
    }

    fn execute<'e>(
        &'e mut self,
        part: &'e mut Part<'_>,
        nodes: &'e [CommandNode],
    ) -> BoxFuture<'e, Result<(), ReportError>> {
        async move {
            for node in nodes {
                match node {
                    CommandNode::Leaf(located) => self.leaf(part, located).await?,
                    CommandNode::Block(block) => match &block.header {
                        BlockHeader::For { var, expr } => self.for_block(part, block, var, expr).await?,
                        BlockHeader::If { cond } => self.if_block(part, block, cond).await?,
                    },
                }
            }
            Ok(())
        }
        .boxed()
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    async fn evaluate(&mut self, cmd: &RawCommand, code: &str) -> Result<Evaluated, ReportError> {
        let code = if self.options.fix_smart_quotes {
            fix_smart_quotes(code)
        } else {
            code.to_owned()
        };
        debug!(command = %cmd.raw.trim(), kind = %cmd.kind, "evaluating");

        let sandbox = mem::take(&mut self.sandbox);
        let outcome = self.runner.run(&code, sandbox, &self.context).await;
        self.sandbox = outcome.sandbox;

        match outcome.result {
            Ok(v) => Ok(Evaluated::Value(v)),
            Err(source) => {
                let err = ReportError::CommandExecution {
                    command: cmd.raw.trim().to_owned(),
                    source,
                };
                Ok(match self.collector.recover(err, &cmd.raw)? {
                    Some(v) => Evaluated::Substituted(v),
                    None => Evaluated::Skip,
                })
            }
        }
    }

    /// Evaluate and validate.  A validation failure goes through the
    /// collector like an evaluation failure; `None` means "placeholder".
    async fn resolve<T>(
        &mut self,
        cmd: &RawCommand,
        code: &str,
        check: impl Fn(Value) -> Result<T, ReportError>,
    ) -> Result<Option<T>, ReportError> {
        let value = match self.evaluate(cmd, code).await? {
            Evaluated::Skip => return Ok(None),
            Evaluated::Substituted(v) => return self.accept_substitute(check(v)),
            Evaluated::Value(v) => v,
        };
        match check(value) {
            Ok(t) => Ok(Some(t)),
            Err(err) => match self.collector.recover(err, &cmd.raw)? {
                Some(v) => self.accept_substitute(check(v)),
                None => Ok(None),
            },
        }
    }

    fn accept_substitute<T>(&mut self, checked: Result<T, ReportError>) -> Result<Option<T>, ReportError> {
        match checked {
            Ok(t) => Ok(Some(t)),
            Err(err) => {
                self.collector.reject(err)?;
                Ok(None)
            }
        }
    }

    // ── Leaves ────────────────────────────────────────────────────────────────

    async fn leaf(&mut self, part: &mut Part<'_>, located: &Located) -> Result<(), ReportError> {
        let cmd = &located.command;
        if !part.doc.is_live(located.anchor) {
            return Ok(());
        }
        match cmd.kind {
            CommandKind::Query | CommandKind::Alias | CommandKind::CmdNode => {
                remove_command(&mut part.doc, located.anchor);
            }
            CommandKind::Exec => {
                let raw = cmd.raw.clone();
                let insert = self.options.exec_output == ExecOutput::Insert;
                let reject_nullish = self.options.reject_nullish && insert;
                let payload = self
                    .resolve(cmd, &cmd.code, |v| {
                        if insert {
                            ins_payload(v, &raw, reject_nullish).map(Some)
                        } else {
                            Ok(None)
                        }
                    })
                    .await?
                    .flatten();
                match payload {
                    Some(p) => self.place(part, located, p)?,
                    None => remove_command(&mut part.doc, located.anchor),
                }
            }
            CommandKind::Ins | CommandKind::Call => {
                let raw = cmd.raw.clone();
                let reject_nullish = self.options.reject_nullish;
                let payload = self
                    .resolve(cmd, &cmd.code, |v| ins_payload(v, &raw, reject_nullish))
                    .await?
                    .unwrap_or_else(|| Payload::Text(String::new()));
                self.place(part, located, payload)?;
            }
            CommandKind::Image => {
                let raw = cmd.raw.trim().to_owned();
                let reject_nullish = self.options.reject_nullish;
                let spec = self
                    .resolve(cmd, &cmd.code, |v| match v {
                        Value::Undefined | Value::Null if !reject_nullish => Ok(None),
                        Value::Undefined | Value::Null => Err(ReportError::NullishResult { command: raw.clone() }),
                        other => ImageSpec::from_value(&other, &raw).map(Some),
                    })
                    .await?
                    .flatten();
                match spec {
                    Some(spec) => self.place(part, located, Payload::Image(spec))?,
                    None => remove_command(&mut part.doc, located.anchor),
                }
            }
            CommandKind::Link => {
                let raw = cmd.raw.trim().to_owned();
                let reject_nullish = self.options.reject_nullish;
                let spec = self
                    .resolve(cmd, &cmd.code, |v| match v {
                        Value::Undefined | Value::Null if !reject_nullish => Ok(None),
                        Value::Undefined | Value::Null => Err(ReportError::NullishResult { command: raw.clone() }),
                        other => LinkSpec::from_value(&other, &raw).map(Some),
                    })
                    .await?
                    .flatten();
                match spec {
                    Some(spec) => self.place(part, located, Payload::Link(spec))?,
                    None => remove_command(&mut part.doc, located.anchor),
                }
            }
            CommandKind::Html => {
                let raw = cmd.raw.trim().to_owned();
                let reject_nullish = self.options.reject_nullish;
                let html = self
                    .resolve(cmd, &cmd.code, |v| match v {
                        Value::Undefined | Value::Null if reject_nullish => {
                            Err(ReportError::NullishResult { command: raw.clone() })
                        }
                        Value::Undefined | Value::Null => Ok(String::new()),
                        other => Ok(other.to_string()),
                    })
                    .await?
                    .unwrap_or_default();
                if html.trim().is_empty() {
                    remove_command(&mut part.doc, located.anchor);
                } else {
                    insert_html(&mut part.doc, located.anchor, &html)?;
                }
            }
            CommandKind::For | CommandKind::EndFor | CommandKind::If | CommandKind::EndIf => {
                return Err(ReportError::Internal(format!(
                    "unlinked block marker '{}'",
                    cmd.raw.trim()
                )));
            }
        }
        Ok(())
    }

    /// Put a payload where the command was.
    fn place(&mut self, part: &mut Part<'_>, located: &Located, payload: Payload) -> Result<(), ReportError> {
        match payload {
            Payload::Text(text) => {
                insert_text(&mut part.doc, located.text_node, &text, self.options.process_line_breaks);
                Ok(())
            }
            Payload::Image(spec) => insert_image(
                &mut part.doc,
                located.text_node,
                &spec,
                &mut *part.media,
                &mut self.doc_pr_id,
            ),
            Payload::Link(spec) => insert_link(&mut part.doc, located.anchor, &spec, &mut *part.media),
        }
    }

    // ── Blocks ────────────────────────────────────────────────────────────────

    async fn for_block(&mut self, part: &mut Part<'_>, block: &Block, var: &str, expr: &str) -> Result<(), ReportError> {
        let raw = block.open.command.raw.trim().to_owned();
        let items = self
            .resolve(&block.open.command, expr, |v| match v {
                Value::Array(items) => Ok(items),
                other => Err(ReportError::CommandExecution {
                    command: raw.clone(),
                    source: crate::script::EvalError::Type(format!(
                        "FOR needs an array, got {}",
                        other.type_name()
                    )),
                }),
            })
            .await?
            .unwrap_or_default();

        let span = isolate(&mut part.doc, block.open.anchor, block.close.anchor)?;
        let Some(&first) = span.nodes.first() else {
            return Ok(());
        };
        let sentinel = part.doc.create_element(SENTINEL);
        part.doc.insert_before(first, sentinel);
        for &n in &span.nodes {
            part.doc.detach(n);
        }
        debug!(var, iterations = items.len(), "repeating block");

        let list = Value::Array(items.clone());
        for (i, item) in items.into_iter().enumerate() {
            let idx = Value::Int(i as i64);
            let saved = vec![
                self.sandbox.shadow(var, item.clone()),
                self.sandbox.shadow(&format!("${var}"), item),
                self.sandbox.shadow("$idx", idx.clone()),
                self.sandbox.shadow(&format!("${var}_idx"), idx),
                self.sandbox.shadow(&format!("${var}_list"), list.clone()),
            ];

            let clones: Vec<NodeId> = span
                .nodes
                .iter()
                .map(|&t| {
                    let c = part.doc.deep_clone(t);
                    part.doc.insert_before(sentinel, c);
                    c
                })
                .collect();
            let scanned = scan_nodes(&part.doc, &clones, &self.matcher);
            let linked = link(scanned, &mut self.aliases)?;
            let result = self.execute(part, &linked.nodes).await;
            self.sandbox.restore(saved);
            result?;
        }

        part.doc.remove(sentinel);
        for &n in &span.nodes {
            part.doc.remove(n);
        }
        prune_container(&mut part.doc, span.container);
        Ok(())
    }

    async fn if_block(&mut self, part: &mut Part<'_>, block: &Block, cond: &str) -> Result<(), ReportError> {
        let truthy = self
            .resolve(&block.open.command, cond, |v| Ok(v.as_bool()))
            .await?
            .unwrap_or(false);
        let span = isolate(&mut part.doc, block.open.anchor, block.close.anchor)?;
        debug!(condition = cond, truthy, "conditional block");

        if truthy {
            let branch = block.open.command.raw.trim().to_owned();
            for &n in &span.nodes {
                part.doc.set_if_name(n, branch.clone());
            }
            self.execute(part, &block.children).await
        } else {
            for &n in &span.nodes {
                part.doc.remove(n);
            }
            prune_container(&mut part.doc, span.container);
            Ok(())
        }
    }
}

/// An inline block may leave its paragraph empty.
fn prune_container(doc: &mut Document, container: NodeId) {
    if doc.is_element(container, "w:p") {
        prune_paragraph(doc, container);
    }
}

/// Link a whole part.
pub fn link_part(
    doc: &mut Document,
    matcher: &Matcher,
    aliases: &mut AliasTable,
) -> Result<crate::linker::Linked, ReportError> {
    let scanned = crate::scanner::prepare(doc, matcher)?;
    link(scanned, aliases)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutate::tests::{body, body_xml, find};
    use crate::mutate::MemoryRelations;
    use crate::scanner::ScanOptions;
    use crate::script::EvalError;
    use serde_json::json;
    use std::collections::BTreeMap;

    async fn render(inner: &str, data: serde_json::Value, options: &Options) -> Result<Document, ReportError> {
        let mut doc = body(inner);
        let matcher = Matcher::new(&ScanOptions::default())?;
        let mut aliases = AliasTable::new();
        let linked = link_part(&mut doc, &matcher, &mut aliases)?;
        let context = Context::new(Value::from(data), BTreeMap::new());
        let mut engine = Engine::new(options, matcher, context, aliases);
        let mut media = MemoryRelations::default();
        let mut part = Part {
            name: "test".into(),
            doc,
            media: &mut media,
        };
        engine.render_part(&mut part, &linked.nodes).await?;
        engine.finish()?;
        Ok(part.doc)
    }

    fn texts(doc: &Document) -> Vec<String> {
        find(doc, "w:p").iter().map(|&p| doc.text_content(p)).collect()
    }

    #[test]
    fn smart_quotes() {
        assert_eq!(fix_smart_quotes("\u{201c}a\u{201d} + \u{2018}b\u{2019}"), "\"a\" + 'b'");
    }

    #[test]
    fn ins_payload_rules() {
        assert_eq!(ins_payload(Value::Null, "x", false).unwrap(), Payload::Text(String::new()));
        assert!(matches!(ins_payload(Value::Null, "x", true), Err(ReportError::NullishResult { .. })));
        assert!(matches!(
            ins_payload(Value::from(json!({"a": 1})), "x", false),
            Err(ReportError::ObjectResult { .. })
        ));
        assert_eq!(
            ins_payload(Value::from(json!([1, "a", null])), "x", false).unwrap(),
            Payload::Text("1,a,".into())
        );
        assert!(matches!(
            ins_payload(Value::from(json!({"url": "https://x"})), "x", false),
            Ok(Payload::Link(_))
        ));
    }

    #[tokio::test]
    async fn inserts_values() {
        let doc = render(
            "<w:p><w:r><w:t>Hello +++name+++!</w:t></w:r></w:p>",
            json!({"name": "World"}),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(texts(&doc), vec!["Hello World!"]);
    }

    #[tokio::test]
    async fn for_loop_repeats_paragraphs() {
        let doc = render(
            "<w:p><w:r><w:t>+++FOR p IN people+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++$idx+++: +++$p.name+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++END-FOR p+++</w:t></w:r></w:p>",
            json!({"people": [{"name": "Ann"}, {"name": "Bob"}]}),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(texts(&doc), vec!["0: Ann", "1: Bob"]);
        assert!(find(&doc, SENTINEL).is_empty());
    }

    #[tokio::test]
    async fn empty_loop_leaves_nothing() {
        let doc = render(
            "<w:p><w:r><w:t>a</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++FOR p IN []+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++p+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++END-FOR+++</w:t></w:r></w:p>",
            json!({}),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(texts(&doc), vec!["a"]);
    }

    #[tokio::test]
    async fn if_keeps_or_drops() {
        let doc = render(
            "<w:p><w:r><w:t>+++IF show+++yes+++END-IF+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++IF !show+++no+++missing.x++++++END-IF+++</w:t></w:r></w:p>",
            json!({"show": true}),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(texts(&doc), vec!["yes"]);
        let kept = find(&doc, "w:r")[0];
        assert_eq!(doc.branch_of(kept), Some("IF show"));
    }

    #[tokio::test]
    async fn exec_assignments_persist() {
        let doc = render(
            "<w:p><w:r><w:t>+++EXEC total = 2 * 21+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++INS total+++</w:t></w:r></w:p>",
            json!({}),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(body_xml(&doc).matches("<w:p>").count(), 1);
        assert_eq!(texts(&doc), vec!["42"]);
    }

    #[tokio::test]
    async fn exec_output_insert_mode() {
        let options = Options::default().with_exec_output(ExecOutput::Insert);
        let doc = render("<w:p><w:r><w:t>+++EXEC 'shown'+++</w:t></w:r></w:p>", json!({}), &options)
            .await
            .unwrap();
        assert_eq!(texts(&doc), vec!["shown"]);
    }

    #[tokio::test]
    async fn collect_all_records_and_continues() {
        let options = Options::default().with_fail_fast(false);
        let err = render(
            "<w:p><w:r><w:t>+++INS missing+++ +++INS obj+++ +++INS ok+++</w:t></w:r></w:p>",
            json!({"obj": {"a": 1}, "ok": "fine"}),
            &options,
        )
        .await
        .unwrap_err();
        let ReportError::Multiple(errors) = err else { panic!("expected Multiple") };
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ReportError::CommandExecution { .. }));
        assert!(matches!(errors[1], ReportError::ObjectResult { .. }));
    }

    #[tokio::test]
    async fn runaway_string_is_recorded_not_fatal() {
        let options = Options::default().with_fail_fast(false);
        let err = render(
            "<w:p><w:r><w:t>+++'xx'.repeat(9000000000000000000)+++</w:t></w:r></w:p>",
            json!({}),
            &options,
        )
        .await
        .unwrap_err();
        let ReportError::Multiple(errors) = err else { panic!("expected Multiple") };
        assert!(matches!(
            &errors[..],
            [ReportError::CommandExecution { source: EvalError::Runtime(_), .. }]
        ));
    }

    #[tokio::test]
    async fn loop_variable_is_bound_with_and_without_sigil() {
        let doc = render(
            "<w:p><w:r><w:t>+++FOR item IN items++++++INS item.name+++/+++$item.name++++++END-FOR+++</w:t></w:r></w:p>",
            json!({"items": [{"name": "A"}, {"name": "B"}], "item": "outer"}),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(texts(&doc).concat(), "A/AB/B");
    }

    #[tokio::test]
    async fn handler_value_is_inserted() {
        let options =
            Options::default().with_error_handler(|_e: &ReportError, raw: &str| Value::from(format!("[{}]", raw.trim())));
        let doc = render("<w:p><w:r><w:t>+++INS nope+++</w:t></w:r></w:p>", json!({}), &options)
            .await
            .unwrap();
        assert_eq!(texts(&doc), vec!["[INS nope]"]);
    }

    #[tokio::test]
    async fn fail_fast_stops_at_first_error() {
        let err = render("<w:p><w:r><w:t>+++INS nope+++</w:t></w:r></w:p>", json!({}), &Options::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::CommandExecution { .. }));
    }

    #[tokio::test]
    async fn nested_loops_and_loop_bindings() {
        let doc = render(
            "<w:p><w:r><w:t>+++FOR g IN groups+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++FOR m IN $g.members+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++$g.name+++/+++$m+++ (+++$m_idx+++ of +++$m_list.length+++)</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++END-FOR m+++</w:t></w:r></w:p>\
             <w:p><w:r><w:t>+++END-FOR g+++</w:t></w:r></w:p>",
            json!({"groups": [{"name": "a", "members": ["x", "y"]}, {"name": "b", "members": ["z"]}]}),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(texts(&doc), vec!["a/x (0 of 2)", "a/y (1 of 2)", "b/z (0 of 1)"]);
    }

    #[tokio::test]
    async fn table_row_loop_repeats_rows() {
        let doc = render(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>+++FOR r IN rows++++++$r+++</w:t></w:r></w:p></w:tc>\
             <w:tc><w:p><w:r><w:t>+++$r_idx++++++END-FOR r+++</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
            json!({"rows": ["a", "b", "c"]}),
            &Options::default(),
        )
        .await
        .unwrap();
        let rows: Vec<String> = find(&doc, "w:tr").iter().map(|&r| doc.text_content(r)).collect();
        assert_eq!(rows, vec!["a0", "b1", "c2"]);
    }

    #[tokio::test]
    async fn marker_rows_are_not_repeated() {
        let doc = render(
            "<w:tbl>\
             <w:tr><w:tc><w:p><w:r><w:t>+++FOR r IN rows+++</w:t></w:r></w:p></w:tc></w:tr>\
             <w:tr><w:tc><w:p><w:r><w:t>+++$r+++</w:t></w:r></w:p></w:tc></w:tr>\
             <w:tr><w:tc><w:p><w:r><w:t>+++END-FOR r+++</w:t></w:r></w:p></w:tc></w:tr>\
             </w:tbl>",
            json!({"rows": ["a", "b"]}),
            &Options::default(),
        )
        .await
        .unwrap();
        let rows: Vec<String> = find(&doc, "w:tr").iter().map(|&r| doc.text_content(r)).collect();
        assert_eq!(rows, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn line_breaks_follow_option() {
        let doc = render("<w:p><w:r><w:t>+++'a\\nb'+++</w:t></w:r></w:p>", json!({}), &Options::default())
            .await
            .unwrap();
        assert_eq!(find(&doc, "w:br").len(), 1);
        let options = Options::default().with_process_line_breaks(false);
        let doc = render("<w:p><w:r><w:t>+++'a\\nb'+++</w:t></w:r></w:p>", json!({}), &options)
            .await
            .unwrap();
        assert!(find(&doc, "w:br").is_empty());
    }

    #[tokio::test]
    async fn image_object_from_ins() {
        let doc = render(
            "<w:p><w:r><w:t>+++INS logo+++</w:t></w:r></w:p>",
            json!({"logo": {"width": 1, "height": 1, "data": "AAEC", "extension": ".png"}}),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(find(&doc, "w:drawing").len(), 1);
    }

    #[tokio::test]
    async fn nullish_image_is_dropped_unless_rejected() {
        let doc = render("<w:p><w:r><w:t>+++IMAGE null+++</w:t></w:r></w:p>", json!({}), &Options::default())
            .await
            .unwrap();
        assert!(find(&doc, "w:p").is_empty());
        let err = render(
            "<w:p><w:r><w:t>+++IMAGE null+++</w:t></w:r></w:p>",
            json!({}),
            &Options::default().with_reject_nullish(true),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReportError::NullishResult { .. }));
    }

    #[tokio::test]
    async fn smart_quotes_normalized_when_enabled() {
        let inner = "<w:p><w:r><w:t>+++INS \u{201c}hi\u{201d}+++</w:t></w:r></w:p>";
        let options = Options::default().with_fix_smart_quotes(true);
        let doc = render(inner, json!({}), &options).await.unwrap();
        assert_eq!(texts(&doc), vec!["hi"]);
        assert!(render(inner, json!({}), &Options::default()).await.is_err());
    }
}
