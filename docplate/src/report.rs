//! Public entry points: run options, `create_report` and friends.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};

use crate::collector::ErrorHandler;
use crate::command::RawCommand;
use crate::context::{Context, DataSource};
use crate::engine::{link_part, Engine, Part};
use crate::error::ReportError;
use crate::linker::{link, AliasTable, Linked};
use crate::mutate::MemoryRelations;
use crate::package::{Package, PartRelations};
use crate::scanner::{prepare, Delimiters, Matcher, ScanOptions};
use crate::script::runner::DEFAULT_MAX_STEPS;
use crate::script::{CodeRunner, Value};
use crate::tree::Document;
use crate::xml;

// ── Options ───────────────────────────────────────────────────────────────────

/// What an EXEC command does with its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecOutput {
    /// Side effects only; the command disappears.
    #[default]
    Discard,
    /// Insert the result like INS.
    Insert,
}

/// Run configuration.
#[derive(Clone)]
pub struct Options {
    pub delimiters: Delimiters,
    /// Literal-XML delimiter; empty disables literal passthrough.
    pub literal_delimiter: String,
    pub process_line_breaks: bool,
    /// Use the step-bounded runner without ambient built-ins.
    pub sandbox: bool,
    /// Overrides `sandbox` when set.
    pub runner: Option<Arc<dyn CodeRunner>>,
    pub additional_context: BTreeMap<String, Value>,
    pub fail_fast: bool,
    pub reject_nullish: bool,
    pub error_handler: Option<ErrorHandler>,
    pub fix_smart_quotes: bool,
    /// Passed to the query resolver with the QUERY code.
    pub query_vars: Value,
    pub exec_output: ExecOutput,
    pub max_steps: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            delimiters: Delimiters::default(),
            literal_delimiter: "||".to_owned(),
            process_line_breaks: true,
            sandbox: true,
            runner: None,
            additional_context: BTreeMap::new(),
            fail_fast: true,
            reject_nullish: false,
            error_handler: None,
            fix_smart_quotes: false,
            query_vars: Value::Undefined,
            exec_output: ExecOutput::Discard,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("delimiters", &self.delimiters)
            .field("literal_delimiter", &self.literal_delimiter)
            .field("process_line_breaks", &self.process_line_breaks)
            .field("sandbox", &self.sandbox)
            .field("runner", &self.runner.as_ref().map(|r| r.name().to_owned()))
            .field("additional_context", &self.additional_context.keys().collect::<Vec<_>>())
            .field("fail_fast", &self.fail_fast)
            .field("reject_nullish", &self.reject_nullish)
            .field("error_handler", &self.error_handler.is_some())
            .field("fix_smart_quotes", &self.fix_smart_quotes)
            .field("exec_output", &self.exec_output)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl Options {
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    pub fn with_literal_delimiter(mut self, delim: &str) -> Self {
        self.literal_delimiter = delim.to_owned();
        self
    }

    pub fn with_process_line_breaks(mut self, on: bool) -> Self {
        self.process_line_breaks = on;
        self
    }

    pub fn with_sandbox(mut self, on: bool) -> Self {
        self.sandbox = on;
        self
    }

    pub fn with_runner<R: CodeRunner + 'static>(mut self, runner: R) -> Self {
        self.runner = Some(Arc::new(runner));
        self
    }

    /// Add a value visible to command code under `name`.
    pub fn with_context(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.additional_context.insert(name.to_owned(), value.into());
        self
    }

    pub fn with_fail_fast(mut self, on: bool) -> Self {
        self.fail_fast = on;
        self
    }

    pub fn with_reject_nullish(mut self, on: bool) -> Self {
        self.reject_nullish = on;
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ReportError, &str) -> Value + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_fix_smart_quotes(mut self, on: bool) -> Self {
        self.fix_smart_quotes = on;
        self
    }

    pub fn with_query_vars(mut self, vars: impl Into<Value>) -> Self {
        self.query_vars = vars.into();
        self
    }

    pub fn with_exec_output(mut self, mode: ExecOutput) -> Self {
        self.exec_output = mode;
        self
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            delimiters: self.delimiters.clone(),
            literal: self.literal_delimiter.clone(),
        }
    }
}

// ── Probes ────────────────────────────────────────────────────────────────────

/// Stop after processing and return the main part instead of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Tree,
    Xml,
}

#[derive(Debug)]
pub enum ReportOutput {
    Package(Vec<u8>),
    Tree(Document),
    Xml(String),
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Render a `.docx` template.
pub async fn create_report(template: &[u8], data: DataSource, options: &Options) -> Result<Vec<u8>, ReportError> {
    match create_report_inner(template, data, options, None).await? {
        ReportOutput::Package(bytes) => Ok(bytes),
        _ => Err(ReportError::Internal("probe output without a probe".into())),
    }
}

/// Render a template and return the processed main part.
pub async fn create_report_probe(
    template: &[u8],
    data: DataSource,
    options: &Options,
    probe: Probe,
) -> Result<ReportOutput, ReportError> {
    create_report_inner(template, data, options, Some(probe)).await
}

struct LinkedPart {
    name: String,
    doc: Document,
    linked: Linked,
}

async fn create_report_inner(
    template: &[u8],
    data: DataSource,
    options: &Options,
    probe: Option<Probe>,
) -> Result<ReportOutput, ReportError> {
    let mut package = Package::read(template)?;
    let matcher = Matcher::new(&options.scan_options())?;
    let mut aliases = AliasTable::new();

    let main = package.main_part()?;
    let mut names = vec![main.clone()];
    names.extend(package.header_footer_parts(&main)?);

    let mut parts = Vec::with_capacity(names.len());
    for name in names {
        let mut doc = package.xml(&name)?;
        let linked = link_part(&mut doc, &matcher, &mut aliases)?;
        parts.push(LinkedPart { name, doc, linked });
    }

    let query = parts.iter().find_map(|p| p.linked.query.clone());
    let data = data.load(query.as_deref(), &options.query_vars).await?;
    let context = Context::new(data, options.additional_context.clone());
    let mut engine = Engine::new(options, matcher, context, aliases);

    let span = info_span!("report", parts = parts.len());
    let mut rendered = Vec::with_capacity(parts.len());
    async {
        for LinkedPart { name, doc, linked } in parts {
            let mut rels = PartRelations::open(&mut package, &name)?;
            let mut part = Part {
                name,
                doc,
                media: &mut rels,
            };
            engine.render_part(&mut part, &linked.nodes).await?;
            let Part { name, doc, .. } = part;
            rels.commit()?;
            rendered.push((name, doc));
        }
        Ok::<_, ReportError>(())
    }
    .instrument(span)
    .await?;
    engine.finish()?;

    let mut main_doc = None;
    for (name, doc) in rendered {
        if name == main && probe.is_some() {
            main_doc = Some(doc);
            continue;
        }
        package.set(&name, xml::serialize(&doc)?.into_bytes());
    }
    info!(part = %main, "report rendered");

    match (probe, main_doc) {
        (Some(Probe::Tree), Some(doc)) => Ok(ReportOutput::Tree(doc)),
        (Some(Probe::Xml), Some(doc)) => Ok(ReportOutput::Xml(xml::serialize(&doc)?)),
        (Some(_), None) => Err(ReportError::Internal("main part was not rendered".into())),
        (None, _) => Ok(ReportOutput::Package(package.write()?)),
    }
}

/// Render one XML part on its own.  Images and links are registered in an
/// in-memory registry and dropped.
pub async fn render_xml(xml_src: &str, data: DataSource, options: &Options) -> Result<String, ReportError> {
    let matcher = Matcher::new(&options.scan_options())?;
    let mut aliases = AliasTable::new();
    let mut doc = xml::parse(xml_src)?;
    let linked = link_part(&mut doc, &matcher, &mut aliases)?;

    let data = data.load(linked.query.as_deref(), &options.query_vars).await?;
    let context = Context::new(data, options.additional_context.clone());
    let mut engine = Engine::new(options, matcher, context, aliases);
    let mut media = MemoryRelations::default();
    let mut part = Part {
        name: "xml".to_owned(),
        doc,
        media: &mut media,
    };
    engine.render_part(&mut part, &linked.nodes).await?;
    engine.finish()?;
    xml::serialize(&part.doc)
}

/// Every command in the template (main part, then headers and footers),
/// after checking that the blocks nest.
pub fn list_commands(template: &[u8], delimiters: &Delimiters) -> Result<Vec<RawCommand>, ReportError> {
    let package = Package::read(template)?;
    let opts = ScanOptions {
        delimiters: delimiters.clone(),
        ..ScanOptions::default()
    };
    let matcher = Matcher::new(&opts)?;
    let main = package.main_part()?;
    let mut names = vec![main.clone()];
    names.extend(package.header_footer_parts(&main)?);

    let mut aliases = AliasTable::new();
    let mut commands = Vec::new();
    for name in names {
        let mut doc = package.xml(&name)?;
        let scanned = prepare(&mut doc, &matcher)?;
        commands.extend(scanned.iter().map(|s| s.command.clone()));
        link(scanned, &mut aliases)?;
    }
    Ok(commands)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::package::tests::{zip_of, CONTENT_TYPES_XML};
    use crate::package::CONTENT_TYPES;
    use serde_json::json;

    const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn docx(body: &str) -> Vec<u8> {
        let doc = format!("<w:document {W}><w:body>{body}</w:body></w:document>");
        zip_of(&[(CONTENT_TYPES, CONTENT_TYPES_XML), ("word/document.xml", &doc)])
    }

    #[test]
    fn options_defaults() {
        let o = Options::default();
        assert_eq!(o.delimiters, Delimiters::symmetric("+++"));
        assert!(o.fail_fast && o.sandbox && o.process_line_breaks);
        assert!(!o.reject_nullish && !o.fix_smart_quotes);
        assert_eq!(o.exec_output, ExecOutput::Discard);
    }

    #[tokio::test]
    async fn probe_xml_returns_rendered_main_part() {
        let template = docx("<w:p><w:r><w:t>+++name+++</w:t></w:r></w:p>");
        let out = create_report_probe(&template, json!({"name": "Ada"}).into(), &Options::default(), Probe::Xml)
            .await
            .unwrap();
        let ReportOutput::Xml(xml) = out else { panic!("expected xml") };
        assert!(xml.contains(">Ada</w:t>"));
    }

    #[tokio::test]
    async fn package_output_is_a_zip() {
        let template = docx("<w:p><w:r><w:t>+++name+++</w:t></w:r></w:p>");
        let out = create_report(&template, json!({"name": "Ada"}).into(), &Options::default())
            .await
            .unwrap();
        let pkg = Package::read(&out).unwrap();
        let main = String::from_utf8(pkg.get("word/document.xml").unwrap().to_vec()).unwrap();
        assert!(main.contains("Ada"));
    }

    #[tokio::test]
    async fn query_goes_to_resolver() {
        let template = docx("<w:p><w:r><w:t>+++QUERY people+++</w:t></w:r></w:p><w:p><w:r><w:t>+++n+++</w:t></w:r></w:p>");
        let source = DataSource::resolver(|q: Option<String>, vars: Value| async move {
            Ok::<_, String>(Value::from(json!({"n": format!("{}:{}", q.unwrap_or_default(), vars.get("x").map(|v| v.to_string()).unwrap_or_default())})))
        });
        let options = Options::default().with_query_vars(Value::from(json!({"x": 1})));
        let out = create_report_probe(&template, source, &options, Probe::Tree).await.unwrap();
        let ReportOutput::Tree(doc) = out else { panic!("expected tree") };
        assert_eq!(doc.text_content(doc.root()), "people:1");
    }

    #[tokio::test]
    async fn render_xml_without_package() {
        let out = render_xml(
            &format!("<w:document {W}><w:body><w:p><w:r><w:t>+++'x'.toUpperCase()+++</w:t></w:r></w:p></w:body></w:document>"),
            DataSource::Empty,
            &Options::default(),
        )
        .await
        .unwrap();
        assert!(out.starts_with("<?xml"));
        assert!(out.contains(">X</w:t>"));
    }

    #[test]
    fn list_commands_in_order() {
        let template = docx(
            "<w:p><w:r><w:t>+++FOR a IN b+++</w:t></w:r></w:p><w:p><w:r><w:t>+++INS a+++ and +++=a.x+++</w:t></w:r></w:p><w:p><w:r><w:t>+++END-FOR a+++</w:t></w:r></w:p>",
        );
        let cmds = list_commands(&template, &Delimiters::default()).unwrap();
        let kinds: Vec<CommandKind> = cmds.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CommandKind::For, CommandKind::Ins, CommandKind::Ins, CommandKind::EndFor]);
        assert_eq!(cmds[2].code, "a.x");
    }

    #[test]
    fn list_commands_rejects_unbalanced() {
        let template = docx("<w:p><w:r><w:t>+++IF x+++</w:t></w:r></w:p>");
        assert!(matches!(
            list_commands(&template, &Delimiters::default()),
            Err(ReportError::CommandSyntax { .. })
        ));
    }
}
