//! LINK command: external hyperlinks.

use crate::error::ReportError;
use crate::script::{EvalError, Value};
use crate::tree::{Document, NodeId};

use super::{is_props, MediaRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub url: String,
    pub label: Option<String>,
}

/// Whether an INS result should be rendered as a hyperlink.
pub fn looks_like_link(v: &Value) -> bool {
    matches!(v, Value::Object(map)
        if map.len() <= 2 && matches!(map.get("url"), Some(Value::Str(_)))
            && map.keys().all(|k| k == "url" || k == "label"))
}

impl LinkSpec {
    /// Accepts a URL string or `{url, label?}`.
    pub fn from_value(v: &Value, command: &str) -> Result<LinkSpec, ReportError> {
        let fail = |msg: String| ReportError::CommandExecution {
            command: command.to_owned(),
            source: EvalError::Type(msg),
        };
        let spec = match v {
            Value::Str(url) => LinkSpec {
                url: url.clone(),
                label: None,
            },
            Value::Object(map) => {
                let Some(Value::Str(url)) = map.get("url") else {
                    return Err(fail("link object needs a string 'url'".into()));
                };
                let label = map
                    .get("label")
                    .filter(|l| !l.is_nullish())
                    .map(Value::to_string);
                LinkSpec {
                    url: url.clone(),
                    label,
                }
            }
            other => return Err(fail(format!("LINK expects a string or {{url, label}}, got {}", other.type_name()))),
        };
        if spec.url.trim().is_empty() {
            return Err(fail("link url is empty".into()));
        }
        Ok(spec)
    }

    pub fn text(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.url)
    }
}

/// Replace the command run `anchor` with a `w:hyperlink` holding one
/// underlined run that keeps the original run formatting.
pub fn insert_link(
    doc: &mut Document,
    anchor: NodeId,
    spec: &LinkSpec,
    registry: &mut dyn MediaRegistry,
) -> Result<(), ReportError> {
    let rel = registry.add_hyperlink(&spec.url)?;

    let hyperlink = doc.create_element_with("w:hyperlink", &[("r:id", rel.as_str()), ("w:history", "1")]);
    let run = if doc.is_element(anchor, "w:r") {
        doc.shallow_clone(anchor)
    } else {
        doc.create_element("w:r")
    };

    let props = doc
        .children(anchor)
        .iter()
        .copied()
        .find(|&c| is_props(doc, c) && doc.is_element(c, "w:rPr"));
    let rpr = match props {
        Some(p) => doc.deep_clone(p),
        None => doc.create_element("w:rPr"),
    };
    match doc.child_element(rpr, "w:u") {
        Some(u) => doc.set_attr(u, "w:val", "single"),
        None => {
            let u = doc.create_element_with("w:u", &[("w:val", "single")]);
            doc.append_child(rpr, u);
        }
    }
    doc.append_child(run, rpr);

    let t = doc.create_element_with("w:t", &[("xml:space", "preserve")]);
    let leaf = doc.create_text(spec.text());
    doc.append_child(t, leaf);
    doc.append_child(run, t);
    doc.append_child(hyperlink, run);

    doc.replace(anchor, &[hyperlink]);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutate::tests::{body, body_xml, find};
    use crate::mutate::MemoryRelations;
    use serde_json::json;

    #[test]
    fn link_values() {
        let s = LinkSpec::from_value(&Value::from("https://a.example"), "LINK x").unwrap();
        assert_eq!(s.text(), "https://a.example");
        let o = LinkSpec::from_value(&Value::from(json!({"url": "https://b.example", "label": "B"})), "LINK x").unwrap();
        assert_eq!(o.text(), "B");
        assert!(LinkSpec::from_value(&Value::Int(3), "LINK x").is_err());
        assert!(LinkSpec::from_value(&Value::from(json!({"label": "x"})), "LINK x").is_err());
        assert!(LinkSpec::from_value(&Value::from(""), "LINK x").is_err());
    }

    #[test]
    fn shape_detection() {
        assert!(looks_like_link(&Value::from(json!({"url": "u"}))));
        assert!(looks_like_link(&Value::from(json!({"url": "u", "label": "l"}))));
        assert!(!looks_like_link(&Value::from(json!({"url": "u", "other": 1}))));
        assert!(!looks_like_link(&Value::from("u")));
    }

    #[test]
    fn hyperlink_replaces_run() {
        let mut doc = body("<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>+++LINK x+++</w:t></w:r></w:p>");
        let run = find(&doc, "w:r")[0];
        let mut rels = MemoryRelations::default();
        let spec = LinkSpec {
            url: "https://example.com".into(),
            label: Some("Example".into()),
        };
        insert_link(&mut doc, run, &spec, &mut rels).unwrap();
        assert_eq!(rels.links, vec![("rIdLink1".to_owned(), "https://example.com".to_owned())]);
        assert_eq!(
            body_xml(&doc),
            r#"<w:p><w:hyperlink r:id="rIdLink1" w:history="1"><w:r><w:rPr><w:b/><w:u w:val="single"/></w:rPr><w:t xml:space="preserve">Example</w:t></w:r></w:hyperlink></w:p>"#
        );
    }
}
