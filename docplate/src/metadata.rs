//! Document properties from `docProps/app.xml` and `docProps/core.xml`.

use serde::Serialize;

use crate::error::ReportError;
use crate::package::Package;
use crate::tree::Document;

const APP_PART: &str = "docProps/app.xml";
const CORE_PART: &str = "docProps/core.xml";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub pages: Option<u64>,
    pub words: Option<u64>,
    pub characters: Option<u64>,
    pub lines: Option<u64>,
    pub paragraphs: Option<u64>,
    pub company: Option<String>,
    pub template: Option<String>,

    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub last_modified_by: Option<String>,
    pub revision: Option<String>,
    pub last_printed: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub category: Option<String>,
}

/// Read a template's properties.  Missing property parts leave fields unset.
pub fn get_metadata(template: &[u8]) -> Result<Metadata, ReportError> {
    let package = Package::read(template)?;
    let mut meta = Metadata::default();

    if package.contains(APP_PART) {
        let app = package.xml(APP_PART)?;
        let number = |local: &str| field(&app, local).and_then(|v| v.trim().parse::<u64>().ok());
        meta.pages = number("Pages");
        meta.words = number("Words");
        meta.characters = number("Characters");
        meta.lines = number("Lines");
        meta.paragraphs = number("Paragraphs");
        meta.company = field(&app, "Company");
        meta.template = field(&app, "Template");
    }

    if package.contains(CORE_PART) {
        let core = package.xml(CORE_PART)?;
        meta.title = field(&core, "title");
        meta.subject = field(&core, "subject");
        meta.creator = field(&core, "creator");
        meta.description = field(&core, "description");
        meta.last_modified_by = field(&core, "lastModifiedBy");
        meta.revision = field(&core, "revision");
        meta.last_printed = field(&core, "lastPrinted");
        meta.created = field(&core, "created");
        meta.modified = field(&core, "modified");
        meta.category = field(&core, "category");
    }
    Ok(meta)
}

/// Text of the root's first child with local name `local`.
fn field(doc: &Document, local: &str) -> Option<String> {
    doc.children(doc.root())
        .iter()
        .copied()
        .find(|&c| doc.tag(c).is_some_and(|t| t.local == local))
        .map(|c| doc.text_content(c))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::tests::zip_of;

    #[test]
    fn reads_app_and_core_properties() {
        let template = zip_of(&[
            (
                APP_PART,
                r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Template>Normal.dotm</Template><Pages>2</Pages><Words>120</Words><Company>ACME</Company></Properties>"#,
            ),
            (
                CORE_PART,
                r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/"><dc:title>Quarterly</dc:title><dc:creator>Ann</dc:creator><cp:lastModifiedBy>Bob</cp:lastModifiedBy><cp:revision>3</cp:revision><dcterms:created>2024-01-01T00:00:00Z</dcterms:created></cp:coreProperties>"#,
            ),
        ]);
        let meta = get_metadata(&template).unwrap();
        assert_eq!(meta.pages, Some(2));
        assert_eq!(meta.words, Some(120));
        assert_eq!(meta.lines, None);
        assert_eq!(meta.company.as_deref(), Some("ACME"));
        assert_eq!(meta.template.as_deref(), Some("Normal.dotm"));
        assert_eq!(meta.title.as_deref(), Some("Quarterly"));
        assert_eq!(meta.last_modified_by.as_deref(), Some("Bob"));
        assert_eq!(meta.revision.as_deref(), Some("3"));
        assert_eq!(meta.created.as_deref(), Some("2024-01-01T00:00:00Z"));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["lastModifiedBy"], "Bob");
    }

    #[test]
    fn missing_parts_leave_defaults() {
        let template = zip_of(&[("word/document.xml", "<w:document/>")]);
        assert_eq!(get_metadata(&template).unwrap(), Metadata::default());
    }
}
