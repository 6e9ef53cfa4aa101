//! The `.docx` container: a zip of XML parts plus relationship and
//! content-type bookkeeping.
//!
//! Only what report generation needs is modelled: finding the main document
//! part and its headers/footers, registering new media and hyperlink
//! relationships, and writing the archive back with untouched entries kept
//! byte for byte and in their original order.

use std::io::{Cursor, Read, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ReportError;
use crate::mutate::MediaRegistry;
use crate::tree::{Document, NodeId};
use crate::xml;

pub const CONTENT_TYPES: &str = "[Content_Types].xml";
const ROOT_RELS: &str = "_rels/.rels";
const DEFAULT_MAIN: &str = "word/document.xml";

const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_OFFICE_DOCUMENT: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_HYPERLINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
const REL_HEADER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
const REL_FOOTER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";

/// `(extension, MIME type)` for media written into the package.
const MEDIA_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("emf", "image/x-emf"),
    ("wmf", "image/x-wmf"),
];

// ── Package ───────────────────────────────────────────────────────────────────

/// An opened template.
#[derive(Debug, Clone, Default)]
pub struct Package {
    entries: Vec<(String, Vec<u8>)>,
    media_count: usize,
}

impl Package {
    /// Read a zip archive into memory.
    pub fn read(bytes: &[u8]) -> Result<Package, ReportError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_owned();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push((name, data));
        }
        debug!(entries = entries.len(), "package read");
        Ok(Package {
            entries,
            media_count: 0,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    /// Like [`get`](Self::get), but a missing part is a package error.
    pub fn part(&self, name: &str) -> Result<&[u8], ReportError> {
        self.get(name)
            .ok_or_else(|| ReportError::Package(format!("missing part '{name}'")))
    }

    /// Replace an entry, or append it.
    pub fn set(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, d)) => *d = data,
            None => self.entries.push((name.to_owned(), data)),
        }
    }

    /// Parse an XML part.
    pub fn xml(&self, name: &str) -> Result<Document, ReportError> {
        xml::parse_bytes(self.part(name)?)
    }

    /// The main document part, from the root relationships.
    pub fn main_part(&self) -> Result<String, ReportError> {
        if self.contains(ROOT_RELS) {
            let rels = self.xml(ROOT_RELS)?;
            for rel in relationships(&rels) {
                if rels.attr(rel, "Type") == Some(REL_OFFICE_DOCUMENT) {
                    if let Some(target) = rels.attr(rel, "Target") {
                        let name = resolve_target("", target);
                        if self.contains(&name) {
                            return Ok(name);
                        }
                    }
                }
            }
        }
        if self.contains(DEFAULT_MAIN) {
            return Ok(DEFAULT_MAIN.to_owned());
        }
        Err(ReportError::Package("no main document part found".into()))
    }

    /// Header and footer parts referenced by `main`, in relationship order.
    pub fn header_footer_parts(&self, main: &str) -> Result<Vec<String>, ReportError> {
        let rels_name = rels_path(main);
        if !self.contains(&rels_name) {
            return Ok(Vec::new());
        }
        let rels = self.xml(&rels_name)?;
        let base = parent_dir(main);
        let mut parts = Vec::new();
        for rel in relationships(&rels) {
            let kind = rels.attr(rel, "Type");
            if kind != Some(REL_HEADER) && kind != Some(REL_FOOTER) {
                continue;
            }
            if let Some(target) = rels.attr(rel, "Target") {
                let name = resolve_target(base, target);
                if self.contains(&name) && !parts.contains(&name) {
                    parts.push(name);
                }
            }
        }
        Ok(parts)
    }

    /// Store a media file under the part's `media/` folder and return its
    /// path relative to the part.
    fn add_media(&mut self, part: &str, extension: &str, data: &[u8]) -> Result<String, ReportError> {
        let mime = MEDIA_TYPES
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, mime)| *mime)
            .ok_or_else(|| ReportError::Package(format!("no content type for '.{extension}'")))?;
        self.ensure_default_content_type(extension, mime)?;

        let base = parent_dir(part);
        let relative = loop {
            self.media_count += 1;
            let candidate = format!("media/docplate_image{}.{extension}", self.media_count);
            if !self.contains(&join(base, &candidate)) {
                break candidate;
            }
        };
        self.set(&join(base, &relative), data.to_vec());
        Ok(relative)
    }

    fn ensure_default_content_type(&mut self, extension: &str, mime: &str) -> Result<(), ReportError> {
        let mut types = self.xml(CONTENT_TYPES)?;
        let root = types.root();
        let known = types.children(root).iter().any(|&c| {
            types.tag(c).is_some_and(|t| t.local == "Default")
                && types
                    .attr(c, "Extension")
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        });
        if known {
            return Ok(());
        }
        let default = types.create_element_with("Default", &[("Extension", extension), ("ContentType", mime)]);
        types.insert_child(root, 0, default);
        self.set(CONTENT_TYPES, xml::serialize(&types)?.into_bytes());
        Ok(())
    }

    /// Write the archive.
    pub fn write(&self) -> Result<Vec<u8>, ReportError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }
}

// ── Relationships ─────────────────────────────────────────────────────────────

/// Relationship registry for one part.  Created relationships are written
/// back by [`commit`](Self::commit).
pub struct PartRelations<'p> {
    package: &'p mut Package,
    part: String,
    rels: Document,
    next_id: usize,
    changed: bool,
}

impl<'p> PartRelations<'p> {
    pub fn open(package: &'p mut Package, part: &str) -> Result<Self, ReportError> {
        let rels = match package.get(&rels_path(part)) {
            Some(bytes) => xml::parse_bytes(bytes)?,
            None => xml::parse(&format!("<Relationships xmlns=\"{REL_NS}\"/>"))?,
        };
        let next_id = relationships(&rels)
            .into_iter()
            .filter_map(|r| rels.attr(r, "Id")?.strip_prefix("rId")?.parse::<usize>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        Ok(PartRelations {
            package,
            part: part.to_owned(),
            rels,
            next_id,
            changed: false,
        })
    }

    fn add(&mut self, kind: &str, target: &str, external: bool) -> String {
        let id = format!("rId{}", self.next_id);
        self.next_id += 1;
        let mut attrs = vec![("Id", id.as_str()), ("Type", kind), ("Target", target)];
        if external {
            attrs.push(("TargetMode", "External"));
        }
        let rel = self.rels.create_element_with("Relationship", &attrs);
        let root = self.rels.root();
        self.rels.append_child(root, rel);
        self.changed = true;
        id
    }

    /// Write the relationships part if anything was added.
    pub fn commit(self) -> Result<(), ReportError> {
        if self.changed {
            let bytes = xml::serialize(&self.rels)?.into_bytes();
            self.package.set(&rels_path(&self.part), bytes);
        }
        Ok(())
    }
}

impl MediaRegistry for PartRelations<'_> {
    fn add_image(&mut self, extension: &str, data: &[u8]) -> Result<String, ReportError> {
        let target = self.package.add_media(&self.part, extension, data)?;
        Ok(self.add(REL_IMAGE, &target, false))
    }

    fn add_hyperlink(&mut self, url: &str) -> Result<String, ReportError> {
        Ok(self.add(REL_HYPERLINK, url, true))
    }
}

fn relationships(rels: &Document) -> Vec<NodeId> {
    rels.children(rels.root())
        .iter()
        .copied()
        .filter(|&c| rels.tag(c).is_some_and(|t| t.local == "Relationship"))
        .collect()
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// `word/document.xml` → `word/_rels/document.xml.rels`.
pub fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

fn parent_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join(base: &str, relative: &str) -> String {
    if base.is_empty() {
        relative.to_owned()
    } else {
        format!("{base}/{relative}")
    }
}

/// Resolve a relationship target against the source part's directory.
fn resolve_target(base: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_owned(),
        None => join(base, target),
    };
    let mut segments: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

    pub(crate) fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn sample() -> Package {
        Package::read(&zip_of(&[
            (CONTENT_TYPES, CONTENT_TYPES_XML),
            (
                ROOT_RELS,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
            ),
            ("word/document.xml", "<w:document/>"),
            (
                "word/_rels/document.xml.rels",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/><Relationship Id="rId8" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="/word/footer1.xml"/></Relationships>"#,
            ),
            ("word/header1.xml", "<w:hdr/>"),
            ("word/footer1.xml", "<w:ftr/>"),
        ]))
        .unwrap()
    }

    #[test]
    fn finds_main_and_header_footer_parts() {
        let pkg = sample();
        assert_eq!(pkg.main_part().unwrap(), "word/document.xml");
        assert_eq!(
            pkg.header_footer_parts("word/document.xml").unwrap(),
            vec!["word/header1.xml", "word/footer1.xml"]
        );
    }

    #[test]
    fn relationships_continue_numbering() {
        let mut pkg = sample();
        let mut rels = PartRelations::open(&mut pkg, "word/document.xml").unwrap();
        assert_eq!(rels.add_image("png", b"\x89PNG").unwrap(), "rId9");
        assert_eq!(rels.add_hyperlink("https://example.com").unwrap(), "rId10");
        rels.commit().unwrap();

        assert_eq!(pkg.get("word/media/docplate_image1.png"), Some(&b"\x89PNG"[..]));
        let rels_xml = String::from_utf8(pkg.get("word/_rels/document.xml.rels").unwrap().to_vec()).unwrap();
        assert!(rels_xml.contains(r#"Target="media/docplate_image1.png""#));
        assert!(rels_xml.contains(r#"TargetMode="External""#));
        let types = String::from_utf8(pkg.get(CONTENT_TYPES).unwrap().to_vec()).unwrap();
        assert!(types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
    }

    #[test]
    fn missing_rels_part_is_created() {
        let mut pkg = sample();
        let mut rels = PartRelations::open(&mut pkg, "word/header1.xml").unwrap();
        assert_eq!(rels.add_hyperlink("https://x.example").unwrap(), "rId1");
        rels.commit().unwrap();
        assert!(pkg.contains("word/_rels/header1.xml.rels"));
    }

    #[test]
    fn write_round_trips_entries_in_order() {
        let pkg = sample();
        let again = Package::read(&pkg.write().unwrap()).unwrap();
        assert_eq!(again.names().collect::<Vec<_>>(), pkg.names().collect::<Vec<_>>());
    }

    #[test]
    fn garbage_is_package_error() {
        assert!(matches!(Package::read(b"not a zip"), Err(ReportError::Package(_))));
    }

    #[test]
    fn target_resolution() {
        assert_eq!(resolve_target("word", "header1.xml"), "word/header1.xml");
        assert_eq!(resolve_target("word", "../customXml/item1.xml"), "customXml/item1.xml");
        assert_eq!(resolve_target("", "/word/document.xml"), "word/document.xml");
        assert_eq!(rels_path("word/document.xml"), "word/_rels/document.xml.rels");
    }
}
