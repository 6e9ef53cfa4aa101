//! IMAGE command: validated image descriptors and inline drawing markup.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::escape::escape;

use crate::error::ReportError;
use crate::script::Value;
use crate::tree::{Document, NodeId};
use crate::xml;

use super::MediaRegistry;

/// DrawingML units per centimetre.
pub const EMU_PER_CM: f64 = 360_000.0;

/// DrawingML rotation units per degree.
const ROT_PER_DEGREE: f64 = 60_000.0;

const IMAGE_EXTENSIONS: &[&str] = &["png", "gif", "jpg", "jpeg", "svg", "bmp", "tif", "tiff", "emf", "wmf"];

const SVG_EXT_URI: &str = "{96DAC541-7B7A-43D3-8B79-37D633B846F1}";

#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub data: Vec<u8>,
    pub extension: String,
}

/// A validated IMAGE result.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    /// Size in centimetres.
    pub width: f64,
    pub height: f64,
    pub data: Vec<u8>,
    /// Lowercase, without the leading dot.
    pub extension: String,
    pub alt: Option<String>,
    /// Clockwise, in degrees.
    pub rotation: Option<f64>,
    pub caption: Option<String>,
    /// Raster fallback, required for SVG.
    pub thumbnail: Option<Thumbnail>,
}

/// Whether an INS result should be rendered as an image.
pub fn looks_like_image(v: &Value) -> bool {
    matches!(v, Value::Object(map)
        if ["width", "height", "data", "extension"].iter().all(|k| map.contains_key(*k)))
}

impl ImageSpec {
    /// Validate an IMAGE command result.
    pub fn from_value(v: &Value, command: &str) -> Result<ImageSpec, ReportError> {
        let fail = |message: String| ReportError::Image {
            command: command.to_owned(),
            message,
        };
        if !matches!(v, Value::Object(_)) {
            return Err(fail(format!("expected an image object, got {}", v.type_name())));
        }

        let width = dimension(v, "width").map_err(&fail)?;
        let height = dimension(v, "height").map_err(&fail)?;
        let ext = extension(v.get_ref("extension")).map_err(&fail)?;
        let data = image_data(v.get_ref("data"), "data").map_err(&fail)?;

        let alt = optional_string(v, "alt");
        let caption = optional_string(v, "caption");
        let rotation = match v.get_ref("rotation") {
            None | Some(Value::Undefined | Value::Null) => None,
            Some(r @ (Value::Int(_) | Value::Float(_))) => Some(r.as_float()),
            Some(other) => return Err(fail(format!("rotation must be a number, got {}", other.type_name()))),
        };

        let thumbnail = match v.get_ref("thumbnail") {
            None | Some(Value::Undefined | Value::Null) => None,
            Some(t @ Value::Object(_)) => Some(Thumbnail {
                data: image_data(t.get_ref("data"), "thumbnail.data").map_err(&fail)?,
                extension: extension(t.get_ref("extension")).map_err(&fail)?,
            }),
            Some(other) => return Err(fail(format!("thumbnail must be an object, got {}", other.type_name()))),
        };
        if ext == "svg" && thumbnail.is_none() {
            return Err(fail("SVG images need a raster thumbnail".into()));
        }
        if thumbnail.as_ref().is_some_and(|t| t.extension == "svg") {
            return Err(fail("an image thumbnail cannot itself be SVG".into()));
        }

        Ok(ImageSpec {
            width,
            height,
            data,
            extension: ext,
            alt,
            rotation,
            caption,
            thumbnail,
        })
    }
}

fn dimension(v: &Value, key: &str) -> Result<f64, String> {
    match v.get_ref(key) {
        Some(n @ (Value::Int(_) | Value::Float(_))) => {
            let x = n.as_float();
            if x.is_finite() && x > 0.0 {
                Ok(x)
            } else {
                Err(format!("{key} must be a positive number of centimetres"))
            }
        }
        Some(other) => Err(format!("{key} must be a number, got {}", other.type_name())),
        None => Err(format!("missing {key}")),
    }
}

fn extension(v: Option<&Value>) -> Result<String, String> {
    let Some(Value::Str(s)) = v else {
        return Err("extension must be a string such as '.png'".into());
    };
    let ext = s.trim().trim_start_matches('.').to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(format!("unsupported image extension '{s}'"))
    }
}

/// Bytes, or a base64 string (a `data:` URL prefix is allowed).
fn image_data(v: Option<&Value>, key: &str) -> Result<Vec<u8>, String> {
    match v {
        Some(Value::Bytes(b)) if !b.is_empty() => Ok(b.clone()),
        Some(Value::Str(s)) => {
            let encoded = match s.split_once(";base64,") {
                Some((prefix, rest)) if prefix.starts_with("data:") => rest,
                _ => s.as_str(),
            };
            let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            match STANDARD.decode(cleaned) {
                Ok(bytes) if !bytes.is_empty() => Ok(bytes),
                Ok(_) => Err(format!("{key} is empty")),
                Err(e) => Err(format!("{key} is not valid base64: {e}")),
            }
        }
        Some(Value::Bytes(_)) => Err(format!("{key} is empty")),
        Some(other) => Err(format!("{key} must be bytes or a base64 string, got {}", other.type_name())),
        None => Err(format!("missing {key}")),
    }
}

fn optional_string(v: &Value, key: &str) -> Option<String> {
    match v.get_ref(key) {
        None | Some(Value::Undefined | Value::Null) => None,
        Some(s) => Some(s.to_string()),
    }
}

// ── Insertion ─────────────────────────────────────────────────────────────────

/// Replace `text_node` with an inline picture.  `doc_pr_id` is the highest
/// drawing id in use and is bumped for the new picture.
pub fn insert_image(
    doc: &mut Document,
    text_node: NodeId,
    spec: &ImageSpec,
    registry: &mut dyn MediaRegistry,
    doc_pr_id: &mut u32,
) -> Result<(), ReportError> {
    let (blip_rel, svg_rel) = match &spec.thumbnail {
        Some(thumb) if spec.extension == "svg" => {
            let svg = registry.add_image(&spec.extension, &spec.data)?;
            let png = registry.add_image(&thumb.extension, &thumb.data)?;
            (png, Some(svg))
        }
        _ => (registry.add_image(&spec.extension, &spec.data)?, None),
    };
    *doc_pr_id += 1;

    let markup = drawing_xml(spec, &blip_rel, svg_rel.as_deref(), *doc_pr_id);
    let fragment = xml::parse_fragment(&markup)?;
    let nodes: Vec<NodeId> = fragment
        .children(fragment.root())
        .iter()
        .map(|&c| doc.import(&fragment, c))
        .collect();
    doc.replace(text_node, &nodes);
    Ok(())
}

fn drawing_xml(spec: &ImageSpec, blip_rel: &str, svg_rel: Option<&str>, id: u32) -> String {
    let cx = (spec.width * EMU_PER_CM).round() as i64;
    let cy = (spec.height * EMU_PER_CM).round() as i64;
    let name = format!("Picture {id}");
    let descr = spec
        .alt
        .as_deref()
        .map(|a| format!(" descr=\"{}\"", escape(a)))
        .unwrap_or_default();
    let rot = spec
        .rotation
        .filter(|r| *r != 0.0)
        .map(|r| format!(" rot=\"{}\"", (r * ROT_PER_DEGREE).round() as i64))
        .unwrap_or_default();
    let ext_list = svg_rel
        .map(|rel| {
            format!(
                "<a:extLst><a:ext uri=\"{SVG_EXT_URI}\"><asvg:svgBlip \
                 xmlns:asvg=\"http://schemas.microsoft.com/office/drawing/2016/SVG/main\" r:embed=\"{rel}\"/>\
                 </a:ext></a:extLst>"
            )
        })
        .unwrap_or_default();
    let caption = spec
        .caption
        .as_deref()
        .map(|c| format!("<w:br/><w:t xml:space=\"preserve\">{}</w:t>", escape(c)))
        .unwrap_or_default();

    format!(
        "<w:drawing><wp:inline distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">\
         <wp:extent cx=\"{cx}\" cy=\"{cy}\"/>\
         <wp:docPr id=\"{id}\" name=\"{name}\"{descr}/>\
         <wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect=\"1\"/></wp:cNvGraphicFramePr>\
         <a:graphic><a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">\
         <pic:pic><pic:nvPicPr><pic:cNvPr id=\"0\" name=\"{name}\"{descr}/>\
         <pic:cNvPicPr><a:picLocks noChangeAspect=\"1\" noChangeArrowheads=\"1\"/></pic:cNvPicPr></pic:nvPicPr>\
         <pic:blipFill><a:blip r:embed=\"{blip_rel}\">{ext_list}</a:blip><a:srcRect/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>\
         <pic:spPr bwMode=\"auto\"><a:xfrm{rot}><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>\
         <a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom><a:noFill/><a:ln><a:noFill/></a:ln></pic:spPr>\
         </pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>{caption}"
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
