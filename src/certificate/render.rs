//! Certificate PDF rendering.
//!
//! The template's first page is kept as the background. An overlay content
//! stream is appended after the template's own streams, which are wrapped in
//! `q`/`Q` so none of their graphics state leaks into the overlay.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use super::cache;
use super::font::{encode_win_ansi, GlyphSet, Helvetica, Shaped, TrueTypeFont};
use super::{AssetKind, CertificateError};

const SCRIPT_FONT: &str = "CertScript";
const SANS_FONT: &str = "CertSans";
const LOGO: &str = "CertLogo";

// US letter, used when the template declares no MediaBox
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
const GREY: [f32; 3] = [0.5, 0.5, 0.5];
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

#[derive(Debug, Clone, PartialEq)]
pub struct Assets {
    pub template: PathBuf,
    pub font: PathBuf,
    /// Drawn only when the file exists.
    pub logo: Option<PathBuf>,
}

/// Everything printed on a certificate. `issue_date` must come from the
/// stored record so re-renders match the original.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateFields {
    pub student_name: String,
    pub course_name: String,
    pub issue_date: NaiveDate,
    pub certification_number: String,
}

pub struct Renderer {
    assets: Assets,
}

impl Renderer {
    pub fn new(assets: Assets) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    /// Render and atomically publish to `output`.
    pub fn render_to(&self, fields: &CertificateFields, output: &Path) -> Result<(), CertificateError> {
        let bytes = self.render(fields)?;
        cache::publish(output, &bytes).map_err(|e| {
            CertificateError::RenderFailure(format!("writing {}: {e}", output.display()))
        })
    }

    pub fn render(&self, fields: &CertificateFields) -> Result<Vec<u8>, CertificateError> {
        let template = &self.assets.template;
        if !template.is_file() {
            return Err(CertificateError::AssetMissing {
                asset: AssetKind::Template,
                path: template.clone(),
            });
        }
        let font_path = &self.assets.font;
        if !font_path.is_file() {
            return Err(CertificateError::AssetMissing {
                asset: AssetKind::Font,
                path: font_path.clone(),
            });
        }

        let font_data = fs::read(font_path)
            .map_err(|e| failure(format!("reading {}: {e}", font_path.display())))?;
        let font_name = font_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = TrueTypeFont::parse(&font_name, font_data)
            .map_err(|e| failure(format!("invalid font {}: {e}", font_path.display())))?;

        let mut doc = Document::load(template)
            .map_err(|e| failure(format!("loading template {}: {e}", template.display())))?;
        let pages = doc.get_pages();
        let (&first_page, &page_id) = pages
            .iter()
            .next()
            .ok_or_else(|| failure("template has no pages"))?;

        let [x0, y0, x1, y1] = media_box(&doc, page_id)?;
        let (width, height) = (x1 - x0, y1 - y0);

        // shape before embedding so the font carries exactly the glyphs drawn
        let mut glyphs = GlyphSet::default();
        let student = script.shape(&fields.student_name, &mut glyphs)?;
        let course_text = format!("'{}'", fields.course_name);
        let course = match encode_win_ansi(&course_text) {
            Ok(encoded) => Line::Sans(encoded),
            Err(_) => Line::Script(script.shape(&course_text, &mut glyphs)?),
        };
        let date = sans(&fields.issue_date.format("%Y-%m-%d").to_string())?;
        let number = sans(&fields.certification_number)?;

        let script_id = script.embed(&mut doc, &glyphs);
        let sans_id = Helvetica.embed(&mut doc);
        let logo_id = match &self.assets.logo {
            Some(path) if path.is_file() => Some(embed_image(&mut doc, path)?),
            _ => None,
        };

        // overlay
        let mut ops = vec![Operation::new("q", vec![])];
        if logo_id.is_some() {
            ops.push(Operation::new("q", vec![]));
            ops.push(Operation::new(
                "cm",
                vec![
                    real(150.0),
                    real(0.0),
                    real(0.0),
                    real(50.0),
                    real(x0 + 30.0),
                    real(y0 + height - 70.0),
                ],
            ));
            ops.push(Operation::new("Do", vec![name(LOGO)]));
            ops.push(Operation::new("Q", vec![]));
        }

        let name_x = x0 + width / 1.83;
        let student_w = student.width(24.0);
        text(&mut ops, SCRIPT_FONT, 24.0, BLACK, name_x - student_w / 2.0, y0 + height - 270.0, student.into_object());

        let (course_font, course_w, course) = match course {
            Line::Sans(encoded) => (SANS_FONT, Helvetica.text_width(&encoded, 12.0), Object::string_literal(encoded)),
            Line::Script(shaped) => (SCRIPT_FONT, shaped.width(12.0), shaped.into_object()),
        };
        text(&mut ops, course_font, 12.0, GREY, name_x - course_w / 2.0, y0 + height - 340.0, course);

        text(&mut ops, SANS_FONT, 12.0, BLACK, x0 + 138.0, y0 + height - 400.0, Object::string_literal(date));

        let number_w = Helvetica.text_width(&number, 7.0);
        text(&mut ops, SANS_FONT, 7.0, WHITE, x0 + width / 1.5 - number_w / 2.0, y0 + height - 15.0, Object::string_literal(number));
        ops.push(Operation::new("Q", vec![]));

        let overlay = Content { operations: ops }
            .encode()
            .map_err(|e| failure(format!("encoding overlay: {e}")))?;

        // resources
        let mut resources = match inherited(&doc, page_id, b"Resources")? {
            Some(obj) => resolve_dict(&doc, obj)?,
            None => Dictionary::new(),
        };
        let mut fonts = sub_dict(&doc, &resources, b"Font")?;
        fonts.set(SCRIPT_FONT, script_id);
        fonts.set(SANS_FONT, sans_id);
        resources.set("Font", fonts);
        if let Some(logo_id) = logo_id {
            let mut xobjects = sub_dict(&doc, &resources, b"XObject")?;
            xobjects.set(LOGO, logo_id);
            resources.set("XObject", xobjects);
        }

        // contents: q <template> Q <overlay>
        let mut contents = vec![Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec())),
        )];
        contents.extend(page_contents(&doc, page_id)?);
        contents.push(Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec())),
        ));
        contents.push(Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), overlay)),
        ));

        let page = doc.get_dictionary_mut(page_id).map_err(pdf)?;
        page.set("Contents", contents);
        page.set("Resources", resources);
        page.set(
            "MediaBox",
            vec![real(x0), real(y0), real(x1), real(y1)],
        );

        let extra: Vec<u32> = pages.keys().copied().filter(|n| *n != first_page).collect();
        if !extra.is_empty() {
            doc.delete_pages(&extra);
            doc.prune_objects();
        }

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| failure(format!("saving certificate: {e}")))?;
        debug!(
            certification_number = %fields.certification_number,
            size = out.len(),
            "rendered certificate"
        );
        Ok(out)
    }
}

fn failure(msg: impl Into<String>) -> CertificateError {
    CertificateError::RenderFailure(msg.into())
}

/// Course title, drawn in Helvetica unless WinAnsi cannot encode it.
enum Line {
    Sans(Vec<u8>),
    Script(Shaped),
}

fn sans(value: &str) -> Result<Vec<u8>, CertificateError> {
    encode_win_ansi(value).map_err(|c| failure(format!("{c:?} cannot be drawn in Helvetica in {value:?}")))
}

fn pdf(e: lopdf::Error) -> CertificateError {
    failure(format!("pdf: {e}"))
}

fn real(v: f32) -> Object {
    Object::Real(v.into())
}

fn name(n: &str) -> Object {
    Object::Name(n.as_bytes().to_vec())
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn text(
    ops: &mut Vec<Operation>,
    font: &str,
    size: f32,
    rgb: [f32; 3],
    x: f32,
    y: f32,
    shown: Object,
) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![name(font), real(size)]));
    ops.push(Operation::new("rg", rgb.iter().map(|c| real(*c)).collect()));
    ops.push(Operation::new("Td", vec![real(x), real(y)]));
    ops.push(Operation::new("Tj", vec![shown]));
    ops.push(Operation::new("ET", vec![]));
}

/// Page attribute, following `Parent` links for inheritable keys.
fn inherited(
    doc: &Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<Object>, CertificateError> {
    let mut current = Some(page_id);
    // bounded so a cyclic page tree cannot spin forever
    for _ in 0..64 {
        let Some(id) = current else { break };
        let dict = doc.get_dictionary(id).map_err(pdf)?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value.clone()));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Ok(None)
}

fn resolve_dict(doc: &Document, obj: Object) -> Result<Dictionary, CertificateError> {
    match obj {
        Object::Dictionary(d) => Ok(d),
        Object::Reference(id) => doc.get_dictionary(id).cloned().map_err(pdf),
        _ => Err(failure("expected a dictionary in page resources")),
    }
}

fn sub_dict(
    doc: &Document,
    parent: &Dictionary,
    key: &[u8],
) -> Result<Dictionary, CertificateError> {
    match parent.get(key) {
        Ok(obj) => resolve_dict(doc, obj.clone()),
        Err(_) => Ok(Dictionary::new()),
    }
}

fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f32; 4], CertificateError> {
    let Some(obj) = inherited(doc, page_id, b"MediaBox")? else {
        return Ok(DEFAULT_MEDIA_BOX);
    };
    let obj = match obj {
        Object::Reference(id) => doc.get_object(id).map_err(pdf)?.clone(),
        other => other,
    };
    let values: Vec<f32> = obj
        .as_array()
        .map_err(pdf)?
        .iter()
        .filter_map(number)
        .collect();
    match values.as_slice() {
        [a, b, c, d] => Ok([a.min(*c), b.min(*d), a.max(*c), b.max(*d)]),
        _ => Err(failure("template MediaBox is malformed")),
    }
}

fn page_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, CertificateError> {
    let page = doc.get_dictionary(page_id).map_err(pdf)?;
    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    })
}

fn embed_image(doc: &mut Document, path: &Path) -> Result<ObjectId, CertificateError> {
    let img = image::open(path)
        .map_err(|e| failure(format!("logo {}: {e}", path.display())))?
        .to_rgba8();
    let (w, h) = img.dimensions();

    let mut rgb = Vec::with_capacity(w as usize * h as usize * 3);
    let mut alpha = Vec::with_capacity(w as usize * h as usize);
    for px in img.pixels() {
        rgb.extend_from_slice(&px.0[..3]);
        alpha.push(px.0[3]);
    }

    let mut mask = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(w),
            "Height" => i64::from(h),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8_i64,
        },
        alpha,
    );
    let _ = mask.compress();
    let mask_id = doc.add_object(mask);

    let mut image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(w),
            "Height" => i64::from(h),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "SMask" => mask_id,
        },
        rgb,
    );
    let _ = image.compress();
    Ok(doc.add_object(image))
}
