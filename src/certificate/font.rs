//! Fonts for the certificate overlay.
//!
//! The decorative TrueType face is embedded as a CID font with `Identity-H`
//! encoding, so every glyph the face carries can be drawn; a `ToUnicode` map
//! keeps the text extractable. Short fixed fields use standard Helvetica with
//! WinAnsi encoding. Neither path substitutes characters: text that cannot
//! be encoded is an error.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use ttf_parser::{Face, GlyphId};

use super::CertificateError;

// WinAnsi codes 0x80..=0x9F that differ from Latin-1.
const WIN_ANSI_HIGH: [(u8, char); 27] = [
    (0x80, '€'),
    (0x82, '‚'),
    (0x83, 'ƒ'),
    (0x84, '„'),
    (0x85, '…'),
    (0x86, '†'),
    (0x87, '‡'),
    (0x88, 'ˆ'),
    (0x89, '‰'),
    (0x8A, 'Š'),
    (0x8B, '‹'),
    (0x8C, 'Œ'),
    (0x8E, 'Ž'),
    (0x91, '‘'),
    (0x92, '’'),
    (0x93, '“'),
    (0x94, '”'),
    (0x95, '•'),
    (0x96, '–'),
    (0x97, '—'),
    (0x98, '˜'),
    (0x99, '™'),
    (0x9A, 'š'),
    (0x9B, '›'),
    (0x9C, 'œ'),
    (0x9E, 'ž'),
    (0x9F, 'Ÿ'),
];

/// Encode text as WinAnsi. Whitespace becomes a plain space; the first
/// character with no WinAnsi code is returned as the error.
pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>, char> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{A0}'..='\u{FF}' => Ok(c as u8),
            c if c.is_whitespace() => Ok(b' '),
            c => WIN_ANSI_HIGH
                .iter()
                .find(|(_, ch)| *ch == c)
                .map(|(code, _)| *code)
                .ok_or(c),
        })
        .collect()
}

/// The standard Helvetica face; never embedded.
pub struct Helvetica;

// AFM advance widths for WinAnsi codes 32..=255.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 224] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0x30
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 0x50
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 0x60
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 350, // 0x70
    556, 350, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 350, 611, 350, // 0x80
    350, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 350, 500, 667, // 0x90
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 0xA0
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 0xB0
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 0xC0
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 0xD0
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278, // 0xE0
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500, // 0xF0
];

impl Helvetica {
    pub fn width(&self, code: u8) -> u16 {
        code.checked_sub(32)
            .and_then(|i| HELVETICA_WIDTHS.get(usize::from(i)))
            .copied()
            .unwrap_or(278)
    }

    pub fn text_width(&self, encoded: &[u8], size: f32) -> f32 {
        let units: u32 = encoded.iter().map(|&b| u32::from(self.width(b))).sum();
        units as f32 * size / 1000.0
    }

    pub fn embed(&self, doc: &mut Document) -> ObjectId {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        })
    }
}

/// Glyphs drawn with an embedded face, keyed by glyph id. The width table
/// and `ToUnicode` map are built from exactly this set.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GlyphSet {
    glyphs: BTreeMap<u16, (char, u16)>,
}

impl GlyphSet {
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    fn insert(&mut self, gid: u16, ch: char, width: u16) {
        self.glyphs.entry(gid).or_insert((ch, width));
    }
}

/// Text mapped to two-byte glyph ids, with its advance in 1/1000 em.
#[derive(Debug, Clone, PartialEq)]
pub struct Shaped {
    pub glyphs: Vec<u8>,
    units: u32,
}

impl Shaped {
    pub fn width(&self, size: f32) -> f32 {
        self.units as f32 * size / 1000.0
    }

    pub fn into_object(self) -> Object {
        Object::String(self.glyphs, StringFormat::Hexadecimal)
    }
}

/// A TrueType face embedded whole (no subsetting) as `FontFile2` under a
/// `CIDFontType2` descendant.
pub struct TrueTypeFont {
    name: String,
    data: Vec<u8>,
    ascent: i64,
    descent: i64,
    cap_height: i64,
    bbox: [i64; 4],
}

impl TrueTypeFont {
    pub fn parse(name: &str, data: Vec<u8>) -> Result<Self, ttf_parser::FaceParsingError> {
        let face = Face::parse(&data, 0)?;
        let upem = i64::from(face.units_per_em().max(1));
        let scale = |v: i64| v * 1000 / upem;

        let bb = face.global_bounding_box();
        let ascent = scale(i64::from(face.ascender()));
        let descent = scale(i64::from(face.descender()));
        let cap_height = face
            .capital_height()
            .map(|h| scale(i64::from(h)))
            .unwrap_or(ascent);
        let bbox = [
            scale(i64::from(bb.x_min)),
            scale(i64::from(bb.y_min)),
            scale(i64::from(bb.x_max)),
            scale(i64::from(bb.y_max)),
        ];

        Ok(Self {
            name: pdf_name(name),
            data,
            ascent,
            descent,
            cap_height,
            bbox,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map `text` to glyph ids, recording each glyph in `used`. Fails on the
    /// first character the face has no glyph for.
    pub fn shape(&self, text: &str, used: &mut GlyphSet) -> Result<Shaped, CertificateError> {
        let face = Face::parse(&self.data, 0).map_err(|e| {
            CertificateError::RenderFailure(format!("font {}: {e}", self.name))
        })?;
        let upem = u32::from(face.units_per_em().max(1));

        let mut glyphs = Vec::with_capacity(text.len() * 2);
        let mut units = 0u32;
        for c in text.chars() {
            let c = if c.is_whitespace() { ' ' } else { c };
            let gid = match face.glyph_index(c) {
                Some(GlyphId(0)) | None => {
                    return Err(CertificateError::RenderFailure(format!(
                        "font {} has no glyph for {c:?} (U+{:04X})",
                        self.name, c as u32
                    )))
                }
                Some(GlyphId(gid)) => gid,
            };
            let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
            let width = u16::try_from(u32::from(advance) * 1000 / upem).unwrap_or(u16::MAX);

            used.insert(gid, c, width);
            glyphs.extend_from_slice(&gid.to_be_bytes());
            units += u32::from(width);
        }
        Ok(Shaped { glyphs, units })
    }

    /// Embed the face as a `Type0` font covering the glyphs in `used`.
    pub fn embed(&self, doc: &mut Document, used: &GlyphSet) -> ObjectId {
        let file_id = doc.add_object(Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.clone(),
        ));
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(self.name.clone().into_bytes()),
            "Flags" => 32_i64,
            "FontBBox" => self.bbox.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            "ItalicAngle" => 0_i64,
            "Ascent" => self.ascent,
            "Descent" => self.descent,
            "CapHeight" => self.cap_height,
            "StemV" => 80_i64,
            "FontFile2" => file_id,
        });

        let mut widths = Vec::with_capacity(used.len() * 2);
        for (gid, (_, width)) in &used.glyphs {
            widths.push(Object::Integer(i64::from(*gid)));
            widths.push(Object::Array(vec![Object::Integer(i64::from(*width))]));
        }
        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(self.name.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0_i64,
            },
            "FontDescriptor" => descriptor_id,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });
        let to_unicode_id = doc.add_object(Stream::new(
            lopdf::Dictionary::new(),
            to_unicode_cmap(used).into_bytes(),
        ));

        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => Object::Name(self.name.clone().into_bytes()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        })
    }
}

/// `ToUnicode` CMap mapping each two-byte glyph id back to UTF-16BE.
fn to_unicode_cmap(used: &GlyphSet) -> String {
    let mut out = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    let entries: Vec<(&u16, &(char, u16))> = used.glyphs.iter().collect();
    // at most 100 entries per bfchar block
    for chunk in entries.chunks(100) {
        let _ = writeln!(out, "{} beginbfchar", chunk.len());
        for (gid, (ch, _)) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            let _ = writeln!(out, "<{gid:04X}> <{hex}>");
        }
        out.push_str("endbfchar\n");
    }

    out.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    out
}

fn pdf_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "CertificateScript".to_string()
    } else {
        cleaned
    }
}
