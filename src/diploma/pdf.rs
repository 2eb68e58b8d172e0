//! Writes the recipient name over page 1 of a PDF template.
//!
//! The name is drawn with the diploma font embedded as a Type0 /
//! CIDFontType2 font (Identity-H, glyph ids as CIDs), so any script the
//! font covers can be stamped. The template's own content stream is
//! wrapped in `q`/`Q` and kept as-is beneath the overlay. Only page 1 is
//! kept in the output.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

use super::font::DiplomaFont;
use super::{LETTER_HEIGHT, LETTER_WIDTH, NAME_FONT_SIZE, NAME_TOP_OFFSET, NameOffset};
use crate::error::PersonalizeError;

/// Resource name of the embedded font on the stamped page.
const FONT_RESOURCE: &str = "FDiploma";

/// PostScript name recorded for the embedded font.
const BASE_FONT: &str = "DiplomaName";

/// Stamp `text` onto page 1 of `template` and return the new PDF bytes.
///
/// `text` is drawn as given; callers apply any visual reordering first.
pub fn stamp_first_page(
    template: &[u8],
    text: &str,
    font: &DiplomaFont,
    offset: NameOffset,
) -> Result<Vec<u8>, PersonalizeError> {
    let mut doc = Document::load_mem(template)?;

    let pages = doc.get_pages();
    let page_count = pages.len() as u32;
    let page_id = *pages
        .get(&1)
        .ok_or_else(|| PersonalizeError::Pdf("template has no pages".into()))?;

    if page_count > 1 {
        let rest: Vec<u32> = (2..=page_count).collect();
        doc.delete_pages(&rest);
    }

    let page = media_box(&doc, page_id);

    let glyphs: Vec<u16> = text.chars().map(|c| font.glyph_id(c).0).collect();
    let text_width: f32 = glyphs
        .iter()
        .map(|&g| font.advance_milli_em(ab_glyph::GlyphId(g)))
        .sum::<f32>()
        * NAME_FONT_SIZE
        / 1000.0;

    let (x, y) = name_origin(page, text_width, offset);

    let font_id = embed_font(&mut doc, font, &glyphs);

    let overlay = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![FONT_RESOURCE.into(), NAME_FONT_SIZE.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(glyph_bytes(&glyphs), StringFormat::Hexadecimal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    let save_state = Content {
        operations: vec![Operation::new("q", vec![])],
    };

    let open_id = doc.add_object(Stream::new(dictionary! {}, save_state.encode()?));
    let overlay_id = doc.add_object(Stream::new(dictionary! {}, overlay.encode()?));

    let mut resources = page_resources(&doc, page_id)?;
    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id)?.clone(),
        Ok(Object::Dictionary(d)) => d.clone(),
        _ => Dictionary::new(),
    };
    fonts.set(FONT_RESOURCE, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    let mut contents = vec![Object::Reference(open_id)];
    match page.get(b"Contents") {
        Ok(Object::Array(existing)) => contents.extend(existing.iter().cloned()),
        Ok(existing @ Object::Reference(_)) => contents.push(existing.clone()),
        _ => {}
    }
    contents.push(Object::Reference(overlay_id));
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));

    doc.prune_objects();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

fn glyph_bytes(glyphs: &[u16]) -> Vec<u8> {
    glyphs.iter().flat_map(|g| g.to_be_bytes()).collect()
}

/// A page's MediaBox: lower-left corner and size, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PageBox {
    left: f32,
    bottom: f32,
    width: f32,
    height: f32,
}

impl PageBox {
    const LETTER: Self = Self {
        left: 0.0,
        bottom: 0.0,
        width: LETTER_WIDTH,
        height: LETTER_HEIGHT,
    };
}

/// Text-space origin for a centred name of `text_width` points.
fn name_origin(page: PageBox, text_width: f32, offset: NameOffset) -> (f32, f32) {
    let x = page.left + page.width / 2.0 + offset.x as f32 - text_width / 2.0;
    let y = page.bottom + page.height - NAME_TOP_OFFSET + offset.y as f32;
    (x, y)
}

/// The page's MediaBox, falling back to US Letter.
fn media_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let rect = inherited(doc, page_id, b"MediaBox").and_then(|obj| {
        let arr = match obj {
            Object::Reference(id) => doc.get_object(id).ok()?.as_array().ok()?.clone(),
            Object::Array(arr) => arr,
            _ => return None,
        };
        let nums: Vec<f32> = arr.iter().filter_map(|o| o.as_float().ok()).collect();
        (nums.len() == 4).then(|| PageBox {
            left: nums[0].min(nums[2]),
            bottom: nums[1].min(nums[3]),
            width: (nums[2] - nums[0]).abs(),
            height: (nums[3] - nums[1]).abs(),
        })
    });
    rect.unwrap_or(PageBox::LETTER)
}

/// The page's resource dictionary, resolved and detached from any sharing.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, PersonalizeError> {
    Ok(match inherited(doc, page_id, b"Resources") {
        Some(Object::Reference(id)) => doc.get_dictionary(id)?.clone(),
        Some(Object::Dictionary(d)) => d,
        _ => Dictionary::new(),
    })
}

/// Look up a page attribute, following the `Parent` chain.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Bounded walk in case of a malformed cyclic tree.
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Embed the font as Type0 with an Identity-H CID font and return its id.
fn embed_font(doc: &mut Document, font: &DiplomaFont, glyphs: &[u16]) -> ObjectId {
    let font_file = Stream::new(
        dictionary! { "Length1" => font.data().len() as i64 },
        font.data().to_vec(),
    );
    let font_file_id = doc.add_object(font_file);

    let ascent = font.ascent_milli_em();
    let descent = font.descent_milli_em();
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(BASE_FONT.as_bytes().to_vec()),
        "Flags" => 4,
        "FontBBox" => vec![
            Object::Integer(0),
            Object::from(descent),
            Object::Integer(1000),
            Object::from(ascent),
        ],
        "ItalicAngle" => 0,
        "Ascent" => ascent,
        "Descent" => descent,
        "CapHeight" => ascent,
        "StemV" => 80,
        "FontFile2" => font_file_id,
    });

    let widths: BTreeMap<u16, f32> = glyphs
        .iter()
        .map(|&g| (g, font.advance_milli_em(ab_glyph::GlyphId(g))))
        .collect();
    let mut w_array = Vec::with_capacity(widths.len() * 2);
    for (glyph, width) in widths {
        w_array.push(Object::Integer(i64::from(glyph)));
        w_array.push(Object::Array(vec![Object::from(width)]));
    }

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => Object::Name(BASE_FONT.as_bytes().to_vec()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
        "W" => w_array,
        "CIDToGIDMap" => "Identity",
    });

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(BASE_FONT.as_bytes().to_vec()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
    })
}
