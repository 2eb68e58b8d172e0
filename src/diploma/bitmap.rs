//! Draws the recipient name onto an image template.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb};
use imageproc::drawing::{draw_text_mut, text_size};

use super::font::DiplomaFont;
use super::{LETTER_HEIGHT, LETTER_WIDTH, NAME_FONT_SIZE, NAME_TOP_OFFSET, NameOffset};
use crate::error::PersonalizeError;

const JPEG_QUALITY: u8 = 95;
const MIN_FONT_PX: f32 = 10.0;
const INK: Rgb<u8> = Rgb([0, 0, 0]);

/// Where the name's center lands on an image of the given size, and the
/// pixel font size to draw it at.
///
/// The PDF baseline (page top − 220pt, horizontally centered) is mapped from
/// letter-sized points onto the image with independent x/y scale factors.
pub fn placement(width: u32, height: u32, offset: NameOffset) -> (f32, f32, f32) {
    let scale_x = width as f32 / LETTER_WIDTH;
    let scale_y = height as f32 / LETTER_HEIGHT;

    let base_x = LETTER_WIDTH / 2.0;
    let base_y = LETTER_HEIGHT - NAME_TOP_OFFSET;

    let center_x = (base_x + offset.x as f32) * scale_x;
    let center_y = height as f32 - (base_y + offset.y as f32) * scale_y;
    let font_px = (NAME_FONT_SIZE * scale_y).floor().max(MIN_FONT_PX);

    (center_x, center_y, font_px)
}

/// Stamp `text` centered at the scaled baseline and return JPEG bytes.
pub fn stamp_image(
    template: &[u8],
    text: &str,
    font: &DiplomaFont,
    offset: NameOffset,
) -> Result<Vec<u8>, PersonalizeError> {
    let mut canvas = image::load_from_memory(template)?.to_rgb8();
    let (width, height) = canvas.dimensions();

    let (center_x, center_y, font_px) = placement(width, height, offset);
    let (text_w, text_h) = text_size(font_px, font.glyphs(), text);

    let x = (center_x - text_w as f32 / 2.0).round() as i32;
    let y = (center_y - text_h as f32 / 2.0).round() as i32;
    draw_text_mut(&mut canvas, INK, x, y, font_px, font.glyphs(), text);

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(canvas)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out)
}
