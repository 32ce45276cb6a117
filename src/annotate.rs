//! Frame annotation: outlines detected barcodes, labels them with the
//! decoded text and re-encodes as JPEG.
//!
//! Labels use the 8x8 ASCII bitmap glyphs from `font8x8`; characters outside
//! that set are left blank.

use anyhow::Result;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

use scanbook_core::{BoundingBox, DecodedBarcode};

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const OUTLINE_WIDTH: u32 = 2;
const LABEL: Rgb<u8> = Rgb([0, 0, 255]);
const GLYPH_SIZE: u32 = 8;
const LABEL_GAP: u32 = 10;

/// Copies `image` to RGB, draws a rectangle around every detection and
/// writes its code above the box (below it when there is no room).
pub fn annotate(image: &DynamicImage, found: &[DecodedBarcode]) -> RgbImage {
    let mut frame = image.to_rgb8();
    for barcode in found {
        draw_outline(&mut frame, barcode.bounds);
        draw_label(&mut frame, barcode.bounds, &barcode.code);
    }
    frame
}

fn draw_label(frame: &mut RgbImage, bounds: BoundingBox, text: &str) {
    let top = bounds
        .y
        .checked_sub(LABEL_GAP + GLYPH_SIZE)
        .unwrap_or_else(|| bounds.y.saturating_add(bounds.height).saturating_add(LABEL_GAP));

    let mut left = bounds.x;
    for c in text.chars() {
        if left >= frame.width() {
            break;
        }
        if let Some(glyph) = BASIC_FONTS.get(c) {
            for (dy, row) in glyph.iter().enumerate() {
                for dx in 0..GLYPH_SIZE {
                    if row & (1 << dx) != 0 {
                        put(frame, left + dx, top.saturating_add(dy as u32), LABEL);
                    }
                }
            }
        }
        left = left.saturating_add(GLYPH_SIZE);
    }
}

fn draw_outline(frame: &mut RgbImage, bounds: BoundingBox) {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let left = bounds.x.min(width - 1);
    let top = bounds.y.min(height - 1);
    let right = bounds.x.saturating_add(bounds.width).min(width - 1);
    let bottom = bounds.y.saturating_add(bounds.height).min(height - 1);

    for t in 0..OUTLINE_WIDTH {
        for x in left..=right {
            put(frame, x, top.saturating_add(t), OUTLINE);
            put(frame, x, bottom.saturating_sub(t), OUTLINE);
        }
        for y in top..=bottom {
            put(frame, left.saturating_add(t), y, OUTLINE);
            put(frame, right.saturating_sub(t), y, OUTLINE);
        }
    }
}

fn put(frame: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < frame.width() && y < frame.height() {
        frame.put_pixel(x, y, color);
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(frame)?;
    Ok(buf)
}
