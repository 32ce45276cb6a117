//! Still-image barcode decoding.
//!
//! [`BarcodeDecoder`] is the seam between the application and whatever
//! library reads symbols out of pixels. The default [`RxingDecoder`] runs
//! rxing's multi-symbol reader over the image's luma channel.

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::trace;

use scanbook_core::{BoundingBox, DecodedBarcode};

/// Reads zero or more barcodes from an image. Failures yield an empty list.
pub trait BarcodeDecoder: Send + Sync {
    fn decode(&self, image: &DynamicImage) -> Vec<DecodedBarcode>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RxingDecoder;

impl BarcodeDecoder for RxingDecoder {
    fn decode(&self, image: &DynamicImage) -> Vec<DecodedBarcode> {
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();

        let results = match rxing::helpers::detect_multiple_in_luma(luma.into_raw(), width, height)
        {
            Ok(results) => results,
            Err(e) => {
                trace!(error = ?e, "No barcodes decoded");
                return Vec::new();
            }
        };

        let mut found: Vec<DecodedBarcode> = Vec::new();
        for result in &results {
            let code = result.getText().to_string();
            if code.is_empty() || found.iter().any(|f| f.code == code) {
                continue;
            }
            let points: Vec<(f32, f32)> = result.getPoints().iter().map(|p| (p.x, p.y)).collect();
            found.push(DecodedBarcode {
                code,
                bounds: BoundingBox::enclosing(&points).unwrap_or_default(),
            });
        }
        found
    }
}

/// Decodes encoded image bytes (JPEG, PNG) into pixels.
pub fn load_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("Image could not be decoded")
}
