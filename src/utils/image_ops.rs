use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::core::types::BoundingBox;

/// Asynchronously load an image from bytes using spawn_blocking.
///
/// Image decoding is CPU-intensive, especially for full-resolution folio
/// scans.
pub async fn load_image_from_memory_async(bytes: &[u8]) -> Result<DynamicImage> {
    let bytes = bytes.to_vec(); // Clone to move into blocking task
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).context("Failed to load image from memory")
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}

/// Asynchronously crop a symbol's bounding box out of a page image and
/// encode it to PNG in a single blocking operation.
///
/// Used for symbol thumbnails; one blocking task covers both steps.
pub async fn crop_and_encode_png_async(img: DynamicImage, bbox: BoundingBox) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let cropped = img.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
        let mut png_bytes = Vec::new();
        let mut cursor = Cursor::new(&mut png_bytes);
        cropped
            .write_to(&mut cursor, ImageFormat::Png)
            .context("Failed to encode cropped image as PNG")?;
        Ok(png_bytes)
    })
    .await
    .context("Failed to spawn blocking task for crop and encode")?
}
