//! Image encoding: `DynamicImage` → base64 PNG wrapped in [`PageImage`].
//!
//! OpenAI-compatible vision APIs accept images as base64 `data:` URIs inside
//! the JSON request body. PNG keeps rendered text crisp.

use crate::record::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the request body.
pub fn encode_page(img: &DynamicImage, page_num: usize) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page {} → {} bytes base64", page_num, b64.len());

    Ok(PageImage {
        page_num,
        width: img.width(),
        height: img.height(),
        data: b64,
        mime_type: "image/png",
    })
}
