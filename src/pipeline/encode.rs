//! Image encoding: stored page image → base64 PNG wrapped in `ImageData`.
//!
//! Vision APIs accept images as base64 data embedded in the JSON request
//! body. Pages are sent as PNG: screenshots of text compress well losslessly
//! and JPEG artefacts around glyphs hurt the model's reading.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Encode a page image as a base64 PNG ready for the vision API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Load a stored page image and encode it.
pub fn encode_page_file(path: &Path) -> Result<ImageData, image::ImageError> {
    let img = image::open(path)?;
    encode_page(&img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("page_0001.png");
        RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255])).save(&path).unwrap();
        assert!(encode_page_file(&path).is_ok());
        assert!(encode_page_file(&dir.path().join("missing.png")).is_err());
    }
}
