//! Image encoding: page bytes → base64 `ImageData` for the multimodal request.
//!
//! Scans within the size cap are sent as-is when the format is one every
//! provider accepts (PNG, JPEG, WebP). Oversized images and GIF/BMP inputs
//! are decoded, downscaled to fit `max_image_pixels` on the long side, and
//! re-encoded as lossless PNG so small print stays legible.
//! `detail: "high"` asks GPT-4-class models for the full tile budget; without
//! it the digits in a parameter table are lost.

use crate::error::PageError;
use crate::pipeline::input::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode a page image off the async runtime.
pub async fn encode_page(
    page_num: usize,
    image: PageImage,
    max_pixels: u32,
) -> Result<ImageData, PageError> {
    tokio::task::spawn_blocking(move || encode_image(&image, max_pixels))
        .await
        .map_err(|e| PageError::InputFailed {
            page: page_num,
            detail: format!("encode task failed: {e}"),
        })?
        .map_err(|e| PageError::InputFailed {
            page: page_num,
            detail: format!("image encoding failed: {e}"),
        })
}

/// Encode synchronously; CPU-bound for large images.
pub fn encode_image(image: &PageImage, max_pixels: u32) -> Result<ImageData, image::ImageError> {
    let decoded = image::load_from_memory_with_format(&image.bytes, image.format)?;
    let fits = decoded.width() <= max_pixels && decoded.height() <= max_pixels;
    let passthrough = matches!(
        image.format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP
    );

    if fits && passthrough {
        let b64 = STANDARD.encode(&image.bytes);
        debug!("Passing {} through → {} bytes base64", image.source, b64.len());
        return Ok(ImageData::new(b64, image.mime_type()).with_detail("high"));
    }

    let scaled = if fits {
        decoded
    } else {
        debug!(
            "Downscaling {} from {}x{} to fit {}px",
            image.source,
            decoded.width(),
            decoded.height(),
            max_pixels
        );
        decoded.resize(max_pixels, max_pixels, FilterType::Lanczos3)
    };
    encode_png(&scaled)
}

fn encode_png(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn page(width: u32, height: u32, format: ImageFormat) -> PageImage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([0, 0, 255, 255])));
        let img = if format == ImageFormat::Png {
            img
        } else {
            DynamicImage::ImageRgb8(img.to_rgb8())
        };
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        PageImage {
            source: "test".into(),
            bytes,
            format,
        }
    }

    fn decoded_dims(data: &ImageData) -> (u32, u32) {
        let bytes = STANDARD.decode(&data.data).expect("valid base64");
        let img = image::load_from_memory(&bytes).expect("decodable");
        (img.width(), img.height())
    }

    #[test]
    fn small_png_passes_through() {
        let p = page(10, 10, ImageFormat::Png);
        let data = encode_image(&p, 2000).unwrap();
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), p.bytes);
    }

    #[test]
    fn small_jpeg_keeps_mime() {
        let data = encode_image(&page(16, 16, ImageFormat::Jpeg), 2000).unwrap();
        assert_eq!(data.mime_type, "image/jpeg");
    }

    #[test]
    fn oversized_image_is_downscaled_keeping_aspect() {
        let data = encode_image(&page(600, 300, ImageFormat::Png), 300).unwrap();
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(decoded_dims(&data), (300, 150));
    }

    #[test]
    fn bmp_is_reencoded_as_png() {
        let data = encode_image(&page(8, 8, ImageFormat::Bmp), 2000).unwrap();
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(decoded_dims(&data), (8, 8));
    }

    #[tokio::test]
    async fn corrupt_bytes_become_page_error() {
        let p = PageImage {
            source: "bad".into(),
            bytes: b"\x89PNG\r\n\x1a\ngarbage".to_vec(),
            format: ImageFormat::Png,
        };
        let err = encode_page(4, p, 2000).await.unwrap_err();
        assert!(matches!(err, PageError::InputFailed { page: 4, .. }));
    }
}
