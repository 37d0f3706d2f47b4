use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;

/// Images above this size get recompressed before upload (800 KiB)
pub const IMAGE_COMPRESSION_THRESHOLD: usize = 800 * 1024;

/// Documents above this size get a store-side quality transformation (6 MiB)
pub const DOCUMENT_COMPRESSION_THRESHOLD: usize = 6 * 1024 * 1024;

/// JPEG quality factor used when recompressing images
const JPEG_QUALITY: u8 = 70;

/// Whether an image payload of the given size should be recompressed locally
pub fn should_compress_image(size: usize) -> bool {
    size > IMAGE_COMPRESSION_THRESHOLD
}

/// Whether a document payload of the given size should get the object
/// store's best-effort transformation
pub fn should_compress_document(size: usize) -> bool {
    size > DOCUMENT_COMPRESSION_THRESHOLD
}

/// Recompress an image by decoding it and re-encoding as JPEG at a fixed
/// quality factor. The output is not guaranteed to be smaller than the
/// input; callers record the measured size either way.
pub fn compress_image(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("Failed to decode image")?;

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();

    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&rgb)
        .context("Failed to re-encode image as JPEG")?;

    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_image_threshold() {
        assert!(!should_compress_image(IMAGE_COMPRESSION_THRESHOLD));
        assert!(should_compress_image(IMAGE_COMPRESSION_THRESHOLD + 1));
        assert!(!should_compress_image(0));
    }

    #[test]
    fn test_document_threshold() {
        assert!(!should_compress_document(DOCUMENT_COMPRESSION_THRESHOLD));
        assert!(should_compress_document(DOCUMENT_COMPRESSION_THRESHOLD + 1));
    }

    #[test]
    fn test_compress_image_produces_jpeg() {
        let png = png_bytes(64, 64);
        let out = compress_image(&png).unwrap();

        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Jpeg);
        // Re-encoded output must still decode
        image::load_from_memory(&out).unwrap();
    }

    #[test]
    fn test_compress_image_rejects_garbage() {
        assert!(compress_image(b"definitely not an image").is_err());
    }

    #[test]
    fn test_compress_image_shrinks_noisy_png() {
        // Pseudo-random noise defeats PNG filtering, so the PNG stays near
        // raw size while lossy quality-70 JPEG comes in well under it
        let mut seed: u32 = 0x2545_F491;
        let img = RgbImage::from_fn(512, 512, |_, _| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let v = (seed >> 16) as u8;
            image::Rgb([v, v.wrapping_mul(31), v.wrapping_add(97)])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        let png = buf.into_inner();

        let out = compress_image(&png).unwrap();
        assert!(out.len() < png.len());
    }
}
