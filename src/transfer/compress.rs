use std::path::Path;

use image::ImageResult;
use image::codecs::jpeg::JpegEncoder;

/// JPEG bytes ready for transfer.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

/// Downscale `path` to fit within `max_width` x `max_height` (aspect ratio
/// kept, never upscaled) and encode it as JPEG.
pub fn compress_image<P: AsRef<Path>>(
    path: P,
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> ImageResult<CompressedImage> {
    let img = image::open(path)?;
    let img = if img.width() > max_width || img.height() > max_height {
        img.thumbnail(max_width, max_height)
    } else {
        img
    };
    let rgb = img.to_rgb8();

    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?;

    Ok(CompressedImage {
        bytes,
        width: rgb.width(),
        height: rgb.height(),
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawImage;
    use image::Rgb;

    #[test]
    fn test_downscales_and_encodes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RawImage::from_pixel(640, 480, Rgb([10, 200, 30])).save(&path).unwrap();

        let out = compress_image(&path, 320, 320, 50).unwrap();
        assert_eq!((out.width, out.height), (320, 240));
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(out.quality, 50);
    }

    #[test]
    fn test_small_image_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        RawImage::from_pixel(100, 60, Rgb([0, 0, 0])).save(&path).unwrap();

        let out = compress_image(&path, 320, 240, 70).unwrap();
        assert_eq!((out.width, out.height), (100, 60));
    }
}
