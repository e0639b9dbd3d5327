//! EXIF orientation correction for phone photos.
//!
//! Cameras store the sensor image as captured and record the intended rotation
//! in EXIF tag 0x0112. Word ignores that tag on embedded JPEGs, so the pixels
//! are rotated here, before any resizing. Re-encoding drops all metadata, which
//! clears the tag in the output.
//!
//! EXIF orientation values:
//! 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
//! 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW

use std::io::Cursor;

use image::DynamicImage;
use tracing::{debug, warn};

/// Upright orientation; also the value assumed when no tag can be read.
pub const ORIENTATION_NORMAL: u32 = 1;

/// Rotates decoded pixels upright. Never fails: an image whose metadata cannot
/// be read is returned unchanged.
pub trait OrientationCorrector: Send + Sync {
    /// `raw_bytes`: original file bytes (needed for EXIF reading).
    /// `image`: the decoded image.
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage;
}

/// Reads the orientation tag with `kamadak-exif` and applies it.
pub struct ExifOrientationCorrector;

impl OrientationCorrector for ExifOrientationCorrector {
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        match read_exif_orientation(raw_bytes) {
            Ok(orientation) => apply_orientation(image, orientation),
            Err(reason) => {
                warn!(%reason, "Could not read EXIF orientation, keeping pixels as decoded");
                image
            }
        }
    }
}

/// Leaves the image untouched.
pub struct NoOpOrientationCorrector;

impl OrientationCorrector for NoOpOrientationCorrector {
    fn correct(&self, _raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        image
    }
}

/// Read the EXIF orientation tag from raw image bytes.
///
/// Returns `Ok(1)` when the file carries no EXIF block or no orientation tag,
/// and `Err` with a description when the metadata is present but unusable.
pub fn read_exif_orientation(bytes: &[u8]) -> Result<u32, String> {
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => {
            debug!("No EXIF data");
            return Ok(ORIENTATION_NORMAL);
        }
        Err(e) => return Err(e.to_string()),
    };

    let Some(field) = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) else {
        return Ok(ORIENTATION_NORMAL);
    };

    match field.value.get_uint(0) {
        Some(value @ 1..=8) => Ok(value),
        Some(value) => Err(format!("orientation value {value} out of range")),
        None => Err("orientation tag has no integer value".to_string()),
    }
}

/// Apply an EXIF orientation transform to a `DynamicImage`.
/// Unknown values leave the image unchanged.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageOutputFormat, Rgb, RgbImage};

    fn tall_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([100, 100, 100])))
    }

    /// Plain JFIF output from the encoder, no APP1 block.
    fn jpeg_bytes() -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        tall_image()
            .write_to(&mut cursor, ImageOutputFormat::Jpeg(90))
            .unwrap();
        cursor.into_inner()
    }

    fn wide_jpeg() -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([10, 150, 200])))
            .write_to(&mut cursor, ImageOutputFormat::Jpeg(90))
            .unwrap();
        cursor.into_inner()
    }

    /// Encoder JPEG with a big-endian APP1 block holding only an orientation tag.
    fn jpeg_with_orientation(value: u16) -> Vec<u8> {
        let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(b"MM\0\x2A");
        app1.extend_from_slice(&8u32.to_be_bytes());
        app1.extend_from_slice(&1u16.to_be_bytes());
        // tag 0x0112, SHORT, count 1, value left-justified in 4 bytes
        app1.extend_from_slice(&0x0112u16.to_be_bytes());
        app1.extend_from_slice(&3u16.to_be_bytes());
        app1.extend_from_slice(&1u32.to_be_bytes());
        app1.extend_from_slice(&value.to_be_bytes());
        app1.extend_from_slice(&[0, 0]);
        app1.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(app1.len(), 2 + 0x22);

        let plain = wide_jpeg();
        let mut out = plain[..2].to_vec();
        out.extend_from_slice(&app1);
        out.extend_from_slice(&plain[2..]);
        out
    }

    #[test]
    fn reads_orientation_tag_from_app1() {
        assert_eq!(read_exif_orientation(&jpeg_with_orientation(6)), Ok(6));
        assert_eq!(read_exif_orientation(&jpeg_with_orientation(1)), Ok(1));
    }

    #[test]
    fn rotated_jpeg_renders_upright() {
        use crate::pipeline::{PhotoRenderer, RasterSettings, RenderPipeline};

        let settings = RasterSettings {
            effective_width_cm: 7.5,
            resize_ppi: 330,
            compression_quality: 95,
        };
        let rendered = RenderPipeline::standard()
            .render(&jpeg_with_orientation(6), &settings)
            .unwrap();
        assert_eq!((rendered.width_px, rendered.height_px), (20, 40));
        assert!(!rendered.resized);

        let decoded = image::load_from_memory(&rendered.jpeg_bytes).unwrap();
        assert_eq!(decoded.dimensions(), (20, 40));
        // Re-encoding drops the tag
        assert_eq!(read_exif_orientation(&rendered.jpeg_bytes), Ok(1));
    }

    #[test]
    fn out_of_range_orientation_is_an_error() {
        let bytes = jpeg_with_orientation(9);
        assert!(read_exif_orientation(&bytes).is_err());

        let decoded = image::load_from_memory(&bytes).unwrap();
        let corrected = ExifOrientationCorrector.correct(&bytes, decoded);
        assert_eq!(corrected.dimensions(), (40, 20));
    }

    #[test]
    fn jpeg_without_exif_is_normal() {
        assert_eq!(read_exif_orientation(&jpeg_bytes()), Ok(1));
    }

    #[test]
    fn garbage_bytes_do_not_panic() {
        // Either "not found" or a read error; both leave the image alone.
        let result = read_exif_orientation(b"definitely not an image");
        assert!(matches!(result, Ok(1) | Err(_)));
    }

    #[test]
    fn corrector_keeps_image_without_exif() {
        let corrected = ExifOrientationCorrector.correct(&jpeg_bytes(), tall_image());
        assert_eq!(corrected.dimensions(), (10, 20));
    }

    #[test]
    fn corrector_survives_unreadable_metadata() {
        let corrected = ExifOrientationCorrector.correct(b"\xFF\xD8\xFF\xE1garbage", tall_image());
        assert_eq!(corrected.dimensions(), (10, 20));
    }

    #[test]
    fn noop_corrector_is_identity() {
        let corrected = NoOpOrientationCorrector.correct(&[], tall_image());
        assert_eq!(corrected.dimensions(), (10, 20));
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        for orientation in [5, 6, 7, 8] {
            let result = apply_orientation(tall_image(), orientation);
            assert_eq!(result.dimensions(), (20, 10), "orientation {orientation}");
        }
    }

    #[test]
    fn flips_and_half_turn_keep_dimensions() {
        for orientation in [1, 2, 3, 4] {
            let result = apply_orientation(tall_image(), orientation);
            assert_eq!(result.dimensions(), (10, 20), "orientation {orientation}");
        }
    }

    #[test]
    fn rotate90_moves_top_left_to_top_right() {
        let mut img = RgbImage::from_pixel(2, 3, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let rotated = apply_orientation(DynamicImage::ImageRgb8(img), 6).to_rgb8();
        assert_eq!(rotated.dimensions(), (3, 2));
        assert_eq!(rotated.get_pixel(2, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn transpose_keeps_top_left() {
        let mut img = RgbImage::from_pixel(2, 3, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let transposed = apply_orientation(DynamicImage::ImageRgb8(img), 5).to_rgb8();
        assert_eq!(transposed.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn unknown_orientation_is_identity() {
        let result = apply_orientation(tall_image(), 99);
        assert_eq!(result.dimensions(), (10, 20));
    }
}
