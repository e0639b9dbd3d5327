//! Photo rasterization: color-mode normalization, density-based downscaling,
//! and JPEG encoding.
//!
//! **Services architecture**: orientation correction and rasterization are
//! independent services composed by `RenderPipeline`, the same way the
//! assembler only ever sees the `PhotoRenderer` seam.
//!
//! Pipeline flow per photo:
//! 1. Validate bytes (size bounds) and header dimensions (pixel bound)
//! 2. Decode image
//! 3. `orientation.correct()`: fix EXIF rotation
//! 4. Drop alpha / palette / 16-bit modes to 8-bit RGB
//! 5. Downscale to the cell's pixel budget (never upscale)
//! 6. Encode JPEG at the preset quality

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use serde::Serialize;
use tracing::debug;

use super::geometry::CellGeometry;
use super::orientation::{ExifOrientationCorrector, OrientationCorrector};
use super::quality::{QualityPreset, QualityTable};
use super::RenderError;

pub const CM_PER_INCH: f64 = 2.54;

/// Maximum input image size (in bytes) before rejecting.
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Maximum decoded pixel count. The header is checked against this before any
/// pixel buffer is allocated, so a small file cannot claim a huge canvas.
pub const MAX_IMAGE_PIXELS: u64 = 100_000_000; // 100 MP

// ═══════════════════════════════════════════════════════════
// Settings and results
// ═══════════════════════════════════════════════════════════

/// Everything the rasterizer needs, fixed for the whole request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RasterSettings {
    /// Physical width the picture is printed at.
    pub effective_width_cm: f64,
    /// Density the width budget is computed at.
    pub resize_ppi: u32,
    /// JPEG quality, 0-100.
    pub compression_quality: u8,
}

impl RasterSettings {
    pub fn new(table: &QualityTable, preset: QualityPreset, geometry: &CellGeometry) -> Self {
        Self {
            effective_width_cm: geometry.effective_image_width_cm,
            resize_ppi: table.resize_ppi(preset),
            compression_quality: table.profile(preset).compression_quality,
        }
    }

    /// Widest pixel width worth keeping at this size and density.
    pub fn target_width_px(&self) -> u32 {
        target_width_px(self.effective_width_cm, self.resize_ppi)
    }
}

/// A re-encoded photo ready for embedding.
#[derive(Debug, Clone)]
pub struct RasterizedPhoto {
    pub jpeg_bytes: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub resized: bool,
}

// ═══════════════════════════════════════════════════════════
// Service traits
// ═══════════════════════════════════════════════════════════

/// Turns an upright decoded image into JPEG bytes sized for its cell.
pub trait ImageRasterizer: Send + Sync {
    fn rasterize(
        &self,
        image: DynamicImage,
        settings: &RasterSettings,
    ) -> Result<RasterizedPhoto, RenderError>;
}

/// Full per-photo transformation from uploaded bytes to embeddable JPEG.
///
/// Pure byte-to-byte transform, no shared state: safe to call for several
/// photos in parallel as long as results are placed by original index.
pub trait PhotoRenderer: Send + Sync {
    fn render(
        &self,
        raw_bytes: &[u8],
        settings: &RasterSettings,
    ) -> Result<RasterizedPhoto, RenderError>;
}

// ═══════════════════════════════════════════════════════════
// RenderPipeline: composes services
// ═══════════════════════════════════════════════════════════

pub struct RenderPipeline {
    orientation: Box<dyn OrientationCorrector>,
    rasterizer: Box<dyn ImageRasterizer>,
}

impl RenderPipeline {
    pub fn new(
        orientation: Box<dyn OrientationCorrector>,
        rasterizer: Box<dyn ImageRasterizer>,
    ) -> Self {
        Self {
            orientation,
            rasterizer,
        }
    }

    /// Production pipeline: EXIF correction + JPEG rasterization.
    pub fn standard() -> Self {
        Self::new(Box::new(ExifOrientationCorrector), Box::new(JpegRasterizer))
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl PhotoRenderer for RenderPipeline {
    fn render(
        &self,
        raw_bytes: &[u8],
        settings: &RasterSettings,
    ) -> Result<RasterizedPhoto, RenderError> {
        validate_image_bytes(raw_bytes)?;
        validate_image_dimensions(raw_bytes)?;

        let img = image::load_from_memory(raw_bytes)
            .map_err(|e| RenderError::Decode(e.to_string()))?;

        let img = self.orientation.correct(raw_bytes, img);

        self.rasterizer.rasterize(img, settings)
    }
}

// ═══════════════════════════════════════════════════════════
// Production implementations
// ═══════════════════════════════════════════════════════════

/// Lanczos3 downscale + baseline JPEG.
pub struct JpegRasterizer;

impl ImageRasterizer for JpegRasterizer {
    fn rasterize(
        &self,
        image: DynamicImage,
        settings: &RasterSettings,
    ) -> Result<RasterizedPhoto, RenderError> {
        let (source_width, source_height) = image.dimensions();

        let image = normalize_color(image);

        let target_width = settings.target_width_px();
        let (width_px, height_px) = fit_to_width(source_width, source_height, target_width);
        let resized = (width_px, height_px) != (source_width, source_height);
        let image = if resized {
            image.resize_exact(width_px, height_px, FilterType::Lanczos3)
        } else {
            image
        };

        let jpeg_bytes = encode_jpeg(&image, settings.compression_quality)?;

        debug!(
            source_width,
            source_height,
            width_px,
            height_px,
            target_width,
            quality = settings.compression_quality,
            jpeg_size = jpeg_bytes.len(),
            "Photo rasterized"
        );

        Ok(RasterizedPhoto {
            jpeg_bytes,
            width_px,
            height_px,
            source_width,
            source_height,
            resized,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Pure helper functions
// ═══════════════════════════════════════════════════════════

/// Validate image bytes before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), RenderError> {
    if bytes.is_empty() {
        return Err(RenderError::Empty);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(RenderError::TooLarge {
            limit_mb: MAX_IMAGE_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

/// Read the header dimensions and reject canvases above `MAX_IMAGE_PIXELS`.
pub fn validate_image_dimensions(bytes: &[u8]) -> Result<(u32, u32), RenderError> {
    let (width, height) = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RenderError::Decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| RenderError::Decode(e.to_string()))?;

    if u64::from(width) * u64::from(height) > MAX_IMAGE_PIXELS {
        return Err(RenderError::TooManyPixels {
            width,
            height,
            limit_mp: MAX_IMAGE_PIXELS / 1_000_000,
        });
    }
    Ok((width, height))
}

/// `floor(width_cm × ppi / 2.54)`, at least one pixel.
pub fn target_width_px(width_cm: f64, ppi: u32) -> u32 {
    let px = (width_cm * (f64::from(ppi) / CM_PER_INCH)).floor();
    if px < 1.0 {
        1
    } else {
        px as u32
    }
}

/// Scale `width × height` down to `max_width`, preserving aspect ratio.
/// Images already within the budget keep their dimensions.
pub fn fit_to_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let ratio = f64::from(height) / f64::from(width);
    let new_height = (f64::from(max_width) * ratio) as u32;
    (max_width, new_height.max(1))
}

/// JPEG has no alpha channel and no palette: reduce everything except 8-bit
/// gray and 8-bit RGB to 8-bit RGB.
pub fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
        other => {
            debug!(color = ?other.color(), "Converting to RGB for JPEG output");
            DynamicImage::ImageRgb8(other.to_rgb8())
        }
    }
}

/// Encode an image as JPEG bytes.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, RenderError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageOutputFormat::Jpeg(quality.min(100)))
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Mock implementations (testing)
// ═══════════════════════════════════════════════════════════

/// Mock renderer for assembler tests: fails on request, otherwise returns a
/// fixed-size JPEG without decoding the input.
#[cfg(test)]
pub struct MockPhotoRenderer {
    fail_on: Vec<Vec<u8>>,
}

#[cfg(test)]
impl MockPhotoRenderer {
    pub fn new() -> Self {
        Self {
            fail_on: Vec::new(),
        }
    }

    pub fn failing_on(raw: &[u8]) -> Self {
        Self {
            fail_on: vec![raw.to_vec()],
        }
    }
}

#[cfg(test)]
impl PhotoRenderer for MockPhotoRenderer {
    fn render(
        &self,
        raw_bytes: &[u8],
        settings: &RasterSettings,
    ) -> Result<RasterizedPhoto, RenderError> {
        if self.fail_on.iter().any(|f| f == raw_bytes) {
            return Err(RenderError::Decode("Mock decode failure".into()));
        }
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            40,
            30,
            image::Rgb([200, 200, 200]),
        ));
        Ok(RasterizedPhoto {
            jpeg_bytes: encode_jpeg(&img, settings.compression_quality)?,
            width_px: 40,
            height_px: 30,
            source_width: 40,
            source_height: 30,
            resized: false,
        })
    }
}

/// PNG whose IHDR claims `width × height` RGBA, followed by a truncated IDAT.
/// Only the header is well-formed.
#[cfg(test)]
pub(crate) fn png_with_claimed_size(width: u32, height: u32) -> Vec<u8> {
    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &b in bytes {
            crc ^= u32::from(b);
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
        !crc
    }

    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let mut body = kind.to_vec();
        body.extend_from_slice(data);
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc32(&body).to_be_bytes());
    }

    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    // 8-bit RGBA, deflate, adaptive filter, no interlace
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
    chunk(&mut png, b"IHDR", &ihdr);
    chunk(&mut png, b"IDAT", &[0x78, 0x9C, 0x00, 0x00]);
    png
}
