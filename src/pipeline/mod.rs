pub mod geometry;
pub mod quality;
pub mod orientation;
pub mod rasterize;
pub mod docx;
pub mod assemble;

pub use geometry::*;
pub use quality::*;
pub use orientation::*;
pub use rasterize::*;
pub use assemble::*;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Request-level failures. Anything here aborts the whole document.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Unknown quality preset: {0}")]
    UnknownPreset(String),

    #[error("Column count must be between 1 and {max}, got {0}", max = geometry::MAX_COLUMNS)]
    InvalidColumns(u32),

    #[error("Whitespace must be a non-negative number of millimetres, got {0}")]
    InvalidWhitespace(f64),

    #[error("No photos to lay out")]
    NoPhotos,

    #[error("Document packaging failed: {0}")]
    Packaging(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-photo failures. These become placeholder cells, never request errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Image data is empty")]
    Empty,

    #[error("Image data exceeds {limit_mb}MB limit")]
    TooLarge { limit_mb: usize },

    #[error("Image is {width}x{height} pixels, above the {limit_mp} MP limit")]
    TooManyPixels {
        width: u32,
        height: u32,
        limit_mp: u64,
    },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Layout preferences for one document, validated at construction.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutRequest {
    pub num_columns: u32,
    pub whitespace_mm: f64,
    pub include_captions: bool,
    pub quality: QualityPreset,
}

impl LayoutRequest {
    /// Validate caller input. Fails fast on an unknown preset key or on
    /// geometry that cannot be laid out at all.
    pub fn new(
        quality_key: &str,
        num_columns: u32,
        whitespace_mm: f64,
        include_captions: bool,
        table: &QualityTable,
    ) -> Result<Self, GenerationError> {
        let (quality, _) = table.resolve(quality_key)?;
        // Same checks the geometry applies, surfaced before any decoding.
        CellGeometry::compute(num_columns, whitespace_mm)?;
        Ok(Self {
            num_columns,
            whitespace_mm,
            include_captions,
            quality,
        })
    }

    pub fn geometry(&self) -> Result<CellGeometry, GenerationError> {
        CellGeometry::compute(self.num_columns, self.whitespace_mm)
    }
}

/// One uploaded photo with its caption, if the caller sent one.
#[derive(Debug, Clone)]
pub struct PhotoItem {
    pub filename: String,
    pub raw_bytes: Vec<u8>,
    pub caption: Option<String>,
}

impl PhotoItem {
    pub fn new(filename: impl Into<String>, raw_bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            raw_bytes,
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Pair uploads with captions by index. The caption list may be shorter
    /// than the upload list; surplus captions are ignored.
    pub fn pair_with_captions(
        uploads: Vec<(String, Vec<u8>)>,
        captions: Vec<String>,
    ) -> Vec<PhotoItem> {
        let mut captions = captions.into_iter();
        uploads
            .into_iter()
            .map(|(filename, raw_bytes)| PhotoItem {
                filename,
                raw_bytes,
                caption: captions.next(),
            })
            .collect()
    }
}

/// A photo that could not be rendered and got a placeholder instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoFailure {
    pub index: usize,
    pub filename: String,
    pub reason: String,
}

/// Summary of one generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub photos: usize,
    pub rendered: usize,
    pub failures: Vec<PhotoFailure>,
    pub rows: u32,
    pub columns: u32,
    pub geometry: CellGeometry,
}

impl GenerationReport {
    pub fn geometry_warning(&self) -> Option<GeometryWarning> {
        self.geometry.warning
    }
}

/// The finished `.docx` plus what happened while building it.
#[derive(Debug)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub report: GenerationReport,
}

/// Lay out `photos` into a Word document.
///
/// Photos are consumed one at a time: each is decoded, rendered, embedded and
/// dropped before the next one is touched. A photo that fails to render gets
/// a placeholder cell; only request-level problems return `Err`.
pub fn generate(
    request: &LayoutRequest,
    photos: Vec<PhotoItem>,
    table: &QualityTable,
    renderer: &dyn PhotoRenderer,
) -> Result<GeneratedDocument, GenerationError> {
    if photos.is_empty() {
        return Err(GenerationError::NoPhotos);
    }

    let span = info_span!(
        "generate",
        request_id = %Uuid::new_v4(),
        photos = photos.len(),
        quality = %request.quality,
        columns = request.num_columns,
    );
    let _enter = span.enter();

    let geometry = request.geometry()?;
    if let Some(warning) = geometry.warning {
        warn!(
            whitespace_mm = request.whitespace_mm,
            detail = %warning.message(),
            "Padding leaves no room for photos, clamping image width"
        );
    }

    let settings = RasterSettings::new(table, request.quality, &geometry);
    let mut assembler = DocumentAssembler::new(
        geometry,
        settings,
        request.num_columns,
        request.include_captions,
        renderer,
    );

    for photo in photos {
        assembler.place(photo)?;
    }

    let document = assembler.finish()?;
    info!(
        rendered = document.report.rendered,
        failed = document.report.failures.len(),
        rows = document.report.rows,
        size = document.bytes.len(),
        "Document generated"
    );
    Ok(document)
}
