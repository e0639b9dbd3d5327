//! Document assembly: places rendered photos into the table grid.
//!
//! One transition per photo, strictly in upload order:
//! PlaceCell → ApplyCellMargins → RenderContent → ApplyCaption →
//! SetVerticalAlignment → Advance.
//!
//! Each cell is serialized as soon as it is complete, so neither decoded
//! pixels nor encoded JPEG bytes outlive their own transition.

use serde::Serialize;
use tracing::{debug, warn};

use super::docx::{
    self, cm_to_emu, cm_to_twips, DocxPackage, Justification, MediaRef, Spacing, TableWriter,
    VerticalAlignment,
};
use super::geometry::CellGeometry;
use super::rasterize::{PhotoRenderer, RasterSettings, RasterizedPhoto};
use super::{GeneratedDocument, GenerationError, GenerationReport, PhotoFailure, PhotoItem};

pub const REPORT_TITLE: &str = "Gegenereerde Fotoreportage";
pub const PLACEHOLDER_PREFIX: &str = "Fout bij laden afbeelding";
pub const CAPTION_STYLE: &str = "Caption";

/// Zero-based table coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellPosition {
    pub row: u32,
    pub col: u32,
}

/// Walks the grid left to right, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCursor {
    columns: u32,
    position: CellPosition,
}

impl GridCursor {
    pub fn new(columns: u32) -> Self {
        Self {
            columns: columns.max(1),
            position: CellPosition { row: 0, col: 0 },
        }
    }

    pub fn position(&self) -> CellPosition {
        self.position
    }

    /// Move to the next cell. Returns `true` when the move wrapped to a new row.
    pub fn advance(&mut self) -> bool {
        self.position.col += 1;
        if self.position.col >= self.columns {
            self.position.col = 0;
            self.position.row += 1;
            return true;
        }
        false
    }

    /// Rows touched so far, counting a partially filled last row.
    pub fn rows_used(&self) -> u32 {
        if self.position.col == 0 {
            self.position.row
        } else {
            self.position.row + 1
        }
    }
}

/// What a cell shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellContent {
    Picture {
        media: MediaRef,
        width_emu: u64,
        height_emu: u64,
    },
    Placeholder {
        message: String,
    },
}

/// A filled grid slot, alive only until it is written into the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCell {
    pub position: CellPosition,
    pub margin_twips: u32,
    pub content: CellContent,
    /// `Some("")` renders an empty caption line; `None` renders none.
    pub caption: Option<String>,
    pub v_align: VerticalAlignment,
}

impl RenderedCell {
    pub fn to_xml(&self, width_twips: u32) -> String {
        let mut paragraphs = match &self.content {
            CellContent::Picture {
                media,
                width_emu,
                height_emu,
            } => docx::picture_paragraph(
                media,
                *width_emu,
                *height_emu,
                Spacing::flush(),
                Justification::Center,
            ),
            CellContent::Placeholder { message } => docx::text_paragraph(
                message,
                None,
                Spacing::default(),
                Justification::Center,
            ),
        };

        if let Some(caption) = &self.caption {
            paragraphs.push_str(&docx::text_paragraph(
                caption,
                Some(CAPTION_STYLE),
                Spacing::none_before(),
                Justification::Center,
            ));
        }

        docx::table_cell(
            width_twips,
            Some(self.margin_twips),
            Some(self.v_align),
            &paragraphs,
        )
    }
}

/// Sequential grid builder for one document.
pub struct DocumentAssembler<'a> {
    geometry: CellGeometry,
    settings: RasterSettings,
    include_captions: bool,
    renderer: &'a dyn PhotoRenderer,
    cursor: GridCursor,
    columns: u32,
    table: TableWriter,
    package: DocxPackage,
    placed: usize,
    failures: Vec<PhotoFailure>,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(
        geometry: CellGeometry,
        settings: RasterSettings,
        columns: u32,
        include_captions: bool,
        renderer: &'a dyn PhotoRenderer,
    ) -> Self {
        let columns = columns.max(1);
        Self {
            geometry,
            settings,
            include_captions,
            renderer,
            cursor: GridCursor::new(columns),
            columns,
            table: TableWriter::new(columns, geometry.column_width_cm),
            package: DocxPackage::new(),
            placed: 0,
            failures: Vec::new(),
        }
    }

    /// Place the next photo. Only packaging I/O can fail here; a photo that
    /// cannot be rendered becomes a placeholder cell.
    pub fn place(&mut self, photo: PhotoItem) -> Result<(), GenerationError> {
        let index = self.placed;
        let PhotoItem {
            filename,
            raw_bytes,
            caption,
        } = photo;

        // PlaceCell: a fresh cell every time, nothing carried over.
        let position = self.cursor.position();
        self.table.start_row();

        // ApplyCellMargins
        let margin_twips = cm_to_twips(self.geometry.padding_cm);

        // RenderContent
        let rendered = self.renderer.render(&raw_bytes, &self.settings);
        drop(raw_bytes);
        let content = match rendered {
            Ok(photo) => self.embed(photo)?,
            Err(e) => {
                warn!(index, filename = %filename, error = %e, "Photo could not be rendered");
                self.failures.push(PhotoFailure {
                    index,
                    filename: filename.clone(),
                    reason: e.to_string(),
                });
                CellContent::Placeholder {
                    message: format!("{PLACEHOLDER_PREFIX} {filename}"),
                }
            }
        };

        // ApplyCaption
        let caption = self
            .include_captions
            .then(|| caption.unwrap_or_default());

        // SetVerticalAlignment
        let cell = RenderedCell {
            position,
            margin_twips,
            content,
            caption,
            v_align: VerticalAlignment::Top,
        };
        debug!(index, row = position.row, col = position.col, "Cell placed");
        self.table.push_cell(&cell.to_xml(self.table.column_width_twips()));

        // Advance
        if self.cursor.advance() {
            self.table.end_row();
        }
        self.placed += 1;
        Ok(())
    }

    fn embed(&mut self, photo: RasterizedPhoto) -> Result<CellContent, GenerationError> {
        let media = self.package.embed_jpeg(&photo.jpeg_bytes)?;
        let width_emu = cm_to_emu(self.geometry.effective_image_width_cm);
        let height_emu = scaled_height_emu(width_emu, photo.width_px, photo.height_px);
        Ok(CellContent::Picture {
            media,
            width_emu,
            height_emu,
        })
    }

    /// Pad the last row, add the heading and page setup, and zip the package.
    pub fn finish(mut self) -> Result<GeneratedDocument, GenerationError> {
        let rows = self.cursor.rows_used();
        if self.cursor.position().col != 0 {
            while self.cursor.position().col != 0 {
                self.table.push_empty_cell();
                self.cursor.advance();
            }
            self.table.end_row();
        }

        let body = format!(
            "{}{}<w:p/>{}",
            docx::heading_paragraph(REPORT_TITLE, 1),
            self.table.finish(),
            docx::section_properties(docx::PAGE_MARGIN_CM)
        );
        let bytes = self.package.finish(&body, REPORT_TITLE)?;

        let rendered = self.placed - self.failures.len();
        Ok(GeneratedDocument {
            bytes,
            report: GenerationReport {
                photos: self.placed,
                rendered,
                failures: self.failures,
                rows,
                columns: self.columns,
                geometry: self.geometry,
            },
        })
    }
}

/// Height that keeps the pixel aspect ratio at `width_emu`.
pub fn scaled_height_emu(width_emu: u64, width_px: u32, height_px: u32) -> u64 {
    if width_px == 0 {
        return width_emu;
    }
    (width_emu as f64 * f64::from(height_px) / f64::from(width_px)).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::quality::{QualityPreset, QualityTable};
    use crate::pipeline::rasterize::MockPhotoRenderer;
    use crate::pipeline::RenderPipeline;
    use std::io::{Cursor, Read};

    fn document_xml(bytes: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut part = archive.by_name(docx::DOCUMENT_PART).unwrap();
        let mut xml = String::new();
        part.read_to_string(&mut xml).unwrap();
        xml
    }

    /// Cell fragments in document order.
    fn cells(xml: &str) -> Vec<&str> {
        xml.split("<w:tc>").skip(1).collect()
    }

    fn assemble(
        photos: Vec<PhotoItem>,
        columns: u32,
        captions: bool,
        renderer: &dyn PhotoRenderer,
    ) -> GeneratedDocument {
        let geometry = CellGeometry::compute(columns, 5.0).unwrap();
        let settings = RasterSettings::new(&QualityTable::standard(), QualityPreset::Print, &geometry);
        let mut assembler = DocumentAssembler::new(geometry, settings, columns, captions, renderer);
        for photo in photos {
            assembler.place(photo).unwrap();
        }
        assembler.finish().unwrap()
    }

    fn photos(n: usize) -> Vec<PhotoItem> {
        (0..n)
            .map(|i| PhotoItem::new(format!("photo{i}.jpg"), vec![i as u8 + 1]))
            .collect()
    }

    #[test]
    fn cursor_wraps_rows() {
        let mut cursor = GridCursor::new(2);
        assert_eq!(cursor.position(), CellPosition { row: 0, col: 0 });
        assert!(!cursor.advance());
        assert_eq!(cursor.position(), CellPosition { row: 0, col: 1 });
        assert!(cursor.advance());
        assert_eq!(cursor.position(), CellPosition { row: 1, col: 0 });
        assert_eq!(cursor.rows_used(), 1);
        cursor.advance();
        assert_eq!(cursor.rows_used(), 2);
    }

    #[test]
    fn single_column_wraps_every_photo() {
        let mut cursor = GridCursor::new(1);
        assert!(cursor.advance());
        assert!(cursor.advance());
        assert_eq!(cursor.position(), CellPosition { row: 2, col: 0 });
    }

    #[test]
    fn five_photos_two_columns() {
        let doc = assemble(photos(5), 2, false, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);

        assert_eq!(doc.report.rows, 3);
        assert_eq!(doc.report.columns, 2);
        assert_eq!(xml.matches("<w:tr>").count(), 3);
        assert_eq!(xml.matches("</w:tr>").count(), 3);

        let cells = cells(&xml);
        assert_eq!(cells.len(), 6);
        for cell in &cells[..5] {
            assert!(cell.contains("<w:drawing>"));
        }
        // Sixth slot: untouched
        assert!(!cells[5].contains("<w:drawing>"));
        assert!(!cells[5].contains("<w:tcMar>"));
        assert!(cells[5].contains("<w:p/>"));
    }

    #[test]
    fn full_last_row_needs_no_padding() {
        let doc = assemble(photos(4), 2, false, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);
        assert_eq!(doc.report.rows, 2);
        assert_eq!(cells(&xml).len(), 4);
    }

    #[test]
    fn missing_caption_renders_empty() {
        let items = PhotoItem::pair_with_captions(
            vec![
                ("a.jpg".into(), vec![1]),
                ("b.jpg".into(), vec![2]),
                ("c.jpg".into(), vec![3]),
            ],
            vec!["A".into(), "B".into()],
        );
        let doc = assemble(items, 3, true, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);
        let cells = cells(&xml);

        assert!(cells[0].contains(">A</w:t>"));
        assert!(cells[1].contains(">B</w:t>"));
        // Third caption paragraph exists but holds no run
        assert!(cells[2].contains(r#"<w:pStyle w:val="Caption"/>"#));
        assert!(!cells[2].contains("<w:t xml:space"));
    }

    #[test]
    fn captions_off_renders_none() {
        let items = vec![PhotoItem::new("a.jpg", vec![1]).with_caption("ignored")];
        let doc = assemble(items, 2, false, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);
        assert!(!xml.contains("Caption\"/>"));
        assert!(!xml.contains("ignored"));
    }

    #[test]
    fn caption_sits_flush_under_picture() {
        let items = vec![PhotoItem::new("a.jpg", vec![1]).with_caption("Zonsondergang")];
        let doc = assemble(items, 2, true, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);
        let cell = cells(&xml)[0];
        let picture_at = cell.find("<w:drawing>").unwrap();
        let caption_at = cell.find("Zonsondergang").unwrap();
        assert!(picture_at < caption_at);
        assert!(cell.contains(concat!(
            r#"<w:pPr><w:pStyle w:val="Caption"/><w:spacing w:before="0"/>"#,
            r#"<w:jc w:val="center"/></w:pPr>"#
        )));
    }

    #[test]
    fn one_corrupt_photo_of_n() {
        let mut items = photos(4);
        items[2] = PhotoItem::new("kapot.jpg", b"bad".to_vec());
        let doc = assemble(items, 2, true, &MockPhotoRenderer::failing_on(b"bad"));
        let xml = document_xml(&doc.bytes);
        let cells = cells(&xml);

        assert_eq!(cells.len(), 4);
        assert_eq!(xml.matches("<w:drawing>").count(), 3);
        assert_eq!(xml.matches(PLACEHOLDER_PREFIX).count(), 1);
        assert!(cells[2].contains("Fout bij laden afbeelding kapot.jpg"));
        // Placeholder is centered and still captioned
        assert!(cells[2].contains(r#"<w:jc w:val="center"/>"#));
        assert!(cells[2].contains(r#"<w:pStyle w:val="Caption"/>"#));
        assert_eq!(doc.report.rendered, 3);
        assert_eq!(
            doc.report.failures,
            vec![PhotoFailure {
                index: 2,
                filename: "kapot.jpg".into(),
                reason: "Failed to decode image: Mock decode failure".into(),
            }]
        );
    }

    #[test]
    fn margins_match_padding() {
        // 5 mm = 0.5 cm = 283 twips
        let doc = assemble(photos(1), 2, false, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);
        let cell = cells(&xml)[0];
        for side in ["top", "left", "bottom", "right"] {
            assert!(cell.contains(&format!(r#"<w:{side} w:w="283" w:type="dxa"/>"#)));
        }
        assert!(cell.contains(r#"<w:vAlign w:val="top"/>"#));
    }

    #[test]
    fn picture_is_effective_width_and_keeps_ratio() {
        // Mock renders 40x30; 2 columns at 5 mm leave 7.5 cm
        let doc = assemble(photos(1), 2, false, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);
        assert!(xml.contains(r#"<wp:extent cx="2700000" cy="2025000"/>"#), "{xml}");
        assert!(xml.contains(
            r#"<w:spacing w:before="0" w:after="0" w:line="240" w:lineRule="auto"/><w:jc w:val="center"/>"#
        ));
    }

    #[test]
    fn document_has_heading_and_page_setup() {
        let doc = assemble(photos(1), 1, false, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);
        assert!(xml.contains(r#"<w:pStyle w:val="Heading1"/>"#));
        assert!(xml.contains(REPORT_TITLE));
        assert!(xml.contains(r#"w:top="1134" w:right="1134" w:bottom="1134" w:left="1134""#));
        // Heading precedes table
        assert!(xml.find(REPORT_TITLE).unwrap() < xml.find("<w:tbl>").unwrap());
    }

    #[test]
    fn grid_columns_use_column_width() {
        let doc = assemble(photos(3), 3, false, &MockPhotoRenderer::new());
        let xml = document_xml(&doc.bytes);
        // 17 / 3 cm = 3213 twips
        assert_eq!(xml.matches(r#"<w:gridCol w:w="3213"/>"#).count(), 3);
        assert_eq!(xml.matches(r#"<w:tcW w:w="3213" w:type="dxa"/>"#).count(), 3);
    }

    #[test]
    fn media_parts_are_numbered_per_picture() {
        let mut items = photos(3);
        items[0] = PhotoItem::new("bad.jpg", b"bad".to_vec());
        let doc = assemble(items, 2, false, &MockPhotoRenderer::failing_on(b"bad"));
        let archive = zip::ZipArchive::new(Cursor::new(&doc.bytes[..])).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"word/media/image1.jpeg"));
        assert!(names.contains(&"word/media/image2.jpeg"));
        assert!(!names.contains(&"word/media/image3.jpeg"));
    }

    #[test]
    fn real_pipeline_placeholder_for_undecodable() {
        let items = vec![PhotoItem::new("leeg.jpg", Vec::new())];
        let doc = assemble(items, 2, false, &RenderPipeline::standard());
        assert_eq!(doc.report.failures.len(), 1);
        assert_eq!(doc.report.failures[0].reason, "Image data is empty");
    }

    #[test]
    fn scaled_height_rounds() {
        assert_eq!(scaled_height_emu(2_700_000, 40, 30), 2_025_000);
        assert_eq!(scaled_height_emu(100, 3, 1), 33);
        assert_eq!(scaled_height_emu(100, 0, 5), 100);
    }
}
