//! Minimal WordprocessingML package writer.
//!
//! A `.docx` file is a zip archive of XML parts. This module writes exactly the
//! parts a photo report needs: one body with a heading and a table, the styles
//! it references, inline JPEG pictures, and document properties.
//!
//! Media parts are streamed into the archive as they are embedded, so encoded
//! photo bytes do not accumulate in memory while the body is being built.
//!
//! Units:
//! - twip (dxa): 1/20 pt, 567 per cm. Page, table and cell-margin sizes.
//! - EMU: 360 000 per cm. DrawingML extents.

use std::borrow::Cow;
use std::io::{Cursor, Write};

use chrono::{SecondsFormat, Utc};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::GenerationError;

pub const TWIPS_PER_CM: f64 = 567.0;
pub const EMU_PER_CM: f64 = 360_000.0;

/// A4 portrait.
pub const PAGE_WIDTH_TWIPS: u32 = 11_906;
pub const PAGE_HEIGHT_TWIPS: u32 = 16_838;
pub const PAGE_MARGIN_CM: f64 = 2.0;

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const STYLES_PART: &str = "word/styles.xml";

const NS_DECLARATIONS: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#,
);

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

/// Convert centimetres to twips, truncating like Word's own dialogs do.
pub fn cm_to_twips(cm: f64) -> u32 {
    (cm * TWIPS_PER_CM).max(0.0) as u32
}

pub fn cm_to_emu(cm: f64) -> u64 {
    (cm * EMU_PER_CM).max(0.0).round() as u64
}

/// Escape text for element content and attribute values.
pub fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

// ═══════════════════════════════════════════════════════════
// Body fragments
// ═══════════════════════════════════════════════════════════

/// Paragraph horizontal alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justification {
    Left,
    Center,
}

/// Cell vertical alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlignment {
    Top,
}

impl VerticalAlignment {
    fn as_val(self) -> &'static str {
        match self {
            VerticalAlignment::Top => "top",
        }
    }
}

/// Paragraph spacing in twips. `None` inherits from the style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Spacing {
    pub before: Option<u32>,
    pub after: Option<u32>,
    pub single_line: bool,
}

impl Spacing {
    /// Flush paragraph: no space around it, single line spacing.
    pub fn flush() -> Self {
        Self {
            before: Some(0),
            after: Some(0),
            single_line: true,
        }
    }

    pub fn none_before() -> Self {
        Self {
            before: Some(0),
            ..Self::default()
        }
    }

    fn to_xml(self) -> String {
        if self == Self::default() {
            return String::new();
        }
        let mut xml = String::from("<w:spacing");
        if let Some(before) = self.before {
            xml.push_str(&format!(r#" w:before="{before}""#));
        }
        if let Some(after) = self.after {
            xml.push_str(&format!(r#" w:after="{after}""#));
        }
        if self.single_line {
            xml.push_str(r#" w:line="240" w:lineRule="auto""#);
        }
        xml.push_str("/>");
        xml
    }
}

fn paragraph_properties(style: Option<&str>, spacing: Spacing, jc: Justification) -> String {
    let mut ppr = String::new();
    if let Some(style) = style {
        ppr.push_str(&format!(r#"<w:pStyle w:val="{style}"/>"#));
    }
    ppr.push_str(&spacing.to_xml());
    if jc == Justification::Center {
        ppr.push_str(r#"<w:jc w:val="center"/>"#);
    }
    if ppr.is_empty() {
        String::new()
    } else {
        format!("<w:pPr>{ppr}</w:pPr>")
    }
}

/// A paragraph holding a single text run.
pub fn text_paragraph(
    text: &str,
    style: Option<&str>,
    spacing: Spacing,
    jc: Justification,
) -> String {
    let ppr = paragraph_properties(style, spacing, jc);
    if text.is_empty() {
        return format!("<w:p>{ppr}</w:p>");
    }
    format!(
        r#"<w:p>{ppr}<w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(text)
    )
}

pub fn heading_paragraph(text: &str, level: u8) -> String {
    let style = format!("Heading{}", level.clamp(1, 9));
    text_paragraph(text, Some(&style), Spacing::default(), Justification::Left)
}

/// An inline picture scaled to `cx` × `cy` EMU.
pub fn picture_paragraph(
    media: &MediaRef,
    cx: u64,
    cy: u64,
    spacing: Spacing,
    jc: Justification,
) -> String {
    let ppr = paragraph_properties(None, spacing, jc);
    let id = media.index;
    let rel_id = &media.rel_id;
    let name = escape(&media.file_name);
    format!(
        concat!(
            "<w:p>{ppr}<w:r><w:drawing>",
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            "<pic:pic>",
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            "</pic:pic></a:graphicData></a:graphic></wp:inline>",
            "</w:drawing></w:r></w:p>"
        ),
        ppr = ppr,
        cx = cx,
        cy = cy,
        id = id,
        name = name,
        rel_id = rel_id,
    )
}

/// One table cell. Every cell carries at least one paragraph, as Word requires.
pub fn table_cell(
    width_twips: u32,
    margin_twips: Option<u32>,
    v_align: Option<VerticalAlignment>,
    paragraphs: &str,
) -> String {
    let mut tcpr = format!(r#"<w:tcW w:w="{width_twips}" w:type="dxa"/>"#);
    if let Some(m) = margin_twips {
        tcpr.push_str(&format!(
            concat!(
                "<w:tcMar>",
                r#"<w:top w:w="{m}" w:type="dxa"/>"#,
                r#"<w:left w:w="{m}" w:type="dxa"/>"#,
                r#"<w:bottom w:w="{m}" w:type="dxa"/>"#,
                r#"<w:right w:w="{m}" w:type="dxa"/>"#,
                "</w:tcMar>"
            ),
            m = m
        ));
    }
    if let Some(v) = v_align {
        tcpr.push_str(&format!(r#"<w:vAlign w:val="{}"/>"#, v.as_val()));
    }
    let body = if paragraphs.is_empty() {
        "<w:p/>"
    } else {
        paragraphs
    };
    format!("<w:tc><w:tcPr>{tcpr}</w:tcPr>{body}</w:tc>")
}

/// Accumulates a fixed-layout table row by row.
#[derive(Debug)]
pub struct TableWriter {
    xml: String,
    column_width_twips: u32,
    row_open: bool,
}

impl TableWriter {
    pub fn new(columns: u32, column_width_cm: f64) -> Self {
        let column_width_twips = cm_to_twips(column_width_cm);
        let total = column_width_twips * columns;
        let mut xml = format!(
            concat!(
                "<w:tbl><w:tblPr>",
                r#"<w:tblStyle w:val="TableNormal"/>"#,
                r#"<w:tblW w:w="{total}" w:type="dxa"/>"#,
                r#"<w:tblLayout w:type="fixed"/>"#,
                r#"<w:tblLook w:val="0000" w:firstRow="0" w:lastRow="0" w:firstColumn="0" w:lastColumn="0" w:noHBand="0" w:noVBand="0"/>"#,
                "</w:tblPr><w:tblGrid>"
            ),
            total = total
        );
        for _ in 0..columns {
            xml.push_str(&format!(r#"<w:gridCol w:w="{column_width_twips}"/>"#));
        }
        xml.push_str("</w:tblGrid>");
        Self {
            xml,
            column_width_twips,
            row_open: false,
        }
    }

    pub fn column_width_twips(&self) -> u32 {
        self.column_width_twips
    }

    pub fn start_row(&mut self) {
        if !self.row_open {
            self.xml.push_str("<w:tr>");
            self.row_open = true;
        }
    }

    pub fn push_cell(&mut self, cell_xml: &str) {
        self.start_row();
        self.xml.push_str(cell_xml);
    }

    /// A cell with no content, margins or alignment.
    pub fn push_empty_cell(&mut self) {
        let cell = table_cell(self.column_width_twips, None, None, "");
        self.push_cell(&cell);
    }

    pub fn end_row(&mut self) {
        if self.row_open {
            self.xml.push_str("</w:tr>");
            self.row_open = false;
        }
    }

    pub fn finish(mut self) -> String {
        self.end_row();
        self.xml.push_str("</w:tbl>");
        self.xml
    }
}

/// Section properties: A4 portrait with equal margins on all sides.
pub fn section_properties(margin_cm: f64) -> String {
    let m = cm_to_twips(margin_cm);
    format!(
        concat!(
            "<w:sectPr>",
            r#"<w:pgSz w:w="{w}" w:h="{h}"/>"#,
            r#"<w:pgMar w:top="{m}" w:right="{m}" w:bottom="{m}" w:left="{m}" w:header="708" w:footer="708" w:gutter="0"/>"#,
            "</w:sectPr>"
        ),
        w = PAGE_WIDTH_TWIPS,
        h = PAGE_HEIGHT_TWIPS,
        m = m
    )
}

// ═══════════════════════════════════════════════════════════
// Package
// ═══════════════════════════════════════════════════════════

/// Handle to an embedded media part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// 1-based, also used as the drawing object id.
    pub index: usize,
    pub rel_id: String,
    pub file_name: String,
}

impl MediaRef {
    fn target(&self) -> String {
        format!("media/{}", self.file_name)
    }
}

/// Zip archive under construction.
pub struct DocxPackage {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    media: Vec<MediaRef>,
}

impl DocxPackage {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            media: Vec::new(),
        }
    }

    /// Write a JPEG into `word/media/` and register its relationship.
    pub fn embed_jpeg(&mut self, bytes: &[u8]) -> Result<MediaRef, GenerationError> {
        let index = self.media.len() + 1;
        let media = MediaRef {
            index,
            // rId1 is the styles part
            rel_id: format!("rId{}", index + 1),
            file_name: format!("image{index}.jpeg"),
        };

        // JPEG data does not deflate; store it as-is.
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.zip
            .start_file(format!("word/{}", media.target()), options)?;
        self.zip.write_all(bytes)?;

        self.media.push(media.clone());
        Ok(media)
    }

    /// Write the remaining parts and return the finished archive bytes.
    ///
    /// `body_xml` is the content of `<w:body>`, including its `w:sectPr`.
    pub fn finish(mut self, body_xml: &str, title: &str) -> Result<Vec<u8>, GenerationError> {
        let document = format!(
            "{XML_DECLARATION}<w:document {NS_DECLARATIONS}><w:body>{body_xml}</w:body></w:document>"
        );
        let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        self.write_part("[Content_Types].xml", CONTENT_TYPES_XML)?;
        self.write_part("_rels/.rels", PACKAGE_RELS_XML)?;
        self.write_part("docProps/core.xml", &core_properties_xml(title, &created))?;
        self.write_part("docProps/app.xml", APP_PROPERTIES_XML)?;
        self.write_part(STYLES_PART, STYLES_XML)?;
        let document_rels = self.document_relationships_xml();
        self.write_part("word/_rels/document.xml.rels", &document_rels)?;
        self.write_part(DOCUMENT_PART, &document)?;

        let cursor = self.zip.finish()?;
        Ok(cursor.into_inner())
    }

    fn write_part(&mut self, name: &str, xml: &str) -> Result<(), GenerationError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, options)?;
        self.zip.write_all(xml.as_bytes())?;
        Ok(())
    }

    fn document_relationships_xml(&self) -> String {
        let mut xml = format!(
            concat!(
                "{decl}",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="{styles}" Target="styles.xml"/>"#
            ),
            decl = XML_DECLARATION,
            styles = REL_TYPE_STYLES
        );
        for media in &self.media {
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
                media.rel_id,
                REL_TYPE_IMAGE,
                media.target()
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }
}

impl Default for DocxPackage {
    fn default() -> Self {
        Self::new()
    }
}

fn core_properties_xml(title: &str, created: &str) -> String {
    format!(
        concat!(
            "{decl}",
            r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
            r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
            r#"xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "<dc:title>{title}</dc:title>",
            "<dc:creator>{creator}</dc:creator>",
            r#"<dcterms:created xsi:type="dcterms:W3CDTF">{created}</dcterms:created>"#,
            r#"<dcterms:modified xsi:type="dcterms:W3CDTF">{created}</dcterms:modified>"#,
            "</cp:coreProperties>"
        ),
        decl = XML_DECLARATION,
        title = escape(title),
        creator = crate::config::APP_NAME,
        created = created
    )
}

const CONTENT_TYPES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Default Extension="jpeg" ContentType="image/jpeg"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>"#,
    r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#,
    r#"<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#,
    "</Types>"
);

const PACKAGE_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
    r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>"#,
    "</Relationships>"
);

const APP_PROPERTIES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">"#,
    "<Application>Fotoreportage</Application>",
    "</Properties>"
);

const STYLES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
    "<w:docDefaults>",
    r#"<w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:eastAsia="Calibri" w:cs="Calibri"/>"#,
    r#"<w:sz w:val="22"/><w:szCs w:val="22"/><w:lang w:val="nl-NL"/></w:rPr></w:rPrDefault>"#,
    r#"<w:pPrDefault><w:pPr><w:spacing w:after="160" w:line="259" w:lineRule="auto"/></w:pPr></w:pPrDefault>"#,
    "</w:docDefaults>",
    r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style>"#,
    r#"<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/>"#,
    r#"<w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:uiPriority w:val="9"/><w:qFormat/>"#,
    r#"<w:pPr><w:keepNext/><w:keepLines/><w:spacing w:before="480" w:after="240"/><w:outlineLvl w:val="0"/></w:pPr>"#,
    r#"<w:rPr><w:b/><w:bCs/><w:color w:val="2F5496"/><w:sz w:val="32"/><w:szCs w:val="32"/></w:rPr></w:style>"#,
    r#"<w:style w:type="paragraph" w:styleId="Caption"><w:name w:val="caption"/>"#,
    r#"<w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:uiPriority w:val="35"/><w:qFormat/>"#,
    r#"<w:pPr><w:spacing w:after="200" w:line="240" w:lineRule="auto"/></w:pPr>"#,
    r#"<w:rPr><w:i/><w:iCs/><w:color w:val="44546A"/><w:sz w:val="18"/><w:szCs w:val="18"/></w:rPr></w:style>"#,
    r#"<w:style w:type="table" w:default="1" w:styleId="TableNormal"><w:name w:val="Normal Table"/>"#,
    r#"<w:uiPriority w:val="99"/><w:semiHidden/><w:unhideWhenUsed/>"#,
    r#"<w:tblPr><w:tblInd w:w="0" w:type="dxa"/><w:tblCellMar>"#,
    r#"<w:top w:w="0" w:type="dxa"/><w:left w:w="108" w:type="dxa"/>"#,
    r#"<w:bottom w:w="0" w:type="dxa"/><w:right w:w="108" w:type="dxa"/>"#,
    "</w:tblCellMar></w:tblPr></w:style>",
    "</w:styles>"
);
