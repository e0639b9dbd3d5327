//! Cell geometry: column width, padding, and the width left for the picture.

use serde::Serialize;

use super::GenerationError;

/// Usable width between the 2 cm page margins of an A4 page.
pub const CONTENT_WIDTH_CM: f64 = 17.0;

/// Picture width applied when padding leaves no room in the column.
pub const MIN_IMAGE_WIDTH_CM: f64 = 1.0;

/// Widest grid accepted. Each column stays above 0.8 cm.
pub const MAX_COLUMNS: u32 = 20;

/// Raised when padding consumes the whole column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometryWarning {
    ImageWidthClamped { computed_cm: f64, applied_cm: f64 },
}

impl GeometryWarning {
    pub fn message(&self) -> String {
        match self {
            GeometryWarning::ImageWidthClamped {
                computed_cm,
                applied_cm,
            } => format!(
                "whitespace leaves {computed_cm:.2} cm for each photo; using {applied_cm:.1} cm"
            ),
        }
    }
}

/// Derived table geometry for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellGeometry {
    pub content_width_cm: f64,
    pub column_width_cm: f64,
    pub padding_cm: f64,
    pub effective_image_width_cm: f64,
    pub warning: Option<GeometryWarning>,
}

impl CellGeometry {
    /// Compute geometry for `num_columns` columns with `whitespace_mm` of
    /// padding on every side of each cell.
    pub fn compute(num_columns: u32, whitespace_mm: f64) -> Result<Self, GenerationError> {
        if num_columns == 0 || num_columns > MAX_COLUMNS {
            return Err(GenerationError::InvalidColumns(num_columns));
        }
        if !whitespace_mm.is_finite() || whitespace_mm < 0.0 {
            return Err(GenerationError::InvalidWhitespace(whitespace_mm));
        }

        let column_width_cm = CONTENT_WIDTH_CM / f64::from(num_columns);
        let padding_cm = whitespace_mm / 10.0;
        let computed = column_width_cm - 2.0 * padding_cm;

        let (effective_image_width_cm, warning) = if computed <= 0.0 {
            (
                MIN_IMAGE_WIDTH_CM,
                Some(GeometryWarning::ImageWidthClamped {
                    computed_cm: computed,
                    applied_cm: MIN_IMAGE_WIDTH_CM,
                }),
            )
        } else {
            (computed, None)
        };

        Ok(Self {
            content_width_cm: CONTENT_WIDTH_CM,
            column_width_cm,
            padding_cm,
            effective_image_width_cm,
            warning,
        })
    }
}
