//! Quality presets: target pixel density and JPEG quality per named preset.
//!
//! The table is built once at startup and shared read-only. Lookups by key
//! fail fast on unknown presets, before any document work begins.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::GenerationError;

/// Reference density used to cap oversized originals.
///
/// `original` never downscales to a preset density, but a 48 MP phone photo in
/// a 8 cm cell is still capped to this print resolution.
pub const ORIGINAL_REFERENCE_PPI: u32 = 330;

/// Named quality preset as submitted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Original,
    Hd,
    Print,
    Web,
    Email,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 5] = [
        QualityPreset::Original,
        QualityPreset::Hd,
        QualityPreset::Print,
        QualityPreset::Web,
        QualityPreset::Email,
    ];

    pub fn key(self) -> &'static str {
        match self {
            QualityPreset::Original => "original",
            QualityPreset::Hd => "hd",
            QualityPreset::Print => "print",
            QualityPreset::Web => "web",
            QualityPreset::Email => "email",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for QualityPreset {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QualityPreset::ALL
            .into_iter()
            .find(|preset| preset.key() == s)
            .ok_or_else(|| GenerationError::UnknownPreset(s.to_string()))
    }
}

/// How a preset constrains pixel density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    /// Downscale to this many pixels per inch of cell width.
    Target(u32),
    /// Keep source resolution, up to the table's reference cap.
    Unconstrained,
}

/// Density and compression settings for one preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityProfile {
    pub density: Density,
    /// JPEG quality, 0-100.
    pub compression_quality: u8,
}

/// Immutable preset table.
#[derive(Debug, Clone)]
pub struct QualityTable {
    original_reference_ppi: u32,
}

impl QualityTable {
    /// The production table.
    pub fn standard() -> Self {
        Self {
            original_reference_ppi: ORIGINAL_REFERENCE_PPI,
        }
    }

    /// Override the cap applied to `original` uploads. Zero is ignored.
    pub fn with_original_reference_ppi(mut self, ppi: u32) -> Self {
        if ppi > 0 {
            self.original_reference_ppi = ppi;
        }
        self
    }

    pub fn original_reference_ppi(&self) -> u32 {
        self.original_reference_ppi
    }

    pub fn profile(&self, preset: QualityPreset) -> QualityProfile {
        let (density, compression_quality) = match preset {
            QualityPreset::Original => (Density::Unconstrained, 95),
            QualityPreset::Hd => (Density::Target(330), 90),
            QualityPreset::Print => (Density::Target(220), 85),
            QualityPreset::Web => (Density::Target(150), 80),
            QualityPreset::Email => (Density::Target(96), 75),
        };
        QualityProfile {
            density,
            compression_quality,
        }
    }

    /// Resolve a caller-supplied key to its preset and profile.
    pub fn resolve(&self, key: &str) -> Result<(QualityPreset, QualityProfile), GenerationError> {
        let preset: QualityPreset = key.parse()?;
        Ok((preset, self.profile(preset)))
    }

    /// Pixel density the rasterizer downscales against for this preset.
    pub fn resize_ppi(&self, preset: QualityPreset) -> u32 {
        match self.profile(preset).density {
            Density::Target(ppi) => ppi,
            Density::Unconstrained => self.original_reference_ppi,
        }
    }
}

impl Default for QualityTable {
    fn default() -> Self {
        Self::standard()
    }
}
