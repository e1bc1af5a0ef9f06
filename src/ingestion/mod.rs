//! Raw source decoding: elevation rasters and building models.

pub mod citygml;
pub mod raster;

use std::path::Path;

use crate::tiles::TileError;

pub use citygml::{BuildingParser, BuildingSurface, CityGmlParser, RoofInfo};
pub use raster::{RasterDecoder, RasterGrid, XyzRasterDecoder};

/// Supported raw source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xyz,
    CityGml,
}

impl SourceFormat {
    /// Detect format from file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, TileError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xyz" | "txt" => Ok(SourceFormat::Xyz),
            "gml" | "xml" => Ok(SourceFormat::CityGml),
            _ => Err(TileError::Decode(format!(
                "Unsupported source format: .{ext}"
            ))),
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Xyz => f.write_str("XYZ"),
            SourceFormat::CityGml => f.write_str("CityGML"),
        }
    }
}
