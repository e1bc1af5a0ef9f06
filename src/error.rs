use std::io;

use crate::geometry::GeometryError;
use crate::raytracing::PathError;
use crate::tiles::TileError;

/// All error types for the raytracing run.
#[derive(thiserror::Error, Debug)]
pub enum RaytracerError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Result sink error: {0}")]
    Sink(String),
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    #[error("Tile error: {0}")]
    Tile(#[from] TileError),
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RaytracerError>;
