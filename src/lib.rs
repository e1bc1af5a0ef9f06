pub mod config;
pub mod error;
pub mod geometry;
pub mod ingestion;
pub mod pipeline;
pub mod raytracing;
pub mod tiles;

pub use config::{RunConfig, SelectionMethod, TraceMode};
pub use pipeline::{Pipeline, RunSummary};
pub use raytracing::{Raytracer, RaytracingResult};
pub use tiles::{TileCache, TileKey, TileKind};
