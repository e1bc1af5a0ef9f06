use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use crate::error::{RaytracerError, Result};
use crate::geometry::Vector;
use crate::tiles::{GRID_TILE_EXTENT, TileKind};

/// Reduction applied to the reflection candidates of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionMethod {
    /// Single largest-area surface.
    #[default]
    #[value(name = "max-area")]
    MaxArea,
    /// Single surface whose centroid is nearest the start point.
    #[value(name = "min-distance")]
    MinDistance,
    /// Every candidate.
    #[value(name = "all")]
    All,
}

impl std::fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionMethod::MaxArea => write!(f, "max-area"),
            SelectionMethod::MinDistance => write!(f, "min-distance"),
            SelectionMethod::All => write!(f, "all"),
        }
    }
}

/// Which paths are evaluated per end point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TraceMode {
    #[value(name = "direct")]
    Direct,
    #[value(name = "reflection")]
    Reflection,
    #[default]
    #[value(name = "both")]
    Both,
}

impl TraceMode {
    pub fn direct(self) -> bool {
        matches!(self, TraceMode::Direct | TraceMode::Both)
    }

    pub fn reflection(self) -> bool {
        matches!(self, TraceMode::Reflection | TraceMode::Both)
    }
}

impl std::fmt::Display for TraceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceMode::Direct => write!(f, "direct"),
            TraceMode::Reflection => write!(f, "reflection"),
            TraceMode::Both => write!(f, "both"),
        }
    }
}

/// Remote URL templates per raw source kind. `{e}` and `{n}` are replaced
/// by the tile key in kilometres.
#[derive(Debug, Clone, Default)]
pub struct SourceUrls {
    pub dgm: Option<String>,
    pub dom: Option<String>,
    pub lod2: Option<String>,
}

impl SourceUrls {
    /// Template for `kind`; derived kinds have none.
    pub fn template(&self, kind: TileKind) -> Option<&str> {
        match kind {
            TileKind::Dgm => self.dgm.as_deref(),
            TileKind::Dom => self.dom.as_deref(),
            TileKind::Lod2 => self.lod2.as_deref(),
            TileKind::DomMasked => None,
        }
    }
}

/// Tile storage and acquisition parameters.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Root of the binary tile cache, `<cache_dir>/<kind>/<e>_<n>.bin`.
    pub cache_dir: PathBuf,
    /// Root of raw sources, `<raw_dir>/<kind>/<e>_<n>.<ext>`.
    pub raw_dir: PathBuf,
    pub urls: SourceUrls,
    /// Grid resolution in metres per cell.
    pub resolution: f64,
    /// Worker count of the masking phase.
    pub threads: usize,
}

impl CacheSettings {
    /// Cells per side of a grid tile at the configured resolution.
    pub fn grid_width(&self) -> usize {
        (GRID_TILE_EXTENT / self.resolution).round().max(1.0) as usize
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            raw_dir: PathBuf::from("raw"),
            urls: SourceUrls::default(),
            resolution: 1.0,
            threads: default_threads(),
        }
    }
}

/// Raytracer parameters.
#[derive(Debug, Clone)]
pub struct TracerSettings {
    pub selection: SelectionMethod,
    /// Reflectors farther than this from the start point are ignored;
    /// `0` disables the filter.
    pub max_plane_distance: f64,
    pub fresnel_zone: u32,
    /// Carrier frequency in Hz.
    pub frequency: f64,
    pub cancel_on_ground: bool,
    /// Worker count of the candidate evaluation phase.
    pub threads: usize,
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self {
            selection: SelectionMethod::MaxArea,
            max_plane_distance: 0.0,
            fresnel_zone: 1,
            frequency: 2.4e9,
            cancel_on_ground: false,
            threads: default_threads(),
        }
    }
}

/// Fully resolved run configuration (constructed from CLI args).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub start: Vector,
    pub ends: Vec<Vector>,
    pub mode: TraceMode,
    pub output: PathBuf,
    pub cache: CacheSettings,
    pub tracer: TracerSettings,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start: Vector::ZERO,
            ends: Vec::new(),
            mode: TraceMode::Both,
            output: PathBuf::from("results.json"),
            cache: CacheSettings::default(),
            tracer: TracerSettings::default(),
            verbose: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ends.is_empty() {
            return Err(RaytracerError::Config("at least one end point is required".into()));
        }
        if !(self.cache.resolution > 0.0 && self.cache.resolution <= GRID_TILE_EXTENT) {
            return Err(RaytracerError::Config(format!(
                "resolution {} m is outside (0, {GRID_TILE_EXTENT}]",
                self.cache.resolution
            )));
        }
        // Traversal steps on the absolute resolution lattice, so cells must
        // tile the extent exactly.
        let covered = self.cache.grid_width() as f64 * self.cache.resolution;
        if (covered - GRID_TILE_EXTENT).abs() > 1e-6 {
            return Err(RaytracerError::Config(format!(
                "resolution {} m does not divide the {GRID_TILE_EXTENT} m tile extent",
                self.cache.resolution
            )));
        }
        if !(self.tracer.frequency > 0.0) {
            return Err(RaytracerError::Config(format!(
                "frequency {} Hz must be positive",
                self.tracer.frequency
            )));
        }
        if self.tracer.fresnel_zone == 0 {
            return Err(RaytracerError::Config("fresnel zone index starts at 1".into()));
        }
        if self.cache.threads == 0 || self.tracer.threads == 0 {
            return Err(RaytracerError::Config("thread count must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parse an `x,y,z` UTM point.
fn parse_point(s: &str) -> std::result::Result<Vector, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid coordinate in '{s}': {e}"))?;
    match values[..] {
        [x, y, z] => Ok(Vector::new(x, y, z)),
        _ => Err(format!("expected x,y,z but got {} values", values.len())),
    }
}

/// CLI argument definition (clap derive).
#[derive(Parser, Debug)]
#[command(
    name = "terrain-raytracer",
    about = "Direct and single-reflection radio path analysis over terrain, vegetation and buildings",
    version
)]
pub struct CliArgs {
    /// Transmitter position as x,y,z (UTM metres)
    #[arg(short = 's', long, value_parser = parse_point, allow_hyphen_values = true)]
    pub start: Vector,

    /// Receiver position as x,y,z; repeat for several receivers
    #[arg(short = 'e', long = "end", value_parser = parse_point, required = true, allow_hyphen_values = true)]
    pub ends: Vec<Vector>,

    /// Paths to evaluate
    #[arg(long, value_enum, default_value = "both")]
    pub mode: TraceMode,

    /// Reflector selection policy
    #[arg(long, value_enum, default_value = "max-area")]
    pub selection: SelectionMethod,

    /// Max distance of a reflecting plane from the start point in metres (0 = unlimited)
    #[arg(long, default_value_t = 0.0)]
    pub max_plane_distance: f64,

    /// Fresnel zone index
    #[arg(long, default_value_t = 1)]
    pub fresnel_zone: u32,

    /// Carrier frequency in Hz
    #[arg(short = 'f', long, default_value_t = 2.4e9)]
    pub frequency: f64,

    /// Grid resolution in metres per cell
    #[arg(short = 'r', long, default_value_t = 1.0)]
    pub resolution: f64,

    /// Stop a path at its first terrain hit
    #[arg(long)]
    pub cancel_on_ground: bool,

    /// Binary tile cache directory
    #[arg(long, default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Raw source directory
    #[arg(long, default_value = "raw")]
    pub raw_dir: PathBuf,

    /// DGM download URL template ({e}/{n} = tile key in km)
    #[arg(long)]
    pub dgm_url: Option<String>,

    /// DOM download URL template
    #[arg(long)]
    pub dom_url: Option<String>,

    /// LOD2 download URL template
    #[arg(long)]
    pub lod2_url: Option<String>,

    /// Result file (JSON array)
    #[arg(short = 'o', long, default_value = "results.json")]
    pub output: PathBuf,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Worker thread count (default: all cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
}

impl From<CliArgs> for RunConfig {
    fn from(args: CliArgs) -> Self {
        let threads = args.threads.unwrap_or_else(default_threads);

        RunConfig {
            start: args.start,
            ends: args.ends,
            mode: args.mode,
            output: args.output,
            cache: CacheSettings {
                cache_dir: args.cache_dir,
                raw_dir: args.raw_dir,
                urls: SourceUrls {
                    dgm: args.dgm_url,
                    dom: args.dom_url,
                    lod2: args.lod2_url,
                },
                resolution: args.resolution,
                threads,
            },
            tracer: TracerSettings {
                selection: args.selection,
                max_plane_distance: args.max_plane_distance,
                fresnel_zone: args.fresnel_zone,
                frequency: args.frequency,
                cancel_on_ground: args.cancel_on_ground,
                threads,
            },
            verbose: args.verbose,
        }
    }
}
