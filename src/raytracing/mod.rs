//! Direct and single-reflection path evaluation.

pub mod fresnel;
pub mod result;
pub mod selection;
pub mod traversal;

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{TraceMode, TracerSettings};
use crate::error::Result;
use crate::geometry::{GeometryError, Vector};
use crate::tiles::{TileCache, TileError, TileKind, tiles_in_ground_area, tiles_on_ray};

pub use fresnel::{fresnel_radius, fresnel_zone};
pub use result::{ObstructionCounts, PathMethod, RaytracingResult, ResultSink};
pub use selection::{Candidate, select_candidates};
pub use traversal::RaySample;

/// Failure of a single path; sibling paths are unaffected.
#[derive(thiserror::Error, Debug)]
pub enum PathError {
    #[error("tile unavailable: {0}")]
    Tile(#[from] TileError),
    #[error("degenerate path: {0}")]
    Geometry(#[from] GeometryError),
    #[error("worker pool: {0}")]
    Pool(String),
}

/// Record of one reflection candidate; `Ok(None)` when an early terrain
/// stop dropped it.
type CandidateOutcome = std::result::Result<Option<RaytracingResult>, PathError>;

/// Outcome of evaluating one straight segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// All three passes ran.
    Complete(ObstructionCounts),
    /// Early stop on the first terrain hit; only `ground` is set.
    GroundHit(ObstructionCounts),
}

impl SegmentOutcome {
    pub fn counts(&self) -> ObstructionCounts {
        match self {
            SegmentOutcome::Complete(c) | SegmentOutcome::GroundHit(c) => *c,
        }
    }
}

/// Classify the obstruction along `start`-`end` against resident grids.
pub fn evaluate_segment(
    cache: &TileCache,
    start: &Vector,
    end: &Vector,
    cancel_on_ground: bool,
) -> std::result::Result<SegmentOutcome, TileError> {
    let samples = traversal::walk(start, end, cache.settings().resolution);

    let dgm = traversal::blocked(cache, TileKind::Dgm, &samples, cancel_on_ground)?;
    if cancel_on_ground && dgm.iter().any(|hit| *hit) {
        return Ok(SegmentOutcome::GroundHit(ObstructionCounts {
            ground: 1,
            ..Default::default()
        }));
    }

    let masked = traversal::blocked(cache, TileKind::DomMasked, &samples, false)?;
    let dom = traversal::blocked(cache, TileKind::Dom, &samples, false)?;
    Ok(SegmentOutcome::Complete(ObstructionCounts::classify(
        &dgm, &masked, &dom,
    )))
}

/// Traces paths from a fixed start point and records them in a result
/// sink.
pub struct Raytracer {
    start: Vector,
    settings: TracerSettings,
    cache: TileCache,
    sink: ResultSink,
    failed: usize,
    dropped: usize,
}

impl Raytracer {
    /// Bind the tracer to `start` and open the result sink at `output`.
    pub fn new(start: Vector, settings: TracerSettings, cache: TileCache, output: &Path) -> Result<Self> {
        let sink = ResultSink::create(output)?;
        info!(
            start = %start,
            selection = %settings.selection,
            fresnel_zone = settings.fresnel_zone,
            frequency = settings.frequency,
            output = %output.display(),
            "Raytracer ready"
        );
        Ok(Self {
            start,
            settings,
            cache,
            sink,
            failed: 0,
            dropped: 0,
        })
    }

    pub fn start(&self) -> Vector {
        self.start
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Paths that failed so far.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Reflection candidates dropped by `cancel_on_ground` so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Evaluate the paths to `end` selected by `mode`.
    ///
    /// Every completed path is appended to the sink and returned. Failing
    /// paths are logged and counted; only a sink failure is an error.
    pub fn trace(&mut self, end: Vector, mode: TraceMode) -> Result<Vec<RaytracingResult>> {
        let mut records = Vec::new();

        if mode.direct() {
            match self.trace_direct(end) {
                Ok(record) => {
                    self.sink.append(&record)?;
                    records.push(record);
                }
                Err(e) => {
                    warn!(end = %end, error = %e, "Direct path failed");
                    self.failed += 1;
                }
            }
        }

        if mode.reflection() {
            match self.trace_reflections(end) {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            Ok(Some(record)) => {
                                self.sink.append(&record)?;
                                records.push(record);
                            }
                            Ok(None) => self.dropped += 1,
                            Err(e) => {
                                warn!(end = %end, error = %e, "Reflection path failed");
                                self.failed += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(end = %end, error = %e, "Reflection search failed");
                    self.failed += 1;
                }
            }
        }

        Ok(records)
    }

    /// Close the sink; returns the number of records written.
    pub fn finish(self) -> Result<usize> {
        self.sink.finish()
    }

    /// Make every grid tile the segment reads resident.
    fn prepare_segment(&mut self, a: &Vector, b: &Vector) -> std::result::Result<(), TileError> {
        let samples = traversal::walk(a, b, self.cache.settings().resolution);
        for kind in TileKind::GRIDS {
            for key in traversal::required_tiles(a, b, &samples, kind) {
                self.cache.load_grid(key, kind)?;
            }
        }
        Ok(())
    }

    fn trace_direct(&mut self, end: Vector) -> std::result::Result<RaytracingResult, PathError> {
        let start = self.start;
        self.prepare_segment(&start, &end)?;
        let outcome = evaluate_segment(&self.cache, &start, &end, self.settings.cancel_on_ground)?;
        if let SegmentOutcome::GroundHit(_) = outcome {
            debug!(end = %end, "Direct path stopped at terrain");
        }

        Ok(RaytracingResult {
            method: PathMethod::Direct,
            start,
            end,
            reflect: None,
            distance: start.distance(&end),
            reflecting_polygon_id: None,
            reflecting_polygon_area: None,
            selection_method: self.settings.selection,
            counts: outcome.counts(),
        })
    }

    /// Candidate reflectors for the path to `end`.
    fn candidates(&mut self, end: Vector) -> std::result::Result<Vec<Candidate>, PathError> {
        let start = self.start;
        let radius = fresnel_radius(
            self.settings.fresnel_zone,
            self.settings.frequency,
            start.distance(&end),
        );
        let footprint = fresnel_zone(&start, &end, radius)?;

        let width = TileKind::Lod2.width_km();
        let mut keys = tiles_in_ground_area(&footprint, width);
        for key in tiles_on_ray(&start, &end, width) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut resident = Vec::with_capacity(keys.len());
        for key in keys {
            match self.cache.load_vector(key) {
                Ok(_) => resident.push(key),
                Err(e) => warn!(key = %key, error = %e, "Building tile skipped"),
            }
        }

        let polygons = resident
            .iter()
            .filter_map(|key| self.cache.vector(*key))
            .flat_map(|tile| tile.polygons());
        let candidates = select_candidates(
            polygons,
            &footprint,
            &start,
            self.settings.selection,
            self.settings.max_plane_distance,
        );

        debug!(
            end = %end,
            radius,
            tiles = resident.len(),
            candidates = candidates.len(),
            "Selected reflection candidates"
        );
        Ok(candidates)
    }

    /// Evaluate every candidate reflection of the path to `end`.
    fn trace_reflections(&mut self, end: Vector) -> std::result::Result<Vec<CandidateOutcome>, PathError> {
        let start = self.start;
        let candidates = self.candidates(end)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Tiles are loaded here, single-threaded; the parallel phase only
        // reads them.
        let prepared: Vec<std::result::Result<(), TileError>> = candidates
            .iter()
            .map(|c| {
                self.prepare_segment(&start, &c.point)?;
                self.prepare_segment(&c.point, &end)
            })
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.threads.min(candidates.len()).max(1))
            .build()
            .map_err(|e| PathError::Pool(e.to_string()))?;

        let cache = &self.cache;
        let settings = &self.settings;
        let outcomes: Vec<_> = pool.install(|| {
            candidates
                .par_iter()
                .zip(prepared.into_par_iter())
                .map(|(candidate, ready)| {
                    ready?;
                    evaluate_reflection(cache, settings, &start, candidate, &end)
                })
                .collect()
        });
        Ok(outcomes)
    }
}

fn evaluate_reflection(
    cache: &TileCache,
    settings: &TracerSettings,
    start: &Vector,
    candidate: &Candidate,
    end: &Vector,
) -> CandidateOutcome {
    let cancel = settings.cancel_on_ground;
    let inbound = evaluate_segment(cache, start, &candidate.point, cancel)?;
    if let SegmentOutcome::GroundHit(_) = inbound {
        debug!(
            reflect = %candidate.point,
            id = ?candidate.id,
            segment = "inbound",
            "Candidate hits ground, dropped"
        );
        return Ok(None);
    }
    let outbound = evaluate_segment(cache, &candidate.point, end, cancel)?;
    if let SegmentOutcome::GroundHit(_) = outbound {
        debug!(
            reflect = %candidate.point,
            id = ?candidate.id,
            segment = "outbound",
            "Candidate hits ground, dropped"
        );
        return Ok(None);
    }

    Ok(Some(RaytracingResult {
        method: PathMethod::Reflection,
        start: *start,
        end: *end,
        reflect: Some(candidate.point),
        distance: start.distance(&candidate.point) + candidate.point.distance(end),
        reflecting_polygon_id: candidate.id.clone(),
        reflecting_polygon_area: Some(candidate.area),
        selection_method: settings.selection,
        counts: inbound.counts() + outbound.counts(),
    }))
}
