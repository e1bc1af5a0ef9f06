use std::time::{Duration, Instant};

use tracing::info;

use crate::config::RunConfig;
use crate::error::Result;
use crate::raytracing::Raytracer;
use crate::tiles::{CacheStats, TileCache};

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunSummary {
    /// End points traced.
    pub paths: usize,
    /// Records written to the result sink.
    pub records: usize,
    /// Paths that could not be evaluated.
    pub failed: usize,
    /// Reflection candidates dropped on a ground hit.
    pub dropped: usize,
    pub duration: Duration,
    pub cache: CacheStats,
}

/// Run orchestrator: builds the tile cache and raytracer, traces every end
/// point and closes the result sink.
pub struct Pipeline;

impl Pipeline {
    pub fn run(config: &RunConfig) -> Result<RunSummary> {
        Self::run_with_cache(config, TileCache::new(config.cache.clone()))
    }

    /// Like [`Pipeline::run`] with a caller-supplied cache, e.g. one with
    /// custom decoders or fetcher.
    pub fn run_with_cache(config: &RunConfig, cache: TileCache) -> Result<RunSummary> {
        let started = Instant::now();
        config.validate()?;

        info!(
            start = %config.start,
            ends = config.ends.len(),
            mode = %config.mode,
            resolution = config.cache.resolution,
            "Starting run"
        );

        // Opens the sink; nothing is traced if that fails.
        let mut tracer = Raytracer::new(config.start, config.tracer.clone(), cache, &config.output)?;

        for (i, end) in config.ends.iter().enumerate() {
            let records = tracer.trace(*end, config.mode)?;
            info!(path = i, end = %end, records = records.len(), "Path traced");
        }

        let failed = tracer.failed();
        let dropped = tracer.dropped();
        let cache = tracer.cache().stats();
        let records = tracer.finish()?;
        let duration = started.elapsed();

        info!(
            records,
            failed,
            dropped,
            memory_hits = cache.memory_hits,
            cache_file_loads = cache.cache_file_loads,
            raw_loads = cache.raw_loads,
            downloads = cache.downloads,
            elapsed = ?duration,
            "Run complete"
        );

        Ok(RunSummary {
            paths: config.ends.len(),
            records,
            failed,
            dropped,
            duration,
            cache,
        })
    }
}
