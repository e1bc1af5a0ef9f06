use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use terrain_raytracer::config::{CliArgs, RunConfig};
use terrain_raytracer::pipeline::Pipeline;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Init tracing
    let filter = if args.verbose {
        EnvFilter::new("terrain_raytracer=debug")
    } else {
        EnvFilter::new("terrain_raytracer=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config: RunConfig = args.into();

    match Pipeline::run(&config) {
        Ok(summary) => {
            println!(
                "Done: {} records for {} end points ({} failed) in {:.2}s, output {}",
                summary.records,
                summary.paths,
                summary.failed,
                summary.duration.as_secs_f64(),
                config.output.display()
            );
            Ok(())
        }
        Err(e) => {
            error!(%e, "Run failed");
            Err(anyhow::anyhow!(e)).context("terrain-raytracer run failed")
        }
    }
}
