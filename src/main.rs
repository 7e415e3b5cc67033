//! # Application Entry Point
//!
//! Parses the CLI into [`Config`], initializes logging and the global
//! thread pool, and hands off to the run pipeline.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use demix::config::Config;
use demix::pipelines::RunPipeline;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse_and_validate().context("invalid configuration")?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.nthreads())
        .build_global()
        .context("failed to initialize thread pool")?;

    let summary = RunPipeline::new(config).run().context("inference failed")?;

    for row in &summary.evidence {
        println!(
            "K={}  logEvidence(harmonic)={:.4} +/- {:.4}{}",
            row.k,
            row.harmonic_mean,
            row.harmonic_std_err,
            match (row.ti_estimate, row.ti_std_err) {
                (Some(ti), Some(se)) => format!("  logEvidence(TI)={:.4} +/- {:.4}", ti, se),
                _ => String::new(),
            }
        );
    }
    Ok(())
}
