// Distributed sweep node
// Launch the same binary once per rank: rank 0 binds SWEEP_COORDINATOR_ADDR and
// coordinates, every other rank connects to it and runs experiments.

use std::time::Duration;

use anyhow::Context;
use gs_engine::{Backend, DistributedBackend, DistributedConfig, RunOptions, Sweep, SweepConfig};
use gs_sweep::{Kwargs, ParameterSpace, ReturnSchema};
use gs_types::{Outcome, ValueKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn env_usize(name: &str) -> anyhow::Result<usize> {
    std::env::var(name)
        .with_context(|| format!("{name} is not set"))?
        .parse()
        .with_context(|| format!("{name} must be a non-negative integer"))
}

fn demo_experiment(kwargs: &Kwargs) -> anyhow::Result<Outcome> {
    let (a, b) = (kwargs.int("a")?, kwargs.int("b")?);
    std::thread::sleep(Duration::from_millis(50 * (a + b) as u64));
    Ok(Outcome::named([("sum", a + b), ("product", a * b)]))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let rank = env_usize("SWEEP_RANK")?;
    let size = env_usize("SWEEP_SIZE")?;
    let addr = std::env::var("SWEEP_COORDINATOR_ADDR").unwrap_or_else(|_| "127.0.0.1:7878".to_string());

    let mut config = SweepConfig::new(
        ParameterSpace::new().add("a", 1..=4).add("b", 1..=4),
        ReturnSchema::new()
            .with_output("sum", ValueKind::Int)
            .with_output("product", ValueKind::Int),
    );
    if let Ok(path) = std::env::var("SWEEP_SAVE_PATH") {
        config = config.with_save_path(path);
    }

    let backend = DistributedBackend::tcp(&addr, rank, size, DistributedConfig::default())?;
    let auto_save = config.save_path.is_some();
    let mut sweep = Sweep::new(demo_experiment, config, Backend::Distributed(backend))?;
    let summary = sweep.run(&RunOptions::default().with_timeit(true).with_auto_save(auto_save))?;

    if sweep.is_coordinator() {
        info!(
            "Sweep finished: {} completed, {} failed in {:.2?}",
            summary.completed, summary.failed, summary.elapsed
        );
    } else {
        info!("Rank {} ran {} experiments", rank, summary.served);
    }
    Ok(())
}
