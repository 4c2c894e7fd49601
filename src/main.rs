// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use log::info;

use cache_alloc::run_trial;
use cache_alloc::stats::TrialStats;
use cache_alloc::AllocatorKind;
use cache_alloc::SimConfig;
use cache_alloc::TaskNode;
use cache_alloc::WorkloadGenerator;
use cache_alloc::WorkloadKind;

/// cache_alloc: cache-aware task allocation on a simulated multicore
///
/// Generates one synthetic workload, replays it against each selected
/// allocator with fresh per-processor state, and prints the per-processor
/// load and cache state each allocator ended up with.
#[derive(Debug, Parser)]
struct Opts {
    /// Trial configuration as inline JSON, or "f:PATH" / "file:PATH" to read
    /// it from a file. Other flags override individual fields.
    #[clap(long)]
    config: Option<String>,

    /// Number of processors.
    #[clap(short = 'c', long)]
    cores: Option<usize>,

    /// Number of tasks to generate.
    #[clap(short = 'n', long)]
    tasks: Option<usize>,

    /// Total utilization split over the tasks.
    #[clap(short = 'u', long)]
    utilization: Option<f64>,

    /// Fraction of tasks marked highly cache sensitive. Ignored by the
    /// general-purpose workload.
    #[clap(short = 'r', long)]
    high_sensitivity_ratio: Option<f64>,

    /// Seed for the workload generator.
    #[clap(short = 's', long)]
    seed: Option<u64>,

    /// Generate a general-purpose workload instead of a cache-intensive one.
    #[clap(long, action = clap::ArgAction::SetTrue)]
    general: bool,

    /// Allocators to compare. Specify multiple times for more than one.
    #[clap(short = 'a', long = "allocator", value_enum)]
    allocators: Vec<AllocatorKind>,

    /// Enable verbose output. Specify multiple times to increase verbosity.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Opts {
    fn sim_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(input) => SimConfig::parse(input)?,
            None => SimConfig::default(),
        };

        if let Some(cores) = self.cores {
            config.cores = cores;
        }
        if let Some(tasks) = self.tasks {
            config.tasks = tasks;
        }
        if let Some(utilization) = self.utilization {
            config.utilization = utilization;
        }
        if let Some(ratio) = self.high_sensitivity_ratio {
            config.high_sensitivity_ratio = ratio;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.general {
            config.workload = WorkloadKind::General;
        }
        if !self.allocators.is_empty() {
            config.allocators = self.allocators.clone();
        }

        config.validate().context("Invalid trial configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let llv = match opts.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let config = opts.sim_config()?;
    info!(
        "cores={} tasks={} U={:.2} high_ratio={:.2} seed={} workload={:?}",
        config.cores,
        config.tasks,
        config.utilization,
        config.high_sensitivity_ratio,
        config.seed,
        config.workload
    );

    let workload = WorkloadGenerator::new(config.cores, config.seed)
        .with_discard_budget(config.discard_budget)
        .generate(
            config.workload,
            config.tasks,
            config.utilization,
            config.high_sensitivity_ratio,
        );
    let processors = config.processors();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for kind in config.allocators.iter() {
        let mut allocator = kind.build(config.cores);
        let mut tasks: Vec<TaskNode> = workload.iter().map(|t| t.replay_copy()).collect();

        let outcome = run_trial(&mut tasks, allocator.as_mut(), &processors);
        TrialStats::collect(allocator.as_ref(), outcome).format(&mut out)?;
    }
    out.flush()?;

    Ok(())
}
