// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Synthetic workload generation
//!
//! Task sets are built in two steps: UUnifast-Discard splits the requested
//! total utilization over the tasks, then each utilization is turned into a
//! task with a period, a nominal execution time, a cache sensitivity, a
//! cache-weight vector and an optional processor affinity.
//!
//! Two variants exist:
//!
//! - The general-purpose generator draws periods from a fixed menu, derives
//!   execution time as `utilization * period`, and draws sensitivity from
//!   three tiers (high 40%, medium 40%, low 20%) and weights from three
//!   access archetypes.
//!
//! - The cache-intensive generator, used for allocator comparisons, works on
//!   a nanosecond-ish scale (`utilization * 1_000_000`) and lets the caller
//!   mark a fixed fraction of the tasks as highly cache sensitive. Those get
//!   L1-heavy weight vectors.
use log::debug;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::Deserialize;
use serde::Serialize;

use crate::task::CacheWeights;
use crate::task::NodeType;
use crate::task::TaskNode;
use crate::uunifast::UUnifastDiscard;
use crate::uunifast::DEFAULT_DISCARD_BUDGET;

/// Candidate task periods.
pub const PERIODS: [u64; 7] = [10, 20, 50, 100, 200, 500, 1000];

/// Shortest execution time handed out by the general-purpose generator.
pub const MIN_EXECUTION_TIME: u64 = 10;

/// Time units per unit of utilization for the cache-intensive generator.
pub const INTENSIVE_TIME_SCALE: f64 = 1_000_000.0;
pub const MIN_INTENSIVE_EXECUTION_TIME: u64 = 10_000;

const AFFINITY_PROBABILITY: f64 = 0.6;
const CRITICAL_PROBABILITY: f64 = 0.3;
const TASKS_PER_DAG: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    General,
    #[default]
    CacheIntensive,
}

/// Access archetypes a weight vector is drawn from. Each row is the
/// `[low, high)` range of the raw L1, L2, L3 and memory weights before
/// normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightProfile {
    /// Mostly hits close to the core.
    ComputeBound,
    /// Working set lives in L2/L3.
    DataBound,
    /// Streams through memory.
    MemoryBound,
    /// Cache-intensive task marked highly sensitive.
    L1Heavy,
    /// Cache-intensive task with a flatter distribution.
    Spread,
}

impl WeightProfile {
    fn ranges(self) -> [(f64, f64); 4] {
        match self {
            WeightProfile::ComputeBound => [(0.5, 0.8), (0.2, 0.4), (0.1, 0.2), (0.05, 0.15)],
            WeightProfile::DataBound => [(0.2, 0.4), (0.3, 0.5), (0.2, 0.4), (0.1, 0.3)],
            WeightProfile::MemoryBound => [(0.1, 0.3), (0.2, 0.4), (0.2, 0.4), (0.3, 0.5)],
            WeightProfile::L1Heavy => [(0.6, 0.9), (0.2, 0.4), (0.1, 0.2), (0.02, 0.05)],
            WeightProfile::Spread => [(0.3, 0.6), (0.2, 0.4), (0.15, 0.3), (0.05, 0.2)],
        }
    }

    fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> CacheWeights {
        let raw = self.ranges().map(|(lo, hi)| rng.gen_range(lo..hi));
        // Every range has a positive lower bound, so normalization succeeds.
        CacheWeights::normalized(raw).unwrap_or_else(CacheWeights::balanced)
    }
}

pub struct WorkloadGenerator {
    cores: usize,
    discard_budget: usize,
    rng: Pcg64,
}

impl WorkloadGenerator {
    pub fn new(cores: usize, seed: u64) -> Self {
        Self {
            cores,
            discard_budget: DEFAULT_DISCARD_BUDGET,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    pub fn with_discard_budget(mut self, discard_budget: usize) -> Self {
        self.discard_budget = discard_budget;
        self
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    /// Split `total_utilization` over `task_count` tasks, each capped at the
    /// number of cores.
    pub fn utilizations(&mut self, task_count: usize, total_utilization: f64) -> Vec<f64> {
        UUnifastDiscard::new(
            total_utilization,
            task_count,
            self.cores as f64,
            self.discard_budget,
        )
        .utilizations(&mut self.rng)
    }

    pub fn generate(
        &mut self,
        kind: WorkloadKind,
        task_count: usize,
        total_utilization: f64,
        high_sensitivity_ratio: f64,
    ) -> Vec<TaskNode> {
        match kind {
            WorkloadKind::General => self.general_tasks(task_count, total_utilization),
            WorkloadKind::CacheIntensive => {
                self.cache_intensive_tasks(task_count, total_utilization, high_sensitivity_ratio)
            }
        }
    }

    /// General-purpose task set.
    pub fn general_tasks(&mut self, task_count: usize, total_utilization: f64) -> Vec<TaskNode> {
        let utils = self.utilizations(task_count, total_utilization);
        let tasks: Vec<TaskNode> = utils
            .into_iter()
            .enumerate()
            .map(|(id, util)| self.general_task(id, util))
            .collect();

        debug!(
            "Generated {} general tasks (U={:.3}, {} cores)",
            tasks.len(),
            total_utilization,
            self.cores
        );
        tasks
    }

    /// Task set where the first `high_sensitivity_ratio` fraction of tasks is
    /// highly cache sensitive.
    pub fn cache_intensive_tasks(
        &mut self,
        task_count: usize,
        total_utilization: f64,
        high_sensitivity_ratio: f64,
    ) -> Vec<TaskNode> {
        let ratio = if high_sensitivity_ratio.is_nan() {
            0.0
        } else {
            high_sensitivity_ratio.clamp(0.0, 1.0)
        };
        let nr_high = (task_count as f64 * ratio) as usize;

        let utils = self.utilizations(task_count, total_utilization);
        let tasks: Vec<TaskNode> = utils
            .into_iter()
            .enumerate()
            .map(|(id, util)| self.cache_intensive_task(id, util, id < nr_high))
            .collect();

        debug!(
            "Generated {} cache-intensive tasks ({} high sensitivity, U={:.3}, {} cores)",
            tasks.len(),
            nr_high,
            total_utilization,
            self.cores
        );
        tasks
    }

    fn general_task(&mut self, id: usize, util: f64) -> TaskNode {
        let period = self.period();
        let wcet = ((util * period as f64) as u64)
            .max(MIN_EXECUTION_TIME)
            .min(period);

        let sensitivity = self.tiered_sensitivity();
        let weights = self.archetype_weights();
        let affinity = self.affinity();
        let mut task = TaskNode::new(id, wcet)
            .with_dag(id / TASKS_PER_DAG, 0, NodeType::Normal)
            .with_sensitivity(sensitivity)
            .with_weights(weights)
            .with_affinity(affinity);
        task.critical = self.rng.gen_bool(CRITICAL_PROBABILITY);
        task
    }

    fn cache_intensive_task(&mut self, id: usize, util: f64, high: bool) -> TaskNode {
        let wcet = ((util * INTENSIVE_TIME_SCALE) as u64).max(MIN_INTENSIVE_EXECUTION_TIME);

        let sensitivity = if high {
            self.rng.gen_range(0.7..0.95)
        } else {
            self.rng.gen_range(0.1..0.6)
        };
        let profile = if high {
            WeightProfile::L1Heavy
        } else {
            WeightProfile::Spread
        };
        let weights = profile.sample(&mut self.rng);
        let affinity = self.affinity();

        TaskNode::new(id, wcet)
            .with_dag(0, 0, NodeType::Normal)
            .with_sensitivity(sensitivity)
            .with_weights(weights)
            .with_affinity(affinity)
    }

    fn period(&mut self) -> u64 {
        PERIODS[self.rng.gen_range(0..PERIODS.len())]
    }

    fn tiered_sensitivity(&mut self) -> f64 {
        let tier: f64 = self.rng.gen();
        if tier < 0.4 {
            self.rng.gen_range(0.7..1.0)
        } else if tier < 0.8 {
            self.rng.gen_range(0.3..0.7)
        } else {
            self.rng.gen_range(0.0..0.3)
        }
    }

    fn archetype_weights(&mut self) -> CacheWeights {
        let kind: f64 = self.rng.gen();
        let profile = if kind < 0.3 {
            WeightProfile::ComputeBound
        } else if kind < 0.6 {
            WeightProfile::DataBound
        } else {
            WeightProfile::MemoryBound
        };
        profile.sample(&mut self.rng)
    }

    fn affinity(&mut self) -> Option<usize> {
        if self.cores > 0 && self.rng.gen_bool(AFFINITY_PROBABILITY) {
            Some(self.rng.gen_range(0..self.cores))
        } else {
            None
        }
    }
}

/// Generate a cache-intensive task sequence from scratch.
pub fn generate(
    core_count: usize,
    task_count: usize,
    total_utilization: f64,
    high_sensitivity_ratio: f64,
    seed: u64,
) -> Vec<TaskNode> {
    WorkloadGenerator::new(core_count, seed).cache_intensive_tasks(
        task_count,
        total_utilization,
        high_sensitivity_ratio,
    )
}
