// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Per-processor cache model
//!
//! Each processor carries a coarse occupancy estimate for its three cache
//! levels, a count of recently placed tasks, the running mean of their
//! sensitivities, and cumulative access/hit counters. Nothing here models
//! sets, ways or tags: utilization only rises as sensitive tasks land on the
//! processor and decays once the processor has seen a handful of tasks.
use std::fmt;

use crate::task::CacheLevel;
use crate::task::CacheWeights;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HitCounters {
    accesses: [f64; 3],
    hits: [f64; 3],
}

fn ratio(hits: f64, accesses: f64) -> f64 {
    if accesses > 0.0 {
        (hits / accesses).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl HitCounters {
    pub fn record(&mut self, level: CacheLevel, accesses: f64, hits: f64) {
        self.accesses[level.index()] += accesses;
        self.hits[level.index()] += hits;
    }

    pub fn accesses(&self, level: CacheLevel) -> f64 {
        self.accesses[level.index()]
    }

    pub fn hits(&self, level: CacheLevel) -> f64 {
        self.hits[level.index()]
    }

    pub fn total_accesses(&self) -> f64 {
        self.accesses.iter().sum()
    }

    pub fn total_hits(&self) -> f64 {
        self.hits.iter().sum()
    }

    /// Hit ratio of one level, 0.0 when the level was never accessed.
    pub fn hit_ratio(&self, level: CacheLevel) -> f64 {
        ratio(self.hits(level), self.accesses(level))
    }

    /// Hit ratio over all three levels, 0.0 without any access.
    pub fn overall_hit_ratio(&self) -> f64 {
        ratio(self.total_hits(), self.total_accesses())
    }

    pub fn merge(&mut self, other: &HitCounters) {
        for i in 0..3 {
            self.accesses[i] += other.accesses[i];
            self.hits[i] += other.hits[i];
        }
    }

    pub fn breakdown(&self) -> HitRatioBreakdown {
        HitRatioBreakdown {
            l1: self.hit_ratio(CacheLevel::L1),
            l2: self.hit_ratio(CacheLevel::L2),
            l3: self.hit_ratio(CacheLevel::L3),
            overall: self.overall_hit_ratio(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HitRatioBreakdown {
    pub l1: f64,
    pub l2: f64,
    pub l3: f64,
    pub overall: f64,
}

impl fmt::Display for HitRatioBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hit L1={:5.3} L2={:5.3} L3={:5.3} overall={:5.3}",
            self.l1, self.l2, self.l3, self.overall
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessorCacheState {
    utilization: [f64; 3],
    recent_task_count: u32,
    avg_sensitivity: f64,
    counters: HitCounters,
}

impl ProcessorCacheState {
    /// Upper bound of each level's utilization.
    pub const UTIL_CAP: [f64; 3] = [0.9, 0.8, 0.7];
    /// Per-level damping applied both when warming a level and when
    /// estimating its hit ratio.
    pub const DAMP: [f64; 3] = [0.8, 0.6, 0.4];
    /// Utilization added per unit of sensitivity-weighted access.
    pub const WARM_STEP: f64 = 0.05;
    /// Past this many tasks every level decays on each new placement.
    pub const DECAY_AFTER: u32 = 5;
    pub const DECAY_FACTOR: f64 = 0.95;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn utilization(&self, level: CacheLevel) -> f64 {
        self.utilization[level.index()]
    }

    pub fn recent_task_count(&self) -> u32 {
        self.recent_task_count
    }

    pub fn avg_sensitivity(&self) -> f64 {
        self.avg_sensitivity
    }

    pub fn counters(&self) -> &HitCounters {
        &self.counters
    }

    /// Estimated hit ratio for a level given the share of accesses the task
    /// sends there.
    pub fn estimated_hit_ratio(&self, level: CacheLevel, weight: f64) -> f64 {
        let i = level.index();
        (weight * (1.0 - self.utilization[i] * Self::DAMP[i])).max(0.0)
    }

    pub fn estimated_hit_ratios(&self, weights: &CacheWeights) -> [f64; 3] {
        CacheLevel::ALL.map(|level| self.estimated_hit_ratio(level, weights.level(level)))
    }

    /// Account for a task placed on this processor and return the hit ratios
    /// recorded for it: per level, and the processor's cumulative ratio right
    /// after this task's accesses were added. Without weights the cache
    /// levels are left alone (no warming, no decay) and `None` is returned.
    pub fn commit(
        &mut self,
        sensitivity: f64,
        weights: Option<&CacheWeights>,
    ) -> Option<(f64, [f64; 3])> {
        let prev_count = self.recent_task_count;
        self.recent_task_count += 1;

        if let Some(weights) = weights {
            let step = sensitivity * Self::WARM_STEP;
            for level in CacheLevel::ALL {
                let i = level.index();
                let warmed = self.utilization[i] + step * weights.level(level) * Self::DAMP[i];
                self.utilization[i] = warmed.min(Self::UTIL_CAP[i]);
            }

            if self.recent_task_count > Self::DECAY_AFTER {
                for util in self.utilization.iter_mut() {
                    *util *= Self::DECAY_FACTOR;
                }
            }
        }

        self.avg_sensitivity =
            (self.avg_sensitivity * prev_count as f64 + sensitivity) / (prev_count as f64 + 1.0);

        let weights = weights?;
        let per_level = self.estimated_hit_ratios(weights);
        for level in CacheLevel::ALL {
            let accesses = weights.level(level) * sensitivity;
            self.counters
                .record(level, accesses, accesses * per_level[level.index()]);
        }
        Some((self.counters.overall_hit_ratio(), per_level))
    }
}

/// Point-in-time view of one processor for progress reporting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessorSnapshot {
    pub id: usize,
    pub l1: f64,
    pub l2: f64,
    pub l3: f64,
    pub recent_task_count: u32,
    pub avg_sensitivity: f64,
    pub load: f64,
}

impl ProcessorSnapshot {
    pub fn new(id: usize, state: &ProcessorCacheState, load: f64) -> Self {
        Self {
            id,
            l1: state.utilization(CacheLevel::L1),
            l2: state.utilization(CacheLevel::L2),
            l3: state.utilization(CacheLevel::L3),
            recent_task_count: state.recent_task_count(),
            avg_sensitivity: state.avg_sensitivity(),
            load,
        }
    }
}

impl fmt::Display for ProcessorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PROC[{:02}] L1={:4.2} L2={:4.2} L3={:4.2} tasks={} avg_sens={:5.3} load={:.0}",
            self.id,
            self.l1,
            self.l2,
            self.l3,
            self.recent_task_count,
            self.avg_sensitivity,
            self.load
        )
    }
}
