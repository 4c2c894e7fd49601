// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Cache-adjusted execution time.
//!
//! A task placed on a processor whose caches are not yet crowded runs
//! faster than its nominal time. The saving per level is the estimated hit
//! ratio times the task's sensitivity times a per-level factor; the total is
//! boosted for very sensitive tasks and capped at half the nominal time.
use crate::cache_state::ProcessorCacheState;
use crate::task::CacheLevel;
use crate::task::TaskNode;

/// Fraction of execution time saved per unit of hit ratio and sensitivity.
pub const LEVEL_SAVINGS: [f64; 3] = [0.25, 0.15, 0.08];
pub const MAX_SAVINGS: f64 = 0.5;

/// Boost applied to very (> 0.8) and fairly (> 0.6) sensitive tasks. Shared
/// with the allocator's cache benefit score.
pub fn sensitivity_multiplier(sensitivity: f64) -> f64 {
    if sensitivity > 0.8 {
        1.15
    } else if sensitivity > 0.6 {
        1.08
    } else {
        1.0
    }
}

/// Fraction of the nominal time saved on a processor in `state`, in
/// `[0, MAX_SAVINGS]`. Zero for tasks without usable weights.
pub fn savings(task: &TaskNode, state: &ProcessorCacheState) -> f64 {
    let weights = match task.valid_weights() {
        Some(w) => w,
        None => return 0.0,
    };
    let sensitivity = task.sensitivity();

    let total: f64 = CacheLevel::ALL
        .iter()
        .map(|level| {
            state.estimated_hit_ratio(*level, weights.level(*level))
                * sensitivity
                * LEVEL_SAVINGS[level.index()]
        })
        .sum();

    (total * sensitivity_multiplier(sensitivity)).clamp(0.0, MAX_SAVINGS)
}

/// Realized duration of `task` on a processor. Without cache state for the
/// processor, or without usable weights, this is the nominal time.
pub fn adjusted_execution_time(task: &TaskNode, state: Option<&ProcessorCacheState>) -> u64 {
    let nominal = task.nominal_execution_time;
    let state = match state {
        Some(state) => state,
        None => return nominal,
    };

    let adjusted = (nominal as f64 * (1.0 - savings(task, state))) as u64;
    adjusted.max(nominal / 2).min(nominal)
}
