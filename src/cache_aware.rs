// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Cache-aware allocator
//!
//! Every ready task is scored against each candidate processor and placed on
//! the best one. Only the winning processor's state is touched afterwards.
//!
//! Scoring
//! -------
//!
//! ```text
//!   score(p) = 0.40 * cache_benefit
//!            + 0.30 * load_balance
//!            + 0.20 * affinity
//!            + 0.10 * quality
//!            - 0.05 * interference
//! ```
//!
//! - cache_benefit rewards placing sensitive tasks where the levels they
//!   hit are still cool. Tasks without usable weights get a neutral 0.5.
//!
//! - load_balance is `1 - L / (L + ET)`, so a processor that has already
//!   accumulated a lot of work relative to the task scores low. With both
//!   terms zero it scores 1.
//!
//! - affinity mixes how close the task's sensitivity is to the processor's
//!   running mean with the distance to the task's preferred processor.
//!
//! - quality prefers moderately warm caches and processors that have seen
//!   few tasks.
//!
//! - interference grows with the processor's task count and the sensitivity
//!   mismatch.
//!
//! The greatest score wins. Ties go to the candidate listed first, which
//! makes the result depend only on the candidate order and the state.
//!
//! Commit
//! ------
//!
//! The task's nominal execution time is added to the chosen processor's load
//! and its cache state absorbs the task (see
//! [`ProcessorCacheState::commit`]). The hit ratios produced by the commit
//! are written back to the task.
use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use log::trace;
use log::warn;

use crate::allocator::Allocator;
use crate::cache_state::HitCounters;
use crate::cache_state::HitRatioBreakdown;
use crate::cache_state::ProcessorCacheState;
use crate::cache_state::ProcessorSnapshot;
use crate::exec_time;
use crate::task::CacheLevel;
use crate::task::TaskNode;

const W_CACHE: f64 = 0.40;
const W_LOAD: f64 = 0.30;
const W_AFFINITY: f64 = 0.20;
const W_QUALITY: f64 = 0.10;
const W_INTERFERENCE: f64 = 0.05;

const NEUTRAL: f64 = 0.5;

const BENEFIT_FACTOR: [f64; 3] = [0.6, 0.4, 0.3];
const UTIL_PENALTY: [f64; 3] = [0.7, 0.5, 0.3];

const OPTIMAL_UTIL: [f64; 3] = [0.6, 0.5, 0.4];
const QUALITY_WEIGHT: [f64; 3] = [0.5, 0.3, 0.2];
const FRESH_BONUS: f64 = 0.3;
const FRESH_BELOW: u32 = 3;
const CROWDED_PENALTY: f64 = 0.2;
const CROWDED_ABOVE: u32 = 8;

const SENS_MATCH: f64 = 0.3;
const HINT_FALLOFF: f64 = 0.1;

const CROWD_STEP: f64 = 0.05;
const CROWD_MAX: f64 = 0.3;
const MISMATCH: f64 = 0.15;

/// A score must beat this to be selected over the fallback.
const SCORE_FLOOR: f64 = 0.0;

/// Components of one (task, processor) score.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub cache_benefit: f64,
    pub load_balance: f64,
    pub affinity: f64,
    pub quality: f64,
    pub interference: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    fn new(
        cache_benefit: f64,
        load_balance: f64,
        affinity: f64,
        quality: f64,
        interference: f64,
    ) -> Self {
        let total = W_CACHE * cache_benefit
            + W_LOAD * load_balance
            + W_AFFINITY * affinity
            + W_QUALITY * quality
            - W_INTERFERENCE * interference;
        Self {
            cache_benefit,
            load_balance,
            affinity,
            quality,
            interference,
            total,
        }
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "score={:6.4} (cache={:5.3} load={:5.3} aff={:5.3} qual={:5.3} intf={:5.3})",
            self.total,
            self.cache_benefit,
            self.load_balance,
            self.affinity,
            self.quality,
            self.interference
        )
    }
}

fn cache_benefit(task: &TaskNode, state: &ProcessorCacheState) -> f64 {
    let weights = match task.valid_weights() {
        Some(w) => w,
        None => return NEUTRAL,
    };
    let sensitivity = task.sensitivity();

    let benefit: f64 = CacheLevel::ALL
        .iter()
        .map(|level| {
            let i = level.index();
            weights.level(*level)
                * sensitivity
                * BENEFIT_FACTOR[i]
                * (1.0 - state.utilization(*level) * UTIL_PENALTY[i])
        })
        .sum();

    benefit * exec_time::sensitivity_multiplier(sensitivity)
}

fn load_balance(load: f64, execution_time: f64) -> f64 {
    let denom = load + execution_time;
    if denom > 0.0 {
        1.0 - load / denom
    } else {
        1.0
    }
}

fn affinity(task: &TaskNode, state: &ProcessorCacheState, processor: usize) -> f64 {
    let mut score = 0.0;

    let avg = state.avg_sensitivity();
    if avg > 0.0 {
        score += SENS_MATCH * (1.0 - (task.sensitivity() - avg).abs());
    } else {
        score += NEUTRAL;
    }

    match task.affinity {
        Some(hint) => {
            score += (1.0 - HINT_FALLOFF * hint.abs_diff(processor) as f64).max(0.0);
        }
        None => score += NEUTRAL,
    }

    score.clamp(0.0, 1.0)
}

fn quality(state: &ProcessorCacheState) -> f64 {
    let mut score: f64 = CacheLevel::ALL
        .iter()
        .map(|level| {
            let i = level.index();
            QUALITY_WEIGHT[i] * (1.0 - (state.utilization(*level) - OPTIMAL_UTIL[i]).abs())
        })
        .sum();

    let count = state.recent_task_count();
    if count < FRESH_BELOW {
        score += FRESH_BONUS;
    } else if count > CROWDED_ABOVE {
        score -= CROWDED_PENALTY;
    }

    score.clamp(0.0, 1.0)
}

fn interference(task: &TaskNode, state: &ProcessorCacheState) -> f64 {
    (state.recent_task_count() as f64 * CROWD_STEP).min(CROWD_MAX)
        + MISMATCH * (task.sensitivity() - state.avg_sensitivity()).abs()
}

/// Scores candidates on cache state, load, affinity and cache quality.
///
/// Processor state is created the first time a processor id shows up in a
/// candidate list, so the allocator needs no up-front processor count.
#[derive(Clone, Debug, Default)]
pub struct CacheAwareAllocator {
    states: BTreeMap<usize, ProcessorCacheState>,
    loads: BTreeMap<usize, f64>,
}

impl CacheAwareAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score `task` on `processor` without changing any state. A processor
    /// that has never been seen scores as a cold one.
    pub fn score(&self, task: &TaskNode, processor: usize) -> ScoreBreakdown {
        let cold = ProcessorCacheState::default();
        let state = self.states.get(&processor).unwrap_or(&cold);
        let load = self.load(processor);

        ScoreBreakdown::new(
            cache_benefit(task, state),
            load_balance(load, task.nominal_execution_time as f64),
            affinity(task, state, processor),
            quality(state),
            interference(task, state),
        )
    }

    pub fn load(&self, processor: usize) -> f64 {
        self.loads.get(&processor).copied().unwrap_or(0.0)
    }

    pub fn state(&self, processor: usize) -> Option<&ProcessorCacheState> {
        self.states.get(&processor)
    }

    pub fn snapshot(&self, processor: usize) -> Option<ProcessorSnapshot> {
        self.states
            .get(&processor)
            .map(|state| ProcessorSnapshot::new(processor, state, self.load(processor)))
    }

    /// Cumulative hit ratios of everything placed on `processor`.
    pub fn processor_hit_ratios(&self, processor: usize) -> Option<HitRatioBreakdown> {
        self.states
            .get(&processor)
            .map(|state| state.counters().breakdown())
    }

    fn commit(&mut self, task: &mut TaskNode, processor: usize) {
        *self.loads.entry(processor).or_insert(0.0) += task.nominal_execution_time as f64;

        let weights = task.valid_weights().copied();
        let state = self.states.entry(processor).or_default();
        if let Some((overall, per_level)) = state.commit(task.sensitivity(), weights.as_ref()) {
            task.record_hit_ratios(overall, per_level);
        }
    }
}

impl Allocator for CacheAwareAllocator {
    fn name(&self) -> &'static str {
        "cache_aware"
    }

    fn allocate(&mut self, task: &mut TaskNode, available: &[usize]) -> Option<usize> {
        if task.partition().is_some() {
            debug!("{} already placed, not reallocating", task.short_name());
            return None;
        }
        let first = *available.first()?;

        if task.has_malformed_weights() {
            warn!(
                "{}: ignoring malformed cache weights {:?}",
                task.short_name(),
                task.weights.map(|w| *w.as_array())
            );
        }

        let mut best: Option<(usize, f64)> = None;
        for &proc in available {
            self.states.entry(proc).or_default();
            self.loads.entry(proc).or_insert(0.0);

            let score = self.score(task, proc);
            trace!("{} on PROC[{:02}] {}", task.short_name(), proc, score);

            let floor = best.map_or(SCORE_FLOOR, |(_, s)| s);
            if score.total > floor {
                best = Some((proc, score.total));
            }
        }

        let proc = match best {
            Some((proc, _)) => proc,
            None => {
                debug!(
                    "{}: no candidate scored above {}, falling back to PROC[{:02}]",
                    task.short_name(),
                    SCORE_FLOOR,
                    first
                );
                first
            }
        };

        task.assign_partition(proc);
        self.commit(task, proc);

        debug!(
            "CA {} (s={:4.2} et={}) --> PROC[{:02}] load={:.0} hit={:5.3}",
            task.short_name(),
            task.sensitivity(),
            task.nominal_execution_time,
            proc,
            self.load(proc),
            task.cache_hit_ratio
        );
        Some(proc)
    }

    fn execution_time(&self, task: &TaskNode, processor: usize) -> u64 {
        exec_time::adjusted_execution_time(task, self.states.get(&processor))
    }

    fn reset(&mut self) {
        self.states.clear();
        self.loads.clear();
    }

    fn snapshots(&self) -> Vec<ProcessorSnapshot> {
        self.states
            .iter()
            .map(|(id, state)| ProcessorSnapshot::new(*id, state, self.load(*id)))
            .collect()
    }

    fn hit_ratios(&self) -> Option<HitRatioBreakdown> {
        let mut total = HitCounters::default();
        for state in self.states.values() {
            total.merge(state.counters());
        }
        Some(total.breakdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::CacheWeights;

    fn sensitive_task(id: usize) -> TaskNode {
        TaskNode::new(id, 1000)
            .with_sensitivity(0.9)
            .with_weights(CacheWeights::normalized([0.7, 0.2, 0.08, 0.02]).unwrap())
    }

    #[test]
    fn test_load_balance_guards_zero() {
        assert_eq!(load_balance(0.0, 0.0), 1.0);
        assert_eq!(load_balance(0.0, 100.0), 1.0);
        assert!((load_balance(100.0, 100.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_cold_score_components() {
        let ca = CacheAwareAllocator::new();
        let task = sensitive_task(0);
        let score = ca.score(&task, 0);

        let benefit = (0.7 * 0.9 * 0.6 + 0.2 * 0.9 * 0.4 + 0.08 * 0.9 * 0.3) * 1.15;
        assert!((score.cache_benefit - benefit).abs() < 1e-12);
        assert_eq!(score.load_balance, 1.0);
        assert_eq!(score.affinity, 1.0);
        // 0.5 * 0.4 + 0.3 * 0.5 + 0.2 * 0.6 + fresh bonus, clamped.
        assert!((score.quality - 0.77).abs() < 1e-12);
        assert!((score.interference - 0.15 * 0.9).abs() < 1e-12);
    }

    fn fill(ca: &mut CacheAwareAllocator, count: usize, weighted: bool) {
        for id in 0..count {
            let mut task = TaskNode::new(id, 100).with_sensitivity(0.5);
            if weighted {
                task = task.with_weights(CacheWeights::balanced());
            }
            ca.allocate(&mut task, &[0]);
        }
    }

    #[test]
    fn test_quality_and_interference_by_task_count() {
        // Weightless tasks leave utilization at zero, so the level term of
        // quality stays at 0.5 * 0.4 + 0.3 * 0.5 + 0.2 * 0.6 = 0.47.
        let probe = TaskNode::new(99, 100).with_sensitivity(0.5);
        let cases = [
            (2, 0.77, 0.10),
            (3, 0.47, 0.15),
            (5, 0.47, 0.25),
            (8, 0.47, 0.30),
            (9, 0.27, 0.30),
            (12, 0.27, 0.30),
        ];
        for (count, want_quality, want_interference) in cases {
            let mut ca = CacheAwareAllocator::new();
            fill(&mut ca, count, false);
            assert_eq!(ca.state(0).unwrap().recent_task_count(), count as u32);

            let score = ca.score(&probe, 0);
            assert!((score.quality - want_quality).abs() < 1e-12, "{}: {}", count, score);
            assert!(
                (score.interference - want_interference).abs() < 1e-12,
                "{}: {}",
                count,
                score
            );
        }
    }

    #[test]
    fn test_crowded_processor_quality_penalty() {
        let mut ca = CacheAwareAllocator::new();
        fill(&mut ca, 12, true);
        let state = ca.state(0).unwrap();
        assert_eq!(state.recent_task_count(), 12);

        let levels: f64 = CacheLevel::ALL
            .iter()
            .map(|level| {
                let i = level.index();
                QUALITY_WEIGHT[i] * (1.0 - (state.utilization(*level) - OPTIMAL_UTIL[i]).abs())
            })
            .sum();
        let probe = TaskNode::new(99, 100).with_sensitivity(0.5);
        let score = ca.score(&probe, 0);
        assert!(state.utilization(CacheLevel::L1) > 0.0);
        assert!((score.quality - (levels - 0.2)).abs() < 1e-12);
        assert_eq!(score.interference, 0.3);
    }

    #[test]
    fn test_missing_weights_are_neutral() {
        let ca = CacheAwareAllocator::new();
        let task = TaskNode::new(0, 10).with_sensitivity(0.7);
        assert_eq!(ca.score(&task, 3).cache_benefit, 0.5);

        let task = task.with_weights(CacheWeights::from_raw([0.5, 0.5, 0.5, 0.5]));
        assert_eq!(ca.score(&task, 3).cache_benefit, 0.5);
    }

    #[test]
    fn test_affinity_hint_distance() {
        let ca = CacheAwareAllocator::new();
        let task = TaskNode::new(0, 10).with_affinity(Some(4));
        assert_eq!(ca.score(&task, 4).affinity, 1.0);
        assert!((ca.score(&task, 1).affinity - 1.0).abs() < 1e-12);

        // Hint far away: 0.5 from the cold mean plus nothing from the hint.
        assert!((ca.score(&task, 20).affinity - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_commit_only_touches_winner() {
        let mut ca = CacheAwareAllocator::new();
        let mut task = sensitive_task(0);
        assert_eq!(ca.allocate(&mut task, &[0, 1]), Some(0));

        assert_eq!(ca.load(0), 1000.0);
        assert_eq!(ca.load(1), 0.0);
        assert_eq!(ca.state(0).unwrap().recent_task_count(), 1);
        assert_eq!(ca.state(1).unwrap().recent_task_count(), 0);
        assert!(task.cache_hit_ratio > 0.0);
        assert!(ca.processor_hit_ratios(1).unwrap().overall == 0.0);
    }

    #[test]
    fn test_score_is_pure() {
        let mut ca = CacheAwareAllocator::new();
        let mut first = sensitive_task(0);
        ca.allocate(&mut first, &[0, 1]);

        let probe = sensitive_task(1);
        let before = ca.score(&probe, 0);
        let _ = ca.score(&probe, 5);
        assert_eq!(ca.score(&probe, 0), before);
        assert!(ca.state(5).is_none());
    }

    #[test]
    fn test_already_placed_is_rejected() {
        let mut ca = CacheAwareAllocator::new();
        let mut task = sensitive_task(0);
        ca.allocate(&mut task, &[0, 1]);
        assert_eq!(ca.allocate(&mut task, &[0, 1]), None);
        assert_eq!(ca.load(0), 1000.0);
        assert_eq!(ca.state(0).unwrap().recent_task_count(), 1);
    }

    #[test]
    fn test_execution_time_uses_state() {
        let mut ca = CacheAwareAllocator::new();
        let task = sensitive_task(0);
        assert_eq!(ca.execution_time(&task, 0), 1000);

        let mut placed = sensitive_task(1);
        ca.allocate(&mut placed, &[0]);
        let et = ca.execution_time(&task, 0);
        assert!(et < 1000 && et >= 500);
    }
}
