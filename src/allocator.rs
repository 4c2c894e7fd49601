// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
use clap::ValueEnum;
use serde::Deserialize;
use serde::Serialize;

use crate::cache_aware::CacheAwareAllocator;
use crate::cache_state::HitRatioBreakdown;
use crate::cache_state::ProcessorSnapshot;
use crate::task::TaskNode;
use crate::wfd::WfdAllocator;

/// A task-to-processor placement strategy.
///
/// An allocator owns all of its per-processor state for one trial. Two
/// allocators never share state; replaying a workload against another
/// strategy means building (or resetting) a separate instance.
pub trait Allocator {
    fn name(&self) -> &'static str;

    /// Place a single ready task on one of `available`, in the order given.
    /// Sets the task's partition and returns the processor, or `None` when
    /// nothing can be placed (no candidates, or the task is already placed).
    fn allocate(&mut self, task: &mut TaskNode, available: &[usize]) -> Option<usize>;

    /// Place the head of a ready queue. An empty queue yields `None`.
    fn allocate_front(&mut self, ready: &mut [TaskNode], available: &[usize]) -> Option<usize> {
        let task = ready.first_mut()?;
        self.allocate(task, available)
    }

    /// Duration of `task` once placed on `processor`.
    fn execution_time(&self, task: &TaskNode, _processor: usize) -> u64 {
        task.nominal_execution_time
    }

    /// Return every processor to its cold-start state. Idempotent.
    fn reset(&mut self);

    fn snapshots(&self) -> Vec<ProcessorSnapshot>;

    /// Run-level hit ratios, for allocators that model caches.
    fn hit_ratios(&self) -> Option<HitRatioBreakdown> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    /// Worst-fit: least loaded processor, cache state ignored.
    Wfd,
    /// Multi-term score over cache benefit, load, affinity and cache quality.
    CacheAware,
}

impl AllocatorKind {
    pub fn build(self, nr_processors: usize) -> Box<dyn Allocator> {
        match self {
            AllocatorKind::Wfd => Box::new(WfdAllocator::new(nr_processors)),
            AllocatorKind::CacheAware => Box::new(CacheAwareAllocator::new()),
        }
    }
}
