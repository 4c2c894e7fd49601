// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
use log::debug;

use crate::allocator::Allocator;
use crate::cache_state::ProcessorSnapshot;
use crate::task::TaskNode;

/// Worst-fit baseline: every task goes to the candidate with the smallest
/// cumulative nominal load. The first candidate wins ties, so with equal
/// loads the caller's ordering decides.
#[derive(Clone, Debug)]
pub struct WfdAllocator {
    loads: Vec<u64>,
}

impl WfdAllocator {
    /// Track `nr_processors` processors with ids `0..nr_processors`. The
    /// universe does not grow; ids outside it are never selected.
    pub fn new(nr_processors: usize) -> Self {
        Self {
            loads: vec![0; nr_processors],
        }
    }

    pub fn loads(&self) -> &[u64] {
        &self.loads
    }

    pub fn load(&self, processor: usize) -> Option<u64> {
        self.loads.get(processor).copied()
    }
}

impl Allocator for WfdAllocator {
    fn name(&self) -> &'static str {
        "wfd"
    }

    fn allocate(&mut self, task: &mut TaskNode, available: &[usize]) -> Option<usize> {
        if task.partition().is_some() {
            debug!("{} already placed, not reallocating", task.short_name());
            return None;
        }

        let mut best: Option<(usize, u64)> = None;
        for &proc in available {
            let load = match self.loads.get(proc) {
                Some(load) => *load,
                None => continue,
            };
            if best.map_or(true, |(_, min)| load < min) {
                best = Some((proc, load));
            }
        }

        let (proc, load) = best?;
        self.loads[proc] = load.saturating_add(task.nominal_execution_time);
        task.assign_partition(proc);

        debug!(
            "WFD {} (et={}) --> PROC[{:02}] load={}",
            task.short_name(),
            task.nominal_execution_time,
            proc,
            self.loads[proc]
        );
        Some(proc)
    }

    fn reset(&mut self) {
        self.loads.iter_mut().for_each(|load| *load = 0);
    }

    fn snapshots(&self) -> Vec<ProcessorSnapshot> {
        self.loads
            .iter()
            .enumerate()
            .map(|(id, load)| ProcessorSnapshot {
                id,
                load: *load as f64,
                ..Default::default()
            })
            .collect()
    }
}
