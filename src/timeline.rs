// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
use std::collections::BTreeMap;

use log::debug;
use log::info;

use crate::allocator::Allocator;
use crate::task::TaskNode;

/// Per-processor availability for the timing step. Tasks placed on the same
/// processor run back to back in presentation order.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    free_at: BTreeMap<usize, u64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time at which `processor` becomes free. Unused processors are free at 0.
    pub fn free_at(&self, processor: usize) -> u64 {
        self.free_at.get(&processor).copied().unwrap_or(0)
    }

    /// Latest time at which any processor becomes free.
    pub fn horizon(&self) -> u64 {
        self.free_at.values().copied().max().unwrap_or(0)
    }

    /// Time a placed task. An unset release counts as 0. Returns the finish
    /// time, or `None` if the task has no partition or was already timed.
    pub fn place(&mut self, task: &mut TaskNode, duration: u64) -> Option<u64> {
        let proc = task.partition()?;
        if task.start.is_some() {
            return None;
        }

        let free = self.free_at.entry(proc).or_insert(0);
        let start = task.release.unwrap_or(0).max(*free);
        let finish = start.saturating_add(duration);

        task.start = Some(start);
        task.finish_at = Some(finish);
        task.finished = true;
        *free = finish;
        Some(finish)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrialOutcome {
    pub allocated: usize,
    pub unallocated: usize,
}

/// Present `tasks` in order to `allocator` and time each placed task on a
/// fresh [`Timeline`]. Tasks the allocator refuses stay unplaced and untimed.
pub fn run_trial(
    tasks: &mut [TaskNode],
    allocator: &mut dyn Allocator,
    processors: &[usize],
) -> TrialOutcome {
    let mut timeline = Timeline::new();
    let mut outcome = TrialOutcome::default();

    for task in tasks.iter_mut() {
        let proc = match allocator.allocate(task, processors) {
            Some(proc) => proc,
            None => {
                debug!("{}: {} returned no processor", task.short_name(), allocator.name());
                outcome.unallocated += 1;
                continue;
            }
        };

        let duration = allocator.execution_time(task, proc);
        timeline.place(task, duration);
        debug!("{} et={}/{}", task, duration, task.nominal_execution_time);
        outcome.allocated += 1;
    }

    info!(
        "{}: {} tasks placed, {} unplaced, last finish at {}",
        allocator.name(),
        outcome.allocated,
        outcome.unallocated,
        timeline.horizon()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;
    use crate::wfd::WfdAllocator;

    #[test]
    fn test_place_back_to_back() {
        let mut timeline = Timeline::new();
        let mut a = TaskNode::new(0, 10);
        let mut b = TaskNode::new(1, 5);
        a.assign_partition(2);
        b.assign_partition(2);

        assert_eq!(timeline.place(&mut a, 10), Some(10));
        assert_eq!(timeline.place(&mut b, 5), Some(15));
        assert_eq!(b.start, Some(10));
        assert_eq!(b.state(), TaskState::Finished);
        assert_eq!(timeline.free_at(2), 15);
        assert_eq!(timeline.free_at(0), 0);
    }

    #[test]
    fn test_release_delays_start() {
        let mut timeline = Timeline::new();
        let mut t = TaskNode::new(0, 10);
        t.release = Some(40);
        t.assign_partition(0);
        assert_eq!(timeline.place(&mut t, 10), Some(50));
        assert_eq!(t.start, Some(40));
    }

    #[test]
    fn test_unplaced_or_timed_task_is_skipped() {
        let mut timeline = Timeline::new();
        let mut t = TaskNode::new(0, 10);
        assert_eq!(timeline.place(&mut t, 10), None);

        t.assign_partition(1);
        timeline.place(&mut t, 10);
        assert_eq!(timeline.place(&mut t, 10), None);
        assert_eq!(timeline.free_at(1), 10);
    }

    #[test]
    fn test_run_trial_counts() {
        let mut tasks: Vec<TaskNode> = (0..4).map(|i| TaskNode::new(i, 10)).collect();
        let mut wfd = WfdAllocator::new(2);

        let outcome = run_trial(&mut tasks, &mut wfd, &[0, 1]);
        assert_eq!(outcome, TrialOutcome { allocated: 4, unallocated: 0 });
        assert!(tasks.iter().all(|t| t.finished));

        let mut fresh: Vec<TaskNode> = tasks.iter().map(|t| t.replay_copy()).collect();
        let outcome = run_trial(&mut fresh, &mut WfdAllocator::new(2), &[]);
        assert_eq!(outcome, TrialOutcome { allocated: 0, unallocated: 4 });
        assert!(fresh.iter().all(|t| t.state() == TaskState::Created));
    }
}
