// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

// End-to-end placement scenarios.

use cache_alloc::stats::TrialStats;
use cache_alloc::task::TaskState;
use cache_alloc::{run_trial, Allocator, AllocatorKind, CacheAwareAllocator, CacheWeights, TaskNode};

#[test]
fn cold_tie_goes_to_first_candidate() {
    let mut ca = CacheAwareAllocator::new();
    let mut task = TaskNode::new(0, 1000)
        .with_sensitivity(0.9)
        .with_weights(CacheWeights::normalized([0.7, 0.2, 0.08, 0.02]).unwrap());

    assert_eq!(ca.score(&task, 0), ca.score(&task, 1));
    assert_eq!(ca.allocate(&mut task, &[0, 1]), Some(0));

    // Candidate order decides, not the id.
    let mut ca = CacheAwareAllocator::new();
    let mut task = task.replay_copy();
    assert_eq!(ca.allocate(&mut task, &[1, 0]), Some(1));
}

#[test]
fn identical_tasks_do_not_cluster() {
    let mut ca = CacheAwareAllocator::new();
    let mut counts = [0i64; 2];
    for id in 0..10 {
        let mut task = TaskNode::new(id, 100)
            .with_sensitivity(0.5)
            .with_weights(CacheWeights::balanced());
        let proc = ca.allocate(&mut task, &[0, 1]).unwrap();
        counts[proc] += 1;
        assert!((counts[0] - counts[1]).abs() <= 2, "{:?}", counts);
    }
    assert_eq!(counts[0] + counts[1], 10);
}

#[test]
fn replayed_workload_finishes_under_both_allocators() {
    let workload = cache_alloc::generate(4, 40, 3.0, 0.5, 42);
    let processors: Vec<usize> = (0..4).collect();

    for kind in [AllocatorKind::Wfd, AllocatorKind::CacheAware] {
        let mut alloc = kind.build(4);
        let mut tasks: Vec<TaskNode> = workload.iter().map(|t| t.replay_copy()).collect();
        let outcome = run_trial(&mut tasks, alloc.as_mut(), &processors);
        assert_eq!(outcome.allocated, 40);
        assert_eq!(outcome.unallocated, 0);

        for task in tasks.iter() {
            assert_eq!(task.state(), TaskState::Finished);
            let start = task.start.unwrap();
            let end = task.finish_at.unwrap();
            assert!(end >= start);
            let et = task.actual_execution_time().unwrap();
            assert!(et <= task.nominal_execution_time);
            assert!(et >= task.nominal_execution_time / 2);
        }

        let stats = TrialStats::collect(alloc.as_ref(), outcome);
        assert_eq!(stats.processors.len(), 4);
        let nominal: u64 = workload.iter().map(|t| t.nominal_execution_time).sum();
        assert_eq!(stats.total_load(), nominal as f64);
    }

    // Replays leave the source workload untouched.
    assert!(workload.iter().all(|t| t.state() == TaskState::Created));
}

#[test]
fn wfd_trial_reports_no_hit_ratios() {
    let mut tasks = cache_alloc::generate(2, 10, 1.5, 0.5, 8);
    let mut wfd = AllocatorKind::Wfd.build(2);
    let outcome = run_trial(&mut tasks, wfd.as_mut(), &[0, 1]);
    let stats = TrialStats::collect(wfd.as_ref(), outcome);
    assert!(stats.hit_ratios.is_none());
    assert_eq!(wfd.name(), "wfd");

    let mut out = Vec::new();
    stats.format(&mut out).unwrap();
    assert!(String::from_utf8(out).unwrap().contains("PROC[01]"));
}
