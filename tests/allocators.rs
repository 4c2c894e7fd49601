// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

// Allocator contracts shared by the worst-fit baseline and the cache-aware
// allocator.

use cache_alloc::{
    Allocator, AllocatorKind, CacheAwareAllocator, CacheWeights, TaskNode, WfdAllocator,
};

fn workload() -> Vec<TaskNode> {
    cache_alloc::generate(4, 60, 3.5, 0.5, 99)
}

// EMPTY INPUTS

#[test]
fn empty_candidates_return_none() {
    for kind in [AllocatorKind::Wfd, AllocatorKind::CacheAware] {
        let mut alloc = kind.build(4);
        let mut task = TaskNode::new(0, 100);
        assert_eq!(alloc.allocate(&mut task, &[]), None);
        assert!(task.partition().is_none());
        assert!(alloc.snapshots().iter().all(|s| s.load == 0.0));
    }
}

#[test]
fn empty_ready_queue_returns_none() {
    for kind in [AllocatorKind::Wfd, AllocatorKind::CacheAware] {
        let mut alloc = kind.build(4);
        assert_eq!(alloc.allocate_front(&mut [], &[0, 1]), None);

        let mut ready = vec![TaskNode::new(0, 10), TaskNode::new(1, 10)];
        assert_eq!(alloc.allocate_front(&mut ready, &[0, 1]), Some(0));
        assert_eq!(ready[0].partition(), Some(0));
        assert!(ready[1].partition().is_none());
    }
}

#[test]
fn no_migration() {
    for kind in [AllocatorKind::Wfd, AllocatorKind::CacheAware] {
        let mut alloc = kind.build(2);
        let mut task = TaskNode::new(0, 10);
        let first = alloc.allocate(&mut task, &[0, 1]);
        assert!(first.is_some());
        assert_eq!(alloc.allocate(&mut task, &[1]), None);
        assert_eq!(task.partition(), first);
    }
}

// BASELINE

#[test]
fn wfd_equal_loads_pick_first_candidate() {
    let mut wfd = WfdAllocator::new(4);
    let mut task = TaskNode::new(0, 10);
    assert_eq!(wfd.allocate(&mut task, &[0, 1, 2, 3]), Some(0));

    // Loads now [10, 0, 0, 0]: the lowest free id wins.
    let mut task = TaskNode::new(1, 10);
    assert_eq!(wfd.allocate(&mut task, &[0, 1, 2, 3]), Some(1));
}

#[test]
fn wfd_uses_nominal_time() {
    let mut wfd = WfdAllocator::new(2);
    let mut task = TaskNode::new(0, 333)
        .with_sensitivity(1.0)
        .with_weights(CacheWeights::balanced());
    let proc = wfd.allocate(&mut task, &[0, 1]).unwrap();
    assert_eq!(wfd.execution_time(&task, proc), 333);
    assert_eq!(wfd.load(proc), Some(333));
}

// CACHE-AWARE BOUNDS

#[test]
fn execution_time_bounds() {
    let mut ca = CacheAwareAllocator::new();
    let processors = [0, 1, 2, 3];
    for mut task in workload() {
        let nominal = task.nominal_execution_time;
        for p in processors {
            let et = ca.execution_time(&task, p);
            assert!(et >= nominal / 2 && et <= nominal, "{} et={}", task, et);
        }
        ca.allocate(&mut task, &processors).unwrap();
    }
}

#[test]
fn hit_ratios_in_unit_range() {
    let mut ca = CacheAwareAllocator::new();
    let processors = [0, 1, 2, 3];
    let mut tasks = workload();
    for task in tasks.iter_mut() {
        ca.allocate(task, &processors).unwrap();
        assert!((0.0..=1.0).contains(&task.cache_hit_ratio));
        assert!(task.level_hit_ratios.iter().all(|r| (0.0..=1.0).contains(r)));
    }

    for p in processors {
        let hit = ca.processor_hit_ratios(p).unwrap();
        for r in [hit.l1, hit.l2, hit.l3, hit.overall] {
            assert!((0.0..=1.0).contains(&r));
        }
    }
    let run = ca.hit_ratios().unwrap();
    assert!(run.overall > 0.0 && run.overall <= 1.0);
}

#[test]
fn reset_returns_to_cold_start() {
    let probe = TaskNode::new(100, 5000)
        .with_sensitivity(0.8)
        .with_weights(CacheWeights::normalized([0.5, 0.3, 0.1, 0.1]).unwrap())
        .with_affinity(Some(2));
    let cold = CacheAwareAllocator::new();

    let mut ca = CacheAwareAllocator::new();
    for task in workload().iter_mut() {
        ca.allocate(task, &[0, 1, 2, 3]);
    }
    assert_ne!(ca.score(&probe, 0), cold.score(&probe, 0));

    ca.reset();
    ca.reset();
    for p in 0..4 {
        assert_eq!(ca.score(&probe, p), cold.score(&probe, p));
    }
    assert!(ca.snapshots().is_empty());

    let mut a = probe.replay_copy();
    let mut b = probe.replay_copy();
    let mut fresh = CacheAwareAllocator::new();
    assert_eq!(
        ca.allocate(&mut a, &[0, 1, 2, 3]),
        fresh.allocate(&mut b, &[0, 1, 2, 3])
    );
}

#[test]
fn malformed_weights_degrade_to_neutral() {
    let mut ca = CacheAwareAllocator::new();
    let mut task = TaskNode::new(0, 100)
        .with_sensitivity(0.9)
        .with_weights(CacheWeights::from_raw([0.9, 0.9, 0.0, 0.0]));

    assert_eq!(ca.score(&task, 0).cache_benefit, 0.5);
    assert_eq!(ca.allocate(&mut task, &[0, 1]), Some(0));
    assert_eq!(ca.execution_time(&task, 0), 100);
    assert_eq!(task.cache_hit_ratio, 0.0);
    assert_eq!(ca.state(0).unwrap().recent_task_count(), 1);
}
