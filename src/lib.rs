// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # cache_alloc
//!
//! Cache-state-aware task placement on a simulated multicore, together with
//! a synthetic workload generator and a worst-fit baseline to compare
//! against.
//!
//! Flow of a trial
//! ---------------
//!
//! 1. [`generator::WorkloadGenerator`] splits a total utilization over the
//!    tasks with UUnifast-Discard and turns each share into a [`TaskNode`]
//!    carrying a nominal execution time, a cache sensitivity, a cache-weight
//!    vector and an optional affinity hint.
//!
//! 2. Tasks are presented one at a time to an [`Allocator`]. The
//!    [`CacheAwareAllocator`] scores every candidate processor and commits
//!    the task's cache footprint to the winner; the [`WfdAllocator`] simply
//!    picks the least loaded processor.
//!
//! 3. [`timeline::run_trial`] times each placed task, using the allocator's
//!    view of the realized execution time, and [`stats::TrialStats`]
//!    reports the per-processor outcome.
//!
//! All randomness comes from a seeded generator, so a trial is reproducible
//! from its [`config::SimConfig`].
pub mod allocator;
pub mod cache_aware;
pub mod cache_state;
pub mod config;
pub mod exec_time;
pub mod generator;
pub mod stats;
pub mod task;
pub mod timeline;
pub mod uunifast;
pub mod wfd;

pub use allocator::Allocator;
pub use allocator::AllocatorKind;
pub use cache_aware::CacheAwareAllocator;
pub use cache_aware::ScoreBreakdown;
pub use cache_state::ProcessorCacheState;
pub use config::SimConfig;
pub use generator::generate;
pub use generator::WorkloadGenerator;
pub use generator::WorkloadKind;
pub use task::CacheWeights;
pub use task::TaskNode;
pub use timeline::run_trial;
pub use wfd::WfdAllocator;
