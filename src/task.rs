// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Task records
//!
//! A [`TaskNode`] is the unit of work flowing from the workload generator
//! through an allocator and the timeline. It is created once with fully
//! randomized attributes, placed exactly once, timed exactly once and then
//! left alone as a record for whoever analyzes the trial.
//!
//! Lifecycle
//! ---------
//!
//! ```text
//!     Created --allocate--> Allocated --time--> Timed --> Finished
//! ```
//!
//! There are no backward transitions. The timeline moves a task through
//! Timed and Finished in the same step, so a record observed after a trial
//! is either still Created (the allocator returned NONE) or Finished.
use std::fmt;

/// Tolerance used when checking that a weight vector sums to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeType {
    Source,
    Sink,
    #[default]
    Normal,
    Solo,
}

/// The three modeled cache levels. Memory carries a weight but no cache
/// state, so it has no variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheLevel {
    L1,
    L2,
    L3,
}

impl CacheLevel {
    pub const ALL: [CacheLevel; 3] = [CacheLevel::L1, CacheLevel::L2, CacheLevel::L3];

    pub fn index(self) -> usize {
        match self {
            CacheLevel::L1 => 0,
            CacheLevel::L2 => 1,
            CacheLevel::L3 => 2,
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheLevel::L1 => write!(f, "L1"),
            CacheLevel::L2 => write!(f, "L2"),
            CacheLevel::L3 => write!(f, "L3"),
        }
    }
}

/// Access distribution of a task over {L1, L2, L3, Memory}.
///
/// A value built through [`CacheWeights::normalized`] is always valid. The
/// raw constructor exists so callers can represent whatever they were handed
/// and let [`CacheWeights::is_valid`] decide whether the allocator may use it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheWeights([f64; 4]);

impl CacheWeights {
    pub const MEMORY: usize = 3;

    /// Wrap a weight vector as-is, without normalizing or validating it.
    pub fn from_raw(raw: [f64; 4]) -> Self {
        Self(raw)
    }

    /// Scale non-negative raw weights so they sum to one. Returns `None` for
    /// negative or non-finite components, or when everything is zero.
    pub fn normalized(raw: [f64; 4]) -> Option<Self> {
        if raw.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let sum: f64 = raw.iter().sum();
        if sum <= 0.0 {
            return None;
        }
        Some(Self(raw.map(|w| w / sum)))
    }

    /// Uniform weights over all four levels.
    pub fn balanced() -> Self {
        Self([0.25; 4])
    }

    pub fn level(&self, level: CacheLevel) -> f64 {
        self.0[level.index()]
    }

    pub fn memory(&self) -> f64 {
        self.0[Self::MEMORY]
    }

    pub fn as_array(&self) -> &[f64; 4] {
        &self.0
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|w| w.is_finite() && *w >= 0.0)
            && (self.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Allocated,
    Timed,
    Finished,
}

#[derive(Clone, Debug)]
pub struct TaskNode {
    pub id: usize,
    pub dag_id: usize,
    pub layer: u32,
    pub node_type: NodeType,
    pub critical: bool,

    pub release: Option<u64>,
    pub start: Option<u64>,
    pub finish_at: Option<u64>,
    pub nominal_execution_time: u64,
    pub finished: bool,

    partition: Option<usize>,
    pub affinity: Option<usize>,

    sensitivity: f64,
    pub weights: Option<CacheWeights>,

    pub cache_hit_ratio: f64,
    pub level_hit_ratios: [f64; 3],
}

impl TaskNode {
    pub fn new(id: usize, nominal_execution_time: u64) -> Self {
        Self {
            id,
            dag_id: 0,
            layer: 0,
            node_type: NodeType::Normal,
            critical: false,
            release: None,
            start: None,
            finish_at: None,
            nominal_execution_time,
            finished: false,
            partition: None,
            affinity: None,
            sensitivity: 0.0,
            weights: None,
            cache_hit_ratio: 0.0,
            level_hit_ratios: [0.0; 3],
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.set_sensitivity(sensitivity);
        self
    }

    pub fn with_weights(mut self, weights: CacheWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_affinity(mut self, affinity: Option<usize>) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_dag(mut self, dag_id: usize, layer: u32, node_type: NodeType) -> Self {
        self.dag_id = dag_id;
        self.layer = layer;
        self.node_type = node_type;
        self
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// Clamp into [0, 1]. NaN is treated as no sensitivity at all.
    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        self.sensitivity = if sensitivity.is_nan() {
            0.0
        } else {
            sensitivity.clamp(0.0, 1.0)
        };
    }

    /// The weight vector if it is present and usable by the cache model.
    pub fn valid_weights(&self) -> Option<&CacheWeights> {
        self.weights.as_ref().filter(|w| w.is_valid())
    }

    /// Weights are present but unusable.
    pub fn has_malformed_weights(&self) -> bool {
        matches!(&self.weights, Some(w) if !w.is_valid())
    }

    pub fn partition(&self) -> Option<usize> {
        self.partition
    }

    /// Record the processor the task was placed on. A placement is final:
    /// returns false and leaves the task untouched if it is already placed.
    pub fn assign_partition(&mut self, processor: usize) -> bool {
        if self.partition.is_some() {
            return false;
        }
        self.partition = Some(processor);
        true
    }

    pub fn record_hit_ratios(&mut self, overall: f64, per_level: [f64; 3]) {
        self.cache_hit_ratio = overall.clamp(0.0, 1.0);
        self.level_hit_ratios = per_level.map(|r| r.clamp(0.0, 1.0));
    }

    pub fn state(&self) -> TaskState {
        match (self.partition, self.start, self.finished) {
            (None, _, _) => TaskState::Created,
            (Some(_), None, _) => TaskState::Allocated,
            (Some(_), Some(_), false) => TaskState::Timed,
            (Some(_), Some(_), true) => TaskState::Finished,
        }
    }

    /// Realized duration once the task has been timed.
    pub fn actual_execution_time(&self) -> Option<u64> {
        match (self.start, self.finish_at) {
            (Some(start), Some(finish)) => Some(finish.saturating_sub(start)),
            _ => None,
        }
    }

    /// Copy the generated attributes so the same workload can be replayed
    /// against another allocator. Placement, timing and hit ratios start
    /// over; nothing is re-drawn.
    pub fn replay_copy(&self) -> Self {
        Self {
            id: self.id,
            dag_id: self.dag_id,
            layer: self.layer,
            node_type: self.node_type,
            critical: self.critical,
            release: self.release,
            nominal_execution_time: self.nominal_execution_time,
            affinity: self.affinity,
            sensitivity: self.sensitivity,
            weights: self.weights,
            ..Self::new(self.id, self.nominal_execution_time)
        }
    }

    pub fn short_name(&self) -> String {
        format!("T{}_{}", self.dag_id, self.id)
    }
}

fn fmt_time(t: Option<u64>) -> String {
    match t {
        Some(t) => t.to_string(),
        None => "-".to_string(),
    }
}

impl fmt::Display for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}->{}->{}] P{}",
            self.short_name(),
            fmt_time(self.release),
            fmt_time(self.start),
            fmt_time(self.finish_at),
            match self.partition {
                Some(p) => p.to_string(),
                None => "-".to_string(),
            }
        )
    }
}

/// Tasks of one DAG stored by index, with dependency edges kept as index
/// lists in both directions.
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its index.
    pub fn add_node(&mut self, node: TaskNode) -> usize {
        self.nodes.push(node);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        self.nodes.len() - 1
    }

    /// Add a dependency `parent -> child`. Self-edges, duplicates and
    /// unknown indices are rejected.
    pub fn add_edge(&mut self, parent: usize, child: usize) -> bool {
        if parent == child || parent >= self.nodes.len() || child >= self.nodes.len() {
            return false;
        }
        if self.children[parent].contains(&child) {
            return false;
        }
        self.children[parent].push(child);
        self.parents[child].push(parent);
        true
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> Option<&TaskNode> {
        self.nodes.get(idx)
    }

    pub fn node_mut(&mut self, idx: usize) -> Option<&mut TaskNode> {
        self.nodes.get_mut(idx)
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn parents(&self, idx: usize) -> &[usize] {
        self.parents.get(idx).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        self.children.get(idx).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Nodes with no parents.
    pub fn sources(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|i| self.parents[*i].is_empty())
            .collect()
    }

    /// Nodes with no children.
    pub fn sinks(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|i| self.children[*i].is_empty())
            .collect()
    }

    pub fn into_nodes(self) -> Vec<TaskNode> {
        self.nodes
    }
}
