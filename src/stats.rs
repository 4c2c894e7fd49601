// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
use std::cmp::Reverse;
use std::io::Write;

use anyhow::Result;
use ordered_float::OrderedFloat;

use crate::allocator::Allocator;
use crate::cache_state::HitRatioBreakdown;
use crate::cache_state::ProcessorSnapshot;
use crate::timeline::TrialOutcome;

fn signed(x: f64) -> String {
    if x >= 0.0f64 {
        format!("{:+9.1}", x)
    } else {
        format!("{:9.1}", x)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TrialStats {
    pub allocator: String,
    pub outcome: TrialOutcome,
    pub processors: Vec<ProcessorSnapshot>,
    pub hit_ratios: Option<HitRatioBreakdown>,
}

impl TrialStats {
    /// Capture the end-of-trial state of `allocator`. Processors are ordered
    /// from most to least loaded.
    pub fn collect(allocator: &dyn Allocator, outcome: TrialOutcome) -> Self {
        let mut processors = allocator.snapshots();
        processors.sort_by_key(|snap| (Reverse(OrderedFloat(snap.load)), snap.id));

        Self {
            allocator: allocator.name().to_string(),
            outcome,
            processors,
            hit_ratios: allocator.hit_ratios(),
        }
    }

    pub fn total_load(&self) -> f64 {
        self.processors.iter().map(|snap| snap.load).sum()
    }

    pub fn avg_load(&self) -> f64 {
        if self.processors.is_empty() {
            0.0
        } else {
            self.total_load() / self.processors.len() as f64
        }
    }

    /// Spread between the most and least loaded processor.
    pub fn load_spread(&self) -> f64 {
        match (self.processors.first(), self.processors.last()) {
            (Some(max), Some(min)) => max.load - min.load,
            _ => 0.0,
        }
    }

    pub fn format<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(
            w,
            "{}: placed={} unplaced={} load={:.0} avg={:.1} spread={:.1}",
            self.allocator,
            self.outcome.allocated,
            self.outcome.unallocated,
            self.total_load(),
            self.avg_load(),
            self.load_spread()
        )?;
        if let Some(hit) = &self.hit_ratios {
            writeln!(w, "  {}", hit)?;
        }

        let avg = self.avg_load();
        for snap in self.processors.iter() {
            writeln!(w, "  {} imbal={}", snap, signed(snap.load - avg))?;
        }
        Ok(())
    }
}
