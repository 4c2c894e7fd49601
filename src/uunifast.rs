// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # UUnifast-Discard
//!
//! Splits a total utilization U over n tasks so that the individual
//! utilizations sum to U and none exceeds a per-task cap (the number of
//! cores). Each attempt walks the classic multiplicative split:
//!
//! ```text
//!     sum = U
//!     for i in 0..n-1:
//!         next = sum * r^(1 / (n - i))      r ~ U(0, 1)
//!         u_i  = sum - next                 (discard attempt if u_i > cap)
//!         sum  = next
//!     u_{n-1} = sum                         (discard attempt if sum > cap)
//! ```
//!
//! Attempts are retried up to the discard budget. If every attempt is
//! discarded, a bounded random split that cannot fail is used instead, so
//! callers always get exactly n values summing to U.
//!
//! See A. Burns and R. I. Davis, "Improved priority assignment for global
//! fixed priority pre-emptive scheduling in multiprocessor real-time
//! systems", Real-Time Systems 47(1), 2010.
use log::debug;
use log::warn;
use rand::Rng;

pub const DEFAULT_DISCARD_BUDGET: usize = 1000;

/// Share of the bounded remainder handed to each task by the fallback split.
const FALLBACK_SHARE: f64 = 0.8;

#[derive(Clone, Debug)]
pub struct UUnifastDiscard {
    total: f64,
    count: usize,
    cap: f64,
    discard_budget: usize,
}

impl UUnifastDiscard {
    pub fn new(total: f64, count: usize, cap: f64, discard_budget: usize) -> Self {
        let total = if total.is_finite() { total.max(0.0) } else { 0.0 };
        Self {
            total,
            count,
            cap,
            discard_budget,
        }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Produce `count` utilizations summing to `total`, falling back to the
    /// bounded split when the discard budget is exhausted.
    pub fn utilizations<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        if self.count == 0 {
            return Vec::new();
        }

        match self.discard(rng) {
            Some(utils) => utils,
            None => {
                warn!(
                    "UUnifast-Discard gave up after {} attempts (U={:.3} n={} cap={:.1})",
                    self.discard_budget, self.total, self.count, self.cap
                );
                self.fallback(rng)
            }
        }
    }

    /// Run up to `discard_budget` attempts, returning the first feasible one.
    pub fn discard<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Vec<f64>> {
        for attempt in 0..self.discard_budget {
            if let Some(utils) = self.attempt(rng) {
                if attempt > 0 {
                    debug!("UUnifast-Discard succeeded after {} discarded attempts", attempt);
                }
                return Some(utils);
            }
        }
        None
    }

    fn attempt<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Vec<f64>> {
        let n = self.count;
        let mut utils = Vec::with_capacity(n);
        let mut sum = self.total;

        for i in 0..n.saturating_sub(1) {
            let r: f64 = rng.gen();
            let next = sum * r.powf(1.0 / (n - i) as f64);
            let util = sum - next;
            if util > self.cap {
                return None;
            }
            utils.push(util);
            sum = next;
        }

        if sum > self.cap {
            return None;
        }
        utils.push(sum);
        Some(utils)
    }

    /// Bounded random split. Every task but the last takes a random share of
    /// the capped remainder; the last one takes what is left.
    pub fn fallback<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        if self.count == 0 {
            return Vec::new();
        }

        let mut utils = Vec::with_capacity(self.count);
        let mut remaining = self.total;

        for _ in 0..self.count - 1 {
            let r: f64 = rng.gen();
            let util = r * remaining.min(self.cap) * FALLBACK_SHARE;
            utils.push(util);
            remaining -= util;
        }
        utils.push(remaining.max(0.0));
        utils
    }
}
