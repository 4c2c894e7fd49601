// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
use std::fs;
use std::io::Read;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::allocator::AllocatorKind;
use crate::generator::WorkloadKind;
use crate::uunifast::DEFAULT_DISCARD_BUDGET;

/// Parameters of a single trial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub cores: usize,
    pub tasks: usize,
    pub utilization: f64,
    pub high_sensitivity_ratio: f64,
    pub seed: u64,
    pub discard_budget: usize,
    pub workload: WorkloadKind,
    pub allocators: Vec<AllocatorKind>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cores: 4,
            tasks: 50,
            utilization: 3.0,
            high_sensitivity_ratio: 0.5,
            seed: 42,
            discard_budget: DEFAULT_DISCARD_BUDGET,
            workload: WorkloadKind::CacheIntensive,
            allocators: vec![AllocatorKind::Wfd, AllocatorKind::CacheAware],
        }
    }
}

impl SimConfig {
    /// Parse JSON given inline, or read it from the file named after an
    /// `f:` or `file:` prefix.
    pub fn parse(input: &str) -> Result<Self> {
        let config: SimConfig = match input.split_once(':') {
            Some(("f", path)) | Some(("file", path)) => {
                let mut f = fs::OpenOptions::new()
                    .read(true)
                    .open(path)
                    .with_context(|| format!("Failed to open config file {:?}", path))?;
                let mut content = String::new();
                f.read_to_string(&mut content)?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?
            }
            _ => serde_json::from_str(input).context("Failed to parse inline config")?,
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cores == 0 {
            bail!("cores must be at least 1");
        }
        if !self.utilization.is_finite() || self.utilization < 0.0 {
            bail!("utilization {} must be finite and non-negative", self.utilization);
        }
        if !(0.0..=1.0).contains(&self.high_sensitivity_ratio) {
            bail!(
                "high_sensitivity_ratio {} must be within [0, 1]",
                self.high_sensitivity_ratio
            );
        }
        if self.discard_budget == 0 {
            bail!("discard_budget must be at least 1");
        }
        Ok(())
    }

    /// Processor ids of the trial, in candidate order.
    pub fn processors(&self) -> Vec<usize> {
        (0..self.cores).collect()
    }
}
