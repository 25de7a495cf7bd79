// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Cost model coefficients.
//!
//! The cost model has no built-in numbers. Each (algorithm, protocol) pair the
//! deployment wants modeled gets one [`CoefficientConfig`] entry; pairs without
//! an entry keep whatever estimate the host wrote into the cost table.
//!
//! ## TOML Example
//!
//! ```toml
//! [cost]
//! pipeline_floor = 0.25
//!
//! [[cost.coefficients]]
//! algorithm = "ring"
//! protocol = "simple"
//! fixed_latency_us = 8.4
//! bandwidth_gbps = 40.0
//! ```

use std::collections::HashSet;

use dynamo_tuner_common::{Algorithm, Protocol};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Default lower bound on the fraction of startup latency a batched operation pays.
fn default_pipeline_floor() -> f64 {
    0.125
}

/// Latency/bandwidth parameters for one (algorithm, protocol) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CoefficientConfig {
    pub algorithm: Algorithm,
    pub protocol: Protocol,

    /// Per-step startup latency in microseconds.
    ///
    /// Scaled by `ceil(log2(nodes))`, the rank count, or 1 depending on the
    /// algorithm class.
    #[validate(range(min = 0.0))]
    pub fixed_latency_us: f64,

    /// Effective bus bandwidth in GB/s.
    #[validate(range(exclusive_min = 0.0))]
    pub bandwidth_gbps: f64,
}

/// Cost model configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_unique_cells"))]
pub struct CostModelConfig {
    /// Smallest fraction of the startup term a pipelined operation still pays.
    ///
    /// The startup term is divided by the number of batched operations but
    /// never drops below `startup * pipeline_floor`.
    ///
    /// Default: 0.125
    #[serde(default = "default_pipeline_floor")]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub pipeline_floor: f64,

    /// Modeled cells. Empty means the model never overwrites the host's estimates.
    #[serde(default)]
    #[validate(nested)]
    pub coefficients: Vec<CoefficientConfig>,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            pipeline_floor: default_pipeline_floor(),
            coefficients: Vec::new(),
        }
    }
}

impl CostModelConfig {
    /// Look up the coefficients for a cell.
    pub fn coefficient(&self, algorithm: Algorithm, protocol: Protocol) -> Option<&CoefficientConfig> {
        self.coefficients
            .iter()
            .find(|c| c.algorithm == algorithm && c.protocol == protocol)
    }
}

fn validate_unique_cells(config: &CostModelConfig) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for entry in &config.coefficients {
        if !seen.insert((entry.algorithm, entry.protocol)) {
            let mut err = ValidationError::new("duplicate_coefficient");
            err.message = Some(
                format!(
                    "coefficients for {}/{} are configured more than once",
                    entry.algorithm, entry.protocol
                )
                .into(),
            );
            return Err(err);
        }
    }
    Ok(())
}
