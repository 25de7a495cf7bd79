// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Closed-form cost model that fills the host's cost table.
//!
//! For a cell with configured coefficients the modeled time in microseconds is
//!
//! ```text
//! startup   = fixed_latency_us * scale(class)        tree: ceil(log2 nodes), ring: ranks, direct: 1
//! amortized = max(startup / pipelined_ops, startup * pipeline_floor)
//! cost      = amortized + size_bytes * traffic(kind, class, ranks) / (bandwidth_gbps * 1e3)
//! ```
//!
//! `traffic` does not depend on the size, so the cost never decreases as the
//! size grows, and the amortized startup never increases as more operations
//! are batched.

use dynamo_tuner_common::{Algorithm, AlgorithmClass, CollectiveKind, Protocol};
use dynamo_tuner_config::CostModelConfig;
use tracing::{debug, trace, warn};

use crate::decision::CollectiveRequest;
use crate::error::Result;
use crate::table::CostTable;
use crate::topology::TopologyContext;

/// Bytes per microsecond in one GB/s.
const BYTES_PER_US_PER_GBPS: f64 = 1e3;

/// What a build pass did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub kind: CollectiveKind,
    /// Cells overwritten with modeled costs.
    pub written: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CostModel {
    config: CostModelConfig,
}

impl CostModel {
    pub fn new(config: CostModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }

    /// Modeled cost of one cell, or `None` when the cell has no usable
    /// coefficients. The result is never negative.
    pub fn estimate(
        &self,
        context: &TopologyContext,
        kind: CollectiveKind,
        algorithm: Algorithm,
        protocol: Protocol,
        size_bytes: u64,
        pipelined_ops: u32,
    ) -> Option<f32> {
        let coeff = self.config.coefficient(algorithm, protocol)?;
        // A negative result would read back as an ignore marker.
        let usable = coeff.fixed_latency_us >= 0.0 && coeff.bandwidth_gbps > 0.0;
        if !usable {
            warn!(
                %algorithm,
                %protocol,
                fixed_latency_us = coeff.fixed_latency_us,
                bandwidth_gbps = coeff.bandwidth_gbps,
                "invalid coefficients; keeping host cost"
            );
            return None;
        }

        let startup = coeff.fixed_latency_us * startup_scale(context, algorithm.class());
        let ops = f64::from(pipelined_ops.max(1));
        let amortized = (startup / ops).max(startup * self.config.pipeline_floor);

        let traffic = traffic_factor(kind, algorithm.class(), context.rank_count());
        let bandwidth = coeff.bandwidth_gbps * BYTES_PER_US_PER_GBPS;
        let transfer = size_bytes as f64 * traffic / bandwidth;

        Some(((amortized + transfer) as f32).clamp(0.0, f32::MAX))
    }

    /// Write modeled costs into every non-ignored cell that has coefficients.
    ///
    /// An unrecognized function code fails with `UnsupportedOperation` before
    /// the table is touched. Other failures give no atomicity guarantee: cells
    /// written before the failure keep their new values.
    pub fn build(
        &self,
        context: &TopologyContext,
        request: &CollectiveRequest,
        table: &mut CostTable<'_>,
    ) -> Result<BuildReport> {
        let kind = request.kind()?;
        let mut written = 0;

        for algorithm in Algorithm::ALL.into_iter().take(table.num_algorithms()) {
            for protocol in Protocol::ALL.into_iter().take(table.num_protocols()) {
                if !table.is_selectable(algorithm, protocol) {
                    continue;
                }
                let Some(cost) = self.estimate(
                    context,
                    kind,
                    algorithm,
                    protocol,
                    request.size_bytes,
                    request.pipelined_ops(),
                ) else {
                    continue;
                };
                if table.set(algorithm, protocol, cost) {
                    trace!(%algorithm, %protocol, cost, "modeled cell");
                    written += 1;
                }
            }
        }

        debug!(%kind, size = request.size_bytes, written, "cost table built");
        Ok(BuildReport { kind, written })
    }
}

fn startup_scale(context: &TopologyContext, class: AlgorithmClass) -> f64 {
    match class {
        AlgorithmClass::TreeLike => context.tree_depth() as f64,
        AlgorithmClass::RingLike => context.rank_count() as f64,
        AlgorithmClass::Direct => 1.0,
    }
}

/// Bytes moved per byte of payload.
fn traffic_factor(kind: CollectiveKind, class: AlgorithmClass, ranks: usize) -> f64 {
    if kind.is_point_to_point() {
        return 1.0;
    }
    let n = ranks as f64;
    match (class, kind) {
        (AlgorithmClass::RingLike, CollectiveKind::AllReduce) => 2.0 * (n - 1.0) / n,
        (AlgorithmClass::RingLike, CollectiveKind::AllGather | CollectiveKind::ReduceScatter) => {
            (n - 1.0) / n
        }
        (AlgorithmClass::TreeLike, CollectiveKind::AllReduce) => 2.0,
        _ => 1.0,
    }
}
