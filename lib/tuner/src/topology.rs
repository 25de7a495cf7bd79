// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-communicator topology snapshot.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TunerError};
use crate::sink::{LogLevel, LogSink, Subsystem};

/// Immutable view of a communicator's shape, built once at communicator
/// creation and read by every tuning call on that communicator.
///
/// Contexts are shared as `Arc<TopologyContext>` and never mutated, so any
/// number of threads may tune against the same context concurrently.
#[derive(Debug, Clone)]
pub struct TopologyContext {
    rank_count: usize,
    node_count: usize,
    logger: Arc<dyn LogSink>,
}

impl TopologyContext {
    /// Validate and build a context.
    ///
    /// Fails with [`TunerError::InvalidTopology`] unless
    /// `1 <= node_count <= rank_count`.
    pub fn new(rank_count: usize, node_count: usize, logger: Arc<dyn LogSink>) -> Result<Self> {
        if rank_count == 0 || node_count == 0 || node_count > rank_count {
            return Err(TunerError::InvalidTopology {
                ranks: rank_count,
                nodes: node_count,
            });
        }
        Ok(Self {
            rank_count,
            node_count,
            logger,
        })
    }

    pub fn rank_count(&self) -> usize {
        self.rank_count
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Tree depth across nodes: `ceil(log2(nodes))`, at least 1.
    pub fn tree_depth(&self) -> usize {
        let depth = usize::BITS - (self.node_count - 1).leading_zeros();
        (depth as usize).max(1)
    }

    /// Emit a message through the host-supplied logger.
    pub fn log(&self, level: LogLevel, subsystem: Subsystem, message: fmt::Arguments<'_>) {
        self.logger.log(level, subsystem, message);
    }
}
