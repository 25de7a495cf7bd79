// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pinned algorithm/protocol rules.
//!
//! Rules are checked in order; the first rule whose filters all match a
//! request pins the (algorithm, protocol) pair, provided the host did not mark
//! that cell as ignored. Unset filters match anything.
//!
//! ## TOML Example
//!
//! ```toml
//! [[overrides]]
//! collective = "all_reduce"
//! min_bytes = 0
//! max_bytes = 65536
//! node_count = 2
//! algorithm = "tree"
//! protocol = "ll"
//! channels = 4
//! ```

use dynamo_tuner_common::{Algorithm, CollectiveKind, Protocol};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// A single pinned decision and the requests it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_byte_range"))]
pub struct OverrideRule {
    #[serde(default)]
    pub collective: Option<CollectiveKind>,

    /// Inclusive lower bound on the operation size.
    #[serde(default)]
    pub min_bytes: u64,

    /// Inclusive upper bound on the operation size. `None` is unbounded.
    #[serde(default)]
    pub max_bytes: Option<u64>,

    #[serde(default)]
    pub node_count: Option<usize>,

    #[serde(default)]
    pub rank_count: Option<usize>,

    #[serde(default)]
    pub pipelined_op_count: Option<u32>,

    /// Match only registered (`true`) or unregistered (`false`) buffers.
    #[serde(default)]
    pub registered: Option<bool>,

    pub algorithm: Algorithm,
    pub protocol: Protocol,

    /// Pinned channel count, still clamped to the configured ceilings.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub channels: Option<u32>,
}

impl OverrideRule {
    /// Rule that pins `algorithm`/`protocol` for every request.
    pub fn new(algorithm: Algorithm, protocol: Protocol) -> Self {
        Self {
            collective: None,
            min_bytes: 0,
            max_bytes: None,
            node_count: None,
            rank_count: None,
            pipelined_op_count: None,
            registered: None,
            algorithm,
            protocol,
            channels: None,
        }
    }

    /// Returns `true` if `size_bytes` falls inside the rule's byte range.
    pub fn covers_size(&self, size_bytes: u64) -> bool {
        size_bytes >= self.min_bytes && self.max_bytes.is_none_or(|max| size_bytes <= max)
    }
}

fn validate_byte_range(rule: &OverrideRule) -> Result<(), ValidationError> {
    if rule.max_bytes.is_some_and(|max| max < rule.min_bytes) {
        let mut err = ValidationError::new("inverted_byte_range");
        err.message = Some("max_bytes must not be smaller than min_bytes".into());
        return Err(err);
    }
    Ok(())
}
