// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tuner error types.
//!
//! Errors fall into two groups. Structural errors ([`TunerError::InvalidTopology`],
//! handle errors, [`TunerError::InvalidTable`]) are contract violations by the
//! caller and are returned as-is. [`TunerError::UnsupportedOperation`] is a
//! tuning ambiguity: the decision engine absorbs it and hands the whole
//! decision back to the host's default policy.

use dynamo_tuner_config::ConfigError;
use thiserror::Error;

use crate::registry::ContextHandle;

pub type Result<T, E = TunerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TunerError {
    #[error("invalid topology: {ranks} ranks on {nodes} nodes")]
    InvalidTopology { ranks: usize, nodes: usize },

    #[error("{handle} was not created by this tuner")]
    InvalidHandle { handle: ContextHandle },

    #[error("{handle} was already destroyed")]
    DoubleDestroy { handle: ContextHandle },

    #[error("{handle} used after destroy")]
    UseAfterDestroy { handle: ContextHandle },

    #[error("context registry is full ({capacity} slots)")]
    Exhausted { capacity: usize },

    #[error("unsupported collective function code {code}")]
    UnsupportedOperation { code: i32 },

    #[error("invalid cost table: {0}")]
    InvalidTable(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TunerError {
    /// Returns `true` for errors the decision engine routes to the fallback
    /// path instead of reporting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TunerError::UnsupportedOperation { .. })
    }
}
