// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tuning request and result types.

use std::fmt;
use std::num::NonZeroU32;

use dynamo_tuner_common::{Algorithm, CollectiveKind, Protocol};

use crate::error::{Result, TunerError};

/// One collective call as described by the host.
///
/// The function code is kept raw: an unrecognized code is a legal input that
/// sends the call down the fallback path rather than failing construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectiveRequest {
    pub function: i32,
    pub size_bytes: u64,
    /// Operations batched together in the same group call.
    pub pipelined_op_count: u32,
    pub buffer_registration_requested: bool,
    /// Channel count the host already holds before the call.
    pub channel_hint: Option<NonZeroU32>,
}

impl CollectiveRequest {
    pub fn new(kind: CollectiveKind, size_bytes: u64) -> Self {
        Self::from_code(kind.code(), size_bytes)
    }

    pub fn from_code(function: i32, size_bytes: u64) -> Self {
        Self {
            function,
            size_bytes,
            pipelined_op_count: 1,
            buffer_registration_requested: false,
            channel_hint: None,
        }
    }

    /// Number of batched operations; zero is treated as one.
    pub fn with_pipelined_ops(mut self, count: u32) -> Self {
        self.pipelined_op_count = count.max(1);
        self
    }

    pub fn with_registered_buffer(mut self, registered: bool) -> Self {
        self.buffer_registration_requested = registered;
        self
    }

    pub fn with_channel_hint(mut self, hint: Option<NonZeroU32>) -> Self {
        self.channel_hint = hint;
        self
    }

    /// Decode the function code.
    pub fn kind(&self) -> Result<CollectiveKind> {
        CollectiveKind::try_from(self.function).map_err(|_| TunerError::UnsupportedOperation {
            code: self.function,
        })
    }

    /// Pipelined op count, never below one.
    pub fn pipelined_ops(&self) -> u32 {
        self.pipelined_op_count.max(1)
    }
}

/// Result of a tuning call.
///
/// Every field is independently optional. Unset fields are filled in by the
/// host's default policy; set fields are kept as-is even when others are
/// unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    pub algorithm: Option<Algorithm>,
    pub protocol: Option<Protocol>,
    pub channels: Option<NonZeroU32>,
}

impl Decision {
    /// No field set: the host applies its default tuning.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithm.is_none() && self.protocol.is_none() && self.channels.is_none()
    }

    /// All three fields set.
    pub fn is_complete(&self) -> bool {
        self.algorithm.is_some() && self.protocol.is_some() && self.channels.is_some()
    }

    /// Selected cell, if both coordinates are set.
    pub fn cell(&self) -> Option<(Algorithm, Protocol)> {
        self.algorithm.zip(self.protocol)
    }

    /// Channel count as the host's signed integer, if set.
    pub fn channels_raw(&self) -> Option<i32> {
        self.channels.and_then(|c| i32::try_from(c.get()).ok())
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field<T: fmt::Display>(f: &mut fmt::Formatter<'_>, v: Option<T>) -> fmt::Result {
            match v {
                Some(v) => write!(f, "{v}"),
                None => f.write_str("-"),
            }
        }
        f.write_str("algo=")?;
        field(f, self.algorithm)?;
        f.write_str(" proto=")?;
        field(f, self.protocol)?;
        f.write_str(" channels=")?;
        field(f, self.channels)
    }
}
