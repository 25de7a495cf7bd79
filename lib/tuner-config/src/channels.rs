// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Channel count ceilings and sizing granularity.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

fn default_chunk_bytes() -> u64 {
    256 * 1024
}

fn default_min_channels() -> u32 {
    1
}

fn default_max_channels() -> u32 {
    32
}

/// Channel estimation configuration.
///
/// The estimator asks for one channel per `chunk_bytes` of payload, clamped to
/// `[min_channels, ceiling]`, where the ceiling depends on whether the host
/// requested buffer registration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_channel_range"))]
pub struct ChannelConfig {
    /// Bytes carried per channel before another channel is added.
    ///
    /// Default: 256 KiB
    #[serde(default = "default_chunk_bytes")]
    #[validate(range(min = 1))]
    pub chunk_bytes: u64,

    /// Default: 1
    #[serde(default = "default_min_channels")]
    #[validate(range(min = 1))]
    pub min_channels: u32,

    /// Ceiling for unregistered buffers.
    ///
    /// Default: 32
    #[serde(default = "default_max_channels")]
    #[validate(range(min = 1))]
    pub max_channels: u32,

    /// Ceiling for registered buffers.
    ///
    /// `None` means the registered range is unknown to the tuner and channel
    /// selection for registered buffers is left to the host.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub registered_max_channels: Option<u32>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: default_chunk_bytes(),
            min_channels: default_min_channels(),
            max_channels: default_max_channels(),
            registered_max_channels: None,
        }
    }
}

impl ChannelConfig {
    /// Ceiling for the given registration mode, if one is configured.
    pub fn ceiling(&self, registered: bool) -> Option<u32> {
        if registered {
            self.registered_max_channels
        } else {
            Some(self.max_channels)
        }
    }
}

fn validate_channel_range(config: &ChannelConfig) -> Result<(), ValidationError> {
    if config.min_channels > config.max_channels {
        let mut err = ValidationError::new("min_channels_above_max");
        err.message = Some("min_channels must not exceed max_channels".into());
        return Err(err);
    }
    if config
        .registered_max_channels
        .is_some_and(|registered| config.min_channels > registered)
    {
        let mut err = ValidationError::new("min_channels_above_registered_max");
        err.message = Some("min_channels must not exceed registered_max_channels".into());
        return Err(err);
    }
    Ok(())
}
