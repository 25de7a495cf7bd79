// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Channel count estimation.

use std::num::NonZeroU32;

use dynamo_tuner_config::ChannelConfig;
use tracing::debug;

use crate::decision::CollectiveRequest;
use crate::selector::Selection;
use crate::topology::TopologyContext;

#[derive(Debug, Clone, Default)]
pub struct ChannelEstimator {
    config: ChannelConfig,
}

impl ChannelEstimator {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Channel count for a selected cell.
    ///
    /// One channel per `chunk_bytes` of payload (or the override's pinned
    /// count), clamped to `[min_channels, ceiling]`, then capped at the rank
    /// count for rank-bound algorithms. Returns `None` when the request asks
    /// for buffer registration and no registered ceiling is configured.
    pub fn estimate(
        &self,
        context: &TopologyContext,
        selection: &Selection,
        request: &CollectiveRequest,
    ) -> Option<NonZeroU32> {
        let ceiling = self.ceiling(request)?;

        let wanted = selection.pinned_channels.unwrap_or_else(|| {
            let chunks = request.size_bytes.div_ceil(self.config.chunk_bytes.max(1));
            u32::try_from(chunks).unwrap_or(u32::MAX)
        });
        let mut channels = wanted.clamp(self.config.min_channels.min(ceiling), ceiling);

        if selection.algorithm.is_rank_bound() {
            let ranks = u32::try_from(context.rank_count()).unwrap_or(u32::MAX);
            channels = channels.min(ranks);
        }

        NonZeroU32::new(channels.max(1))
    }

    /// Channel count when no cell was selected.
    ///
    /// Only a host-supplied hint can be refined here; it is clamped to the
    /// active ceiling. Without a hint there is nothing to size.
    pub fn refine_hint(&self, request: &CollectiveRequest) -> Option<NonZeroU32> {
        let hint = request.channel_hint?;
        let ceiling = self.ceiling(request)?;
        NonZeroU32::new(hint.get().min(ceiling).max(1))
    }

    fn ceiling(&self, request: &CollectiveRequest) -> Option<u32> {
        let ceiling = self.config.ceiling(request.buffer_registration_requested);
        if ceiling.is_none() {
            debug!("no registered-buffer channel ceiling configured; leaving channels unset");
        }
        ceiling
    }
}
