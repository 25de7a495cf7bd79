// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-call decision pipeline.
//!
//! ```text
//! Start -> BuildCost -> Select -> EstimateChannels -> Done
//!              |          |
//!              v          v
//!           Fallback   Fallback   (unless the host supplied a channel hint)
//! ```
//!
//! Every call is independent: the engine keeps no per-call state and the
//! table is owned by the caller for the duration of the call, so one engine
//! can serve any number of threads.

use dynamo_tuner_config::TunerConfig;
use tracing::debug;

use crate::channels::ChannelEstimator;
use crate::decision::{CollectiveRequest, Decision};
use crate::error::Result;
use crate::model::CostModel;
use crate::selector::{Selection, Selector};
use crate::sink::{LogLevel, Subsystem};
use crate::table::CostTable;
use crate::topology::TopologyContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    BuildCost,
    Select,
    EstimateChannels,
    Done,
    Fallback,
}

/// Why a call handed the decision back to the host's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    UnsupportedOperation { code: i32 },
    NoSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// A full or partial decision was produced.
    Done,
    /// Nothing was decided.
    Fallback(FallbackReason),
}

/// Result of one pass through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub decision: Decision,
    pub terminal: Terminal,
    pub selection: Option<Selection>,
    /// Stages visited, in order, ending in `Done` or `Fallback`.
    pub trace: Vec<Stage>,
}

impl Outcome {
    fn fallback(reason: FallbackReason, mut trace: Vec<Stage>) -> Self {
        trace.push(Stage::Fallback);
        Self {
            decision: Decision::empty(),
            terminal: Terminal::Fallback(reason),
            selection: None,
            trace,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.terminal, Terminal::Fallback(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    model: CostModel,
    selector: Selector,
    channels: ChannelEstimator,
}

impl DecisionEngine {
    pub fn new(config: &TunerConfig) -> Self {
        Self {
            model: CostModel::new(config.cost.clone()),
            selector: Selector::new(config.overrides.clone()),
            channels: ChannelEstimator::new(config.channels.clone()),
        }
    }

    /// Validate `config`, then build an engine from it.
    pub fn try_new(config: &TunerConfig) -> Result<Self> {
        config.ensure_valid()?;
        Ok(Self::new(config))
    }

    /// Build an engine from the environment and configuration files.
    pub fn from_env() -> Result<Self> {
        let config = TunerConfig::from_env()?;
        Ok(Self::new(&config))
    }

    pub fn model(&self) -> &CostModel {
        &self.model
    }

    pub fn channel_estimator(&self) -> &ChannelEstimator {
        &self.channels
    }

    /// Run the pipeline for one request.
    ///
    /// Never fails: an unrecognized function code or an empty table end in
    /// [`Terminal::Fallback`] with an empty decision.
    pub fn decide(
        &self,
        context: &TopologyContext,
        request: &CollectiveRequest,
        table: &mut CostTable<'_>,
    ) -> Outcome {
        let mut trace = vec![Stage::Start, Stage::BuildCost];

        let report = match self.model.build(context, request, table) {
            Ok(report) => report,
            Err(e) => {
                // Building only fails on function codes it cannot model.
                let code = request.function;
                debug!(code, error = %e, "cost build failed; falling back to default tuning");
                context.log(
                    LogLevel::Info,
                    Subsystem::TUNING,
                    format_args!("tuner: unsupported function {code}, using default tuning"),
                );
                return Outcome::fallback(FallbackReason::UnsupportedOperation { code }, trace);
            }
        };

        trace.push(Stage::Select);
        let selection = self.selector.select(context, report.kind, request, table);

        let decision = match selection {
            Some(sel) => {
                trace.push(Stage::EstimateChannels);
                Decision {
                    algorithm: Some(sel.algorithm),
                    protocol: Some(sel.protocol),
                    channels: self.channels.estimate(context, &sel, request),
                }
            }
            None if request.channel_hint.is_some() => {
                trace.push(Stage::EstimateChannels);
                Decision {
                    channels: self.channels.refine_hint(request),
                    ..Decision::empty()
                }
            }
            None => Decision::empty(),
        };

        if decision.is_empty() {
            debug!(kind = %report.kind, "no selectable cell; falling back to default tuning");
            return Outcome::fallback(FallbackReason::NoSelection, trace);
        }

        trace.push(Stage::Done);
        debug!(
            kind = %report.kind,
            size = request.size_bytes,
            pipelined_ops = request.pipelined_ops(),
            %decision,
            "tuning decision"
        );
        context.log(
            LogLevel::Trace,
            Subsystem::TUNING,
            format_args!(
                "tuner: {} {} bytes -> {}",
                report.kind, request.size_bytes, decision
            ),
        );

        Outcome {
            decision,
            terminal: Terminal::Done,
            selection,
            trace,
        }
    }
}
