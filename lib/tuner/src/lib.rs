// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Dynamo Collective Tuner
//!
//! Decides which algorithm, protocol and channel count a collective
//! communication library should use for each call. The host supplies a cost
//! table indexed by (algorithm, protocol); the tuner refines it with a
//! closed-form cost model, picks the cheapest usable cell, sizes the channel
//! count and reports the decision back. Anything it cannot decide is left to
//! the host's defaults.
//!
//! ```no_run
//! use dynamo_tuner::{CollTuner, CollectiveRequest, CostTable, TracingSink, TunerCatalog, TunerVersion};
//! use dynamo_tuner_common::CollectiveKind;
//! use dynamo_tuner_config::TunerConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TunerConfig::from_env()?;
//! let catalog = TunerCatalog::with_builtin(&config);
//! let tuner = catalog
//!     .negotiate_for(&config, TunerVersion::V1..=TunerVersion::LATEST)
//!     .expect("built-in tuner is always registered");
//!
//! let ctx = tuner.init(8, 2, TracingSink::shared())?;
//! let mut cells = vec![1.0f32; 21];
//! let mut table = CostTable::new(&mut cells, 7, 3)?;
//! let request = CollectiveRequest::new(CollectiveKind::AllReduce, 1 << 20);
//! let decision = tuner.get_coll_info(ctx, &request, &mut table)?;
//! println!("{decision}");
//! tuner.destroy(ctx)?;
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod decision;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod plugin;
pub mod registry;
pub mod selector;
pub mod sink;
pub mod table;
pub mod topology;

pub use channels::ChannelEstimator;
pub use decision::{CollectiveRequest, Decision};
pub use engine::{DecisionEngine, FallbackReason, Outcome, Stage, Terminal};
pub use error::{Result, TunerError};
pub use model::{BuildReport, CostModel};
pub use plugin::{COST_MODEL_TUNER_NAME, CollTuner, CostModelTuner, TunerCatalog, TunerVersion};
pub use registry::{ContextHandle, ContextRegistry};
pub use selector::{Selection, SelectionSource, Selector, min_cost_cell};
pub use sink::{LogLevel, LogRecord, LogSink, MemorySink, Subsystem, TracingSink};
pub use table::CostTable;
pub use topology::TopologyContext;
