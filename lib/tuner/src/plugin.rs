// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Versioned tuner interface and implementation catalog.
//!
//! A host asks the [`TunerCatalog`] for an implementation compatible with the
//! interface versions it understands. Any number of implementations can be
//! registered side by side; negotiation picks one per host.

use std::fmt;
use std::num::NonZeroU32;
use std::ops::RangeInclusive;
use std::sync::Arc;

use dynamo_tuner_common::{Algorithm, Protocol, is_ignored};
use dynamo_tuner_config::TunerConfig;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::decision::{CollectiveRequest, Decision};
use crate::engine::DecisionEngine;
use crate::error::{Result, TunerError};
use crate::registry::{ContextHandle, ContextRegistry};
use crate::sink::LogSink;
use crate::table::CostTable;

/// Name of the built-in cost model tuner.
pub const COST_MODEL_TUNER_NAME: &str = "dynamo-cost-model";

/// Tuner interface revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TunerVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
    /// Adds the pipelined op count and buffer registration inputs.
    V4 = 4,
}

impl TunerVersion {
    pub const LATEST: TunerVersion = TunerVersion::V4;

    pub fn number(self) -> u32 {
        self as u32
    }

    /// Symbol a dynamically loaded implementation of this revision exports.
    pub fn symbol_name(self) -> String {
        format!("ncclTunerPlugin_v{}", self.number())
    }
}

impl fmt::Display for TunerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

/// A collective tuner: per-communicator setup, per-call decisions, teardown.
pub trait CollTuner: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> TunerVersion;

    /// Create the per-communicator context.
    fn init(
        &self,
        rank_count: usize,
        node_count: usize,
        logger: Arc<dyn LogSink>,
    ) -> Result<ContextHandle>;

    /// Decide algorithm, protocol and channel count for one collective.
    ///
    /// `Ok` with unset fields means the host fills those fields with its
    /// defaults. `Err` means the host applies its default tuning to the whole
    /// call.
    fn get_coll_info(
        &self,
        context: ContextHandle,
        request: &CollectiveRequest,
        table: &mut CostTable<'_>,
    ) -> Result<Decision>;

    /// Tear down the per-communicator context.
    ///
    /// # Preconditions
    ///
    /// All `get_coll_info` calls on `context` have returned.
    fn destroy(&self, context: ContextHandle) -> Result<()>;

    /// Host-facing form of [`CollTuner::get_coll_info`] using the flat
    /// in/out arguments of the plugin boundary.
    ///
    /// The selected cell is reported by setting its cost to `0.0` and raising
    /// any other usable cell at zero just above it, so the selected cell is the
    /// table's strict minimum. This needs both algorithm and protocol; a
    /// half-chosen cell leaves the table as modeled. A positive `n_channels`
    /// on entry is treated as the host's channel hint and is overwritten only
    /// when a channel count is decided.
    #[allow(clippy::too_many_arguments)]
    fn get_coll_info_raw(
        &self,
        context: ContextHandle,
        coll_type: i32,
        n_bytes: usize,
        num_pipe_ops: i32,
        cost_table: &mut [f32],
        num_algo: i32,
        num_proto: i32,
        reg_buff: i32,
        n_channels: &mut i32,
    ) -> Result<()> {
        let num_algo = usize::try_from(num_algo)
            .map_err(|_| TunerError::InvalidTable(format!("negative algorithm count {num_algo}")))?;
        let num_proto = usize::try_from(num_proto)
            .map_err(|_| TunerError::InvalidTable(format!("negative protocol count {num_proto}")))?;
        let mut table = CostTable::new(cost_table, num_algo, num_proto)?;

        let hint = u32::try_from(*n_channels).ok().and_then(NonZeroU32::new);
        let request = CollectiveRequest::from_code(coll_type, n_bytes as u64)
            .with_pipelined_ops(u32::try_from(num_pipe_ops).unwrap_or(1))
            .with_registered_buffer(reg_buff != 0)
            .with_channel_hint(hint);

        let decision = self.get_coll_info(context, &request, &mut table)?;

        if let Some((algorithm, protocol)) = decision.cell() {
            mark_selected(&mut table, algorithm, protocol);
        }
        if let Some(channels) = decision.channels_raw() {
            *n_channels = channels;
        }
        Ok(())
    }
}

/// Highest version wins; the earliest candidate wins a tie.
fn highest<'a>(
    candidates: impl Iterator<Item = &'a Arc<dyn CollTuner>>,
) -> Option<Arc<dyn CollTuner>> {
    candidates
        .fold(None::<&'a Arc<dyn CollTuner>>, |best, t| match best {
            Some(b) if b.version() >= t.version() => Some(b),
            _ => Some(t),
        })
        .cloned()
}

fn mark_selected(table: &mut CostTable<'_>, algorithm: Algorithm, protocol: Protocol) {
    if !table.set(algorithm, protocol, 0.0) {
        warn!(%algorithm, %protocol, "selected cell could not be marked in the host table");
        return;
    }
    let ties: Vec<(Algorithm, Protocol)> = table
        .iter()
        .filter(|&(a, p, cost)| {
            (a, p) != (algorithm, protocol) && !is_ignored(cost) && cost <= 0.0
        })
        .map(|(a, p, _)| (a, p))
        .collect();
    for (a, p) in ties {
        table.set(a, p, f32::MIN_POSITIVE);
    }
}

/// The built-in tuner backed by the closed-form cost model.
pub struct CostModelTuner {
    name: String,
    registry: ContextRegistry,
    engine: DecisionEngine,
}

impl CostModelTuner {
    pub fn new(config: &TunerConfig) -> Self {
        Self::with_engine(COST_MODEL_TUNER_NAME, DecisionEngine::new(config))
    }

    /// Validate `config`, then build the tuner from it.
    pub fn try_new(config: &TunerConfig) -> Result<Self> {
        Ok(Self::with_engine(
            COST_MODEL_TUNER_NAME,
            DecisionEngine::try_new(config)?,
        ))
    }

    pub fn with_engine(name: impl Into<String>, engine: DecisionEngine) -> Self {
        Self {
            name: name.into(),
            registry: ContextRegistry::new(),
            engine,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }
}

impl fmt::Debug for CostModelTuner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostModelTuner")
            .field("name", &self.name)
            .field("live_contexts", &self.registry.live_count())
            .finish()
    }
}

impl CollTuner for CostModelTuner {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> TunerVersion {
        TunerVersion::V4
    }

    fn init(
        &self,
        rank_count: usize,
        node_count: usize,
        logger: Arc<dyn LogSink>,
    ) -> Result<ContextHandle> {
        self.registry.create(rank_count, node_count, logger)
    }

    fn get_coll_info(
        &self,
        context: ContextHandle,
        request: &CollectiveRequest,
        table: &mut CostTable<'_>,
    ) -> Result<Decision> {
        let topology = self.registry.get(context)?;
        Ok(self.engine.decide(&topology, request, table).decision)
    }

    fn destroy(&self, context: ContextHandle) -> Result<()> {
        self.registry.destroy(context)
    }
}

/// Registered tuner implementations.
#[derive(Default)]
pub struct TunerCatalog {
    tuners: RwLock<Vec<Arc<dyn CollTuner>>>,
}

impl fmt::Debug for TunerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tuners = self.tuners.read();
        f.debug_list()
            .entries(tuners.iter().map(|t| format!("{}@{}", t.name(), t.version())))
            .finish()
    }
}

impl TunerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in cost model tuner.
    pub fn with_builtin(config: &TunerConfig) -> Self {
        let catalog = Self::new();
        catalog.register(Arc::new(CostModelTuner::new(config)));
        catalog
    }

    /// Add an implementation. An existing entry with the same name and
    /// version is replaced.
    pub fn register(&self, tuner: Arc<dyn CollTuner>) {
        let mut tuners = self.tuners.write();
        if let Some(existing) = tuners
            .iter_mut()
            .find(|t| t.name() == tuner.name() && t.version() == tuner.version())
        {
            warn!(name = tuner.name(), version = %tuner.version(), "replacing registered tuner");
            *existing = tuner;
            return;
        }
        debug!(name = tuner.name(), version = %tuner.version(), "registered tuner");
        tuners.push(tuner);
    }

    pub fn len(&self) -> usize {
        self.tuners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuners.read().is_empty()
    }

    /// Pick an implementation whose version the host supports.
    ///
    /// A preferred name narrows the candidates when it matches one; otherwise
    /// it is ignored with a warning. Among candidates the highest version wins,
    /// then the earliest registered.
    pub fn negotiate(
        &self,
        supported: RangeInclusive<TunerVersion>,
        preferred: Option<&str>,
    ) -> Option<Arc<dyn CollTuner>> {
        let tuners = self.tuners.read();
        let compatible: Vec<&Arc<dyn CollTuner>> = tuners
            .iter()
            .filter(|t| supported.contains(&t.version()))
            .collect();

        if let Some(name) = preferred {
            if let Some(found) = highest(compatible.iter().copied().filter(|t| t.name() == name)) {
                return Some(found);
            }
            warn!(name, "preferred tuner not available; negotiating among all tuners");
        }

        highest(compatible.into_iter())
    }

    /// Negotiate using the `plugin` preference from configuration.
    pub fn negotiate_for(
        &self,
        config: &TunerConfig,
        supported: RangeInclusive<TunerVersion>,
    ) -> Option<Arc<dyn CollTuner>> {
        self.negotiate(supported, config.plugin.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TracingSink;
    use dynamo_tuner_common::{ALGO_PROTO_IGNORE, CollectiveKind};
    use dynamo_tuner_config::OverrideRule;

    /// Tuner that never decides anything.
    struct NullTuner {
        name: &'static str,
        version: TunerVersion,
    }

    impl CollTuner for NullTuner {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> TunerVersion {
            self.version
        }

        fn init(&self, _: usize, _: usize, _: Arc<dyn LogSink>) -> Result<ContextHandle> {
            Ok(ContextHandle::from_raw(0))
        }

        fn get_coll_info(
            &self,
            _: ContextHandle,
            _: &CollectiveRequest,
            _: &mut CostTable<'_>,
        ) -> Result<Decision> {
            Ok(Decision::empty())
        }

        fn destroy(&self, _: ContextHandle) -> Result<()> {
            Ok(())
        }
    }

    fn null(name: &'static str, version: TunerVersion) -> Arc<dyn CollTuner> {
        Arc::new(NullTuner { name, version })
    }

    #[test]
    fn test_symbol_name() {
        assert_eq!(TunerVersion::V4.symbol_name(), "ncclTunerPlugin_v4");
        assert_eq!(TunerVersion::LATEST, TunerVersion::V4);
        assert!(TunerVersion::V2 < TunerVersion::V3);
    }

    #[test]
    fn test_negotiate_highest_compatible() {
        let catalog = TunerCatalog::new();
        catalog.register(null("old", TunerVersion::V2));
        catalog.register(null("new", TunerVersion::V4));
        catalog.register(null("mid", TunerVersion::V3));

        let t = catalog
            .negotiate(TunerVersion::V1..=TunerVersion::V4, None)
            .unwrap();
        assert_eq!(t.name(), "new");

        let t = catalog
            .negotiate(TunerVersion::V1..=TunerVersion::V3, None)
            .unwrap();
        assert_eq!(t.name(), "mid");

        assert!(catalog
            .negotiate(TunerVersion::V1..=TunerVersion::V1, None)
            .is_none());
    }

    #[test]
    fn test_negotiate_preferred_name() {
        let catalog = TunerCatalog::new();
        catalog.register(null("alpha", TunerVersion::V4));
        catalog.register(null("beta", TunerVersion::V3));
        catalog.register(null("beta", TunerVersion::V2));

        let t = catalog
            .negotiate(TunerVersion::V1..=TunerVersion::V4, Some("beta"))
            .unwrap();
        assert_eq!((t.name(), t.version()), ("beta", TunerVersion::V3));

        let t = catalog
            .negotiate(TunerVersion::V1..=TunerVersion::V4, Some("missing"))
            .unwrap();
        assert_eq!(t.name(), "alpha");
    }

    #[test]
    fn test_register_replaces_same_name_and_version() {
        let catalog = TunerCatalog::new();
        catalog.register(null("a", TunerVersion::V4));
        catalog.register(null("a", TunerVersion::V4));
        catalog.register(null("a", TunerVersion::V3));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_builtin_from_config_preference() {
        let config = TunerConfig {
            plugin: Some(COST_MODEL_TUNER_NAME.to_string()),
            ..Default::default()
        };
        let catalog = TunerCatalog::with_builtin(&config);
        catalog.register(null("other", TunerVersion::V4));

        let t = catalog
            .negotiate_for(&config, TunerVersion::V1..=TunerVersion::LATEST)
            .unwrap();
        assert_eq!(t.name(), COST_MODEL_TUNER_NAME);
    }

    #[test]
    fn test_raw_marks_selected_cell_and_channels() {
        let tuner = CostModelTuner::new(&TunerConfig::default());
        let ctx = tuner.init(8, 2, TracingSink::shared()).unwrap();

        let mut cells = vec![ALGO_PROTO_IGNORE; 21];
        cells[Algorithm::Ring.index() * 3 + Protocol::Simple.index()] = 40.0;
        cells[Algorithm::Tree.index() * 3 + Protocol::Ll.index()] = 50.0;
        let mut n_channels = 0;

        tuner
            .get_coll_info_raw(
                ctx,
                CollectiveKind::AllReduce.code(),
                1 << 20,
                1,
                &mut cells,
                7,
                3,
                0,
                &mut n_channels,
            )
            .unwrap();

        assert_eq!(cells[Algorithm::Ring.index() * 3 + Protocol::Simple.index()], 0.0);
        assert_eq!(cells[Algorithm::Tree.index() * 3 + Protocol::Ll.index()], 50.0);
        assert_eq!(n_channels, 4);
        tuner.destroy(ctx).unwrap();
    }

    /// Index of the strict minimum over non-ignored cells, scanning in order.
    fn host_min(cells: &[f32]) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &cost) in cells.iter().enumerate() {
            if cost < 0.0 {
                continue;
            }
            if best.is_none_or(|(_, min)| cost < min) {
                best = Some((i, cost));
            }
        }
        best.map(|(i, _)| i)
    }

    #[test]
    fn test_raw_pinned_cell_beats_existing_zero_cost() {
        let config = TunerConfig {
            overrides: vec![OverrideRule::new(Algorithm::Ring, Protocol::Simple)],
            ..Default::default()
        };
        let tuner = CostModelTuner::new(&config);
        let ctx = tuner.init(8, 2, TracingSink::shared()).unwrap();

        let mut cells = vec![5.0f32; 21];
        cells[Algorithm::Tree.index() * 3 + Protocol::Ll.index()] = 0.0;
        cells[Algorithm::Nvls.index() * 3 + Protocol::Ll.index()] = -0.0;
        cells[Algorithm::Pat.index() * 3 + Protocol::Ll.index()] = ALGO_PROTO_IGNORE;
        let mut n_channels = 0;

        tuner
            .get_coll_info_raw(
                ctx,
                CollectiveKind::AllReduce.code(),
                1 << 20,
                1,
                &mut cells,
                7,
                3,
                0,
                &mut n_channels,
            )
            .unwrap();

        let pinned = Algorithm::Ring.index() * 3 + Protocol::Simple.index();
        assert_eq!(host_min(&cells), Some(pinned));
        assert_eq!(cells[pinned], 0.0);
        assert!(cells[Algorithm::Tree.index() * 3 + Protocol::Ll.index()] > 0.0);
        assert!(cells[Algorithm::Nvls.index() * 3 + Protocol::Ll.index()] > 0.0);
        assert_eq!(
            cells[Algorithm::Pat.index() * 3 + Protocol::Ll.index()],
            ALGO_PROTO_IGNORE
        );
        tuner.destroy(ctx).unwrap();
    }

    #[test]
    fn test_raw_rejects_bad_dimensions() {
        let tuner = CostModelTuner::new(&TunerConfig::default());
        let ctx = tuner.init(2, 1, TracingSink::shared()).unwrap();
        let mut cells = vec![1.0f32; 21];
        let mut n_channels = 0;
        let err = tuner
            .get_coll_info_raw(ctx, 4, 64, 1, &mut cells, -1, 3, 0, &mut n_channels)
            .unwrap_err();
        assert!(matches!(err, TunerError::InvalidTable(_)));
        assert_eq!(n_channels, 0);
    }

    #[test]
    fn test_raw_fallback_leaves_outputs_alone() {
        let tuner = CostModelTuner::new(&TunerConfig::default());
        let ctx = tuner.init(4, 1, TracingSink::shared()).unwrap();
        let mut cells = vec![2.0f32; 21];
        let mut n_channels = 0;
        tuner
            .get_coll_info_raw(ctx, 99, 64, 1, &mut cells, 7, 3, 0, &mut n_channels)
            .unwrap();
        assert!(cells.iter().all(|c| *c == 2.0));
        assert_eq!(n_channels, 0);
    }
}
