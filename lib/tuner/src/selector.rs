// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Picks the (algorithm, protocol) cell for a request.

use dynamo_tuner_common::{Algorithm, CollectiveKind, Protocol, is_ignored};
use dynamo_tuner_config::OverrideRule;
use tracing::debug;

use crate::decision::CollectiveRequest;
use crate::table::CostTable;
use crate::topology::TopologyContext;

/// How a selection was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// Minimum over the cost table.
    CostScan,
    /// Pinned by the override rule at this position.
    Override(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub algorithm: Algorithm,
    pub protocol: Protocol,
    /// Table value of the selected cell.
    pub cost: f32,
    pub source: SelectionSource,
    /// Channel count carried by a matching override rule.
    pub pinned_channels: Option<u32>,
}

/// Minimum finite cost among non-ignored cells.
///
/// Cells are visited in algorithm-major order and only a strictly smaller
/// cost replaces the current best, so exact ties resolve to the lower
/// algorithm index, then the lower protocol index.
pub fn min_cost_cell(table: &CostTable<'_>) -> Option<(Algorithm, Protocol, f32)> {
    let mut best: Option<(Algorithm, Protocol, f32)> = None;
    for (algorithm, protocol, cost) in table.iter() {
        if is_ignored(cost) || !cost.is_finite() {
            continue;
        }
        if best.is_none_or(|(_, _, min)| cost < min) {
            best = Some((algorithm, protocol, cost));
        }
    }
    best
}

#[derive(Debug, Clone, Default)]
pub struct Selector {
    overrides: Vec<OverrideRule>,
}

impl Selector {
    pub fn new(overrides: Vec<OverrideRule>) -> Self {
        Self { overrides }
    }

    /// Select a cell, or `None` when nothing in the table is selectable.
    ///
    /// The first matching override whose pinned cell holds a finite,
    /// non-ignored cost wins; otherwise the cheapest cell is taken.
    pub fn select(
        &self,
        context: &TopologyContext,
        kind: CollectiveKind,
        request: &CollectiveRequest,
        table: &CostTable<'_>,
    ) -> Option<Selection> {
        for (idx, rule) in self.overrides.iter().enumerate() {
            if !rule_matches(rule, context, kind, request) {
                continue;
            }
            match table.get(rule.algorithm, rule.protocol) {
                Some(cost) if !is_ignored(cost) && cost.is_finite() => {
                    return Some(Selection {
                        algorithm: rule.algorithm,
                        protocol: rule.protocol,
                        cost,
                        source: SelectionSource::Override(idx),
                        pinned_channels: rule.channels,
                    });
                }
                _ => {
                    debug!(
                        rule = idx,
                        algorithm = %rule.algorithm,
                        protocol = %rule.protocol,
                        "override pins an ignored, non-finite or out-of-range cell; skipping"
                    );
                }
            }
        }

        min_cost_cell(table).map(|(algorithm, protocol, cost)| Selection {
            algorithm,
            protocol,
            cost,
            source: SelectionSource::CostScan,
            pinned_channels: None,
        })
    }
}

fn rule_matches(
    rule: &OverrideRule,
    context: &TopologyContext,
    kind: CollectiveKind,
    request: &CollectiveRequest,
) -> bool {
    rule.collective.is_none_or(|k| k == kind)
        && rule.covers_size(request.size_bytes)
        && rule.node_count.is_none_or(|n| n == context.node_count())
        && rule.rank_count.is_none_or(|n| n == context.rank_count())
        && rule
            .pipelined_op_count
            .is_none_or(|n| n == request.pipelined_ops())
        && rule
            .registered
            .is_none_or(|r| r == request.buffer_registration_requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TracingSink;
    use dynamo_tuner_common::ALGO_PROTO_IGNORE;
    use rstest::rstest;

    fn ctx() -> TopologyContext {
        TopologyContext::new(8, 2, TracingSink::shared()).unwrap()
    }

    fn offset(algorithm: Algorithm, protocol: Protocol) -> usize {
        algorithm.index() * 3 + protocol.index()
    }

    #[test]
    fn test_all_ignored_yields_no_selection() {
        let mut cells = vec![ALGO_PROTO_IGNORE; 21];
        let table = CostTable::new(&mut cells, 7, 3).unwrap();
        assert!(min_cost_cell(&table).is_none());
    }

    #[test]
    fn test_non_finite_cells_never_selected() {
        let mut cells = vec![ALGO_PROTO_IGNORE; 21];
        cells[0] = f32::NAN;
        cells[1] = f32::INFINITY;
        let table = CostTable::new(&mut cells, 7, 3).unwrap();
        assert!(min_cost_cell(&table).is_none());
    }

    #[rstest]
    #[case(Algorithm::Tree, Protocol::Ll, 0.0)]
    #[case(Algorithm::Ring, Protocol::Simple, 1e9)]
    #[case(Algorithm::Pat, Protocol::Ll128, 42.0)]
    fn test_single_finite_cell_selected(
        #[case] algorithm: Algorithm,
        #[case] protocol: Protocol,
        #[case] cost: f32,
    ) {
        let mut cells = vec![ALGO_PROTO_IGNORE; 21];
        cells[offset(algorithm, protocol)] = cost;
        let table = CostTable::new(&mut cells, 7, 3).unwrap();
        assert_eq!(min_cost_cell(&table), Some((algorithm, protocol, cost)));
    }

    #[test]
    fn test_ties_break_to_lowest_index() {
        let mut cells = vec![10.0f32; 21];
        cells[offset(Algorithm::Nvls, Protocol::Ll)] = 1.0;
        cells[offset(Algorithm::Ring, Protocol::Simple)] = 1.0;
        cells[offset(Algorithm::Ring, Protocol::Ll128)] = 1.0;
        let table = CostTable::new(&mut cells, 7, 3).unwrap();
        for _ in 0..10 {
            assert_eq!(
                min_cost_cell(&table),
                Some((Algorithm::Ring, Protocol::Ll128, 1.0))
            );
        }
    }

    #[test]
    fn test_override_pins_cell() {
        let mut cells: Vec<f32> = (1..=21).map(|i| i as f32).collect();
        let table = CostTable::new(&mut cells, 7, 3).unwrap();
        let rule = OverrideRule {
            collective: Some(CollectiveKind::AllReduce),
            max_bytes: Some(1 << 20),
            channels: Some(2),
            ..OverrideRule::new(Algorithm::Pat, Protocol::Simple)
        };
        let selector = Selector::new(vec![rule]);

        let req = CollectiveRequest::new(CollectiveKind::AllReduce, 1024);
        let sel = selector
            .select(&ctx(), CollectiveKind::AllReduce, &req, &table)
            .unwrap();
        assert_eq!((sel.algorithm, sel.protocol), (Algorithm::Pat, Protocol::Simple));
        assert_eq!(sel.source, SelectionSource::Override(0));
        assert_eq!(sel.pinned_channels, Some(2));

        // Outside the byte range the cost scan takes over.
        let big = CollectiveRequest::new(CollectiveKind::AllReduce, 1 << 21);
        let sel = selector
            .select(&ctx(), CollectiveKind::AllReduce, &big, &table)
            .unwrap();
        assert_eq!((sel.algorithm, sel.protocol), (Algorithm::Tree, Protocol::Ll));
        assert_eq!(sel.source, SelectionSource::CostScan);

        // Other collectives are not affected.
        let bcast = CollectiveRequest::new(CollectiveKind::Broadcast, 1024);
        let sel = selector
            .select(&ctx(), CollectiveKind::Broadcast, &bcast, &table)
            .unwrap();
        assert_eq!(sel.source, SelectionSource::CostScan);
    }

    #[test]
    fn test_override_on_ignored_cell_skipped() {
        let mut cells = vec![5.0f32; 21];
        cells[offset(Algorithm::Nvls, Protocol::Simple)] = ALGO_PROTO_IGNORE;
        cells[offset(Algorithm::Ring, Protocol::Ll)] = 1.0;
        let table = CostTable::new(&mut cells, 7, 3).unwrap();
        let selector = Selector::new(vec![
            OverrideRule::new(Algorithm::Nvls, Protocol::Simple),
            OverrideRule::new(Algorithm::CollNetChain, Protocol::Ll128),
        ]);

        let req = CollectiveRequest::new(CollectiveKind::AllGather, 64);
        let sel = selector
            .select(&ctx(), CollectiveKind::AllGather, &req, &table)
            .unwrap();
        assert_eq!(
            (sel.algorithm, sel.protocol, sel.source),
            (Algorithm::CollNetChain, Protocol::Ll128, SelectionSource::Override(1))
        );
    }

    #[rstest]
    #[case(f32::NAN)]
    #[case(f32::INFINITY)]
    fn test_override_on_non_finite_cell_skipped(#[case] pinned: f32) {
        let mut cells = vec![5.0f32; 21];
        cells[offset(Algorithm::Ring, Protocol::Ll)] = pinned;
        cells[offset(Algorithm::Nvls, Protocol::Ll128)] = 2.0;
        let table = CostTable::new(&mut cells, 7, 3).unwrap();
        let selector = Selector::new(vec![OverrideRule::new(Algorithm::Ring, Protocol::Ll)]);

        let req = CollectiveRequest::new(CollectiveKind::AllReduce, 1024);
        let sel = selector
            .select(&ctx(), CollectiveKind::AllReduce, &req, &table)
            .unwrap();
        assert_eq!(
            (sel.algorithm, sel.protocol, sel.source),
            (Algorithm::Nvls, Protocol::Ll128, SelectionSource::CostScan)
        );
    }

    #[test]
    fn test_override_topology_and_registration_filters() {
        let mut cells = vec![5.0f32; 21];
        let table = CostTable::new(&mut cells, 7, 3).unwrap();
        let selector = Selector::new(vec![OverrideRule {
            node_count: Some(2),
            rank_count: Some(8),
            registered: Some(true),
            pipelined_op_count: Some(4),
            ..OverrideRule::new(Algorithm::NvlsTree, Protocol::Simple)
        }]);

        let matching = CollectiveRequest::new(CollectiveKind::ReduceScatter, 64)
            .with_registered_buffer(true)
            .with_pipelined_ops(4);
        let sel = selector
            .select(&ctx(), CollectiveKind::ReduceScatter, &matching, &table)
            .unwrap();
        assert_eq!(sel.source, SelectionSource::Override(0));

        let unregistered = matching.with_registered_buffer(false);
        let sel = selector
            .select(&ctx(), CollectiveKind::ReduceScatter, &unregistered, &table)
            .unwrap();
        assert_eq!(sel.source, SelectionSource::CostScan);

        let other_topology = TopologyContext::new(16, 2, TracingSink::shared()).unwrap();
        let sel = selector
            .select(&other_topology, CollectiveKind::ReduceScatter, &matching, &table)
            .unwrap();
        assert_eq!(sel.source, SelectionSource::CostScan);
    }
}
