// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Borrowed view over the host's cost table.

use dynamo_tuner_common::{Algorithm, NUM_ALGORITHMS, NUM_PROTOCOLS, Protocol, is_ignored};

use crate::error::{Result, TunerError};

/// Rectangular `num_algorithms x num_protocols` grid of estimated costs,
/// stored algorithm-major in memory owned by the host.
///
/// The view never reallocates or resizes the host's storage, and every access
/// is bounds-checked against the declared dimensions rather than the full
/// algorithm/protocol space. Cells holding a negative value (the host writes
/// [`ALGO_PROTO_IGNORE`](dynamo_tuner_common::ALGO_PROTO_IGNORE)) are
/// read-only through this view.
#[derive(Debug)]
pub struct CostTable<'a> {
    cells: &'a mut [f32],
    num_algorithms: usize,
    num_protocols: usize,
}

impl<'a> CostTable<'a> {
    pub fn new(cells: &'a mut [f32], num_algorithms: usize, num_protocols: usize) -> Result<Self> {
        if num_algorithms == 0 || num_protocols == 0 {
            return Err(TunerError::InvalidTable(format!(
                "empty table ({num_algorithms}x{num_protocols})"
            )));
        }
        if num_algorithms > NUM_ALGORITHMS || num_protocols > NUM_PROTOCOLS {
            return Err(TunerError::InvalidTable(format!(
                "table is {num_algorithms}x{num_protocols}, at most {NUM_ALGORITHMS}x{NUM_PROTOCOLS} is supported"
            )));
        }
        if cells.len() != num_algorithms * num_protocols {
            return Err(TunerError::InvalidTable(format!(
                "{} cells cannot form a {num_algorithms}x{num_protocols} table",
                cells.len()
            )));
        }
        Ok(Self {
            cells,
            num_algorithms,
            num_protocols,
        })
    }

    pub fn num_algorithms(&self) -> usize {
        self.num_algorithms
    }

    pub fn num_protocols(&self) -> usize {
        self.num_protocols
    }

    fn offset(&self, algorithm: Algorithm, protocol: Protocol) -> Option<usize> {
        let (a, p) = (algorithm.index(), protocol.index());
        (a < self.num_algorithms && p < self.num_protocols).then_some(a * self.num_protocols + p)
    }

    /// Current cost of a cell, or `None` when the cell lies outside the table.
    pub fn get(&self, algorithm: Algorithm, protocol: Protocol) -> Option<f32> {
        self.offset(algorithm, protocol).map(|i| self.cells[i])
    }

    /// Returns `true` if the cell is inside the table and not ignored.
    pub fn is_selectable(&self, algorithm: Algorithm, protocol: Protocol) -> bool {
        self.get(algorithm, protocol).is_some_and(|c| !is_ignored(c))
    }

    /// Overwrite a non-ignored cell. Returns `false` and leaves the table
    /// untouched for ignored or out-of-range cells.
    pub fn set(&mut self, algorithm: Algorithm, protocol: Protocol, cost: f32) -> bool {
        match self.offset(algorithm, protocol) {
            Some(i) if !is_ignored(self.cells[i]) => {
                self.cells[i] = cost;
                true
            }
            _ => false,
        }
    }

    /// All cells in algorithm-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Algorithm, Protocol, f32)> + '_ {
        self.cells.iter().enumerate().filter_map(|(i, cost)| {
            let algorithm = Algorithm::from_index(i / self.num_protocols)?;
            let protocol = Protocol::from_index(i % self.num_protocols)?;
            Some((algorithm, protocol, *cost))
        })
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<f32> {
        self.cells.to_vec()
    }
}
