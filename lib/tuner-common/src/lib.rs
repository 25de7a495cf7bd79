// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shared vocabulary for the collective tuner.
//!
//! The numeric values of [`CollectiveKind`], [`Algorithm`] and [`Protocol`] are
//! the indices used by the host collective library, both for the function code
//! passed into a tuning call and for the rows and columns of the cost table.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of algorithms a full cost table carries.
pub const NUM_ALGORITHMS: usize = 7;

/// Number of protocols a full cost table carries.
pub const NUM_PROTOCOLS: usize = 3;

/// Cost table entry written by the host for combinations that are not valid
/// on the current topology or build.
pub const ALGO_PROTO_IGNORE: f32 = -1.0;

/// Returns `true` if a cost table entry marks an ignored combination.
///
/// The host only ever writes the [`ALGO_PROTO_IGNORE`] sentinel, but any
/// negative cost is treated the same way since it cannot be a modeled time.
#[inline]
pub fn is_ignored(cost: f32) -> bool {
    cost < 0.0
}

/// Raised when a raw index does not name a known enum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown {kind} index {value}")]
pub struct UnknownIndex {
    pub kind: &'static str,
    pub value: i64,
}

/// Collective function issued by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectiveKind {
    Broadcast = 0,
    Reduce = 1,
    AllGather = 2,
    ReduceScatter = 3,
    AllReduce = 4,
    SendRecv = 5,
    Send = 6,
    Recv = 7,
}

impl CollectiveKind {
    pub const ALL: [CollectiveKind; 8] = [
        CollectiveKind::Broadcast,
        CollectiveKind::Reduce,
        CollectiveKind::AllGather,
        CollectiveKind::ReduceScatter,
        CollectiveKind::AllReduce,
        CollectiveKind::SendRecv,
        CollectiveKind::Send,
        CollectiveKind::Recv,
    ];

    /// Raw function code as passed across the tuner boundary.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Point-to-point functions do not run a collective algorithm.
    pub fn is_point_to_point(self) -> bool {
        matches!(
            self,
            CollectiveKind::SendRecv | CollectiveKind::Send | CollectiveKind::Recv
        )
    }
}

impl TryFrom<i32> for CollectiveKind {
    type Error = UnknownIndex;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(UnknownIndex {
                kind: "collective",
                value: value as i64,
            })
    }
}

impl fmt::Display for CollectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectiveKind::Broadcast => "Broadcast",
            CollectiveKind::Reduce => "Reduce",
            CollectiveKind::AllGather => "AllGather",
            CollectiveKind::ReduceScatter => "ReduceScatter",
            CollectiveKind::AllReduce => "AllReduce",
            CollectiveKind::SendRecv => "SendRecv",
            CollectiveKind::Send => "Send",
            CollectiveKind::Recv => "Recv",
        };
        f.write_str(name)
    }
}

/// How an algorithm's startup latency grows with the communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmClass {
    /// Depth grows with `log2(nodes)`.
    TreeLike,
    /// Steps grow with the number of ranks.
    RingLike,
    /// Single hop through a switch or network offload.
    Direct,
}

/// Communication pattern used to realize a collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Tree = 0,
    Ring = 1,
    CollNetDirect = 2,
    CollNetChain = 3,
    Nvls = 4,
    NvlsTree = 5,
    Pat = 6,
}

impl Algorithm {
    pub const ALL: [Algorithm; NUM_ALGORITHMS] = [
        Algorithm::Tree,
        Algorithm::Ring,
        Algorithm::CollNetDirect,
        Algorithm::CollNetChain,
        Algorithm::Nvls,
        Algorithm::NvlsTree,
        Algorithm::Pat,
    ];

    /// Row of this algorithm in the cost table.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn class(self) -> AlgorithmClass {
        match self {
            Algorithm::Tree | Algorithm::CollNetChain | Algorithm::NvlsTree | Algorithm::Pat => {
                AlgorithmClass::TreeLike
            }
            Algorithm::Ring => AlgorithmClass::RingLike,
            Algorithm::CollNetDirect | Algorithm::Nvls => AlgorithmClass::Direct,
        }
    }

    /// Algorithms whose channels each map onto a path through the ranks, so
    /// running more channels than ranks buys nothing.
    pub fn is_rank_bound(self) -> bool {
        matches!(
            self,
            Algorithm::Tree | Algorithm::Ring | Algorithm::CollNetChain | Algorithm::Pat
        )
    }
}

impl TryFrom<usize> for Algorithm {
    type Error = UnknownIndex;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or(UnknownIndex {
            kind: "algorithm",
            value: value as i64,
        })
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Tree => "TREE",
            Algorithm::Ring => "RING",
            Algorithm::CollNetDirect => "COLLNET_DIRECT",
            Algorithm::CollNetChain => "COLLNET_CHAIN",
            Algorithm::Nvls => "NVLS",
            Algorithm::NvlsTree => "NVLS_TREE",
            Algorithm::Pat => "PAT",
        };
        f.write_str(name)
    }
}

/// Low-level transfer mode used within an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Ll = 0,
    Ll128 = 1,
    Simple = 2,
}

impl Protocol {
    pub const ALL: [Protocol; NUM_PROTOCOLS] = [Protocol::Ll, Protocol::Ll128, Protocol::Simple];

    /// Column of this protocol in the cost table.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl TryFrom<usize> for Protocol {
    type Error = UnknownIndex;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or(UnknownIndex {
            kind: "protocol",
            value: value as i64,
        })
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Ll => "LL",
            Protocol::Ll128 => "LL128",
            Protocol::Simple => "SIMPLE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, CollectiveKind::Broadcast)]
    #[case(4, CollectiveKind::AllReduce)]
    #[case(7, CollectiveKind::Recv)]
    fn test_collective_from_code(#[case] code: i32, #[case] expected: CollectiveKind) {
        assert_eq!(CollectiveKind::try_from(code).unwrap(), expected);
        assert_eq!(expected.code(), code);
    }

    #[rstest]
    #[case(-1)]
    #[case(8)]
    #[case(i32::MAX)]
    fn test_collective_unknown_code(#[case] code: i32) {
        let err = CollectiveKind::try_from(code).unwrap_err();
        assert_eq!(err.value, code as i64);
        assert!(err.to_string().contains("collective"));
    }

    #[test]
    fn test_algorithm_indices_match_table_rows() {
        for (idx, algo) in Algorithm::ALL.iter().enumerate() {
            assert_eq!(algo.index(), idx);
            assert_eq!(Algorithm::from_index(idx), Some(*algo));
        }
        assert!(Algorithm::from_index(NUM_ALGORITHMS).is_none());
        assert!(Protocol::from_index(NUM_PROTOCOLS).is_none());
    }

    #[test]
    fn test_algorithm_classes() {
        assert_eq!(Algorithm::Tree.class(), AlgorithmClass::TreeLike);
        assert_eq!(Algorithm::Ring.class(), AlgorithmClass::RingLike);
        assert_eq!(Algorithm::Nvls.class(), AlgorithmClass::Direct);
        assert!(Algorithm::Ring.is_rank_bound());
        assert!(!Algorithm::Nvls.is_rank_bound());
    }

    #[test]
    fn test_ignore_sentinel() {
        assert!(is_ignored(ALGO_PROTO_IGNORE));
        assert!(!is_ignored(0.0));
        assert!(!is_ignored(12.5));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Algorithm::CollNetDirect).unwrap();
        assert_eq!(json, "\"coll_net_direct\"");
        let proto: Protocol = serde_json::from_str("\"ll128\"").unwrap();
        assert_eq!(proto, Protocol::Ll128);
        let kind: CollectiveKind = serde_json::from_str("\"all_reduce\"").unwrap();
        assert_eq!(kind, CollectiveKind::AllReduce);
    }
}
