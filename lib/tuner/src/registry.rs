// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Arena of topology contexts addressed by generational handles.
//!
//! Each communicator owns one slot. Destroying a context vacates the slot,
//! and the next context placed there gets a bumped generation, so stale
//! handles are always distinguishable from live ones.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::error::{Result, TunerError};
use crate::sink::LogSink;
use crate::topology::TopologyContext;

const REGISTRY_BITS: u32 = 64;
const INDEX_BITS: u32 = 32;
const GENERATION_BITS: u32 = 32;

const INDEX_SHIFT: u32 = GENERATION_BITS;
const REGISTRY_SHIFT: u32 = INDEX_SHIFT + INDEX_BITS;

const REGISTRY_MASK: u128 = ((1u128 << REGISTRY_BITS) - 1) << REGISTRY_SHIFT;
const INDEX_MASK: u128 = ((1u128 << INDEX_BITS) - 1) << INDEX_SHIFT;
const GENERATION_MASK: u128 = (1u128 << GENERATION_BITS) - 1;

/// Registry ids start at 1 so a zeroed handle never matches a registry.
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-communicator handle encoded in a single u128 value.
///
/// Layout (MSB to LSB): `[registry_id: 64 bits][slot_index: 32 bits][generation: 32 bits]`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle(u128);

impl ContextHandle {
    fn new(registry_id: u64, index: u32, generation: u32) -> Self {
        let raw = ((registry_id as u128) << REGISTRY_SHIFT)
            | ((index as u128) << INDEX_SHIFT)
            | (generation as u128);
        Self(raw)
    }

    /// Reconstruct a handle from its raw u128 representation.
    pub fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn registry_id(&self) -> u64 {
        ((self.0 & REGISTRY_MASK) >> REGISTRY_SHIFT) as u64
    }

    pub fn index(&self) -> u32 {
        ((self.0 & INDEX_MASK) >> INDEX_SHIFT) as u32
    }

    pub fn generation(&self) -> u32 {
        (self.0 & GENERATION_MASK) as u32
    }
}

impl Display for ContextHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContextHandle(registry={}, index={}, generation={})",
            self.registry_id(),
            self.index(),
            self.generation()
        )
    }
}

#[derive(Debug)]
struct Slot {
    /// Generation of the most recent context placed in this slot.
    generation: u32,
    context: Option<Arc<TopologyContext>>,
}

#[derive(Debug, Default)]
struct Slots {
    entries: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

/// Where a handle stands relative to the slot it points at.
enum SlotState<'a> {
    Live(&'a Arc<TopologyContext>),
    Destroyed,
    Foreign,
}

/// Owns every topology context created through it.
///
/// Lookups take a shared lock just long enough to clone the `Arc`; tuning
/// itself runs without holding any lock.
#[derive(Debug)]
pub struct ContextRegistry {
    id: u64,
    slots: RwLock<Slots>,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            slots: RwLock::new(Slots::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of contexts created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.slots.read().live
    }

    /// Validate the topology and place a new context in the arena.
    pub fn create(
        &self,
        rank_count: usize,
        node_count: usize,
        logger: Arc<dyn LogSink>,
    ) -> Result<ContextHandle> {
        let context = Arc::new(TopologyContext::new(rank_count, node_count, logger)?);
        let mut slots = self.slots.write();

        let handle = match slots.free.pop() {
            Some(index) => {
                let slot = &mut slots.entries[index as usize];
                slot.generation += 1;
                slot.context = Some(context);
                ContextHandle::new(self.id, index, slot.generation)
            }
            None => {
                let index = u32::try_from(slots.entries.len()).map_err(|_| {
                    TunerError::Exhausted {
                        capacity: u32::MAX as usize,
                    }
                })?;
                slots.entries.push(Slot {
                    generation: 1,
                    context: Some(context),
                });
                ContextHandle::new(self.id, index, 1)
            }
        };
        slots.live += 1;

        debug!(%handle, rank_count, node_count, "created topology context");
        Ok(handle)
    }

    /// Resolve a handle to its context.
    ///
    /// A handle that was destroyed yields [`TunerError::UseAfterDestroy`]. That
    /// is a caller ordering bug, so it is also logged at error level.
    pub fn get(&self, handle: ContextHandle) -> Result<Arc<TopologyContext>> {
        let slots = self.slots.read();
        match self.classify(&slots, handle) {
            SlotState::Live(context) => Ok(Arc::clone(context)),
            SlotState::Destroyed => {
                error!(%handle, "topology context used after destroy");
                Err(TunerError::UseAfterDestroy { handle })
            }
            SlotState::Foreign => {
                error!(%handle, "unknown topology context handle");
                Err(TunerError::InvalidHandle { handle })
            }
        }
    }

    /// Destroy the context behind `handle`.
    ///
    /// # Preconditions
    ///
    /// Every tuning call that resolved this handle must have returned before
    /// `destroy` is called. The registry does not track in-flight calls; a
    /// call that already cloned the context finishes against the old
    /// snapshot, and any later call fails with `UseAfterDestroy`.
    pub fn destroy(&self, handle: ContextHandle) -> Result<()> {
        let mut slots = self.slots.write();
        match self.classify(&slots, handle) {
            SlotState::Live(_) => {}
            SlotState::Destroyed => {
                error!(%handle, "topology context destroyed twice");
                return Err(TunerError::DoubleDestroy { handle });
            }
            SlotState::Foreign => {
                error!(%handle, "destroy called with unknown handle");
                return Err(TunerError::InvalidHandle { handle });
            }
        }

        let index = handle.index();
        let slot = &mut slots.entries[index as usize];
        slot.context = None;
        // A slot whose generation space is spent is retired instead of reused.
        if slot.generation < u32::MAX {
            slots.free.push(index);
        } else {
            trace!(index, "retiring context slot after exhausting generation space");
        }
        slots.live -= 1;

        debug!(%handle, "destroyed topology context");
        Ok(())
    }

    fn classify<'a>(&self, slots: &'a Slots, handle: ContextHandle) -> SlotState<'a> {
        if handle.registry_id() != self.id || handle.generation() == 0 {
            return SlotState::Foreign;
        }
        let Some(slot) = slots.entries.get(handle.index() as usize) else {
            return SlotState::Foreign;
        };
        if handle.generation() > slot.generation {
            return SlotState::Foreign;
        }
        match (&slot.context, handle.generation() == slot.generation) {
            (Some(context), true) => SlotState::Live(context),
            _ => SlotState::Destroyed,
        }
    }
}
