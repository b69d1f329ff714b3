//! Entity ids.
//!
//! An [`EntityId`] packs a slot index (low 32 bits) and a generation (high 32
//! bits). Destroying an entity retires its generation, so a pool ledger entry
//! that outlives its entity is recognised as stale rather than silently
//! pointing at whatever reused the slot.
//!
//! Ids are network-stable: an observer adopts the authority's id for its
//! mirror through [`EntityAllocator::allocate_specific`], which is what lets
//! a replicated ledger name entities the same way on both sides.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;

use crate::HostError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Generational handle to a host entity. Layout: `[generation | index]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self(u64::from(generation) << 32 | u64::from(index))
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Wire and hashing form.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The id the same slot hands out after this one is destroyed.
    pub fn successor(self) -> Self {
        Self::new(self.index(), self.generation().wrapping_add(1))
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// What an allocator knows about an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStatus {
    /// The id names a live entity.
    Live,
    /// The entity was destroyed; its slot has moved on or sits vacant.
    Retired,
    /// The id was never handed out here. On observers this is a remote id
    /// that has not been mirrored yet.
    Unissued,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    /// Generation the slot hands out next, or holds while live.
    generation: u32,
    live: bool,
}

/// Issues [`EntityId`]s, recycling vacated slots oldest first.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    vacant: VecDeque<u32>,
    live: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out an id, reusing the longest-vacant slot when there is one.
    pub fn allocate(&mut self) -> EntityId {
        let index = match self.vacant.pop_front() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.live = true;
        self.live += 1;
        EntityId::new(index, slot.generation)
    }

    /// Adopt an id issued by the authority for a local mirror.
    ///
    /// Slots skipped over on the way become vacant and stay available to
    /// [`allocate`](Self::allocate). Fails if the slot is live or has
    /// already moved past `id`'s generation.
    pub fn allocate_specific(&mut self, id: EntityId) -> Result<(), HostError> {
        let index = id.index() as usize;
        while self.slots.len() <= index {
            let gap = self.slots.len() as u32;
            self.slots.push(Slot::default());
            if gap as usize != index {
                self.vacant.push_back(gap);
            }
        }
        let slot = self.slots[index];
        if slot.live {
            return Err(HostError::EntityInUse { entity: id });
        }
        if slot.generation > id.generation() {
            return Err(HostError::StaleEntity { entity: id });
        }
        self.vacant.retain(|&v| v != id.index());
        self.slots[index] = Slot {
            generation: id.generation(),
            live: true,
        };
        self.live += 1;
        Ok(())
    }

    /// Destroy `id`, retiring its generation.
    pub fn release(&mut self, id: EntityId) -> Result<(), HostError> {
        if self.status(id) != IdStatus::Live {
            return Err(HostError::StaleEntity { entity: id });
        }
        let slot = &mut self.slots[id.index() as usize];
        slot.live = false;
        slot.generation = id.successor().generation();
        self.vacant.push_back(id.index());
        self.live -= 1;
        Ok(())
    }

    pub fn status(&self, id: EntityId) -> IdStatus {
        let Some(slot) = self.slots.get(id.index() as usize) else {
            return IdStatus::Unissued;
        };
        match id.generation().cmp(&slot.generation) {
            Ordering::Less => IdStatus::Retired,
            Ordering::Equal if slot.live => IdStatus::Live,
            // A vacant slot's generation has not been handed out yet.
            _ => IdStatus::Unissued,
        }
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.status(id) == IdStatus::Live
    }

    /// Number of live entities.
    pub fn alive_count(&self) -> usize {
        self.live
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
