//! The replicated pool ledger.
//!
//! A [`Ledger`] is an order-stable list of [`PoolEntry`]s, keyed logically by
//! entity. Entities are recycled, never evicted, so an entry only disappears
//! when its entity was destroyed behind the pool's back ([`Ledger::remove`])
//! or when the whole ledger is cleared at pool teardown.
//!
//! Every mutation goes through [`Ledger::mark_dirty`], which bumps the entry's
//! replication key and the ledger-wide key. [`Ledger::diff`] turns those keys
//! into a structural delta for an observer, and [`Ledger::apply_delta`]
//! replays it on the other side.

use std::collections::HashSet;

use netpool_host::class::ClassId;
use netpool_host::entity::EntityId;
use netpool_host::transform::Transform;

use crate::delta::{AppliedDelta, LedgerDelta, ReplicationBaseline};
use crate::entry::PoolEntry;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Free / used / transform record of one pool's entities.
#[derive(Debug, Clone)]
pub struct Ledger {
    entries: Vec<PoolEntry>,
    next_replication_id: u32,
    /// Ledger-wide replication key.
    key: u32,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// An empty ledger. Replication ids start at 1.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_replication_id: 1,
            key: 0,
        }
    }

    /// Number of entries, free and used.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order. Observers mirror this order.
    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    /// Entry at `index`, as reported by [`AppliedDelta`].
    pub fn get(&self, index: usize) -> Option<&PoolEntry> {
        self.entries.get(index)
    }

    /// Current ledger-wide replication key.
    pub fn key(&self) -> u32 {
        self.key
    }

    fn position(&self, entity: EntityId) -> Option<usize> {
        self.entries.iter().position(|e| e.entity == entity)
    }

    // -- mutation ------------------------------------------------------------

    /// Mark the entry at `index` as changed so it is sent on the next diff.
    pub fn mark_dirty(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.replication_key = entry.replication_key.wrapping_add(1);
            self.key = self.key.wrapping_add(1);
        }
    }

    /// Upsert: update the free flag of an existing entry, or append a new
    /// one. `class` is only used when appending.
    pub fn add(&mut self, entity: EntityId, class: ClassId, free: bool) -> &PoolEntry {
        let index = match self.position(entity) {
            Some(index) => {
                self.entries[index].free = free;
                index
            }
            None => {
                let id = self.next_replication_id;
                self.next_replication_id = self.next_replication_id.wrapping_add(1);
                self.entries.push(PoolEntry::new(entity, class, free, id));
                self.entries.len() - 1
            }
        };
        self.mark_dirty(index);
        &self.entries[index]
    }

    /// Find the entry for `entity`.
    pub fn find(&self, entity: EntityId) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.entity == entity)
    }

    /// Find the entry for `entity`, adding it as free if it is missing.
    pub fn find_or_add(&mut self, entity: EntityId, class: ClassId) -> &PoolEntry {
        match self.position(entity) {
            Some(index) => &self.entries[index],
            None => self.add(entity, class, true),
        }
    }

    /// Whether `entity` has an entry, free or used.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.position(entity).is_some()
    }

    /// Free flag of `entity`. A missing entity reads as not free.
    pub fn is_free(&self, entity: EntityId) -> bool {
        match self.find(entity) {
            Some(entry) => entry.free,
            None => {
                tracing::warn!(entity = %entity, "entity not found in ledger");
                false
            }
        }
    }

    /// Claim the first free entry whose class is exactly `class`.
    ///
    /// Subclasses never match. When nothing matches the ledger is left
    /// untouched and `None` is returned.
    pub fn take_free_of_class(&mut self, class: ClassId) -> Option<EntityId> {
        let index = self
            .entries
            .iter()
            .position(|e| e.class == class && e.free)?;
        self.entries[index].free = false;
        self.mark_dirty(index);
        Some(self.entries[index].entity)
    }

    /// Record the transform an entity should appear at. Only the authority
    /// may write spatial state; calls without authority are ignored.
    pub fn set_transform(&mut self, entity: EntityId, transform: &Transform, has_authority: bool) -> bool {
        if !has_authority {
            return false;
        }
        let Some(index) = self.position(entity) else {
            tracing::warn!(entity = %entity, "cannot set transform of entity missing from ledger");
            return false;
        };
        self.entries[index].set_transform(transform);
        self.mark_dirty(index);
        true
    }

    /// Whether `entity` has not been activated in this process yet.
    /// A missing entity counts as never activated.
    pub fn is_first_activation(&self, entity: EntityId) -> bool {
        self.find(entity).map_or(true, |e| e.first_activation)
    }

    /// Record the first activation. Local only, never replicated.
    pub fn mark_activated(&mut self, entity: EntityId) {
        if let Some(index) = self.position(entity) {
            self.entries[index].first_activation = false;
        }
    }

    /// Drop the entry for `entity`. The next diff reports it as removed.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        let Some(index) = self.position(entity) else {
            return false;
        };
        self.entries.remove(index);
        self.key = self.key.wrapping_add(1);
        true
    }

    /// Drop every entry (pool teardown).
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.key = self.key.wrapping_add(1);
        }
    }

    // -- replication ---------------------------------------------------------

    /// Structural delta between this ledger and what `baseline` has seen.
    ///
    /// Delivery is assumed reliable and ordered, so the baseline is advanced
    /// to the current state. Returns `None` when there is nothing to send.
    pub fn diff(&self, baseline: &mut ReplicationBaseline) -> Option<LedgerDelta> {
        if baseline.ledger_key == Some(self.key) {
            return None;
        }

        let mut delta = LedgerDelta {
            ledger_key: self.key,
            ..LedgerDelta::default()
        };
        let mut live = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            live.insert(entry.replication_id);
            match baseline.known.get(&entry.replication_id) {
                None => delta.added.push(entry.to_wire()),
                Some(&sent) if sent != entry.replication_key => {
                    delta.changed.push(entry.to_wire())
                }
                Some(_) => {}
            }
            baseline
                .known
                .insert(entry.replication_id, entry.replication_key);
        }
        let mut removed: Vec<u32> = baseline
            .known
            .keys()
            .copied()
            .filter(|id| !live.contains(id))
            .collect();
        removed.sort_unstable();
        for id in &removed {
            baseline.known.remove(id);
        }
        delta.removed = removed;
        baseline.ledger_key = Some(self.key);

        if delta.is_empty() {
            None
        } else {
            Some(delta)
        }
    }

    /// Apply a delta received from the authority.
    ///
    /// Removals run first, then additions, then changes. The returned indices
    /// are valid for this ledger after the call.
    pub fn apply_delta(&mut self, delta: &LedgerDelta) -> AppliedDelta {
        let mut applied = AppliedDelta::default();

        if !delta.removed.is_empty() {
            let removed: HashSet<u32> = delta.removed.iter().copied().collect();
            self.entries.retain(|e| {
                if removed.contains(&e.replication_id) {
                    applied.removed.push(e.entity);
                    false
                } else {
                    true
                }
            });
        }

        for wire in &delta.added {
            match self
                .entries
                .iter()
                .position(|e| e.replication_id == wire.replication_id)
            {
                // Already known: treat as a change.
                Some(index) => {
                    self.entries[index].apply_wire(wire);
                    applied.changed.push(index);
                }
                None => {
                    self.entries.push(PoolEntry::from_wire(wire));
                    applied.added.push(self.entries.len() - 1);
                }
            }
        }

        for wire in &delta.changed {
            match self
                .entries
                .iter()
                .position(|e| e.replication_id == wire.replication_id)
            {
                Some(index) => {
                    self.entries[index].apply_wire(wire);
                    applied.changed.push(index);
                }
                None => {
                    tracing::warn!(
                        replication_id = wire.replication_id,
                        entity = %wire.entity,
                        "change for unknown ledger entry"
                    );
                }
            }
        }

        self.key = delta.ledger_key;
        applied
    }

    /// BLAKE3 hex digest of the replicated view of the ledger.
    pub fn state_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.entries.len() as u64).to_le_bytes());
        for entry in &self.entries {
            hash_entry(&mut hasher, entry);
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn hash_entry(hasher: &mut blake3::Hasher, entry: &PoolEntry) {
    hasher.update(&entry.entity.to_raw().to_le_bytes());
    hasher.update(&entry.class.to_raw().to_le_bytes());
    hasher.update(&[entry.free as u8]);
    let t = entry.transform();
    for v in [
        t.location.x,
        t.location.y,
        t.location.z,
        t.rotation.x,
        t.rotation.y,
        t.rotation.z,
        t.rotation.w,
        t.scale.x,
        t.scale.y,
        t.scale.z,
    ] {
        hasher.update(&v.to_le_bytes());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use netpool_host::transform::Vec3;

    fn e(index: u32) -> EntityId {
        EntityId::new(index, 0)
    }

    // -- 1. Upsert and lookup ------------------------------------------------

    #[test]
    fn add_is_idempotent_upsert() {
        let mut ledger = Ledger::new();
        ledger.add(e(1), ClassId::ACTOR, false);
        let key_after_first = ledger.key();
        let entry = ledger.add(e(1), ClassId::ACTOR, true);
        assert!(entry.free);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.key() > key_after_first, "upsert marks dirty");
    }

    #[test]
    fn find_missing_is_none_and_reads_not_free() {
        let ledger = Ledger::new();
        assert!(ledger.find(e(9)).is_none());
        assert!(!ledger.is_free(e(9)));
        assert!(ledger.is_first_activation(e(9)));
    }

    #[test]
    fn find_or_add_adds_as_free_once() {
        let mut ledger = Ledger::new();
        assert!(ledger.find_or_add(e(2), ClassId::ACTOR).free);
        ledger.add(e(2), ClassId::ACTOR, false);
        assert!(!ledger.find_or_add(e(2), ClassId::ACTOR).free);
        assert_eq!(ledger.len(), 1);
    }

    // -- 2. Free lookup ------------------------------------------------------

    #[test]
    fn take_free_requires_exact_class() {
        let derived = ClassId::OBJECT; // stands in for any other class id
        let mut ledger = Ledger::new();
        ledger.add(e(1), ClassId::ACTOR, true);
        assert_eq!(ledger.take_free_of_class(derived), None);
        assert_eq!(ledger.take_free_of_class(ClassId::ACTOR), Some(e(1)));
        assert!(!ledger.is_free(e(1)));
        assert_eq!(ledger.take_free_of_class(ClassId::ACTOR), None);
    }

    #[test]
    fn take_free_miss_does_not_mutate() {
        let mut ledger = Ledger::new();
        ledger.add(e(1), ClassId::ACTOR, false);
        let before = ledger.key();
        let hash = ledger.state_hash();
        assert_eq!(ledger.take_free_of_class(ClassId::ACTOR), None);
        assert_eq!(ledger.key(), before);
        assert_eq!(ledger.state_hash(), hash);
    }

    // -- 3. Transform guard --------------------------------------------------

    #[test]
    fn set_transform_requires_authority() {
        let mut ledger = Ledger::new();
        ledger.add(e(1), ClassId::ACTOR, false);
        let t = Transform::from_location(Vec3::new(5.0, 6.0, 7.0));
        assert!(!ledger.set_transform(e(1), &t, false));
        assert_eq!(ledger.find(e(1)).unwrap().location, Vec3::ZERO);
        assert!(ledger.set_transform(e(1), &t, true));
        assert_eq!(ledger.find(e(1)).unwrap().location, t.location);
        assert!(!ledger.set_transform(e(2), &t, true));
    }

    // -- 4. Replication ------------------------------------------------------

    #[test]
    fn diff_and_apply_converge() {
        let mut authority = Ledger::new();
        let mut observer = Ledger::new();
        let mut baseline = ReplicationBaseline::new();

        authority.add(e(1), ClassId::ACTOR, false);
        authority.add(e(2), ClassId::ACTOR, true);
        let delta = authority.diff(&mut baseline).unwrap();
        assert_eq!(delta.added.len(), 2);
        let applied = observer.apply_delta(&delta);
        assert_eq!(applied.added, vec![0, 1]);
        assert_eq!(observer.state_hash(), authority.state_hash());

        assert!(authority.diff(&mut baseline).is_none(), "nothing new");

        authority.add(e(1), ClassId::ACTOR, true);
        let delta = authority.diff(&mut baseline).unwrap();
        assert!(delta.added.is_empty());
        assert_eq!(delta.changed.len(), 1);
        let applied = observer.apply_delta(&delta);
        assert_eq!(applied.changed, vec![0]);
        assert!(observer.is_free(e(1)));
        assert_eq!(observer.state_hash(), authority.state_hash());
    }

    #[test]
    fn apply_preserves_first_activation_flag() {
        let mut authority = Ledger::new();
        let mut observer = Ledger::new();
        let mut baseline = ReplicationBaseline::new();

        authority.add(e(1), ClassId::ACTOR, false);
        observer.apply_delta(&authority.diff(&mut baseline).unwrap());
        observer.mark_activated(e(1));

        authority.add(e(1), ClassId::ACTOR, true);
        observer.apply_delta(&authority.diff(&mut baseline).unwrap());
        assert!(!observer.is_first_activation(e(1)));
    }

    #[test]
    fn clear_replicates_as_removals() {
        let mut authority = Ledger::new();
        let mut observer = Ledger::new();
        let mut baseline = ReplicationBaseline::new();

        authority.add(e(1), ClassId::ACTOR, false);
        authority.add(e(2), ClassId::ACTOR, false);
        observer.apply_delta(&authority.diff(&mut baseline).unwrap());

        authority.clear();
        let delta = authority.diff(&mut baseline).unwrap();
        assert_eq!(delta.removed.len(), 2);
        let applied = observer.apply_delta(&delta);
        assert_eq!(applied.removed, vec![e(1), e(2)]);
        assert!(observer.is_empty());
    }

    #[test]
    fn remove_replicates_a_single_removal() {
        let mut authority = Ledger::new();
        let mut observer = Ledger::new();
        let mut baseline = ReplicationBaseline::new();

        authority.add(e(1), ClassId::ACTOR, false);
        authority.add(e(2), ClassId::ACTOR, true);
        observer.apply_delta(&authority.diff(&mut baseline).unwrap());

        assert!(authority.remove(e(1)));
        assert!(!authority.remove(e(1)));
        assert!(!authority.contains(e(1)));
        let delta = authority.diff(&mut baseline).unwrap();
        assert_eq!(delta.removed.len(), 1);
        assert!(delta.changed.is_empty());
        let applied = observer.apply_delta(&delta);
        assert_eq!(applied.removed, vec![e(1)]);
        assert_eq!(observer.state_hash(), authority.state_hash());
    }

    #[test]
    fn late_joining_observer_gets_full_state() {
        let mut authority = Ledger::new();
        let mut early = ReplicationBaseline::new();
        authority.add(e(1), ClassId::ACTOR, false);
        authority.diff(&mut early);
        authority.add(e(1), ClassId::ACTOR, true);
        authority.diff(&mut early);

        let mut late = ReplicationBaseline::new();
        let delta = authority.diff(&mut late).unwrap();
        assert_eq!(delta.added.len(), 1);
        assert!(delta.added[0].free);
    }
}
