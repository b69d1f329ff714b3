//! Structural ledger deltas and their wire codec.
//!
//! The authority computes one [`LedgerDelta`] per observer from a
//! [`ReplicationBaseline`] (what that observer has already been sent) and the
//! observer feeds it to [`Ledger::apply_delta`](crate::ledger::Ledger::apply_delta).
//! Deltas are encoded with bincode's serde integration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use netpool_host::entity::EntityId;

use crate::entry::WireEntry;
use crate::LedgerError;

// ---------------------------------------------------------------------------
// LedgerDelta
// ---------------------------------------------------------------------------

/// Add / change / remove delta for one ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerDelta {
    /// Ledger-wide replication key the delta brings the observer up to.
    pub ledger_key: u32,
    pub added: Vec<WireEntry>,
    pub changed: Vec<WireEntry>,
    /// Replication ids of removed entries.
    pub removed: Vec<u32>,
}

impl LedgerDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Encode to the compact binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    /// Decode from the wire format. Trailing bytes are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        let (delta, read): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if read != bytes.len() {
            return Err(LedgerError::TrailingBytes {
                expected: read,
                actual: bytes.len(),
            });
        }
        Ok(delta)
    }
}

// ---------------------------------------------------------------------------
// ReplicationBaseline
// ---------------------------------------------------------------------------

/// What one observer has been sent of one ledger so far.
#[derive(Debug, Clone, Default)]
pub struct ReplicationBaseline {
    pub(crate) ledger_key: Option<u32>,
    /// replication id -> last replication key sent.
    pub(crate) known: HashMap<u32, u32>,
}

impl ReplicationBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been sent yet.
    pub fn is_fresh(&self) -> bool {
        self.ledger_key.is_none()
    }
}

// ---------------------------------------------------------------------------
// AppliedDelta
// ---------------------------------------------------------------------------

/// Outcome of applying a delta on an observer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedDelta {
    /// Indices of newly added entries, in delivery order.
    pub added: Vec<usize>,
    /// Indices of changed entries, in delivery order.
    pub changed: Vec<usize>,
    /// Entities whose entries were removed.
    pub removed: Vec<EntityId>,
}

impl AppliedDelta {
    /// Added then changed indices: the order reactions must run in.
    pub fn touched(&self) -> impl Iterator<Item = usize> + '_ {
        self.added.iter().chain(self.changed.iter()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netpool_host::class::ClassId;
    use netpool_host::transform::{Quat, Vec3};

    fn wire(id: u32, free: bool) -> WireEntry {
        WireEntry {
            replication_id: id,
            entity: EntityId::new(id, 0),
            class: ClassId::ACTOR,
            free,
            location: Vec3::new(100.0, -50.0, 3.0),
            rotation: Quat::from_yaw_pitch(1.0, 0.0),
            scale: Vec3::ONE,
        }
    }

    #[test]
    fn codec_roundtrip() {
        let delta = LedgerDelta {
            ledger_key: 9,
            added: vec![wire(1, false)],
            changed: vec![wire(2, true)],
            removed: vec![3],
        };
        let bytes = delta.encode().unwrap();
        assert_eq!(LedgerDelta::decode(&bytes).unwrap(), delta);
    }

    #[test]
    fn decode_rejects_garbage_and_trailing_bytes() {
        let mut bytes = LedgerDelta::default().encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            LedgerDelta::decode(&bytes),
            Err(LedgerError::TrailingBytes { .. })
        ));
        assert!(LedgerDelta::decode(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn empty_delta() {
        assert!(LedgerDelta::default().is_empty());
        assert!(ReplicationBaseline::new().is_fresh());
    }
}
