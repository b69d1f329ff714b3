//! Replication updates exchanged between an authority and its observers.
//!
//! One [`PoolReplicationUpdate`] carries the ledger delta of one pool. The
//! first update an observer receives for a pool also carries the pool's
//! [`PoolDescriptor`] so the observer can build its mirror.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use netpool_ledger::delta::{LedgerDelta, ReplicationBaseline};

use crate::pool::{PoolDescriptor, PoolNetId};
use crate::PoolError;

/// One pool's ledger changes for one observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolReplicationUpdate {
    pub net_id: PoolNetId,
    /// Sent with the first update of a pool so the observer can build it.
    pub descriptor: Option<PoolDescriptor>,
    pub delta: LedgerDelta,
}

impl PoolReplicationUpdate {
    /// Bincode wire form.
    pub fn encode(&self) -> Result<Vec<u8>, PoolError> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    /// Inverse of [`encode`](Self::encode). Trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, PoolError> {
        let (update, read): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if read != bytes.len() {
            return Err(netpool_ledger::LedgerError::TrailingBytes {
                expected: read,
                actual: bytes.len(),
            }
            .into());
        }
        Ok(update)
    }
}

/// What one observer has been sent, per pool.
#[derive(Debug, Clone, Default)]
pub struct ObserverBaselines {
    per_pool: HashMap<PoolNetId, ReplicationBaseline>,
}

impl ObserverBaselines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline for `net_id`, created empty on first use.
    pub fn baseline_mut(&mut self, net_id: PoolNetId) -> &mut ReplicationBaseline {
        self.per_pool.entry(net_id).or_default()
    }

    /// Forget everything sent so far; the next collection resends every pool
    /// in full.
    pub fn reset(&mut self) {
        self.per_pool.clear();
    }

    pub fn len(&self) -> usize {
        self.per_pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolFlavor;
    use netpool_host::class::ClassId;

    #[test]
    fn update_codec_roundtrip() {
        let update = PoolReplicationUpdate {
            net_id: PoolNetId(3),
            descriptor: Some(PoolDescriptor {
                net_id: PoolNetId(3),
                name: "projectiles".into(),
                flavor: PoolFlavor::Actor,
                target_class: ClassId::ACTOR,
                include_child_classes: false,
            }),
            delta: LedgerDelta::default(),
        };
        let bytes = update.encode().unwrap();
        assert_eq!(PoolReplicationUpdate::decode(&bytes).unwrap(), update);

        let mut padded = bytes;
        padded.push(7);
        assert!(PoolReplicationUpdate::decode(&padded).is_err());
    }

    #[test]
    fn baselines_start_fresh() {
        let mut baselines = ObserverBaselines::new();
        assert!(baselines.baseline_mut(PoolNetId(1)).is_fresh());
        assert_eq!(baselines.len(), 1);
        baselines.reset();
        assert!(baselines.is_empty());
    }
}
