//! In-process replication link.
//!
//! [`ReplicationLink`] stands in for the network between an authority session
//! and one observer session. Updates are encoded to bytes on send and decoded
//! on delivery, so everything an observer sees went through the wire format.
//! Latency and jitter are counted in link ticks and drawn from a seeded PCG
//! generator, so a given seed always produces the same delivery schedule.
//!
//! Delivery is reliable and ordered: jitter can delay an update, but never
//! past one sent after it.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::replication::PoolReplicationUpdate;
use crate::PoolError;

/// Delay model of a [`ReplicationLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Ticks every update spends in flight.
    pub latency_ticks: u64,
    /// Up to this many extra ticks, drawn per update.
    pub jitter_ticks: u64,
    pub seed: u64,
}

impl Default for LinkConfig {
    /// Immediate delivery on the next [`ReplicationLink::advance`].
    fn default() -> Self {
        Self {
            latency_ticks: 0,
            jitter_ticks: 0,
            seed: 0,
        }
    }
}

/// One-way link from an authority to one observer.
#[derive(Debug, Clone)]
pub struct ReplicationLink {
    config: LinkConfig,
    rng: Pcg32,
    now: u64,
    last_deliver_at: u64,
    in_flight: VecDeque<(u64, Vec<u8>)>,
    bytes_sent: usize,
}

impl ReplicationLink {
    /// An empty link whose jitter is drawn from `config.seed`.
    pub fn new(config: LinkConfig) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(config.seed),
            config,
            now: 0,
            last_deliver_at: 0,
            in_flight: VecDeque::new(),
            bytes_sent: 0,
        }
    }

    /// Latency, jitter and seed the link was built with.
    pub fn config(&self) -> LinkConfig {
        self.config
    }

    /// Encode `update` and put it on the wire.
    pub fn send(&mut self, update: &PoolReplicationUpdate) -> Result<(), PoolError> {
        let bytes = update.encode()?;
        let jitter = if self.config.jitter_ticks > 0 {
            self.rng.gen_range(0..=self.config.jitter_ticks)
        } else {
            0
        };
        let deliver_at = (self.now + self.config.latency_ticks + jitter).max(self.last_deliver_at);
        self.last_deliver_at = deliver_at;
        self.bytes_sent += bytes.len();
        tracing::trace!(pool = %update.net_id, bytes = bytes.len(), deliver_at, "replication update sent");
        self.in_flight.push_back((deliver_at, bytes));
        Ok(())
    }

    /// Send every update in order.
    pub fn send_all(&mut self, updates: &[PoolReplicationUpdate]) -> Result<(), PoolError> {
        for update in updates {
            self.send(update)?;
        }
        Ok(())
    }

    /// Advance the link by one tick and return the updates that arrived, in
    /// send order.
    ///
    /// A payload that fails to decode is dropped from the link and reported;
    /// nothing sent after it is delivered in the same call.
    pub fn advance(&mut self) -> Result<Vec<PoolReplicationUpdate>, PoolError> {
        let mut delivered = Vec::new();
        while let Some((deliver_at, _)) = self.in_flight.front() {
            if *deliver_at > self.now {
                break;
            }
            let Some((_, bytes)) = self.in_flight.pop_front() else {
                break;
            };
            delivered.push(PoolReplicationUpdate::decode(&bytes)?);
        }
        self.now += 1;
        Ok(delivered)
    }

    /// Updates sent but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Total encoded bytes put on the wire.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Current link tick.
    pub fn now(&self) -> u64 {
        self.now
    }
}
