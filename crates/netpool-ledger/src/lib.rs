//! Netpool Ledger - the replicated free/used record of a pool.
//!
//! Each pool owns one [`Ledger`](ledger::Ledger): an order-stable list of
//! entries saying which pooled entity is free, which is in use, and where an
//! in-use actor that does not replicate its own movement should appear. The
//! authority mutates it; observers only receive it, as structural deltas.
//!
//! # Modules
//!
//! - [`entry`]: one ledger entry, plus its replicated wire view.
//! - [`ledger`]: the ledger itself (upsert, free lookup, transform guard,
//!   dirty marking, diff / apply, state hash).
//! - [`delta`]: add / change / remove deltas, per-observer baselines and the
//!   bincode wire codec.

#![deny(unsafe_code)]

pub mod delta;
pub mod entry;
pub mod ledger;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while moving ledger deltas over the wire.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to encode ledger delta: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode ledger delta: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The payload holds more bytes than one delta.
    #[error("ledger delta used {expected} of {actual} bytes")]
    TrailingBytes { expected: usize, actual: usize },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::delta::{AppliedDelta, LedgerDelta, ReplicationBaseline};
    pub use crate::entry::{PoolEntry, WireEntry};
    pub use crate::ledger::Ledger;
    pub use crate::LedgerError;
}
