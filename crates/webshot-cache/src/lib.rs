//! Two-tier screenshot cache
//!
//! Keeps rendered artifacts in a process-local memory tier backed by a
//! durable on-disk tier (one payload file plus a JSON metadata sidecar per
//! key). Entries expire after a configurable TTL; a background sweeper
//! removes stale records from both tiers.
//!
//! Every public store operation is infallible from the caller's point of
//! view: I/O faults are logged and reported as a degraded outcome or a miss.

mod clock;
mod disk;
mod error;
mod key;
mod memory;
mod store;
mod sweeper;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use key::derive_key;
pub use store::CacheStore;
pub use sweeper::Sweeper;
pub use types::{
    CacheConfig, CacheEntry, CacheHit, CacheOutcome, CacheStats, CacheTier, EntryMetadata,
    Stored, SweepReport,
};
