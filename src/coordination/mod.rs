// Cross-process coordination: a shared JSON document under an advisory file
// lock, with TTL resource leases and a single leader lease built on top.

pub mod leader;
pub mod locks;
pub mod store;
pub mod types;

pub use leader::LeaderElection;
pub use locks::{LockOptions, ResourceLockManager};
pub use store::{CoordinationError, CoordinationStore};
pub use types::{
    resource_key, CoordinationState, LeaderCandidate, LeaderRecord, LeaderResolution,
    ResourceLockRecord,
};
