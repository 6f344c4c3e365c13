//! Tier coordination for Strata.
//!
//! [`TierCoordinator`] drives every request through the cache / search /
//! database stack with read-through, write-back, and failover semantics;
//! [`BackfillQueue`] carries the fire-and-forget repairs that keep the
//! faster tiers warm.

mod backfill;
mod coordinator;

pub use backfill::BackfillQueue;
pub use coordinator::TierCoordinator;

#[cfg(test)]
mod tests;
