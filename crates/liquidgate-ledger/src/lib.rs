//! # Liquidgate Ledger
//!
//! Persisted consumables: disposable tips and stock-solution volumes.
//!
//! Every read reloads from the [`SnapshotStore`] and every mutation persists
//! before returning, so independent handles observe each other's writes.
//! There is no locking; callers are expected to be serialized by the
//! gateway's task guard.

pub mod solution;
pub mod store;
pub mod tips;

use std::sync::Arc;

use liquidgate_core::Result;

pub use solution::{DecrementOutcome, SolutionLedger, WarningRatios};
pub use store::{InMemorySnapshotStore, JsonFileStore, SnapshotStore};
pub use tips::{TipLedger, TipSlot, TIP_SLOT_COUNT};

/// Both ledgers over one store.
#[derive(Clone)]
pub struct ResourceLedger {
    pub tips: TipLedger,
    pub solutions: SolutionLedger,
}

impl ResourceLedger {
    /// Open both ledgers, writing defaults for any resource not yet persisted.
    pub async fn open(store: Arc<dyn SnapshotStore>) -> Result<Self> {
        Ok(Self {
            tips: TipLedger::open(store.clone()).await?,
            solutions: SolutionLedger::open(store).await?,
        })
    }

    /// A ledger backed by memory only.
    pub async fn in_memory() -> Result<Self> {
        Self::open(Arc::new(InMemorySnapshotStore::new())).await
    }
}
