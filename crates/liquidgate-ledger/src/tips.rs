//! Disposable tip inventory.

use std::sync::Arc;

use liquidgate_core::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{load_or_init, save_typed, SnapshotStore};

/// Number of tips in a full set of tip boxes.
pub const TIP_SLOT_COUNT: u32 = 192;

/// Snapshot key of the tip inventory.
pub const TIP_INVENTORY_KEY: &str = "tip_box_info";

/// One tip position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipSlot {
    pub id: u32,
    /// The tip has been picked up and must not be issued again before a reset.
    pub consumed: bool,
}

/// Persisted state of every tip position, in allocation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipInventory {
    pub slots: Vec<TipSlot>,
}

impl TipInventory {
    /// A full, unused set of tips.
    pub fn full() -> Self {
        Self {
            slots: (0..TIP_SLOT_COUNT)
                .map(|id| TipSlot { id, consumed: false })
                .collect(),
        }
    }

    /// Mark the first unused slot consumed and return it.
    fn take_first(&mut self) -> Option<TipSlot> {
        let slot = self.slots.iter_mut().find(|s| !s.consumed)?;
        slot.consumed = true;
        Some(*slot)
    }

    pub fn remaining(&self) -> usize {
        self.slots.iter().filter(|s| !s.consumed).count()
    }
}

/// Allocation and reset of tips against the persisted inventory.
#[derive(Clone)]
pub struct TipLedger {
    store: Arc<dyn SnapshotStore>,
}

impl TipLedger {
    /// Open the ledger, writing a full inventory if none is persisted yet.
    pub async fn open(store: Arc<dyn SnapshotStore>) -> Result<Self> {
        load_or_init(store.as_ref(), TIP_INVENTORY_KEY, TipInventory::full).await?;
        Ok(Self { store })
    }

    async fn load(&self) -> Result<TipInventory> {
        load_or_init(self.store.as_ref(), TIP_INVENTORY_KEY, TipInventory::full).await
    }

    /// Issue the lowest-numbered unused tip.
    ///
    /// The slot is marked consumed and persisted before it is returned.
    pub async fn allocate(&self) -> Result<TipSlot> {
        let mut inventory = self.load().await?;
        let slot = inventory.take_first().ok_or_else(|| {
            warn!("No unused tips left");
            GatewayError::ResourceExhausted("no unused tips left, reset the tip boxes".to_string())
        })?;
        save_typed(self.store.as_ref(), TIP_INVENTORY_KEY, &inventory).await?;
        Ok(slot)
    }

    /// Mark every tip unused again.
    pub async fn reset(&self) -> Result<()> {
        save_typed(self.store.as_ref(), TIP_INVENTORY_KEY, &TipInventory::full()).await?;
        info!("Tip inventory reset to {} tips", TIP_SLOT_COUNT);
        Ok(())
    }

    pub async fn remaining_count(&self) -> Result<usize> {
        Ok(self.load().await?.remaining())
    }

    pub async fn total_count(&self) -> Result<usize> {
        Ok(self.load().await?.slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemorySnapshotStore, JsonFileStore};

    async fn ledger() -> TipLedger {
        TipLedger::open(Arc::new(InMemorySnapshotStore::new())).await.unwrap()
    }

    #[tokio::test]
    async fn test_allocation_is_exhaustive_and_ordered() {
        let tips = ledger().await;

        for expected in 0..TIP_SLOT_COUNT {
            let slot = tips.allocate().await.unwrap();
            assert_eq!(slot.id, expected);
            assert!(slot.consumed);
        }

        let err = tips.allocate().await.unwrap_err();
        assert!(matches!(err, GatewayError::ResourceExhausted(_)));
        assert_eq!(tips.remaining_count().await.unwrap(), 0);

        tips.reset().await.unwrap();
        assert_eq!(tips.remaining_count().await.unwrap(), TIP_SLOT_COUNT as usize);
        assert_eq!(tips.allocate().await.unwrap().id, 0);
    }

    #[tokio::test]
    async fn test_counts_reflect_other_handles() {
        let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
        let a = TipLedger::open(store.clone()).await.unwrap();
        let b = TipLedger::open(store).await.unwrap();

        a.allocate().await.unwrap();
        a.allocate().await.unwrap();

        assert_eq!(b.remaining_count().await.unwrap(), 190);
        assert_eq!(b.total_count().await.unwrap(), 192);
        assert_eq!(b.allocate().await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_inventory_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tips = TipLedger::open(Arc::new(JsonFileStore::new(dir.path()))).await.unwrap();
            tips.allocate().await.unwrap();
        }
        let reopened = TipLedger::open(Arc::new(JsonFileStore::new(dir.path()))).await.unwrap();
        assert_eq!(reopened.remaining_count().await.unwrap(), 191);
    }
}
