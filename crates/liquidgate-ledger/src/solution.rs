//! Stock-solution reservoirs and their low-volume warning ratios.

use std::collections::BTreeMap;
use std::sync::Arc;

use liquidgate_core::{GatewayError, Result, SolutionClass};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{load_or_init, save_typed, SnapshotStore};

/// Snapshot key of the remaining volumes.
pub const SOLUTION_INFO_KEY: &str = "solution_info";

/// Snapshot key of the warning ratios.
pub const WARNING_VALUE_KEY: &str = "warning_value";

/// Warning ratio applied to every class on a fresh deck.
pub const DEFAULT_WARNING_RATIO: f64 = 0.1;

/// Remaining volume per position, per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservoirVolumes(pub BTreeMap<SolutionClass, Vec<f64>>);

impl ReservoirVolumes {
    /// Every position of every class filled to nominal capacity.
    pub fn full() -> Self {
        Self(
            SolutionClass::ALL
                .iter()
                .map(|c| (*c, vec![c.capacity(); c.default_positions()]))
                .collect(),
        )
    }

    fn slot_mut(&mut self, class: SolutionClass, position: usize) -> Result<&mut f64> {
        self.0
            .get_mut(&class)
            .and_then(|v| v.get_mut(position))
            .ok_or_else(|| GatewayError::validation(format!("{} has no position {}", class, position)))
    }

    pub fn get(&self, class: SolutionClass, position: usize) -> Option<f64> {
        self.0.get(&class).and_then(|v| v.get(position)).copied()
    }
}

/// Fraction of nominal capacity below which a reservoir is reported low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarningRatios(pub BTreeMap<SolutionClass, f64>);

impl Default for WarningRatios {
    fn default() -> Self {
        Self(
            SolutionClass::ALL
                .iter()
                .map(|c| (*c, DEFAULT_WARNING_RATIO))
                .collect(),
        )
    }
}

/// Result of subtracting from a reservoir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Applied; the reservoir is above its warning threshold.
    Applied,
    /// Applied; the reservoir is now below its warning threshold.
    LowWarning,
    /// The class name is not recognized. Nothing was changed.
    UnknownClass,
}

/// Remaining volumes of the stock-solution reservoirs.
#[derive(Clone)]
pub struct SolutionLedger {
    store: Arc<dyn SnapshotStore>,
}

impl SolutionLedger {
    /// Open the ledger, writing full reservoirs and default ratios if absent.
    pub async fn open(store: Arc<dyn SnapshotStore>) -> Result<Self> {
        load_or_init(store.as_ref(), SOLUTION_INFO_KEY, ReservoirVolumes::full).await?;
        load_or_init(store.as_ref(), WARNING_VALUE_KEY, WarningRatios::default).await?;
        Ok(Self { store })
    }

    async fn volumes(&self) -> Result<ReservoirVolumes> {
        load_or_init(self.store.as_ref(), SOLUTION_INFO_KEY, ReservoirVolumes::full).await
    }

    async fn ratios(&self) -> Result<WarningRatios> {
        load_or_init(self.store.as_ref(), WARNING_VALUE_KEY, WarningRatios::default).await
    }

    async fn save_volumes(&self, volumes: &ReservoirVolumes) -> Result<()> {
        save_typed(self.store.as_ref(), SOLUTION_INFO_KEY, volumes).await
    }

    /// Volume below which `class` is reported low.
    pub async fn warning_threshold(&self, class: SolutionClass) -> Result<f64> {
        Ok(class.capacity() * self.warning_ratio(class).await?)
    }

    /// Subtract `amount` from one reservoir position.
    ///
    /// The subtraction is applied even when it takes the reservoir below its
    /// warning threshold; the caller learns about it through the outcome.
    /// An over-draw floors the position at zero and reports `LowWarning`.
    pub async fn decrement(&self, class: &str, position: usize, amount: f64) -> Result<DecrementOutcome> {
        let Ok(class) = class.parse::<SolutionClass>() else {
            warn!("Decrement requested for unknown solution class '{}'", class);
            return Ok(DecrementOutcome::UnknownClass);
        };
        if !amount.is_finite() || amount < 0.0 {
            return Err(GatewayError::validation(format!("invalid decrement amount {}", amount)));
        }

        let mut volumes = self.volumes().await?;
        let slot = volumes.slot_mut(class, position)?;
        *slot = (*slot - amount).max(0.0);
        let remaining = *slot;
        self.save_volumes(&volumes).await?;

        let threshold = self.warning_threshold(class).await?;
        if remaining < threshold {
            warn!(
                "{} position {} has {} left, below warning threshold {}; refill soon",
                class, position, remaining, threshold
            );
            Ok(DecrementOutcome::LowWarning)
        } else {
            Ok(DecrementOutcome::Applied)
        }
    }

    /// Overwrite one position with an absolute volume in `[0, capacity]`.
    pub async fn set_volume(&self, class: SolutionClass, position: usize, value: f64) -> Result<()> {
        if !(0.0..=class.capacity()).contains(&value) {
            return Err(GatewayError::validation(format!(
                "volume {} outside 0..={} for {}",
                value,
                class.capacity(),
                class
            )));
        }
        let mut volumes = self.volumes().await?;
        *volumes.slot_mut(class, position)? = value;
        self.save_volumes(&volumes).await?;
        info!("{} position {} set to {}", class, position, value);
        Ok(())
    }

    /// Refill one position to nominal capacity.
    pub async fn reset_position(&self, class: SolutionClass, position: usize) -> Result<()> {
        self.set_volume(class, position, class.capacity()).await
    }

    /// Refill every position of every class.
    pub async fn reset_all(&self) -> Result<()> {
        self.save_volumes(&ReservoirVolumes::full()).await?;
        info!("All stock-solution reservoirs reset to full");
        Ok(())
    }

    /// Remaining volume of one position.
    pub async fn volume(&self, class: SolutionClass, position: usize) -> Result<Option<f64>> {
        Ok(self.volumes().await?.get(class, position))
    }

    /// Fill fraction of every position, freshly loaded from the store.
    pub async fn levels(&self) -> Result<BTreeMap<SolutionClass, Vec<f64>>> {
        let volumes = self.volumes().await?;
        Ok(volumes
            .0
            .into_iter()
            .map(|(class, values)| {
                let fractions = values.iter().map(|v| v / class.capacity()).collect();
                (class, fractions)
            })
            .collect())
    }

    pub async fn warning_ratio(&self, class: SolutionClass) -> Result<f64> {
        Ok(self.ratios().await?.0.get(&class).copied().unwrap_or(0.0))
    }

    pub async fn set_warning_ratio(&self, class: SolutionClass, ratio: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(GatewayError::validation(format!("warning ratio {} outside 0..=1", ratio)));
        }
        let mut ratios = self.ratios().await?;
        ratios.0.insert(class, ratio);
        save_typed(self.store.as_ref(), WARNING_VALUE_KEY, &ratios).await
    }

    pub async fn reset_warning_ratios(&self) -> Result<()> {
        save_typed(self.store.as_ref(), WARNING_VALUE_KEY, &WarningRatios::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySnapshotStore;

    async fn ledger() -> SolutionLedger {
        SolutionLedger::open(Arc::new(InMemorySnapshotStore::new())).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_reservoirs_are_full() {
        let solutions = ledger().await;
        let levels = solutions.levels().await.unwrap();

        assert_eq!(levels[&SolutionClass::Ml4], vec![1.0, 1.0]);
        assert_eq!(levels[&SolutionClass::Ml50].len(), 8);
        assert_eq!(levels[&SolutionClass::Ml100].len(), 2);
    }

    #[tokio::test]
    async fn test_decrement_below_threshold_warns_but_applies() {
        let solutions = ledger().await;
        solutions.set_volume(SolutionClass::Ml4, 0, 0.5).await.unwrap();

        // 4 * 0.1 = 0.4 threshold
        let outcome = solutions.decrement("4ml", 0, 0.2).await.unwrap();
        assert_eq!(outcome, DecrementOutcome::LowWarning);

        let left = solutions.volume(SolutionClass::Ml4, 0).await.unwrap().unwrap();
        assert!((left - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_overdraw_floors_at_zero() {
        let solutions = ledger().await;

        let outcome = solutions.decrement("100ml", 1, 150.0).await.unwrap();

        assert_eq!(outcome, DecrementOutcome::LowWarning);
        assert_eq!(solutions.volume(SolutionClass::Ml100, 1).await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_decrement_above_threshold() {
        let solutions = ledger().await;
        let outcome = solutions.decrement("50ml", 3, 10.0).await.unwrap();
        assert_eq!(outcome, DecrementOutcome::Applied);
        assert_eq!(solutions.volume(SolutionClass::Ml50, 3).await.unwrap(), Some(40.0));
    }

    #[tokio::test]
    async fn test_unknown_class_leaves_state_untouched() {
        let solutions = ledger().await;
        let before = solutions.levels().await.unwrap();

        let outcome = solutions.decrement("20ml", 0, 1.0).await.unwrap();

        assert_eq!(outcome, DecrementOutcome::UnknownClass);
        assert_eq!(solutions.levels().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_set_volume_respects_capacity() {
        let solutions = ledger().await;
        assert!(solutions.set_volume(SolutionClass::Ml4, 0, 4.5).await.is_err());
        assert!(solutions.set_volume(SolutionClass::Ml100, 2, 10.0).await.is_err());
    }

    #[tokio::test]
    async fn test_resets() {
        let solutions = ledger().await;
        solutions.set_volume(SolutionClass::Ml100, 1, 25.0).await.unwrap();
        solutions.set_volume(SolutionClass::Ml50, 0, 5.0).await.unwrap();

        solutions.reset_position(SolutionClass::Ml100, 1).await.unwrap();
        assert_eq!(solutions.volume(SolutionClass::Ml100, 1).await.unwrap(), Some(100.0));
        assert_eq!(solutions.volume(SolutionClass::Ml50, 0).await.unwrap(), Some(5.0));

        solutions.reset_all().await.unwrap();
        assert_eq!(solutions.volume(SolutionClass::Ml50, 0).await.unwrap(), Some(50.0));
    }

    #[tokio::test]
    async fn test_warning_ratio_changes_threshold() {
        let solutions = ledger().await;
        solutions.set_warning_ratio(SolutionClass::Ml50, 0.5).await.unwrap();
        assert_eq!(solutions.warning_threshold(SolutionClass::Ml50).await.unwrap(), 25.0);

        let outcome = solutions.decrement("solutionInfo50ml", 0, 30.0).await.unwrap();
        assert_eq!(outcome, DecrementOutcome::LowWarning);

        solutions.reset_warning_ratios().await.unwrap();
        assert_eq!(solutions.warning_ratio(SolutionClass::Ml50).await.unwrap(), DEFAULT_WARNING_RATIO);
    }
}
