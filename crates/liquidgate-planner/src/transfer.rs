//! Transfer planning: fill target containers from stock-solution bottles.
//!
//! Each source bottle gets its own batch, and a bottle's batch must finish
//! before the next bottle is planned. Batches that already ran are not
//! rolled back when a later one fails.

use std::collections::BTreeMap;

use liquidgate_core::{
    BatchRunner, CommandBatch, Container, ContainerSize, DropTarget, ExecutionContext,
    GatewayError, PrimitiveOperation, Result, SourceBottle, Station, TransferParams,
};
use tracing::{error, info};

use crate::lids::{close_source, close_triplet, open_source, open_triplet, sample_lid, source_suck};
use crate::planner::OperationPlanner;

/// One container to fill and how much to put into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferTarget {
    pub container: Container,
    pub volume: f64,
}

/// Everything one source bottle has to fill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BottleWork {
    pub targets_20ml: Vec<TransferTarget>,
    pub targets_4ml: Vec<TransferTarget>,
}

impl BottleWork {
    fn push(&mut self, target: TransferTarget) {
        match target.container.size() {
            ContainerSize::Ml4 => self.targets_4ml.push(target),
            ContainerSize::Ml20 => self.targets_20ml.push(target),
        }
    }

    /// Tip groups: the 20ml targets together, then the 4ml targets in
    /// groups of at most `group_size`.
    fn groups(&self, group_size: usize) -> Vec<(ContainerSize, &[TransferTarget])> {
        let mut groups = Vec::new();
        if !self.targets_20ml.is_empty() {
            groups.push((ContainerSize::Ml20, self.targets_20ml.as_slice()));
        }
        groups.extend(
            self.targets_4ml
                .chunks(group_size.max(1))
                .map(|chunk| (ContainerSize::Ml4, chunk)),
        );
        groups
    }
}

/// Assign every draw instruction's targets to its source bottle.
///
/// A draw applies to every context container of the rack it is listed
/// under. Bottles come out in ascending order.
pub fn group_by_bottle(
    containers: &[Container],
    params: &TransferParams,
) -> BTreeMap<SourceBottle, BottleWork> {
    let mut work: BTreeMap<SourceBottle, BottleWork> = BTreeMap::new();
    for (container_type, list) in params.by_container_type() {
        let targets: Vec<&Container> = containers
            .iter()
            .filter(|c| c.container_type == container_type)
            .collect();
        for draw in &list.draws {
            for container in &targets {
                work.entry(draw.bottle).or_default().push(TransferTarget {
                    container: **container,
                    volume: draw.volume,
                });
            }
        }
    }
    work
}

fn drop_target(size: ContainerSize) -> DropTarget {
    match size {
        ContainerSize::Ml4 => DropTarget::Slot4ml,
        ContainerSize::Ml20 => DropTarget::Slot20ml,
    }
}

impl OperationPlanner {
    /// Build the batch that serves one source bottle.
    pub async fn plan_bottle(
        &self,
        ctx: &ExecutionContext,
        bottle: SourceBottle,
        work: &BottleWork,
    ) -> Result<CommandBatch> {
        let mut batch = Self::new_batch(ctx)?;
        let groups = work.groups(self.config.transfer_group_size);
        let last = groups.len().saturating_sub(1);

        for (i, (size, targets)) in groups.into_iter().enumerate() {
            let lid = sample_lid(size);
            let opened: Vec<(u32, &TransferTarget)> = (0u32..).zip(targets).collect();
            for &(lid_index, target) in &opened {
                batch.extend(open_triplet(size, (Station::Sample, target.container.index()), lid, lid_index));
            }
            if i == 0 {
                batch.extend(open_source(bottle));
            }

            self.install_tip(&mut batch).await?;
            for target in targets {
                batch.push(PrimitiveOperation::suck(
                    Station::Material,
                    source_suck(bottle),
                    bottle.location(),
                    target.volume,
                ));
                batch.push(PrimitiveOperation::drop_to(
                    Station::Sample,
                    drop_target(size),
                    target.container.index(),
                ));
            }
            batch.push(PrimitiveOperation::uninstall_tip(Station::Recycle));

            if i == last {
                batch.extend(close_source(bottle));
            }
            for &(lid_index, target) in opened.iter().rev() {
                batch.extend(close_triplet(size, (Station::Sample, target.container.index()), lid, lid_index));
            }
        }

        Ok(batch)
    }

    /// Plan and run a transfer, one bottle at a time.
    pub async fn transfer(
        &self,
        ctx: &ExecutionContext,
        params: &TransferParams,
        runner: &dyn BatchRunner,
    ) -> Result<()> {
        let containers = ctx.containers()?;
        Self::new_batch(ctx)?;
        let work = group_by_bottle(&containers, params);
        if work.is_empty() {
            info!("Transfer has no targets");
            return Ok(());
        }

        for (bottle, bottle_work) in &work {
            let batch = self.plan_bottle(ctx, *bottle, bottle_work).await?;
            info!(
                "Running transfer batch {} for bottle {} ({} commands)",
                batch.id,
                bottle,
                batch.len()
            );
            runner.run(batch).await.map_err(|e| {
                error!("Transfer from bottle {} failed: {}", bottle, e);
                GatewayError::BatchFailed {
                    bottle: bottle.number(),
                    source: Box::new(e),
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, planner, RecordingRunner};
    use liquidgate_core::OperationKind;
    use serde_json::json;

    fn params(value: serde_json::Value) -> TransferParams {
        serde_json::from_value(value).unwrap()
    }

    fn codes(batch: &CommandBatch) -> Vec<&str> {
        batch.operations.iter().map(|op| op.code.as_str()).collect()
    }

    #[test]
    fn test_grouping_by_bottle() {
        let ctx = context(json!([
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 1},
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 2},
            {"containerTypeCode": "container_bottle_20ml", "logicNo": 3},
        ]));
        let params = params(json!({
            "param4mlRack1": {"operateList": [
                {"originalSolutionBottle": 4, "originalSolutionVolume": 100.0},
                {"originalSolutionBottle": 1, "originalSolutionVolume": 50.0}
            ]},
            "param20mlRack1": {"operateList": [
                {"originalSolutionBottle": 4, "originalSolutionVolume": 900.0}
            ]}
        }));

        let work = group_by_bottle(&ctx.containers().unwrap(), &params);

        let bottles: Vec<u8> = work.keys().map(|b| b.number()).collect();
        assert_eq!(bottles, vec![1, 4]);
        let four = &work[&SourceBottle::new(4).unwrap()];
        assert_eq!(four.targets_4ml.len(), 2);
        assert_eq!(four.targets_20ml.len(), 1);
        assert_eq!(four.targets_20ml[0].volume, 900.0);
    }

    #[tokio::test]
    async fn test_start_bottle_sequence() {
        let (planner, _) = planner().await;
        let ctx = context(json!([
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 1},
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 2},
        ]));
        let work = group_by_bottle(
            &ctx.containers().unwrap(),
            &params(json!({"param4mlRack1": {"operateList": [
                {"originalSolutionBottle": 2, "originalSolutionVolume": 150.0}
            ]}})),
        );

        let batch = planner
            .plan_bottle(&ctx, SourceBottle::new(2).unwrap(), &work[&SourceBottle::new(2).unwrap()])
            .await
            .unwrap();

        assert_eq!(
            codes(&batch),
            vec![
                "move", "open_slot_4ml", "move",
                "move", "open_slot_4ml", "move",
                "move", "open_slot_4ml_start", "move",
                "move_from_drip",
                "suck_from_4ml", "drip_to_slot_4ml",
                "suck_from_4ml", "drip_to_slot_4ml",
                "move_to_drip",
                "move", "close_slot_4ml_start", "move",
                "move", "close_slot_4ml", "move",
                "move", "close_slot_4ml", "move",
            ]
        );
        // Target lids close in reverse: position 2 (lid 1) before position 1 (lid 0).
        assert_eq!(batch.operations[18].source.index(), Some(1));
        assert_eq!(batch.operations[19].source.index(), Some(1));
        assert_eq!(batch.operations[22].source.index(), Some(0));
        assert_eq!(batch.operations[10].tool_arg, Some(150.0));
    }

    /// (container position, lid index) for every lid-station op of `kind`.
    fn lid_sequence(batch: &CommandBatch, kind: OperationKind) -> Vec<(u32, u32)> {
        batch
            .operations
            .windows(2)
            .filter(|pair| pair[1].kind == kind && pair[1].source.station == Station::LidOperation)
            .filter_map(|pair| Some((pair[0].source.index()?, pair[1].source.index()?)))
            .collect()
    }

    #[tokio::test]
    async fn test_lids_close_in_reverse_of_opening() {
        let (planner, _) = planner().await;
        let ctx = context(json!([
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 1},
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 2},
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 3},
        ]));
        let work = group_by_bottle(
            &ctx.containers().unwrap(),
            &params(json!({"param4mlRack1": {"operateList": [
                {"originalSolutionBottle": 5, "originalSolutionVolume": 80.0}
            ]}})),
        );
        let bottle = SourceBottle::new(5).unwrap();

        let batch = planner.plan_bottle(&ctx, bottle, &work[&bottle]).await.unwrap();

        let opened = lid_sequence(&batch, OperationKind::OpenLid);
        let mut closed = lid_sequence(&batch, OperationKind::CloseLid);
        assert_eq!(opened.len(), 3);
        assert_eq!(closed.len(), 3);
        assert_eq!(opened, vec![(0, 0), (1, 1), (2, 2)]);
        closed.reverse();
        assert_eq!(closed, opened);
    }

    #[tokio::test]
    async fn test_duplicate_logic_no_fills_once() {
        let (planner, _) = planner().await;
        let ctx = context(json!([
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 1},
            {"containerTypeCode": "container_sample_1_4ml", "logicNo": 1},
        ]));
        let work = group_by_bottle(
            &ctx.containers().unwrap(),
            &params(json!({"param4mlRack1": {"operateList": [
                {"originalSolutionBottle": 1, "originalSolutionVolume": 100.0}
            ]}})),
        );
        let bottle = SourceBottle::new(1).unwrap();
        assert_eq!(work[&bottle].targets_4ml.len(), 1);

        let batch = planner.plan_bottle(&ctx, bottle, &work[&bottle]).await.unwrap();

        assert_eq!(batch.count(OperationKind::Suck), 1);
        assert_eq!(batch.count(OperationKind::Drop), 1);
    }

    #[tokio::test]
    async fn test_large_transfer_splits_4ml_groups() {
        let (planner, tips) = planner().await;
        let entries: Vec<_> = (1..=14)
            .map(|n| json!({"containerTypeCode": "container_sample_1_4ml", "logicNo": n}))
            .chain((1..=14).map(|n| json!({"containerTypeCode": "container_sample_2_4ml", "logicNo": n})))
            .chain((1..=3).map(|n| json!({"containerTypeCode": "container_bottle_20ml", "logicNo": n})))
            .collect();
        let ctx = context(json!(entries));
        let draw = json!({"operateList": [{"originalSolutionBottle": 7, "originalSolutionVolume": 20.0}]});
        let work = group_by_bottle(
            &ctx.containers().unwrap(),
            &params(json!({"param4mlRack1": draw, "param4mlRack2": draw, "param20mlRack1": draw})),
        );
        let bottle = SourceBottle::new(7).unwrap();

        let batch = planner.plan_bottle(&ctx, bottle, &work[&bottle]).await.unwrap();

        // One 20ml group and 28 vials in groups of 12, 12, 4.
        assert_eq!(batch.count(OperationKind::InstallTip), 4);
        assert_eq!(tips.remaining_count().await.unwrap(), 188);
        assert_eq!(batch.count(OperationKind::Drop), 31);

        let source_lids: Vec<&str> = batch
            .operations
            .iter()
            .filter(|op| matches!(op.kind, OperationKind::OpenLid | OperationKind::CloseLid))
            .filter(|op| op.code.contains("50ml"))
            .map(|op| op.code.as_str())
            .collect();
        assert_eq!(
            source_lids,
            vec!["open_slot_50ml_put", "open_slot_50ml_take", "close_slot_50ml_put", "close_slot_50ml_take"]
        );
        let last_uninstall = batch
            .operations
            .iter()
            .rposition(|op| op.kind == OperationKind::UninstallTip)
            .unwrap();
        assert_eq!(batch.operations[last_uninstall + 1].code, "close_slot_50ml_put");
    }

    #[tokio::test]
    async fn test_20ml_only_bottle_closes_source() {
        let (planner, _) = planner().await;
        let ctx = context(json!([{"containerTypeCode": "container_bottle_20ml", "logicNo": 2}]));
        let work = group_by_bottle(
            &ctx.containers().unwrap(),
            &params(json!({"param20mlRack1": {"operateList": [
                {"originalSolutionBottle": 11, "originalSolutionVolume": 5000.0}
            ]}})),
        );
        let bottle = SourceBottle::new(11).unwrap();

        let batch = planner.plan_bottle(&ctx, bottle, &work[&bottle]).await.unwrap();

        assert_eq!(batch.count(OperationKind::OpenLid), 3);
        assert_eq!(batch.count(OperationKind::CloseLid), 3);
        assert!(codes(&batch).contains(&"drip_to_slot_20ml"));
        assert!(codes(&batch).contains(&"close_slot_100ml_take"));
    }

    #[tokio::test]
    async fn test_failed_bottle_stops_transfer() {
        let (planner, _) = planner().await;
        let runner = RecordingRunner::failing_at(0);
        let ctx = context(json!([{"containerTypeCode": "container_sample_3_4ml", "logicNo": 9}]));
        let params = params(json!({"param4mlRack3": {"operateList": [
            {"originalSolutionBottle": 2, "originalSolutionVolume": 100.0},
            {"originalSolutionBottle": 1, "originalSolutionVolume": 100.0}
        ]}}));

        let err = planner.transfer(&ctx, &params, &runner).await.unwrap_err();

        assert_eq!(err.failed_bottle(), Some(1));
        assert!(err.to_string().contains("source bottle 1"));
        assert_eq!(runner.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_bottles_run_in_order() {
        let (planner, _) = planner().await;
        let runner = RecordingRunner::default();
        let ctx = context(json!([{"containerTypeCode": "container_bottle_20ml", "logicNo": 1}]));
        let params = params(json!({"param20mlRack1": {"operateList": [
            {"originalSolutionBottle": 12, "originalSolutionVolume": 10.0},
            {"originalSolutionBottle": 3, "originalSolutionVolume": 10.0}
        ]}}));

        planner.transfer(&ctx, &params, &runner).await.unwrap();

        let batches = runner.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].operations[3].code, "open_slot_50ml_put");
        assert_eq!(batches[1].operations[3].code, "open_slot_100ml_put");
    }

    #[tokio::test]
    async fn test_missing_instance_rejected_before_running() {
        let (planner, _) = planner().await;
        let runner = RecordingRunner::default();
        let ctx: ExecutionContext = serde_json::from_value(json!({
            "containers": [{"containers": [{"containerTypeCode": "container_bottle_20ml", "logicNo": 1}]}]
        }))
        .unwrap();
        let params = params(json!({"param20mlRack1": {"operateList": [
            {"originalSolutionBottle": 3, "originalSolutionVolume": 10.0}
        ]}}));

        let err = planner.transfer(&ctx, &params, &runner).await.unwrap_err();

        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(runner.batches().is_empty());
    }
}
