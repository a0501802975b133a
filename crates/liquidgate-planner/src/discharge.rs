//! Discharge planning: drain sample containers to waste.
//!
//! Containers are uncapped one after another while their draws are queued.
//! Once a lid mechanism is one lid short of full, or the last container has
//! been opened, the queue is flushed behind a single tip: install, every
//! queued suck/dispense pair, uninstall, then the queued closes. All flushes
//! go into one batch.

use std::collections::VecDeque;

use liquidgate_core::{
    BatchRunner, CommandBatch, Container, ContainerSize, ContainerType, DischargeParams,
    ExecutionContext, PrimitiveOperation, Result, Station, SuckSource,
};
use tracing::{debug, info};

use crate::lids::{close_triplet, open_triplet, sample_lid};
use crate::planner::OperationPlanner;
use crate::volume::{chunk_volume, discharge_volume};

/// Order in which container groups are stacked. The last group is popped first.
const STACK_ORDER: [ContainerType; 4] = [
    ContainerType::Sample3,
    ContainerType::Sample2,
    ContainerType::Sample1,
    ContainerType::Bottle20ml,
];

/// Work queued between two flushes.
#[derive(Debug, Default)]
struct PendingFlush {
    open_4ml: u32,
    open_20ml: u32,
    draws: Vec<PrimitiveOperation>,
    closes: VecDeque<PrimitiveOperation>,
}

impl PendingFlush {
    fn open_count(&self, size: ContainerSize) -> u32 {
        match size {
            ContainerSize::Ml4 => self.open_4ml,
            ContainerSize::Ml20 => self.open_20ml,
        }
    }

    fn record_open(&mut self, size: ContainerSize) {
        match size {
            ContainerSize::Ml4 => self.open_4ml += 1,
            ContainerSize::Ml20 => self.open_20ml += 1,
        }
    }

    /// Queue a close triplet ahead of every close queued so far.
    fn prepend_close(&mut self, triplet: [PrimitiveOperation; 3]) {
        for op in triplet.into_iter().rev() {
            self.closes.push_front(op);
        }
    }
}

fn sample_suck(size: ContainerSize) -> SuckSource {
    match size {
        ContainerSize::Ml4 => SuckSource::Ml4,
        ContainerSize::Ml20 => SuckSource::Ml20,
    }
}

/// Containers stacked by group; popping yields processing order.
fn container_stack(containers: &[Container]) -> Vec<Container> {
    STACK_ORDER
        .iter()
        .flat_map(|ty| containers.iter().filter(move |c| c.container_type == *ty))
        .copied()
        .collect()
}

impl OperationPlanner {
    fn lids_full(&self, pending: &PendingFlush) -> bool {
        [ContainerSize::Ml4, ContainerSize::Ml20].iter().any(|size| {
            pending.open_count(*size) >= self.config.lid_capacity(*size).saturating_sub(1)
                && pending.open_count(*size) > 0
        })
    }

    async fn flush(&self, batch: &mut CommandBatch, pending: &mut PendingFlush) -> Result<()> {
        let pending = std::mem::take(pending);
        debug!(
            "Flushing {} draw commands for {} open 4ml / {} open 20ml containers",
            pending.draws.len(),
            pending.open_4ml,
            pending.open_20ml
        );
        self.install_tip(batch).await?;
        batch.extend(pending.draws);
        batch.push(PrimitiveOperation::uninstall_tip(Station::Recycle));
        batch.extend(pending.closes);
        Ok(())
    }

    /// Build the discharge batch for every container in the context.
    pub async fn plan_discharge(
        &self,
        ctx: &ExecutionContext,
        params: &DischargeParams,
    ) -> Result<CommandBatch> {
        let containers = ctx.containers()?;
        let mut batch = Self::new_batch(ctx)?;
        let mut queue = container_stack(&containers);
        let mut pending = PendingFlush::default();

        while let Some(container) = queue.pop() {
            let size = container.size();
            let home = (Station::Sample, container.index());
            let lid = sample_lid(size);
            let lid_index = pending.open_count(size);

            batch.extend(open_triplet(size, home, lid, lid_index));
            pending.record_open(size);

            for chunk in chunk_volume(discharge_volume(params, &container), self.config.suck_ceiling) {
                pending.draws.push(PrimitiveOperation::suck(
                    Station::Sample,
                    sample_suck(size),
                    container.index(),
                    chunk,
                ));
                pending.draws.push(PrimitiveOperation::dispense(Station::Recycle, 0));
            }
            pending.prepend_close(close_triplet(size, home, lid, lid_index));

            if self.lids_full(&pending) || queue.is_empty() {
                self.flush(&mut batch, &mut pending).await?;
            }
        }

        Ok(batch)
    }

    /// Plan and run a discharge.
    pub async fn discharge(
        &self,
        ctx: &ExecutionContext,
        params: &DischargeParams,
        runner: &dyn BatchRunner,
    ) -> Result<()> {
        let batch = self.plan_discharge(ctx, params).await?;
        if batch.is_empty() {
            info!("No containers to discharge");
            return Ok(());
        }
        info!("Running discharge batch {} with {} commands", batch.id, batch.len());
        runner.run(batch).await
    }
}
