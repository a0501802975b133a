//! Lid handling sequences.
//!
//! Sample containers are uncapped by carrying them to the lid operation
//! station, removing the lid there and carrying them back. Closing runs the
//! same three steps with the container's uncapped kind.

use liquidgate_core::{
    BottleKind, ContainerSize, Handoff, LidSlot, PrimitiveOperation, SourceBottle, Station,
    SuckSource,
};

/// Where a container is parked while its lid is handled.
const LID_PARKING: (Station, u32) = (Station::LidOperation, 0);

/// Lid mechanism used for a sample container of the given size.
pub fn sample_lid(size: ContainerSize) -> LidSlot {
    match size {
        ContainerSize::Ml4 => LidSlot::Sample4ml,
        ContainerSize::Ml20 => LidSlot::Sample20ml,
    }
}

/// Move to the lid station, open the lid at `lid_index`, move back.
pub fn open_triplet(
    size: ContainerSize,
    home: (Station, u32),
    lid: LidSlot,
    lid_index: u32,
) -> [PrimitiveOperation; 3] {
    let slot = size.slot_kind();
    [
        PrimitiveOperation::move_container(size.capped(), slot, home, LID_PARKING),
        PrimitiveOperation::open_lid(Station::LidOperation, lid, lid_index),
        PrimitiveOperation::move_container(size.uncapped(), slot, LID_PARKING, home),
    ]
}

/// Move to the lid station, close the lid parked at `lid_index`, move back.
pub fn close_triplet(
    size: ContainerSize,
    home: (Station, u32),
    lid: LidSlot,
    lid_index: u32,
) -> [PrimitiveOperation; 3] {
    let slot = size.slot_kind();
    [
        PrimitiveOperation::move_container(size.uncapped(), slot, home, LID_PARKING),
        PrimitiveOperation::close_lid(Station::LidOperation, lid, lid_index),
        PrimitiveOperation::move_container(size.capped(), slot, LID_PARKING, home),
    ]
}

/// Commands that uncap a stock-solution bottle.
pub fn open_source(bottle: SourceBottle) -> Vec<PrimitiveOperation> {
    let location = bottle.location();
    match bottle.kind() {
        BottleKind::Start4ml => open_triplet(
            ContainerSize::Ml4,
            (Station::Material, location),
            LidSlot::Start4ml,
            location,
        )
        .to_vec(),
        BottleKind::Ml50 => handoff_pair(true, LidSlot::Bottle50ml, location),
        BottleKind::Ml100 => handoff_pair(true, LidSlot::Bottle100ml, location),
    }
}

/// Commands that recap a stock-solution bottle.
pub fn close_source(bottle: SourceBottle) -> Vec<PrimitiveOperation> {
    let location = bottle.location();
    match bottle.kind() {
        BottleKind::Start4ml => close_triplet(
            ContainerSize::Ml4,
            (Station::Material, location),
            LidSlot::Start4ml,
            location,
        )
        .to_vec(),
        BottleKind::Ml50 => handoff_pair(false, LidSlot::Bottle50ml, location),
        BottleKind::Ml100 => handoff_pair(false, LidSlot::Bottle100ml, location),
    }
}

// Opening takes the lid off the bottle and puts it in the holder; closing
// takes it back from the holder and puts it on the bottle.
fn handoff_pair(open: bool, lid: fn(Handoff) -> LidSlot, location: u32) -> Vec<PrimitiveOperation> {
    if open {
        vec![
            PrimitiveOperation::open_lid(Station::Material, lid(Handoff::Put), location),
            PrimitiveOperation::open_lid(Station::Material, lid(Handoff::Take), 0),
        ]
    } else {
        vec![
            PrimitiveOperation::close_lid(Station::Material, lid(Handoff::Put), 0),
            PrimitiveOperation::close_lid(Station::Material, lid(Handoff::Take), location),
        ]
    }
}

/// Reservoir a bottle is sucked from.
pub fn source_suck(bottle: SourceBottle) -> SuckSource {
    match bottle.kind() {
        BottleKind::Start4ml => SuckSource::Ml4,
        BottleKind::Ml50 => SuckSource::Ml50,
        BottleKind::Ml100 => SuckSource::Ml100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidgate_core::{OperationKind, RobotContainer};

    #[test]
    fn test_open_and_close_mirror_each_other() {
        let open = open_triplet(ContainerSize::Ml20, (Station::Sample, 4), LidSlot::Sample20ml, 2);
        let close = close_triplet(ContainerSize::Ml20, (Station::Sample, 4), LidSlot::Sample20ml, 2);

        assert_eq!(open[0].container, Some(RobotContainer::Container20ml));
        assert_eq!(open[2].container, Some(RobotContainer::Container20mlNoCap));
        assert_eq!(close[0].container, Some(RobotContainer::Container20mlNoCap));
        assert_eq!(close[2].container, Some(RobotContainer::Container20ml));

        assert_eq!(open[1].code, "open_slot_20ml");
        assert_eq!(close[1].code, "close_slot_20ml");
        assert_eq!(close[1].source.index(), Some(2));
        assert_eq!(open[0].source, close[2].target);
    }

    #[test]
    fn test_bottle_lids_by_kind() {
        let start = open_source(SourceBottle::new(2).unwrap());
        assert_eq!(start.len(), 3);
        assert_eq!(start[1].code, "open_slot_4ml_start");
        assert_eq!(start[1].source.index(), Some(1));

        let ml50 = open_source(SourceBottle::new(5).unwrap());
        let codes: Vec<&str> = ml50.iter().map(|op| op.code.as_str()).collect();
        assert_eq!(codes, vec!["open_slot_50ml_put", "open_slot_50ml_take"]);
        assert_eq!(ml50[0].source.index(), Some(2));

        let ml100 = close_source(SourceBottle::new(12).unwrap());
        assert!(ml100.iter().all(|op| op.kind == OperationKind::CloseLid));
        assert_eq!(ml100[1].code, "close_slot_100ml_take");
        assert_eq!(ml100[1].source.index(), Some(1));
    }
}
