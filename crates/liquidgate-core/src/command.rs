//! Primitive robot operations and the batches they are submitted in.
//!
//! Every primitive carries a source and target station address, the
//! operation code the controller dispatches on, and an optional tool
//! argument (the volume of a suck). Constructors below are the only way the
//! planner builds primitives, so the wire vocabulary lives in one place.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::types::{RobotContainer, SlotKind, Station};

/// Discriminant of a primitive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Move,
    OpenLid,
    CloseLid,
    InstallTip,
    UninstallTip,
    Suck,
    Drop,
    Dispense,
}

/// A station plus an optional slot inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAddress {
    pub station: Station,
    pub slot: Option<(SlotKind, u32)>,
}

impl SlotAddress {
    /// Address of a whole station.
    pub fn station(station: Station) -> Self {
        Self { station, slot: None }
    }

    /// Address of a slot inside a station.
    pub fn slot(station: Station, kind: SlotKind, index: u32) -> Self {
        Self {
            station,
            slot: Some((kind, index)),
        }
    }

    /// Slot index, if the address names one.
    pub fn index(&self) -> Option<u32> {
        self.slot.map(|(_, index)| index)
    }
}

impl Serialize for SlotAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.slot.is_some() { 2 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some((kind, index)) = self.slot {
            map.serialize_entry(kind.key(), &index)?;
        }
        map.serialize_entry("workstation", self.station.name())?;
        map.end()
    }
}

/// Which side of a 50ml/100ml bottle lid hand-off a command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    Put,
    Take,
}

impl Handoff {
    fn suffix(&self) -> &'static str {
        match self {
            Handoff::Put => "put",
            Handoff::Take => "take",
        }
    }
}

/// Lid mechanism addressed by an open/close command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidSlot {
    /// 4ml sample vial parked at the lid station.
    Sample4ml,
    /// 20ml sample bottle parked at the lid station.
    Sample20ml,
    /// Fixed lid-station slots reserved for 4ml source bottles 1–2.
    Start4ml,
    Bottle50ml(Handoff),
    Bottle100ml(Handoff),
}

impl LidSlot {
    /// Controller operation code for opening (`true`) or closing this lid.
    pub fn code(&self, open: bool) -> String {
        let verb = if open { "open" } else { "close" };
        match self {
            LidSlot::Sample4ml => format!("{}_slot_4ml", verb),
            LidSlot::Sample20ml => format!("{}_slot_20ml", verb),
            LidSlot::Start4ml => format!("{}_slot_4ml_start", verb),
            LidSlot::Bottle50ml(h) => format!("{}_slot_50ml_{}", verb, h.suffix()),
            LidSlot::Bottle100ml(h) => format!("{}_slot_100ml_{}", verb, h.suffix()),
        }
    }
}

/// Reservoir size a suck command draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuckSource {
    Ml4,
    Ml20,
    Ml50,
    Ml100,
}

impl SuckSource {
    pub fn code(&self) -> &'static str {
        match self {
            SuckSource::Ml4 => "suck_from_4ml",
            SuckSource::Ml20 => "suck_from_20ml",
            SuckSource::Ml50 => "suck_from_50ml",
            SuckSource::Ml100 => "suck_from_100ml",
        }
    }
}

/// Container size a drop command releases liquid into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Slot4ml,
    Slot20ml,
}

impl DropTarget {
    pub fn code(&self) -> &'static str {
        match self {
            DropTarget::Slot4ml => "drip_to_slot_4ml",
            DropTarget::Slot20ml => "drip_to_slot_20ml",
        }
    }
}

/// One low-level instruction for the robot arm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimitiveOperation {
    #[serde(skip)]
    pub kind: OperationKind,

    /// Operation code the controller dispatches on.
    #[serde(rename = "operation")]
    pub code: String,

    /// Container kind carried by a move.
    #[serde(rename = "containerTypeCode", skip_serializing_if = "Option::is_none")]
    pub container: Option<RobotContainer>,

    pub source: SlotAddress,

    pub target: SlotAddress,

    /// Volume for a suck.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_arg: Option<f64>,
}

impl PrimitiveOperation {
    fn station_op(kind: OperationKind, code: impl Into<String>, station: Station, index: u32) -> Self {
        Self {
            kind,
            code: code.into(),
            container: None,
            source: SlotAddress::slot(station, SlotKind::Slot4ml, index),
            target: SlotAddress::station(station),
            tool_arg: None,
        }
    }

    /// Move a container between two station slots.
    pub fn move_container(
        container: RobotContainer,
        slot: SlotKind,
        from: (Station, u32),
        to: (Station, u32),
    ) -> Self {
        Self {
            kind: OperationKind::Move,
            code: "move".to_string(),
            container: Some(container),
            source: SlotAddress::slot(from.0, slot, from.1),
            target: SlotAddress::slot(to.0, slot, to.1),
            tool_arg: None,
        }
    }

    /// Remove a lid and park it at `index` of the lid mechanism.
    pub fn open_lid(station: Station, lid: LidSlot, index: u32) -> Self {
        Self::station_op(OperationKind::OpenLid, lid.code(true), station, index)
    }

    /// Put back the lid parked at `index` of the lid mechanism.
    pub fn close_lid(station: Station, lid: LidSlot, index: u32) -> Self {
        Self::station_op(OperationKind::CloseLid, lid.code(false), station, index)
    }

    /// Pick up the disposable tip in slot `tip_id`.
    pub fn install_tip(station: Station, tip_id: u32) -> Self {
        Self::station_op(OperationKind::InstallTip, "move_from_drip", station, tip_id)
    }

    /// Eject the current tip.
    pub fn uninstall_tip(station: Station) -> Self {
        Self::station_op(OperationKind::UninstallTip, "move_to_drip", station, 0)
    }

    /// Aspirate `volume` from `position`.
    pub fn suck(station: Station, source: SuckSource, position: u32, volume: f64) -> Self {
        let mut op = Self::station_op(OperationKind::Suck, source.code(), station, position);
        op.tool_arg = Some(volume);
        op
    }

    /// Release the tip's contents into the container at `position`.
    pub fn drop_to(station: Station, target: DropTarget, position: u32) -> Self {
        Self::station_op(OperationKind::Drop, target.code(), station, position)
    }

    /// Release the tip's contents to waste.
    pub fn dispense(station: Station, position: u32) -> Self {
        Self::station_op(OperationKind::Dispense, "drip_to_recycle", station, position)
    }

    /// Volume carried by a suck.
    pub fn volume(&self) -> Option<f64> {
        self.tool_arg
    }
}

impl fmt::Display for PrimitiveOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(index) = self.source.index() {
            write!(f, " {}[{}]", self.source.station.name(), index)?;
        }
        if let Some(volume) = self.tool_arg {
            write!(f, " ({})", volume)?;
        }
        Ok(())
    }
}

/// Identifier issued by the orchestration system, numeric or textual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(serde_json::Value);

impl ExternalId {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self(value.into())
    }

    /// Returns true if the orchestrator sent nothing usable.
    pub fn is_missing(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// Ordered primitives submitted to the controller as one unit.
#[derive(Debug, Clone)]
pub struct CommandBatch {
    /// Local id used in logs only.
    pub id: Uuid,
    pub instance_id: ExternalId,
    pub pipeline_id: ExternalId,
    pub operations: Vec<PrimitiveOperation>,
}

impl CommandBatch {
    pub fn new(instance_id: ExternalId, pipeline_id: ExternalId) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_id,
            pipeline_id,
            operations: Vec::new(),
        }
    }

    pub fn push(&mut self, op: PrimitiveOperation) {
        self.operations.push(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = PrimitiveOperation>) {
        self.operations.extend(ops);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Splits the batch into one single-primitive batch per operation,
    /// preserving order.
    pub fn into_steps(self) -> Vec<CommandBatch> {
        let CommandBatch {
            instance_id,
            pipeline_id,
            operations,
            ..
        } = self;
        operations
            .into_iter()
            .map(|op| {
                let mut step = CommandBatch::new(instance_id.clone(), pipeline_id.clone());
                step.push(op);
                step
            })
            .collect()
    }

    /// Number of primitives of the given kind.
    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind == kind).count()
    }
}
