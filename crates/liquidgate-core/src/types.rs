//! Addressing and labware types shared across the gateway.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Number of 4ml positions on one sample rack.
pub const RACK_WIDTH_4ML: u32 = 14;

/// Number of 4ml sample racks.
pub const RACK_COUNT_4ML: u32 = 3;

/// Number of positions on the 20ml bottle rack.
pub const RACK_WIDTH_20ML: u32 = 8;

/// Highest source (stock-solution) bottle number.
pub const MAX_SOURCE_BOTTLE: u8 = 12;

/// Externally visible status of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    /// The controller failed its liveness check.
    Offline,
    /// No task is running; a new one may be admitted.
    Idle,
    /// A task is running.
    Busy,
}

impl DeviceStatus {
    /// Returns true if a new task may be admitted.
    pub fn is_idle(&self) -> bool {
        matches!(self, DeviceStatus::Idle)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceStatus::Offline => "OFFLINE",
            DeviceStatus::Idle => "IDLE",
            DeviceStatus::Busy => "BUSY",
        };
        f.write_str(name)
    }
}

/// Labware kind as named by the orchestration system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerType {
    #[serde(rename = "container_sample_1_4ml")]
    Sample1,
    #[serde(rename = "container_sample_2_4ml")]
    Sample2,
    #[serde(rename = "container_sample_3_4ml")]
    Sample3,
    #[serde(rename = "container_bottle_20ml")]
    Bottle20ml,
}

impl ContainerType {
    /// Physical size class of this container.
    pub fn size(&self) -> ContainerSize {
        match self {
            ContainerType::Bottle20ml => ContainerSize::Ml20,
            _ => ContainerSize::Ml4,
        }
    }

    /// Offset added to a rack-relative number to reach the unified numbering.
    pub fn logical_offset(&self) -> u32 {
        match self {
            ContainerType::Sample1 | ContainerType::Bottle20ml => 0,
            ContainerType::Sample2 => RACK_WIDTH_4ML,
            ContainerType::Sample3 => 2 * RACK_WIDTH_4ML,
        }
    }

    /// Unified logical position for a rack-relative (1-based) number.
    pub fn logical_position(&self, rack_number: u32) -> u32 {
        rack_number + self.logical_offset()
    }

    /// The 4ml sample rack type owning unified position `n` (1-based).
    pub fn sample_rack_for(n: u32) -> Option<ContainerType> {
        match position_to_rack(n)? {
            0 => Some(ContainerType::Sample1),
            1 => Some(ContainerType::Sample2),
            2 => Some(ContainerType::Sample3),
            _ => None,
        }
    }

    /// Wire code of this container type.
    pub fn code(&self) -> &'static str {
        match self {
            ContainerType::Sample1 => "container_sample_1_4ml",
            ContainerType::Sample2 => "container_sample_2_4ml",
            ContainerType::Sample3 => "container_sample_3_4ml",
            ContainerType::Bottle20ml => "container_bottle_20ml",
        }
    }
}

/// Recovers the 0-based 4ml rack index from a unified logical position.
///
/// Returns `None` for positions outside `[1, 42]`.
pub fn position_to_rack(n: u32) -> Option<u32> {
    if n == 0 || n > RACK_WIDTH_4ML * RACK_COUNT_4ML {
        return None;
    }
    Some((n - 1) / RACK_WIDTH_4ML)
}

/// Physical size class of a container, which decides lid station and commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerSize {
    Ml4,
    Ml20,
}

impl ContainerSize {
    /// Slot key used to address containers of this size.
    pub fn slot_kind(&self) -> SlotKind {
        match self {
            ContainerSize::Ml4 => SlotKind::Slot4ml,
            ContainerSize::Ml20 => SlotKind::Slot20ml,
        }
    }

    /// Container kind handed to the controller while the lid is on.
    pub fn capped(&self) -> RobotContainer {
        match self {
            ContainerSize::Ml4 => RobotContainer::Container4ml,
            ContainerSize::Ml20 => RobotContainer::Container20ml,
        }
    }

    /// Container kind handed to the controller while the lid is off.
    pub fn uncapped(&self) -> RobotContainer {
        match self {
            ContainerSize::Ml4 => RobotContainer::Container4ml,
            ContainerSize::Ml20 => RobotContainer::Container20mlNoCap,
        }
    }
}

/// Work stations known to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Station {
    #[serde(rename = "material_station")]
    Material,
    #[serde(rename = "lid_operation_station")]
    LidOperation,
    #[serde(rename = "sample_station")]
    Sample,
    #[serde(rename = "recycle_station")]
    Recycle,
}

impl Station {
    pub fn name(&self) -> &'static str {
        match self {
            Station::Material => "material_station",
            Station::LidOperation => "lid_operation_station",
            Station::Sample => "sample_station",
            Station::Recycle => "recycle_station",
        }
    }
}

/// Slot key inside a station address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    #[serde(rename = "slot_4ml_position")]
    Slot4ml,
    #[serde(rename = "slot_20ml_position")]
    Slot20ml,
}

impl SlotKind {
    pub fn key(&self) -> &'static str {
        match self {
            SlotKind::Slot4ml => "slot_4ml_position",
            SlotKind::Slot20ml => "slot_20ml_position",
        }
    }
}

/// Container kind as understood by the controller's move command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotContainer {
    #[serde(rename = "container_4ml")]
    Container4ml,
    #[serde(rename = "container_20ml")]
    Container20ml,
    #[serde(rename = "container_20ml_nocap")]
    Container20mlNoCap,
}

/// Capacity class of a stock-solution reservoir.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SolutionClass {
    #[serde(rename = "solutionInfo4ml")]
    Ml4,
    #[serde(rename = "solutionInfo50ml")]
    Ml50,
    #[serde(rename = "solutionInfo100ml")]
    Ml100,
}

impl SolutionClass {
    pub const ALL: [SolutionClass; 3] = [SolutionClass::Ml4, SolutionClass::Ml50, SolutionClass::Ml100];

    /// Nominal capacity of one position of this class.
    pub fn capacity(&self) -> f64 {
        match self {
            SolutionClass::Ml4 => 4.0,
            SolutionClass::Ml50 => 50.0,
            SolutionClass::Ml100 => 100.0,
        }
    }

    /// Number of physical positions of this class on a fresh deck.
    pub fn default_positions(&self) -> usize {
        match self {
            SolutionClass::Ml4 => 2,
            SolutionClass::Ml50 => 8,
            SolutionClass::Ml100 => 2,
        }
    }

    /// Numeric code used by the orchestration system.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SolutionClass::Ml4),
            1 => Some(SolutionClass::Ml50),
            2 => Some(SolutionClass::Ml100),
            _ => None,
        }
    }

    /// Key under which this class is persisted and reported.
    pub fn key(&self) -> &'static str {
        match self {
            SolutionClass::Ml4 => "solutionInfo4ml",
            SolutionClass::Ml50 => "solutionInfo50ml",
            SolutionClass::Ml100 => "solutionInfo100ml",
        }
    }
}

impl fmt::Display for SolutionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SolutionClass {
    type Err = GatewayError;

    /// Accepts the short name (`4ml`), the persisted key (`solutionInfo4ml`)
    /// or the numeric code (`0`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "4ml" | "solutionInfo4ml" | "0" => Ok(SolutionClass::Ml4),
            "50ml" | "solutionInfo50ml" | "1" => Ok(SolutionClass::Ml50),
            "100ml" | "solutionInfo100ml" | "2" => Ok(SolutionClass::Ml100),
            other => Err(GatewayError::validation(format!(
                "unknown solution class '{}'",
                other
            ))),
        }
    }
}

/// How a source bottle's lid is handled, decided by the bottle number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BottleKind {
    /// Bottles 1–2: 4ml vials uncapped at the lid station's fixed start slots.
    Start4ml,
    /// Bottles 3–10.
    Ml50,
    /// Bottles 11–12.
    Ml100,
}

/// A stock-solution bottle on the material station, numbered 1–12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SourceBottle(u8);

impl SourceBottle {
    pub fn new(number: u8) -> Option<Self> {
        (1..=MAX_SOURCE_BOTTLE).contains(&number).then_some(Self(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn kind(&self) -> BottleKind {
        match self.0 {
            1..=2 => BottleKind::Start4ml,
            3..=10 => BottleKind::Ml50,
            _ => BottleKind::Ml100,
        }
    }

    /// Slot index of this bottle within its kind's block on the material station.
    pub fn location(&self) -> u32 {
        let first = match self.kind() {
            BottleKind::Start4ml => 1,
            BottleKind::Ml50 => 3,
            BottleKind::Ml100 => 11,
        };
        u32::from(self.0 - first)
    }
}

impl TryFrom<u8> for SourceBottle {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SourceBottle::new(value).ok_or_else(|| format!("source bottle {} out of range 1-12", value))
    }
}

impl From<SourceBottle> for u8 {
    fn from(bottle: SourceBottle) -> Self {
        bottle.0
    }
}

impl fmt::Display for SourceBottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
