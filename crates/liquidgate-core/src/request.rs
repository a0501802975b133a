//! Request payloads sent by the orchestration system.

use std::collections::HashSet;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::command::ExternalId;
use crate::error::{GatewayError, Result};
use crate::types::{ContainerSize, ContainerType, SourceBottle};

/// Envelope of every inbound task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    /// Task id, echoed in the acknowledgement and the completion callback.
    pub id: ExternalId,

    /// Operation-specific parameters.
    #[serde(default)]
    pub param: serde_json::Value,

    /// Execution context; required by planning operations.
    #[serde(default)]
    pub context: Option<ExecutionContext>,
}

impl TaskRequest {
    /// Parameters with a `settings` wrapper unwrapped to its first element.
    pub fn params(&self) -> serde_json::Value {
        match self.param.get("settings").and_then(|s| s.as_array()) {
            Some(settings) => settings.first().cloned().unwrap_or(serde_json::Value::Null),
            None => self.param.clone(),
        }
    }

    /// Deserializes the parameters into an operation-specific shape.
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.params())
            .map_err(|e| GatewayError::validation(format!("invalid parameters: {}", e)))
    }

    /// The execution context, failing if it was not sent.
    pub fn require_context(&self) -> Result<&ExecutionContext> {
        self.context
            .as_ref()
            .ok_or_else(|| GatewayError::validation("request carries no execution context"))
    }
}

/// Pipeline/instance binding plus the containers the task works on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    #[serde(default = "missing_id")]
    pub pipeline_id: ExternalId,

    #[serde(default = "missing_id")]
    pub instance_id: ExternalId,

    #[serde(default)]
    pub containers: Option<Vec<ContainerGroup>>,
}

fn missing_id() -> ExternalId {
    ExternalId::new(serde_json::Value::Null)
}

/// One rack's worth of containers as listed in the context.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerGroup {
    #[serde(default)]
    pub containers: Vec<RawContainer>,
}

/// A container entry before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContainer {
    pub container_type_code: Option<String>,
    pub logic_no: Option<u32>,
}

/// A validated container addressed in the unified logical numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    /// 1-based unified position.
    pub position: u32,
    pub container_type: ContainerType,
}

impl Container {
    /// 0-based slot index used in controller commands.
    pub fn index(&self) -> u32 {
        self.position - 1
    }

    pub fn size(&self) -> ContainerSize {
        self.container_type.size()
    }
}

impl FromStr for ContainerType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| GatewayError::validation(format!("unknown container type '{}'", s)))
    }
}

impl ExecutionContext {
    /// Validates every listed container and maps it into the unified numbering.
    ///
    /// Fails on the first entry lacking a type or logical number, so that no
    /// robot command is ever emitted for a partially described deck. A logical
    /// number repeated within one rack is skipped with a warning.
    pub fn containers(&self) -> Result<Vec<Container>> {
        let groups = self
            .containers
            .as_ref()
            .ok_or_else(|| GatewayError::validation("execution context has no containers"))?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for raw in groups.iter().flat_map(|g| g.containers.iter()) {
            let code = raw
                .container_type_code
                .as_deref()
                .ok_or_else(|| GatewayError::validation("container is missing its type code"))?;
            let container_type: ContainerType = code.parse()?;
            let logic_no = raw.logic_no.ok_or_else(|| {
                GatewayError::validation(format!("{} container is missing its logical number", code))
            })?;

            let rack_width = match container_type.size() {
                ContainerSize::Ml4 => crate::types::RACK_WIDTH_4ML,
                ContainerSize::Ml20 => crate::types::RACK_WIDTH_20ML,
            };
            if logic_no == 0 || logic_no > rack_width {
                return Err(GatewayError::validation(format!(
                    "logical number {} out of range for {}",
                    logic_no,
                    container_type.code()
                )));
            }
            if !seen.insert((container_type, logic_no)) {
                warn!("Duplicate logical number {} for {}, skipping", logic_no, container_type.code());
                continue;
            }

            out.push(Container {
                position: container_type.logical_position(logic_no),
                container_type,
            });
        }
        Ok(out)
    }
}

/// Per-rack discharge volumes: a default plus per-position overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct RackVolumes {
    #[serde(rename = "defalut_rack_info", alias = "default_rack_info")]
    pub default_volume: f64,

    #[serde(default)]
    pub specified_volume: Vec<VolumeOverride>,
}

impl RackVolumes {
    /// Volume for a rack-relative (1-based) location.
    pub fn volume_at(&self, location: u32) -> f64 {
        self.specified_volume
            .iter()
            .find(|o| o.location == location)
            .map(|o| o.volume)
            .unwrap_or(self.default_volume)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeOverride {
    pub location: u32,
    pub volume: f64,
}

/// Parameters of a discharge (drain to waste) task.
#[derive(Debug, Clone, Deserialize)]
pub struct DischargeParams {
    #[serde(rename = "solutionExchangeInfoRack1")]
    pub rack1: RackVolumes,
    #[serde(rename = "solutionExchangeInfoRack2")]
    pub rack2: RackVolumes,
    #[serde(rename = "solutionExchangeInfoRack3")]
    pub rack3: RackVolumes,
    /// The 20ml bottle rack.
    #[serde(rename = "solutionExchangeInfoRack4")]
    pub rack4: RackVolumes,
}

/// Draw instruction: fill every listed target from `bottle` with `volume`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDraw {
    #[serde(rename = "originalSolutionBottle")]
    pub bottle: SourceBottle,
    #[serde(rename = "originalSolutionVolume")]
    pub volume: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperateList {
    #[serde(rename = "operateList", default)]
    pub draws: Vec<SourceDraw>,
}

/// Parameters of a transfer (stock solution to targets) task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferParams {
    #[serde(rename = "param4mlRack1", default)]
    pub rack1: OperateList,
    #[serde(rename = "param4mlRack2", default)]
    pub rack2: OperateList,
    #[serde(rename = "param4mlRack3", default)]
    pub rack3: OperateList,
    #[serde(rename = "param20mlRack1", default)]
    pub rack_20ml: OperateList,
}

impl TransferParams {
    /// Draw lists paired with the container type they target.
    pub fn by_container_type(&self) -> [(ContainerType, &OperateList); 4] {
        [
            (ContainerType::Sample1, &self.rack1),
            (ContainerType::Sample2, &self.rack2),
            (ContainerType::Sample3, &self.rack3),
            (ContainerType::Bottle20ml, &self.rack_20ml),
        ]
    }
}

/// Parameters of a cyclic exchange task: discharge, transfer, wait, repeat.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeParams {
    #[serde(rename = "cycleCount")]
    pub cycle_count: u32,

    /// Seconds to wait after each cycle.
    #[serde(rename = "time", default)]
    pub delay_secs: f64,

    #[serde(flatten)]
    pub discharge: DischargeParams,

    #[serde(flatten)]
    pub transfer: TransferParams,
}

/// Absolute override of one reservoir position, given as a fill fraction.
#[derive(Debug, Clone, Deserialize)]
pub struct StockSolutionUpdate {
    pub location: usize,
    pub stock_solution_type: u8,
    /// Fill fraction in `[0, 1]`.
    pub value: f64,
}
