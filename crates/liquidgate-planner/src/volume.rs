//! Volume splitting and per-container volume lookup.

use liquidgate_core::{Container, ContainerType, DischargeParams, RackVolumes};

/// Split `volume` into suck-sized chunks.
///
/// Every chunk is at most `ceiling`; all but the last are exactly `ceiling`.
/// A non-positive or non-finite volume yields no chunks.
pub fn chunk_volume(volume: f64, ceiling: f64) -> Vec<f64> {
    if !(volume.is_finite() && volume > 0.0 && ceiling > 0.0) {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut remaining = volume;
    while remaining > ceiling {
        chunks.push(ceiling);
        remaining -= ceiling;
    }
    chunks.push(remaining);
    chunks
}

/// The rack volume table responsible for a container type.
fn rack_for(params: &DischargeParams, container_type: ContainerType) -> &RackVolumes {
    match container_type {
        ContainerType::Sample1 => &params.rack1,
        ContainerType::Sample2 => &params.rack2,
        ContainerType::Sample3 => &params.rack3,
        ContainerType::Bottle20ml => &params.rack4,
    }
}

/// Volume to discharge from `container`.
///
/// Overrides are keyed by the rack-relative location, so the unified
/// position is shifted back by the rack's offset first.
pub fn discharge_volume(params: &DischargeParams, container: &Container) -> f64 {
    let location = container.position - container.container_type.logical_offset();
    rack_for(params, container.container_type).volume_at(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunks_respect_ceiling() {
        assert_eq!(chunk_volume(1200.0, 1000.0), vec![1000.0, 200.0]);
        assert_eq!(chunk_volume(1000.0, 1000.0), vec![1000.0]);
        assert_eq!(chunk_volume(350.0, 1000.0), vec![350.0]);
        assert!(chunk_volume(0.0, 1000.0).is_empty());
        assert!(chunk_volume(-5.0, 1000.0).is_empty());
    }

    #[test]
    fn test_chunks_sum_to_volume() {
        for volume in [1.0, 999.0, 1001.0, 2500.5, 4000.0, 7321.0] {
            let chunks = chunk_volume(volume, 1000.0);
            let sum: f64 = chunks.iter().sum();
            assert!((sum - volume).abs() < 1e-9, "volume {}", volume);
            assert!(chunks.iter().all(|c| *c <= 1000.0));
            assert!(chunks.iter().filter(|c| **c < 1000.0).count() <= 1);
        }
    }

    #[test]
    fn test_discharge_volume_uses_rack_relative_override() {
        let params: DischargeParams = serde_json::from_value(json!({
            "solutionExchangeInfoRack1": {"defalut_rack_info": 100.0, "specified_volume": []},
            "solutionExchangeInfoRack2": {
                "defalut_rack_info": 200.0,
                "specified_volume": [{"location": 3, "volume": 750.0}]
            },
            "solutionExchangeInfoRack3": {"defalut_rack_info": 300.0, "specified_volume": []},
            "solutionExchangeInfoRack4": {"defalut_rack_info": 400.0, "specified_volume": []}
        }))
        .unwrap();

        let rack2_third = Container {
            position: ContainerType::Sample2.logical_position(3),
            container_type: ContainerType::Sample2,
        };
        let rack2_fourth = Container {
            position: ContainerType::Sample2.logical_position(4),
            container_type: ContainerType::Sample2,
        };
        let bottle = Container {
            position: 3,
            container_type: ContainerType::Bottle20ml,
        };

        assert_eq!(discharge_volume(&params, &rack2_third), 750.0);
        assert_eq!(discharge_volume(&params, &rack2_fourth), 200.0);
        assert_eq!(discharge_volume(&params, &bottle), 400.0);
    }
}
