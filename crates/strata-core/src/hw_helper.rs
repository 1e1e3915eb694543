//! Queries derived from a hardware description and the debug settings

use crate::engine::{EngineType, PreemptionMode};
use crate::hw_info::HardwareInfo;
use crate::settings::DebugSettings;

/// One engine a device brings up through the standard path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineInstance {
    pub engine_type: EngineType,
    pub low_priority: bool,
}

impl EngineInstance {
    fn regular(engine_type: EngineType) -> Self {
        Self {
            engine_type,
            low_priority: false,
        }
    }
}

/// Number of sub-units (tiles) the hardware exposes, at least 1
pub fn sub_devices_count(hw_info: &HardwareInfo, settings: &DebugSettings) -> u32 {
    if settings.create_multiple_sub_devices > 0 {
        return settings.create_multiple_sub_devices;
    }
    hw_info.gt_system_info.tile_count.max(1)
}

pub fn enable_local_memory(hw_info: &HardwareInfo, settings: &DebugSettings) -> bool {
    match settings.enable_local_memory {
        -1 => hw_info.feature_table.ftr_local_memory,
        value => value != 0,
    }
}

/// Engine type of the default context
pub fn chosen_engine_type(hw_info: &HardwareInfo, settings: &DebugSettings) -> EngineType {
    EngineType::from_raw(settings.node_ordinal)
        .unwrap_or(hw_info.capability_table.default_engine_type)
}

pub fn default_preemption_mode(hw_info: &HardwareInfo, settings: &DebugSettings) -> PreemptionMode {
    PreemptionMode::from_raw(settings.force_preemption_mode)
        .unwrap_or(hw_info.capability_table.default_preemption_mode)
}

/// Engines created per device by the standard engine path, in creation order.
///
/// The default engine appears a second time as the low-priority context.
pub fn gpgpu_engine_instances(hw_info: &HardwareInfo, settings: &DebugSettings) -> Vec<EngineInstance> {
    let mut engines = vec![EngineInstance::regular(EngineType::Rcs)];
    if hw_info.feature_table.ftr_ccs_node {
        engines.push(EngineInstance::regular(EngineType::Ccs));
    }
    engines.push(EngineInstance {
        engine_type: chosen_engine_type(hw_info, settings),
        low_priority: true,
    });
    if hw_info.feature_table.ftr_blitter {
        engines.push(EngineInstance::regular(EngineType::Bcs));
    }
    engines
}

/// OS contexts one root device may register, including its sub-devices
pub fn max_os_context_count(hw_info: &HardwareInfo, settings: &DebugSettings) -> u32 {
    let engines = gpgpu_engine_instances(hw_info, settings).len() as u32;
    let sub_devices = sub_devices_count(hw_info, settings);
    if sub_devices > 1 {
        // one aggregate context at the root
        engines.saturating_mul(sub_devices).saturating_add(1)
    } else {
        engines
    }
}
