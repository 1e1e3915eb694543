//! Hardware-capability descriptions and hw-config strings

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::engine::{EngineType, PreemptionMode};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HwConfigError {
    #[error("Malformed hw config {0:?}, expected <slices>x<subslices>x<eus>")]
    Malformed(String),
    #[error("Hw config {0:?} has a zero field")]
    ZeroField(String),
    #[error("Hw config {0:?} is out of range")]
    OutOfRange(String),
}

/// Identity of the product a description belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Product family short name (e.g., "tgllp")
    pub product_family: String,
    /// Render core family name (e.g., "gen12lp")
    pub render_core_family: String,
    /// PCI device id
    #[serde(default)]
    pub device_id: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureTable {
    pub ftr_local_memory: bool,
    pub ftr_e2e_compression: bool,
    pub ftr_ccs_node: bool,
    pub ftr_blitter: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GtSystemInfo {
    pub slice_count: u32,
    pub sub_slice_count: u32,
    pub eu_count: u32,
    /// Number of tiles; 0 when the part has no multi-tile architecture
    pub tile_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    /// Highest usable GPU virtual address
    pub gpu_address_space: u64,
    pub default_engine_type: EngineType,
    pub default_preemption_mode: PreemptionMode,
}

/// Complete capability description of one accelerator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub platform: Platform,
    #[serde(default)]
    pub feature_table: FeatureTable,
    #[serde(default)]
    pub gt_system_info: GtSystemInfo,
    pub capability_table: CapabilityTable,
}

impl HardwareInfo {
    pub fn product_family(&self) -> &str {
        &self.platform.product_family
    }
}

/// Slice/subslice/EU topology requested through a hw-config string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HwInfoConfig {
    pub slices: u32,
    pub sub_slices_per_slice: u32,
    pub eu_per_sub_slice: u32,
}

impl HwInfoConfig {
    pub fn new(slices: u32, sub_slices_per_slice: u32, eu_per_sub_slice: u32) -> Self {
        Self {
            slices,
            sub_slices_per_slice,
            eu_per_sub_slice,
        }
    }

    /// Packed form: slices in bits 32.., subslices in 16..32, EUs in 0..16
    pub fn packed(&self) -> u64 {
        (u64::from(self.slices) << 32)
            | (u64::from(self.sub_slices_per_slice & 0xFFFF) << 16)
            | u64::from(self.eu_per_sub_slice & 0xFFFF)
    }

    pub fn from_packed(packed: u64) -> Self {
        Self {
            slices: (packed >> 32) as u32,
            sub_slices_per_slice: ((packed >> 16) & 0xFFFF) as u32,
            eu_per_sub_slice: (packed & 0xFFFF) as u32,
        }
    }

    /// Overwrite the topology counts of `hw_info`
    pub fn apply_to(&self, hw_info: &mut HardwareInfo) {
        let sub_slices = self.slices.saturating_mul(self.sub_slices_per_slice);
        hw_info.gt_system_info.slice_count = self.slices;
        hw_info.gt_system_info.sub_slice_count = sub_slices;
        hw_info.gt_system_info.eu_count = sub_slices.saturating_mul(self.eu_per_sub_slice);
    }
}

impl FromStr for HwInfoConfig {
    type Err = HwConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split('x').collect();
        if fields.len() != 3 {
            return Err(HwConfigError::Malformed(s.to_string()));
        }

        let mut values = [0u32; 3];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field
                .parse()
                .map_err(|_| HwConfigError::Malformed(s.to_string()))?;
        }

        if values.contains(&0) {
            return Err(HwConfigError::ZeroField(s.to_string()));
        }

        // the packed form holds 16 bits per sub-slice and EU field
        let [slices, sub_slices_per_slice, eu_per_sub_slice] = values;
        let eu_count = slices
            .checked_mul(sub_slices_per_slice)
            .and_then(|sub_slices| sub_slices.checked_mul(eu_per_sub_slice));
        if eu_count.is_none() || sub_slices_per_slice > 0xFFFF || eu_per_sub_slice > 0xFFFF {
            return Err(HwConfigError::OutOfRange(s.to_string()));
        }

        Ok(Self::new(slices, sub_slices_per_slice, eu_per_sub_slice))
    }
}

impl std::fmt::Display for HwInfoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}x{}",
            self.slices, self.sub_slices_per_slice, self.eu_per_sub_slice
        )
    }
}
