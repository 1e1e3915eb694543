//! Strata Core - Value types shared by device bring-up
//!
//! This crate provides the foundational types for the Strata driver stack:
//! - Device bitfields scoping engines and contexts to sub-units
//! - Hardware-capability descriptions and hw-config strings
//! - The product catalog resolving product families to descriptions
//! - Debug settings injected into discovery and device construction
//! - Hardware helper queries derived from descriptions and settings

pub mod bitfield;
pub mod catalog;
pub mod engine;
pub mod hw_helper;
pub mod hw_info;
pub mod settings;

pub use bitfield::{max_n_bit_value, DeviceBitfield};
pub use catalog::{BuiltinCatalog, CatalogError, HardwareCatalog};
pub use engine::{CommandStreamReceiverType, EngineType, PreemptionMode};
pub use hw_info::{HardwareInfo, HwConfigError, HwInfoConfig};
pub use settings::{DebugSettings, SettingsError};
