//! Debug settings steering discovery and device construction
//!
//! Settings are loaded once (TOML file, then environment variables named like
//! the keys) and passed explicitly to whoever needs them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::bitfield::max_n_bit_value;
use crate::engine::CommandStreamReceiverType;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse settings file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Recognized debug options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DebugSettings {
    /// Number of simulated root devices (0 = one)
    pub create_multiple_root_devices: u32,
    /// Sub-device count override (0 = from the hardware description)
    pub create_multiple_sub_devices: u32,
    /// Product family short name used by the simulation path
    pub product_family_override: String,
    /// Hw config string (`SxUxE`) or `default`
    pub hardware_info_override: String,
    /// Receiver type selector; see `CommandStreamReceiverType::from_raw`
    pub set_command_stream_receiver: i32,
    /// GPU address-space width in bits (-1 = keep description)
    pub override_gpu_address_space: i32,
    /// -1 = from description, 0 = off, 1 = on
    pub enable_local_memory: i32,
    /// Forced default engine (-1 = from description)
    pub node_ordinal: i32,
    /// Forced default preemption mode (-1 = from description)
    pub force_preemption_mode: i32,
    /// Trace file handed to the simulation center
    #[serde(rename = "AUBDumpCaptureFileName")]
    pub aub_dump_capture_file_name: String,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            create_multiple_root_devices: 0,
            create_multiple_sub_devices: 0,
            product_family_override: "unk".to_string(),
            hardware_info_override: "default".to_string(),
            set_command_stream_receiver: -1,
            override_gpu_address_space: -1,
            enable_local_memory: -1,
            node_ordinal: -1,
            force_preemption_mode: -1,
            aub_dump_capture_file_name: String::new(),
        }
    }
}

impl DebugSettings {
    /// Load settings from a TOML file, or defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let settings = Self::from_toml(&content)?;
            info!(path = %path.display(), "Loaded debug settings");
            Ok(settings)
        } else {
            info!(
                path = %path.display(),
                "Debug settings file not found, using defaults"
            );
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Override individual values from environment variables named like the keys
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override individual values from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_value(&lookup, "CreateMultipleRootDevices", &mut self.create_multiple_root_devices)?;
        override_value(&lookup, "CreateMultipleSubDevices", &mut self.create_multiple_sub_devices)?;
        override_value(&lookup, "ProductFamilyOverride", &mut self.product_family_override)?;
        override_value(&lookup, "HardwareInfoOverride", &mut self.hardware_info_override)?;
        override_value(&lookup, "SetCommandStreamReceiver", &mut self.set_command_stream_receiver)?;
        override_value(&lookup, "OverrideGpuAddressSpace", &mut self.override_gpu_address_space)?;
        override_value(&lookup, "EnableLocalMemory", &mut self.enable_local_memory)?;
        override_value(&lookup, "NodeOrdinal", &mut self.node_ordinal)?;
        override_value(&lookup, "ForcePreemptionMode", &mut self.force_preemption_mode)?;
        override_value(&lookup, "AUBDumpCaptureFileName", &mut self.aub_dump_capture_file_name)?;
        Ok(())
    }

    /// Requested simulated root-device count
    pub fn root_device_count(&self) -> u32 {
        self.create_multiple_root_devices.max(1)
    }

    /// Receiver type when the selector names a known one
    pub fn command_stream_receiver_type(&self) -> Option<CommandStreamReceiverType> {
        CommandStreamReceiverType::from_raw(self.set_command_stream_receiver)
    }

    /// Address-space limit requested by `OverrideGpuAddressSpace`
    pub fn gpu_address_space_override(&self) -> Option<u64> {
        u64::try_from(self.override_gpu_address_space)
            .ok()
            .map(max_n_bit_value)
    }
}

fn override_value<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|_| SettingsError::InvalidValue {
        key,
        value: raw.clone(),
    })?;
    debug!(key, value = %raw, "Debug setting overridden");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = DebugSettings::default();
        assert_eq!(settings.root_device_count(), 1);
        assert_eq!(settings.hardware_info_override, "default");
        assert_eq!(settings.command_stream_receiver_type(), None);
        assert_eq!(settings.gpu_address_space_override(), None);
    }

    #[test]
    fn test_from_toml_partial() {
        let settings = DebugSettings::from_toml(
            r#"
CreateMultipleRootDevices = 3
ProductFamilyOverride = "tgllp"
SetCommandStreamReceiver = 2
AUBDumpCaptureFileName = "capture.aub"
"#,
        )
        .unwrap();

        assert_eq!(settings.root_device_count(), 3);
        assert_eq!(settings.product_family_override, "tgllp");
        assert_eq!(
            settings.command_stream_receiver_type(),
            Some(CommandStreamReceiverType::Tbx)
        );
        assert_eq!(settings.aub_dump_capture_file_name, "capture.aub");
        assert_eq!(settings.hardware_info_override, "default");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = DebugSettings::load(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(settings, DebugSettings::default());
    }

    #[test]
    fn test_load_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("strata.toml");
        std::fs::write(&path, "OverrideGpuAddressSpace = 36\n").unwrap();

        let settings = DebugSettings::load(&path).unwrap();
        assert_eq!(settings.gpu_address_space_override(), Some(0xF_FFFF_FFFF));
    }

    #[test]
    fn test_overrides() {
        let values: HashMap<&str, &str> = HashMap::from([
            ("CreateMultipleSubDevices", "4"),
            ("HardwareInfoOverride", "1x2x8"),
        ]);
        let mut settings = DebugSettings::default();
        settings
            .apply_overrides(|key| values.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.create_multiple_sub_devices, 4);
        assert_eq!(settings.hardware_info_override, "1x2x8");
    }

    #[test]
    fn test_invalid_override_names_key() {
        let mut settings = DebugSettings::default();
        let err = settings
            .apply_overrides(|key| (key == "NodeOrdinal").then(|| "ccs".to_string()))
            .unwrap_err();

        assert!(matches!(
            err,
            SettingsError::InvalidValue { key: "NodeOrdinal", .. }
        ));
    }
}
