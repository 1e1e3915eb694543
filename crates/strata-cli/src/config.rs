//! Settings resolution: file, then environment, then command-line flags

use anyhow::{Context, Result};
use std::path::Path;
use strata_core::DebugSettings;
use tracing::info;

/// Per-setting overrides taken from the command line
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub command_stream_receiver: Option<i32>,
    pub product_family: Option<String>,
    pub hardware_info: Option<String>,
    pub root_devices: Option<u32>,
    pub sub_devices: Option<u32>,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut DebugSettings) {
        if let Some(csr) = self.command_stream_receiver {
            settings.set_command_stream_receiver = csr;
        }
        if let Some(product) = &self.product_family {
            settings.product_family_override = product.clone();
        }
        if let Some(hw_config) = &self.hardware_info {
            settings.hardware_info_override = hw_config.clone();
        }
        if let Some(count) = self.root_devices {
            settings.create_multiple_root_devices = count;
        }
        if let Some(count) = self.sub_devices {
            settings.create_multiple_sub_devices = count;
        }
    }
}

/// Load settings from `path` and layer environment and flag overrides on top
pub fn load_settings(path: &Path, overrides: &SettingsOverrides) -> Result<DebugSettings> {
    let mut settings = DebugSettings::load(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    settings
        .apply_env_overrides()
        .context("Invalid settings override in environment")?;
    overrides.apply(&mut settings);

    info!(
        csr = settings.set_command_stream_receiver,
        product = %settings.product_family_override,
        hw_config = %settings.hardware_info_override,
        root_devices = settings.create_multiple_root_devices,
        "Settings resolved"
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.toml");
        fs::write(
            &path,
            "SetCommandStreamReceiver = 2\nProductFamilyOverride = \"tgllp\"\n",
        )
        .unwrap();

        let overrides = SettingsOverrides {
            product_family: Some("xehp".to_string()),
            root_devices: Some(3),
            ..SettingsOverrides::default()
        };
        let mut settings = DebugSettings::from_toml(&fs::read_to_string(&path).unwrap()).unwrap();
        overrides.apply(&mut settings);

        assert_eq!(settings.set_command_stream_receiver, 2);
        assert_eq!(settings.product_family_override, "xehp");
        assert_eq!(settings.create_multiple_root_devices, 3);
        assert_eq!(settings.hardware_info_override, "default");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let overrides = SettingsOverrides {
            sub_devices: Some(2),
            ..SettingsOverrides::default()
        };
        let settings = load_settings(&dir.path().join("absent.toml"), &overrides).unwrap();
        assert_eq!(settings.create_multiple_sub_devices, 2);
    }
}
