//! Device factory - discovery and root device construction
//!
//! The factory runs one of two discovery paths, chosen once from the receiver
//! type in the debug settings:
//! - Hardware: bind every render node the OS reports to its own root-device
//!   environment
//! - Simulated: fabricate root-device environments from the product family
//!   and hw config overrides, with a simulation center on each
//!
//! Both paths finish by sizing the OS-context budget and initializing the
//! memory manager. Root devices are then built through a replaceable
//! constructor, one per populated environment.

use std::sync::Arc;
use strata_core::{
    hw_helper, BuiltinCatalog, CommandStreamReceiverType, DebugSettings, HardwareCatalog,
    HardwareInfo, HwConfigError, HwInfoConfig,
};
use strata_runtime::{ExecutionEnvironment, RootDevice};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::os::{DiscoveryError, DrmDiscovery, OsDiscovery};

const DEFAULT_HW_CONFIG: &str = "default";

#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("No hardware devices discovered")]
    NoDevices,
    #[error("Failed to bind root device {index}: {source}")]
    Bind {
        index: u32,
        #[source]
        source: DiscoveryError,
    },
    #[error("Invalid hardware info override {value:?}: {source}")]
    InvalidHwConfig {
        value: String,
        #[source]
        source: HwConfigError,
    },
    #[error("No default hw config for product {0}")]
    NoDefaultConfig(String),
}

/// Discovery path selected by the receiver type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    Hardware,
    Simulated(CommandStreamReceiverType),
}

impl DiscoveryMode {
    pub fn from_settings(settings: &DebugSettings) -> Self {
        match settings.command_stream_receiver_type() {
            Some(receiver_type) if receiver_type.is_simulation() => Self::Simulated(receiver_type),
            _ => Self::Hardware,
        }
    }
}

/// Builds the root device for one populated environment, `None` to skip it
pub type RootDeviceConstructor =
    Arc<dyn Fn(&Arc<ExecutionEnvironment>, u32) -> Option<RootDevice> + Send + Sync>;

fn create_root_device(
    execution_environment: &Arc<ExecutionEnvironment>,
    root_device_index: u32,
) -> Option<RootDevice> {
    RootDevice::create(execution_environment, root_device_index).ok()
}

pub struct DeviceFactory {
    settings: DebugSettings,
    catalog: Arc<dyn HardwareCatalog>,
    os: Arc<dyn OsDiscovery>,
    create_root_device: RootDeviceConstructor,
}

impl std::fmt::Debug for DeviceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFactory")
            .field("settings", &self.settings)
            .field("mode", &self.discovery_mode())
            .finish_non_exhaustive()
    }
}

impl DeviceFactory {
    /// Factory over the built-in catalog and DRM render nodes under `/dev/dri`
    pub fn new(settings: DebugSettings) -> Self {
        Self {
            settings,
            catalog: Arc::new(BuiltinCatalog::builtin()),
            os: Arc::new(DrmDiscovery::default()),
            create_root_device: Arc::new(create_root_device),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn HardwareCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_os_discovery(mut self, os: Arc<dyn OsDiscovery>) -> Self {
        self.os = os;
        self
    }

    /// Replace the per-index root device constructor
    pub fn with_root_device_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&Arc<ExecutionEnvironment>, u32) -> Option<RootDevice> + Send + Sync + 'static,
    {
        self.create_root_device = Arc::new(constructor);
        self
    }

    pub fn settings(&self) -> &DebugSettings {
        &self.settings
    }

    pub fn discovery_mode(&self) -> DiscoveryMode {
        DiscoveryMode::from_settings(&self.settings)
    }

    /// False when an AUB or TBX receiver was requested
    pub fn is_hw_mode_selected(&self) -> bool {
        self.discovery_mode() == DiscoveryMode::Hardware
    }

    /// Empty environment carrying the factory's settings
    ///
    /// The shared description starts from the product family override when the
    /// catalog knows it, otherwise from the catalog default.
    pub fn new_execution_environment(&self) -> ExecutionEnvironment {
        ExecutionEnvironment::new(self.settings.clone(), self.base_hardware_info().clone())
    }

    fn base_hardware_info(&self) -> &HardwareInfo {
        self.catalog
            .resolve(&self.settings.product_family_override)
            .unwrap_or_else(|| self.catalog.default_platform())
    }

    /// Simulated discovery; returns the number of root devices
    pub fn get_devices_for_product_family_override(
        &self,
        execution_environment: &mut ExecutionEnvironment,
    ) -> Result<u32, FactoryError> {
        let num_root_devices = self.settings.root_device_count();
        execution_environment.prepare_root_device_environments(num_root_devices);

        let base = self.base_hardware_info();
        let product = base.product_family().to_string();
        let config = match self.resolve_hw_config(&product) {
            Ok(config) => config,
            Err(e) => {
                execution_environment.prepare_root_device_environments(0);
                return Err(e);
            }
        };

        let hw_info = execution_environment.mutable_hardware_info();
        *hw_info = base.clone();
        config.apply_to(hw_info);
        self.catalog.setup(hw_info, &config);
        hw_info.feature_table.ftr_e2e_compression = false;
        self.catalog.configure_custom(hw_info);
        debug!(product = %product, config = %config, "Applied hw config");

        execution_environment.calculate_max_os_context_count();

        let receiver_type = self
            .settings
            .command_stream_receiver_type()
            .filter(|t| *t != CommandStreamReceiverType::Hardware);
        if let Some(receiver_type) = receiver_type {
            let local_memory_enabled =
                hw_helper::enable_local_memory(execution_environment.hardware_info(), &self.settings);
            for root_environment in execution_environment.root_device_environments_mut() {
                root_environment.init_aub_center(
                    local_memory_enabled,
                    &self.settings.aub_dump_capture_file_name,
                    receiver_type,
                );
                root_environment.bind_aub_memory_operations();
            }
        }

        self.apply_gpu_address_space_override(execution_environment);
        execution_environment.initialize_memory_manager();

        info!(
            product = %product,
            root_devices = num_root_devices,
            receiver = ?receiver_type,
            "Simulated device discovery complete"
        );
        Ok(num_root_devices)
    }

    fn resolve_hw_config(&self, product: &str) -> Result<HwInfoConfig, FactoryError> {
        let value = &self.settings.hardware_info_override;
        if value == DEFAULT_HW_CONFIG {
            return self
                .catalog
                .default_config(product)
                .ok_or_else(|| FactoryError::NoDefaultConfig(product.to_string()));
        }
        value.parse().map_err(|source| FactoryError::InvalidHwConfig {
            value: value.clone(),
            source,
        })
    }

    /// Hardware discovery; returns the number of root devices
    ///
    /// Fails when nothing is discovered or any binding fails. On failure no
    /// root-device environment is left populated.
    pub fn get_devices(
        &self,
        execution_environment: &mut ExecutionEnvironment,
    ) -> Result<u32, FactoryError> {
        let hw_device_ids = self.os.discover_devices();
        if hw_device_ids.is_empty() {
            warn!("No hardware devices discovered");
            return Err(FactoryError::NoDevices);
        }

        let total = hw_device_ids.len() as u32;
        execution_environment.prepare_root_device_environments(total);

        for (index, hw_device_id) in (0..total).zip(hw_device_ids) {
            let os_interface = match self.os.bind(hw_device_id) {
                Ok(os_interface) => os_interface,
                Err(source) => {
                    warn!(root_device_index = index, error = %source, "Failed to bind device");
                    execution_environment.prepare_root_device_environments(0);
                    return Err(FactoryError::Bind { index, source });
                }
            };
            if let Some(root_environment) = execution_environment.root_device_environment_mut(index) {
                root_environment.init_os_interface(os_interface);
            }
        }

        execution_environment.calculate_max_os_context_count();
        self.apply_gpu_address_space_override(execution_environment);
        execution_environment.initialize_memory_manager();

        info!(root_devices = total, "Hardware device discovery complete");
        Ok(total)
    }

    fn apply_gpu_address_space_override(&self, execution_environment: &mut ExecutionEnvironment) {
        if let Some(limit) = self.settings.gpu_address_space_override() {
            execution_environment
                .mutable_hardware_info()
                .capability_table
                .gpu_address_space = limit;
            debug!(gpu_address_space = format_args!("{:#x}", limit), "Overrode GPU address space");
        }
    }

    /// Run the discovery path of the selected mode
    pub fn discover(
        &self,
        execution_environment: &mut ExecutionEnvironment,
    ) -> Result<u32, FactoryError> {
        match self.discovery_mode() {
            DiscoveryMode::Hardware => self.get_devices(execution_environment),
            DiscoveryMode::Simulated(_) => {
                self.get_devices_for_product_family_override(execution_environment)
            }
        }
    }

    /// Discover and build one root device per populated environment
    ///
    /// A failed discovery yields no devices. Indices the constructor declines
    /// are left out; the rest keep discovery order.
    pub fn create_devices(&self, mut execution_environment: ExecutionEnvironment) -> Vec<RootDevice> {
        if let Err(e) = self.discover(&mut execution_environment) {
            warn!(error = %e, "Device discovery failed");
            return Vec::new();
        }

        let execution_environment = Arc::new(execution_environment);
        let count = execution_environment.root_device_environments().len() as u32;
        let devices: Vec<RootDevice> = (0..count)
            .filter_map(|index| (self.create_root_device)(&execution_environment, index))
            .collect();

        if devices.len() as u32 != count {
            warn!(
                discovered = count,
                created = devices.len(),
                "Some root devices were not created"
            );
        }
        info!(devices = devices.len(), "Created devices");
        devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_csr(raw: i32) -> DebugSettings {
        DebugSettings {
            set_command_stream_receiver: raw,
            ..DebugSettings::default()
        }
    }

    #[test]
    fn test_mode_selection() {
        assert!(DeviceFactory::new(DebugSettings::default()).is_hw_mode_selected());
        assert!(DeviceFactory::new(settings_with_csr(0)).is_hw_mode_selected());
        assert!(DeviceFactory::new(settings_with_csr(3)).is_hw_mode_selected());
        assert!(DeviceFactory::new(settings_with_csr(99)).is_hw_mode_selected());

        for (raw, expected) in [
            (1, CommandStreamReceiverType::Aub),
            (2, CommandStreamReceiverType::Tbx),
            (4, CommandStreamReceiverType::TbxWithAub),
        ] {
            let factory = DeviceFactory::new(settings_with_csr(raw));
            assert!(!factory.is_hw_mode_selected());
            assert_eq!(factory.discovery_mode(), DiscoveryMode::Simulated(expected));
        }
    }

    #[test]
    fn test_base_hardware_info_falls_back_to_default() {
        let factory = DeviceFactory::new(DebugSettings::default());
        assert_eq!(
            factory.new_execution_environment().hardware_info().product_family(),
            "skl"
        );

        let factory = DeviceFactory::new(DebugSettings {
            product_family_override: "tgllp".to_string(),
            ..DebugSettings::default()
        });
        assert_eq!(
            factory.new_execution_environment().hardware_info().product_family(),
            "tgllp"
        );
    }

    #[test]
    fn test_resolve_hw_config() {
        let factory = DeviceFactory::new(DebugSettings::default());
        assert_eq!(
            factory.resolve_hw_config("tgllp").unwrap(),
            HwInfoConfig::new(1, 6, 16)
        );

        let factory = DeviceFactory::new(DebugSettings {
            hardware_info_override: "2x4x8".to_string(),
            ..DebugSettings::default()
        });
        assert_eq!(
            factory.resolve_hw_config("tgllp").unwrap(),
            HwInfoConfig::new(2, 4, 8)
        );

        let factory = DeviceFactory::new(DebugSettings {
            hardware_info_override: "2x4".to_string(),
            ..DebugSettings::default()
        });
        assert!(matches!(
            factory.resolve_hw_config("tgllp"),
            Err(FactoryError::InvalidHwConfig { .. })
        ));
    }
}
