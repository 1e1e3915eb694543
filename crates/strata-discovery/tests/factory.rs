use std::sync::{Arc, Mutex};
use strata_core::{
    BuiltinCatalog, CommandStreamReceiverType, DebugSettings, HardwareCatalog, HardwareInfo,
    HwConfigError,
};
use strata_discovery::{DeviceFactory, DiscoveryError, FactoryError, OsDiscovery};
use strata_runtime::{CommandStreamReceiver, Device, HwDeviceId, OsInterface, RootDevice};

/// In-memory OS layer returning a fixed list of devices
#[derive(Default)]
struct ScriptedDiscovery {
    ids: Vec<HwDeviceId>,
    reject_index: Option<usize>,
    hardware_info: Option<HardwareInfo>,
    bound: Mutex<Vec<HwDeviceId>>,
}

impl ScriptedDiscovery {
    fn with_devices(count: usize) -> Self {
        Self {
            ids: (0..count)
                .map(|i| HwDeviceId::new(format!("/dev/dri/by-path/pci-0000:0{}:00.0-render", i)))
                .collect(),
            ..Self::default()
        }
    }

    fn rejecting(mut self, index: usize) -> Self {
        self.reject_index = Some(index);
        self
    }

    fn reporting(mut self, product: &str) -> Self {
        self.hardware_info = Some(catalog().resolve(product).unwrap().clone());
        self
    }
}

impl OsDiscovery for ScriptedDiscovery {
    fn discover_devices(&self) -> Vec<HwDeviceId> {
        self.ids.clone()
    }

    fn bind(&self, hw_device_id: HwDeviceId) -> Result<OsInterface, DiscoveryError> {
        let mut bound = self.bound.lock().unwrap();
        if self.reject_index == Some(bound.len()) {
            return Err(DiscoveryError::Rejected(hw_device_id));
        }
        bound.push(hw_device_id.clone());

        let os_interface = OsInterface::new(hw_device_id, None);
        Ok(match &self.hardware_info {
            Some(hardware_info) => os_interface.with_hardware_info(hardware_info.clone()),
            None => os_interface,
        })
    }
}

fn catalog() -> BuiltinCatalog {
    BuiltinCatalog::builtin()
}

fn hw_factory(discovery: ScriptedDiscovery) -> DeviceFactory {
    DeviceFactory::new(DebugSettings::default()).with_os_discovery(Arc::new(discovery))
}

fn simulated_settings(receiver: CommandStreamReceiverType, product: &str) -> DebugSettings {
    DebugSettings {
        set_command_stream_receiver: receiver.raw(),
        product_family_override: product.to_string(),
        ..DebugSettings::default()
    }
}

fn indices(devices: &[RootDevice]) -> Vec<u32> {
    devices.iter().map(|d| d.root_device_index()).collect()
}

#[test]
fn test_no_devices_discovered() {
    let factory = hw_factory(ScriptedDiscovery::default());
    let mut env = factory.new_execution_environment();

    let err = factory.get_devices(&mut env).unwrap_err();
    assert!(matches!(err, FactoryError::NoDevices));
    assert!(env.root_device_environments().is_empty());
    assert!(env.memory_manager().is_none());

    assert!(factory
        .create_devices(factory.new_execution_environment())
        .is_empty());
}

#[test]
fn test_every_discovered_device_is_bound() {
    let factory = hw_factory(ScriptedDiscovery::with_devices(3));
    let mut env = factory.new_execution_environment();

    assert_eq!(factory.get_devices(&mut env).unwrap(), 3);
    assert_eq!(env.root_device_environments().len(), 3);
    for (index, root_env) in env.root_device_environments().iter().enumerate() {
        assert_eq!(root_env.root_device_index(), index as u32);
        let os_interface = root_env.os_interface().unwrap();
        assert!(os_interface
            .hw_device_id()
            .to_string()
            .contains(&format!("pci-0000:0{}", index)));
        assert!(root_env.memory_operations().is_some());
        assert!(root_env.aub_center().is_none());
    }
    assert_eq!(env.max_os_context_count(), 3 * 2);
    assert!(env.memory_manager().is_some());
}

#[test]
fn test_bind_failure_fails_whole_discovery() {
    let factory = hw_factory(ScriptedDiscovery::with_devices(3).rejecting(1));
    let mut env = factory.new_execution_environment();

    let err = factory.get_devices(&mut env).unwrap_err();
    assert!(matches!(err, FactoryError::Bind { index: 1, .. }));
    assert!(env.root_device_environments().is_empty());
    assert!(env.memory_manager().is_none());

    let factory = hw_factory(ScriptedDiscovery::with_devices(3).rejecting(2));
    assert!(factory
        .create_devices(factory.new_execution_environment())
        .is_empty());
}

#[test]
fn test_create_devices_in_discovery_order() {
    let factory = hw_factory(ScriptedDiscovery::with_devices(3));
    let devices = factory.create_devices(factory.new_execution_environment());

    assert_eq!(indices(&devices), vec![0, 1, 2]);
    for device in &devices {
        assert_eq!(device.num_sub_devices(), 0);
        assert_eq!(device.engines().len(), 2);
    }
}

#[test]
fn test_constructor_declining_an_index_omits_it() {
    let factory = hw_factory(ScriptedDiscovery::with_devices(3)).with_root_device_constructor(
        |env, index| {
            if index == 2 {
                None
            } else {
                RootDevice::create(env, index).ok()
            }
        },
    );

    let devices = factory.create_devices(factory.new_execution_environment());
    assert_eq!(indices(&devices), vec![0, 1]);
}

#[test]
fn test_bound_hardware_info_drives_sub_devices() {
    let factory = hw_factory(ScriptedDiscovery::with_devices(2).reporting("xehp"));
    let devices = factory.create_devices(factory.new_execution_environment());

    assert_eq!(devices.len(), 2);
    for device in &devices {
        assert_eq!(device.hardware_info().product_family(), "xehp");
        assert_eq!(device.num_sub_devices(), 2);
        assert_eq!(device.device_bitfield().raw(), 0b11);
        assert_eq!(device.engines().len(), 1);
        for sub_device in device.sub_devices() {
            assert_eq!(sub_device.ref_counts().internal_count(), 1);
        }
    }
}

#[test]
fn test_gpu_address_space_override() {
    let factory = DeviceFactory::new(DebugSettings {
        override_gpu_address_space: 36,
        ..DebugSettings::default()
    })
    .with_os_discovery(Arc::new(ScriptedDiscovery::with_devices(1)));
    let mut env = factory.new_execution_environment();

    factory.get_devices(&mut env).unwrap();
    assert_eq!(
        env.hardware_info().capability_table.gpu_address_space,
        (1u64 << 36) - 1
    );
}

#[test]
fn test_simulated_discovery_populates_simulation_centers() {
    let settings = DebugSettings {
        create_multiple_root_devices: 2,
        aub_dump_capture_file_name: "capture.aub".to_string(),
        ..simulated_settings(CommandStreamReceiverType::Aub, "tgllp")
    };
    let factory = DeviceFactory::new(settings);
    let mut env = factory.new_execution_environment();

    assert_eq!(factory.get_devices_for_product_family_override(&mut env).unwrap(), 2);
    assert_eq!(env.root_device_environments().len(), 2);

    let hw_info = env.hardware_info();
    assert_eq!(hw_info.product_family(), "tgllp");
    assert!(!hw_info.feature_table.ftr_e2e_compression);
    assert_eq!(hw_info.gt_system_info.sub_slice_count, 6);
    assert_eq!(hw_info.gt_system_info.eu_count, 96);

    for root_env in env.root_device_environments() {
        let aub_manager = root_env.aub_center().unwrap().aub_manager();
        assert_eq!(aub_manager.receiver_type(), CommandStreamReceiverType::Aub);
        assert!(!aub_manager.local_memory_enabled());
        assert_eq!(
            aub_manager.trace_file().unwrap().to_str(),
            Some("capture.aub")
        );
        assert!(root_env.memory_operations().is_some());
    }
    assert!(env.memory_manager().is_some());
}

#[test]
fn test_simulated_discovery_ignores_os_layer() {
    let factory = DeviceFactory::new(simulated_settings(CommandStreamReceiverType::Tbx, "xehp"))
        .with_os_discovery(Arc::new(ScriptedDiscovery::default()));
    let devices = factory.create_devices(factory.new_execution_environment());

    assert_eq!(devices.len(), 1);
    let device = &devices[0];
    assert_eq!(device.num_sub_devices(), 2);
    let receiver = &device.engines()[0].command_stream_receiver;
    assert_eq!(receiver.receiver_type(), CommandStreamReceiverType::Tbx);

    let aub_manager = device
        .execution_environment()
        .root_device_environment(0)
        .unwrap()
        .aub_center()
        .unwrap()
        .aub_manager();
    assert!(aub_manager.local_memory_enabled());
    assert!(aub_manager.bytes_written() > 0);
}

#[test]
fn test_explicit_hw_config_is_applied() {
    let settings = DebugSettings {
        hardware_info_override: "1x40x8".to_string(),
        ..simulated_settings(CommandStreamReceiverType::Aub, "xehp")
    };
    let factory = DeviceFactory::new(settings);
    let mut env = factory.new_execution_environment();

    factory.get_devices_for_product_family_override(&mut env).unwrap();
    let gt = &env.hardware_info().gt_system_info;
    assert_eq!(gt.slice_count, 1);
    assert_eq!(gt.sub_slice_count, 32);
    assert_eq!(gt.eu_count, 32 * 8);
    assert_eq!(gt.tile_count, 2);
}

#[test]
fn test_unknown_product_uses_default_platform() {
    let factory = DeviceFactory::new(simulated_settings(CommandStreamReceiverType::Aub, "unk"));
    let mut env = factory.new_execution_environment();

    factory.get_devices_for_product_family_override(&mut env).unwrap();
    assert_eq!(
        env.hardware_info().product_family(),
        catalog().default_platform().product_family()
    );
}

#[test]
fn test_unparsable_hw_config_fails() {
    let settings = DebugSettings {
        hardware_info_override: "not-a-config".to_string(),
        ..simulated_settings(CommandStreamReceiverType::TbxWithAub, "skl")
    };
    let factory = DeviceFactory::new(settings);
    let mut env = factory.new_execution_environment();

    let err = factory
        .get_devices_for_product_family_override(&mut env)
        .unwrap_err();
    assert!(matches!(err, FactoryError::InvalidHwConfig { .. }));
    assert!(env.root_device_environments().is_empty());
    assert!(env.memory_manager().is_none());

    assert!(factory
        .create_devices(factory.new_execution_environment())
        .is_empty());
}

#[test]
fn test_overflowing_hw_config_fails() {
    let settings = DebugSettings {
        hardware_info_override: "100000x100000x100000".to_string(),
        ..simulated_settings(CommandStreamReceiverType::Aub, "xehp")
    };
    let factory = DeviceFactory::new(settings);
    let mut env = factory.new_execution_environment();

    let err = factory
        .get_devices_for_product_family_override(&mut env)
        .unwrap_err();
    assert!(matches!(
        err,
        FactoryError::InvalidHwConfig {
            source: HwConfigError::OutOfRange(_),
            ..
        }
    ));
    assert!(env.root_device_environments().is_empty());

    assert!(factory
        .create_devices(factory.new_execution_environment())
        .is_empty());
}

#[test]
fn test_sub_device_override_beyond_bitfield_omits_device() {
    let settings = DebugSettings {
        create_multiple_root_devices: 2,
        create_multiple_sub_devices: 33,
        ..simulated_settings(CommandStreamReceiverType::Aub, "skl")
    };
    let factory = DeviceFactory::new(settings);
    let mut env = factory.new_execution_environment();

    factory.get_devices_for_product_family_override(&mut env).unwrap();
    assert_eq!(env.max_os_context_count(), 2 * (2 * 33 + 1));

    assert!(factory
        .create_devices(factory.new_execution_environment())
        .is_empty());
}

#[test]
fn test_tbx_receiver_ignores_capture_file() {
    let settings = DebugSettings {
        aub_dump_capture_file_name: "capture.aub".to_string(),
        ..simulated_settings(CommandStreamReceiverType::Tbx, "tgllp")
    };
    let factory = DeviceFactory::new(settings);
    let mut env = factory.new_execution_environment();

    factory.get_devices_for_product_family_override(&mut env).unwrap();
    let aub_manager = env
        .root_device_environment(0)
        .unwrap()
        .aub_center()
        .unwrap()
        .aub_manager();
    assert_eq!(aub_manager.receiver_type(), CommandStreamReceiverType::Tbx);
    assert!(aub_manager.trace_file().is_none());
}
