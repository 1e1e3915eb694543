use std::sync::Arc;
use strata_core::bitfield::MAX_SUB_DEVICES;
use strata_core::{hw_helper, DeviceBitfield};
use tracing::{debug, info, warn};

use super::{Device, DeviceCore, DeviceError, EngineControl, SubDevice};
use crate::environment::ExecutionEnvironment;

/// One physical accelerator and, on multi-tile hardware, its sub-devices
///
/// A root device stays alive as long as its execution environment does. It
/// holds one internal reference on each of its sub-devices and gives each
/// back exactly once when dropped.
#[derive(Debug)]
pub struct RootDevice {
    core: DeviceCore,
    sub_devices: Vec<Arc<SubDevice>>,
}

impl RootDevice {
    /// Build the root device for `root_device_index` with its sub-devices and engines
    ///
    /// On failure every sub-device created so far is released.
    pub fn create(
        execution_environment: &Arc<ExecutionEnvironment>,
        root_device_index: u32,
    ) -> Result<Self, DeviceError> {
        let mut root_device = Self {
            core: DeviceCore::new(execution_environment.clone(), root_device_index),
            sub_devices: Vec::new(),
        };
        if let Err(e) = root_device.create_device_impl() {
            warn!(root_device_index, error = %e, "Root device creation failed");
            return Err(e);
        }

        info!(
            root_device_index,
            product = %root_device.hardware_info().product_family(),
            sub_devices = root_device.num_sub_devices(),
            engines = root_device.engines().len(),
            "Created root device"
        );
        Ok(root_device)
    }

    pub(crate) fn create_device_impl(&mut self) -> Result<(), DeviceError> {
        assert!(
            self.sub_devices.is_empty(),
            "root device sub-devices are already created (double initialization)"
        );

        let root_device_index = self.core.root_device_index();
        let env = self.core.execution_environment().clone();
        let mut count = hw_helper::sub_devices_count(self.core.hardware_info(), env.settings());
        if count == 1 {
            count = 0;
        }
        if count > MAX_SUB_DEVICES {
            warn!(
                root_device_index,
                requested = count,
                max = MAX_SUB_DEVICES,
                "Sub-device count exceeds the device bitfield"
            );
            return Err(DeviceError::TooManySubDevices {
                requested: count,
                max: MAX_SUB_DEVICES,
            });
        }

        for index in 0..count {
            let sub_device = SubDevice::create(env.clone(), root_device_index, index).map_err(
                |e| DeviceError::SubDeviceCreation {
                    index,
                    source: Box::new(e),
                },
            )?;
            sub_device.inc_ref_internal();
            self.sub_devices.push(Arc::new(sub_device));
        }

        self.create_engines()
    }

    fn create_engines(&mut self) -> Result<(), DeviceError> {
        if self.sub_devices.len() < 2 {
            return self.core.create_engines(self.device_bitfield());
        }
        self.initialize_root_command_stream_receiver()
    }

    /// Bring up the single aggregate engine spanning every sub-device
    fn initialize_root_command_stream_receiver(&mut self) -> Result<(), DeviceError> {
        let settings = self.core.execution_environment().settings();
        let hw_info = self.core.hardware_info();
        let engine_type = hw_helper::chosen_engine_type(hw_info, settings);
        let preemption_mode = hw_helper::default_preemption_mode(hw_info, settings);
        let device_bitfield = self.device_bitfield();

        let mut csr = self.core.new_command_stream_receiver()?;
        let os_context = self.core.memory_manager()?.create_and_register_os_context(
            csr.as_ref(),
            engine_type,
            device_bitfield,
            preemption_mode,
            false,
        )?;
        csr.setup_context(os_context.clone());
        csr.initialize_tag_allocation()?;
        csr.create_global_fence_allocation()?;

        debug!(
            root_device_index = self.core.root_device_index(),
            engine = %engine_type,
            bitfield = %device_bitfield,
            "Created root command stream receiver"
        );
        self.core.add_engine(csr, os_context);
        Ok(())
    }

    /// Owned sub-devices, 0 on single-tile hardware
    pub fn num_sub_devices(&self) -> u32 {
        self.sub_devices.len() as u32
    }

    pub fn sub_devices(&self) -> &[Arc<SubDevice>] {
        &self.sub_devices
    }

    /// Addressable unit `id`: the root itself or one of its sub-devices
    ///
    /// # Panics
    ///
    /// Panics if `id >= num_available_devices()`.
    pub fn get_device_by_id(&self, id: u32) -> &dyn Device {
        let available = self.num_available_devices();
        assert!(
            id < available,
            "device id {} out of range, {} available",
            id,
            available
        );
        if self.sub_devices.is_empty() {
            return self;
        }
        self.sub_devices[id as usize].as_ref()
    }
}

impl Device for RootDevice {
    fn root_device_index(&self) -> u32 {
        self.core.root_device_index()
    }

    fn device_bitfield(&self) -> DeviceBitfield {
        DeviceBitfield::all_below(self.num_available_devices())
    }

    fn num_available_devices(&self) -> u32 {
        if self.sub_devices.is_empty() {
            1
        } else {
            self.num_sub_devices()
        }
    }

    fn engines(&self) -> &[EngineControl] {
        self.core.engines()
    }

    fn execution_environment(&self) -> &Arc<ExecutionEnvironment> {
        self.core.execution_environment()
    }

    fn is_releasable(&self) -> bool {
        false
    }
}

impl Drop for RootDevice {
    fn drop(&mut self) {
        for sub_device in &self.sub_devices {
            sub_device.dec_ref_internal();
        }
    }
}
