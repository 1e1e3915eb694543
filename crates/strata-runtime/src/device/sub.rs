use std::sync::Arc;
use strata_core::DeviceBitfield;
use tracing::debug;

use super::{Device, DeviceCore, DeviceError, EngineControl};
use crate::environment::ExecutionEnvironment;
use crate::refcount::ReferenceCounts;

/// One tile of a multi-tile root device
#[derive(Debug)]
pub struct SubDevice {
    core: DeviceCore,
    sub_device_index: u32,
    ref_counts: ReferenceCounts,
}

impl SubDevice {
    /// Create the sub-device and bring up its engines on its own bit
    pub fn create(
        execution_environment: Arc<ExecutionEnvironment>,
        root_device_index: u32,
        sub_device_index: u32,
    ) -> Result<Self, DeviceError> {
        let mut sub_device = Self {
            core: DeviceCore::new(execution_environment, root_device_index),
            sub_device_index,
            ref_counts: ReferenceCounts::new(),
        };
        sub_device
            .core
            .create_engines(DeviceBitfield::single(sub_device_index))?;
        debug!(
            root_device_index,
            sub_device_index,
            engines = sub_device.core.engines().len(),
            "Created sub-device"
        );
        Ok(sub_device)
    }

    pub fn sub_device_index(&self) -> u32 {
        self.sub_device_index
    }

    pub fn inc_ref_internal(&self) -> i32 {
        self.ref_counts.inc_ref_internal()
    }

    pub fn dec_ref_internal(&self) -> i32 {
        self.ref_counts.dec_ref_internal()
    }

    pub fn ref_counts(&self) -> &ReferenceCounts {
        &self.ref_counts
    }
}

impl Device for SubDevice {
    fn root_device_index(&self) -> u32 {
        self.core.root_device_index()
    }

    fn device_bitfield(&self) -> DeviceBitfield {
        DeviceBitfield::single(self.sub_device_index)
    }

    fn num_available_devices(&self) -> u32 {
        1
    }

    fn engines(&self) -> &[EngineControl] {
        self.core.engines()
    }

    fn execution_environment(&self) -> &Arc<ExecutionEnvironment> {
        self.core.execution_environment()
    }

    fn is_releasable(&self) -> bool {
        self.ref_counts.is_releasable()
    }

    fn is_sub_device(&self) -> bool {
        true
    }
}
