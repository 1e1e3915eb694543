//! Device hierarchy and engine bring-up
//!
//! A `RootDevice` represents one physical accelerator. When the hardware has
//! more than one tile it owns one `SubDevice` per tile and brings up a single
//! aggregate engine spanning all of them; otherwise it creates its engines
//! through the standard per-device path in `DeviceCore`.

mod root;
mod sub;

pub use root::RootDevice;
pub use sub::SubDevice;

use std::sync::Arc;
use strata_core::hw_helper::{self, EngineInstance};
use strata_core::{DeviceBitfield, HardwareInfo};
use thiserror::Error;
use tracing::debug;

use crate::csr::CommandStreamReceiver;
use crate::environment::ExecutionEnvironment;
use crate::memory::{MemoryError, MemoryManager, OsContext};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Memory manager is not initialized")]
    MemoryManagerNotInitialized,
    #[error("Failed to create command stream receiver for root device {0}")]
    CommandStreamReceiverCreation(u32),
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
    #[error("Requested {requested} sub-devices, a root device addresses at most {max}")]
    TooManySubDevices { requested: u32, max: u32 },
    #[error("Failed to create sub-device {index}: {source}")]
    SubDeviceCreation {
        index: u32,
        #[source]
        source: Box<DeviceError>,
    },
}

/// A command-stream receiver and the OS context it is bound to
#[derive(Debug, Clone)]
pub struct EngineControl {
    pub command_stream_receiver: Arc<dyn CommandStreamReceiver>,
    pub os_context: Arc<OsContext>,
}

/// Behaviour shared by root and sub-devices
pub trait Device: Send + Sync + std::fmt::Debug {
    fn root_device_index(&self) -> u32;

    /// Sub-unit slots this device addresses
    fn device_bitfield(&self) -> DeviceBitfield;

    /// Units addressable through this device
    fn num_available_devices(&self) -> u32;

    fn engines(&self) -> &[EngineControl];

    fn execution_environment(&self) -> &Arc<ExecutionEnvironment>;

    fn is_releasable(&self) -> bool;

    fn is_sub_device(&self) -> bool {
        false
    }

    fn hardware_info(&self) -> &HardwareInfo {
        self.execution_environment()
            .hardware_info_for(self.root_device_index())
    }
}

/// State and standard engine path common to every device
pub struct DeviceCore {
    execution_environment: Arc<ExecutionEnvironment>,
    root_device_index: u32,
    command_stream_receivers: Vec<Arc<dyn CommandStreamReceiver>>,
    engines: Vec<EngineControl>,
}

impl std::fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCore")
            .field("root_device_index", &self.root_device_index)
            .field("engines", &self.engines)
            .finish_non_exhaustive()
    }
}

impl DeviceCore {
    pub fn new(execution_environment: Arc<ExecutionEnvironment>, root_device_index: u32) -> Self {
        Self {
            execution_environment,
            root_device_index,
            command_stream_receivers: Vec::new(),
            engines: Vec::new(),
        }
    }

    pub fn execution_environment(&self) -> &Arc<ExecutionEnvironment> {
        &self.execution_environment
    }

    pub fn root_device_index(&self) -> u32 {
        self.root_device_index
    }

    pub fn engines(&self) -> &[EngineControl] {
        &self.engines
    }

    pub fn command_stream_receivers(&self) -> &[Arc<dyn CommandStreamReceiver>] {
        &self.command_stream_receivers
    }

    pub fn hardware_info(&self) -> &HardwareInfo {
        self.execution_environment
            .hardware_info_for(self.root_device_index)
    }

    /// Standard engine path: one engine per gpgpu engine instance
    pub fn create_engines(&mut self, device_bitfield: DeviceBitfield) -> Result<(), DeviceError> {
        let settings = self.execution_environment.settings();
        let instances = hw_helper::gpgpu_engine_instances(self.hardware_info(), settings);
        for instance in instances {
            self.create_engine(instance, device_bitfield)?;
        }
        Ok(())
    }

    fn create_engine(
        &mut self,
        instance: EngineInstance,
        device_bitfield: DeviceBitfield,
    ) -> Result<(), DeviceError> {
        let preemption_mode = hw_helper::default_preemption_mode(
            self.hardware_info(),
            self.execution_environment.settings(),
        );

        let mut csr = self.new_command_stream_receiver()?;
        let os_context = self
            .memory_manager()?
            .create_and_register_os_context(
                csr.as_ref(),
                instance.engine_type,
                device_bitfield,
                preemption_mode,
                instance.low_priority,
            )?;
        csr.setup_context(os_context.clone());
        csr.initialize_tag_allocation()?;

        debug!(
            root_device_index = self.root_device_index,
            engine = %instance.engine_type,
            bitfield = %device_bitfield,
            low_priority = instance.low_priority,
            "Created engine"
        );
        self.add_engine(csr, os_context);
        Ok(())
    }

    pub(crate) fn new_command_stream_receiver(
        &self,
    ) -> Result<Box<dyn CommandStreamReceiver>, DeviceError> {
        self.execution_environment
            .create_command_stream_receiver(self.root_device_index)
            .ok_or(DeviceError::CommandStreamReceiverCreation(
                self.root_device_index,
            ))
    }

    pub(crate) fn memory_manager(&self) -> Result<&Arc<dyn MemoryManager>, DeviceError> {
        self.execution_environment
            .memory_manager()
            .ok_or(DeviceError::MemoryManagerNotInitialized)
    }

    /// Take ownership of a fully set-up receiver and record its engine
    pub(crate) fn add_engine(
        &mut self,
        csr: Box<dyn CommandStreamReceiver>,
        os_context: Arc<OsContext>,
    ) {
        let csr: Arc<dyn CommandStreamReceiver> = Arc::from(csr);
        self.command_stream_receivers.push(csr.clone());
        self.engines.push(EngineControl {
            command_stream_receiver: csr,
            os_context,
        });
    }
}
