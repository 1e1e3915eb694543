//! Execution environment and per-root-device environments
//!
//! Discovery populates these before any device exists. Devices then hold the
//! execution environment through an `Arc` and only read from it.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::{hw_helper, CommandStreamReceiverType, DebugSettings, HardwareInfo};
use tracing::{debug, info};

use crate::aub::AubCenter;
use crate::csr::{create_command_stream, CommandStreamReceiver, CsrFactory};
use crate::memory::{DefaultMemoryManager, MemoryManager};
use crate::memory_operations::{
    AubMemoryOperationsHandler, MemoryOperationsHandler, ResidencyMemoryOperationsHandler,
};

/// Opaque identifier of one piece of hardware found by OS discovery
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HwDeviceId {
    path: PathBuf,
}

impl HwDeviceId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Device node or bus path this identifier was discovered at
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Display for HwDeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Result of binding a hardware identifier through the OS layer
#[derive(Debug)]
pub struct OsInterface {
    hw_device_id: HwDeviceId,
    handle: Option<File>,
    hardware_info: Option<HardwareInfo>,
}

impl OsInterface {
    pub fn new(hw_device_id: HwDeviceId, handle: Option<File>) -> Self {
        Self {
            hw_device_id,
            handle,
            hardware_info: None,
        }
    }

    /// Attach the description queried from the device
    pub fn with_hardware_info(mut self, hardware_info: HardwareInfo) -> Self {
        self.hardware_info = Some(hardware_info);
        self
    }

    pub fn hw_device_id(&self) -> &HwDeviceId {
        &self.hw_device_id
    }

    pub fn handle(&self) -> Option<&File> {
        self.handle.as_ref()
    }

    pub fn hardware_info(&self) -> Option<&HardwareInfo> {
        self.hardware_info.as_ref()
    }
}

/// State of one discovered (or simulated) hardware unit
#[derive(Debug)]
pub struct RootDeviceEnvironment {
    root_device_index: u32,
    hardware_info: Option<HardwareInfo>,
    os_interface: Option<OsInterface>,
    aub_center: Option<AubCenter>,
    memory_operations: Option<Box<dyn MemoryOperationsHandler>>,
}

impl RootDeviceEnvironment {
    pub fn new(root_device_index: u32) -> Self {
        Self {
            root_device_index,
            hardware_info: None,
            os_interface: None,
            aub_center: None,
            memory_operations: None,
        }
    }

    pub fn root_device_index(&self) -> u32 {
        self.root_device_index
    }

    /// Description specific to this unit, if it differs from the shared one
    pub fn hardware_info(&self) -> Option<&HardwareInfo> {
        self.hardware_info.as_ref()
    }

    pub fn set_hardware_info(&mut self, hardware_info: HardwareInfo) {
        self.hardware_info = Some(hardware_info);
    }

    /// Attach a bound OS interface and its residency handler
    pub fn init_os_interface(&mut self, os_interface: OsInterface) {
        if let Some(hardware_info) = os_interface.hardware_info() {
            self.hardware_info = Some(hardware_info.clone());
        }
        debug!(
            root_device_index = self.root_device_index,
            device = %os_interface.hw_device_id(),
            "Bound OS interface"
        );
        self.os_interface = Some(os_interface);
        self.memory_operations = Some(Box::new(ResidencyMemoryOperationsHandler::new()));
    }

    pub fn os_interface(&self) -> Option<&OsInterface> {
        self.os_interface.as_ref()
    }

    /// Create the simulation center once; later calls keep the first one
    pub fn init_aub_center(
        &mut self,
        local_memory_enabled: bool,
        trace_file: &str,
        receiver_type: CommandStreamReceiverType,
    ) {
        if self.aub_center.is_none() {
            self.aub_center = Some(AubCenter::new(
                local_memory_enabled,
                trace_file,
                receiver_type,
            ));
        }
    }

    pub fn aub_center(&self) -> Option<&AubCenter> {
        self.aub_center.as_ref()
    }

    /// Route residency through the simulation center
    ///
    /// Returns false when no simulation center has been initialized.
    pub fn bind_aub_memory_operations(&mut self) -> bool {
        let Some(aub_center) = &self.aub_center else {
            return false;
        };
        self.memory_operations = Some(Box::new(AubMemoryOperationsHandler::new(
            aub_center.aub_manager(),
        )));
        true
    }

    pub fn memory_operations(&self) -> Option<&dyn MemoryOperationsHandler> {
        self.memory_operations.as_deref()
    }
}

/// Driver-wide container of root-device environments
pub struct ExecutionEnvironment {
    settings: DebugSettings,
    hardware_info: HardwareInfo,
    root_device_environments: Vec<RootDeviceEnvironment>,
    max_os_context_count: u32,
    memory_manager: Option<Arc<dyn MemoryManager>>,
    csr_factory: CsrFactory,
}

impl std::fmt::Debug for ExecutionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEnvironment")
            .field("product_family", &self.hardware_info.product_family())
            .field("root_device_environments", &self.root_device_environments)
            .field("max_os_context_count", &self.max_os_context_count)
            .field("memory_manager", &self.memory_manager)
            .finish_non_exhaustive()
    }
}

impl ExecutionEnvironment {
    /// Create an empty environment with a shared hardware description
    pub fn new(settings: DebugSettings, hardware_info: HardwareInfo) -> Self {
        Self {
            settings,
            hardware_info,
            root_device_environments: Vec::new(),
            max_os_context_count: 0,
            memory_manager: None,
            csr_factory: Arc::new(create_command_stream),
        }
    }

    pub fn settings(&self) -> &DebugSettings {
        &self.settings
    }

    /// Shared description used by units without their own
    pub fn hardware_info(&self) -> &HardwareInfo {
        &self.hardware_info
    }

    pub fn mutable_hardware_info(&mut self) -> &mut HardwareInfo {
        &mut self.hardware_info
    }

    /// Description in effect for one root device
    pub fn hardware_info_for(&self, root_device_index: u32) -> &HardwareInfo {
        self.root_device_environment(root_device_index)
            .and_then(RootDeviceEnvironment::hardware_info)
            .unwrap_or(&self.hardware_info)
    }

    /// Resize to exactly `count` environments, indexed from 0
    pub fn prepare_root_device_environments(&mut self, count: u32) {
        let count = count as usize;
        self.root_device_environments.truncate(count);
        while self.root_device_environments.len() < count {
            let index = self.root_device_environments.len() as u32;
            self.root_device_environments
                .push(RootDeviceEnvironment::new(index));
        }
    }

    pub fn root_device_environments(&self) -> &[RootDeviceEnvironment] {
        &self.root_device_environments
    }

    pub fn root_device_environment(&self, root_device_index: u32) -> Option<&RootDeviceEnvironment> {
        self.root_device_environments.get(root_device_index as usize)
    }

    pub fn root_device_environment_mut(
        &mut self,
        root_device_index: u32,
    ) -> Option<&mut RootDeviceEnvironment> {
        self.root_device_environments
            .get_mut(root_device_index as usize)
    }

    pub fn root_device_environments_mut(&mut self) -> &mut [RootDeviceEnvironment] {
        &mut self.root_device_environments
    }

    /// Size the OS-context budget for every populated environment
    pub fn calculate_max_os_context_count(&mut self) {
        self.max_os_context_count = (0..self.root_device_environments.len() as u32)
            .map(|index| hw_helper::max_os_context_count(self.hardware_info_for(index), &self.settings))
            .fold(0, u32::saturating_add);
        debug!(
            max_os_context_count = self.max_os_context_count,
            "Calculated OS context budget"
        );
    }

    pub fn max_os_context_count(&self) -> u32 {
        self.max_os_context_count
    }

    /// Install a memory manager before `initialize_memory_manager` runs
    pub fn set_memory_manager(&mut self, memory_manager: Arc<dyn MemoryManager>) {
        self.memory_manager = Some(memory_manager);
    }

    /// Create the default memory manager unless one is already installed
    pub fn initialize_memory_manager(&mut self) {
        if self.memory_manager.is_some() {
            return;
        }
        let gpu_address_limit = self.hardware_info.capability_table.gpu_address_space;
        self.memory_manager = Some(Arc::new(DefaultMemoryManager::new(
            self.max_os_context_count,
            gpu_address_limit,
        )));
        info!(
            max_os_context_count = self.max_os_context_count,
            gpu_address_space = format_args!("{:#x}", gpu_address_limit),
            "Memory manager initialized"
        );
    }

    pub fn memory_manager(&self) -> Option<&Arc<dyn MemoryManager>> {
        self.memory_manager.as_ref()
    }

    pub fn set_command_stream_receiver_factory(&mut self, factory: CsrFactory) {
        self.csr_factory = factory;
    }

    /// Build a receiver for a root device through the installed factory
    pub fn create_command_stream_receiver(
        &self,
        root_device_index: u32,
    ) -> Option<Box<dyn CommandStreamReceiver>> {
        (self.csr_factory)(self, root_device_index)
    }
}
