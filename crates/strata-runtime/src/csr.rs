//! Command-stream receivers - the channels work is submitted through

use std::sync::Arc;
use strata_core::CommandStreamReceiverType;
use tracing::{debug, warn};

use crate::aub::AubManager;
use crate::environment::ExecutionEnvironment;
use crate::memory::{AllocationType, GraphicsAllocation, MemoryError, MemoryManager, OsContext};

const TAG_ALLOCATION_SIZE: u64 = 4096;
const GLOBAL_FENCE_SIZE: u64 = 4096;

/// Pluggable receiver construction: `(environment, root_device_index) -> receiver`
pub type CsrFactory = Arc<
    dyn Fn(&ExecutionEnvironment, u32) -> Option<Box<dyn CommandStreamReceiver>> + Send + Sync,
>;

pub trait CommandStreamReceiver: Send + Sync + std::fmt::Debug {
    fn receiver_type(&self) -> CommandStreamReceiverType;

    fn root_device_index(&self) -> u32;

    /// Bind the OS context this receiver submits on; happens once
    fn setup_context(&mut self, os_context: Arc<OsContext>);

    fn os_context(&self) -> Option<&Arc<OsContext>>;

    /// Allocate the completion tag the receiver polls
    fn initialize_tag_allocation(&mut self) -> Result<(), MemoryError>;

    /// Allocate the fence shared across engines
    fn create_global_fence_allocation(&mut self) -> Result<(), MemoryError>;

    fn tag_allocation(&self) -> Option<&GraphicsAllocation>;

    fn global_fence_allocation(&self) -> Option<&GraphicsAllocation>;
}

/// Receiver for hardware and simulated submission alike
#[derive(Debug)]
pub struct DefaultCommandStreamReceiver {
    receiver_type: CommandStreamReceiverType,
    root_device_index: u32,
    memory_manager: Arc<dyn MemoryManager>,
    aub_manager: Option<Arc<AubManager>>,
    os_context: Option<Arc<OsContext>>,
    tag_allocation: Option<GraphicsAllocation>,
    global_fence_allocation: Option<GraphicsAllocation>,
}

impl DefaultCommandStreamReceiver {
    pub fn new(
        receiver_type: CommandStreamReceiverType,
        root_device_index: u32,
        memory_manager: Arc<dyn MemoryManager>,
        aub_manager: Option<Arc<AubManager>>,
    ) -> Self {
        Self {
            receiver_type,
            root_device_index,
            memory_manager,
            aub_manager,
            os_context: None,
            tag_allocation: None,
            global_fence_allocation: None,
        }
    }

    fn allocate(
        &self,
        allocation_type: AllocationType,
        size: u64,
    ) -> Result<GraphicsAllocation, MemoryError> {
        let allocation =
            self.memory_manager
                .allocate_graphics_memory(self.root_device_index, allocation_type, size)?;
        if let Some(aub_manager) = &self.aub_manager {
            aub_manager.write_memory(&allocation);
        }
        Ok(allocation)
    }
}

impl CommandStreamReceiver for DefaultCommandStreamReceiver {
    fn receiver_type(&self) -> CommandStreamReceiverType {
        self.receiver_type
    }

    fn root_device_index(&self) -> u32 {
        self.root_device_index
    }

    fn setup_context(&mut self, os_context: Arc<OsContext>) {
        assert!(
            self.os_context.is_none(),
            "command stream receiver is already bound to an OS context"
        );
        self.os_context = Some(os_context);
    }

    fn os_context(&self) -> Option<&Arc<OsContext>> {
        self.os_context.as_ref()
    }

    fn initialize_tag_allocation(&mut self) -> Result<(), MemoryError> {
        if self.tag_allocation.is_none() {
            self.tag_allocation = Some(self.allocate(AllocationType::TagBuffer, TAG_ALLOCATION_SIZE)?);
        }
        Ok(())
    }

    fn create_global_fence_allocation(&mut self) -> Result<(), MemoryError> {
        if self.global_fence_allocation.is_none() {
            self.global_fence_allocation =
                Some(self.allocate(AllocationType::GlobalFence, GLOBAL_FENCE_SIZE)?);
        }
        Ok(())
    }

    fn tag_allocation(&self) -> Option<&GraphicsAllocation> {
        self.tag_allocation.as_ref()
    }

    fn global_fence_allocation(&self) -> Option<&GraphicsAllocation> {
        self.global_fence_allocation.as_ref()
    }
}

impl Drop for DefaultCommandStreamReceiver {
    fn drop(&mut self) {
        for allocation in [self.tag_allocation.take(), self.global_fence_allocation.take()]
            .into_iter()
            .flatten()
        {
            self.memory_manager.free_graphics_memory(&allocation);
        }
    }
}

/// Default receiver factory installed in every execution environment
pub fn create_command_stream(
    execution_environment: &ExecutionEnvironment,
    root_device_index: u32,
) -> Option<Box<dyn CommandStreamReceiver>> {
    let Some(memory_manager) = execution_environment.memory_manager() else {
        warn!(root_device_index, "Memory manager not initialized, cannot create receiver");
        return None;
    };
    let root_environment = execution_environment.root_device_environment(root_device_index)?;

    let receiver_type = execution_environment
        .settings()
        .command_stream_receiver_type()
        .unwrap_or(CommandStreamReceiverType::Hardware);
    let aub_manager = root_environment.aub_center().map(|center| center.aub_manager());

    if receiver_type.is_simulation() && aub_manager.is_none() {
        warn!(
            root_device_index,
            receiver = %receiver_type,
            "Simulation receiver requested without a simulation center"
        );
        return None;
    }

    debug!(root_device_index, receiver = %receiver_type, "Creating command stream receiver");
    Some(Box::new(DefaultCommandStreamReceiver::new(
        receiver_type,
        root_device_index,
        memory_manager.clone(),
        aub_manager,
    )))
}
