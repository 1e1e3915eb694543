//! Memory manager, OS contexts and graphics allocations

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use strata_core::{DeviceBitfield, EngineType, PreemptionMode};
use thiserror::Error;
use tracing::{debug, trace};

use crate::csr::CommandStreamReceiver;

const PAGE_SIZE: u64 = 4096;
const GPU_HEAP_BASE: u64 = 0x1_0000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("OS context limit of {limit} reached")]
    OsContextLimitReached { limit: u32 },
    #[error("Out of GPU address space: requested {requested} bytes")]
    OutOfAddressSpace { requested: u64 },
    #[error("Allocation {0} is not resident")]
    NotResident(u64),
}

/// Execution context registered with the memory manager for one receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsContext {
    pub context_id: u32,
    pub root_device_index: u32,
    pub engine_type: EngineType,
    pub device_bitfield: DeviceBitfield,
    pub preemption_mode: PreemptionMode,
    pub low_priority: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationType {
    TagBuffer,
    GlobalFence,
    CommandBuffer,
}

/// GPU-visible allocation handed out by the memory manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsAllocation {
    pub id: u64,
    pub root_device_index: u32,
    pub allocation_type: AllocationType,
    pub gpu_address: u64,
    pub size: u64,
}

/// Allocation and OS-context registration primitives
pub trait MemoryManager: Send + Sync + std::fmt::Debug {
    /// Create an OS context for `csr` and register it
    fn create_and_register_os_context(
        &self,
        csr: &dyn CommandStreamReceiver,
        engine_type: EngineType,
        device_bitfield: DeviceBitfield,
        preemption_mode: PreemptionMode,
        low_priority: bool,
    ) -> Result<Arc<OsContext>, MemoryError>;

    /// Every context registered so far, in registration order
    fn registered_contexts(&self) -> Vec<Arc<OsContext>>;

    fn allocate_graphics_memory(
        &self,
        root_device_index: u32,
        allocation_type: AllocationType,
        size: u64,
    ) -> Result<GraphicsAllocation, MemoryError>;

    fn free_graphics_memory(&self, allocation: &GraphicsAllocation);

    /// Number of allocations not yet freed
    fn live_allocations(&self) -> usize;
}

#[derive(Debug, Default)]
struct Registry {
    contexts: Vec<Arc<OsContext>>,
    allocations: HashMap<u64, GraphicsAllocation>,
}

/// Memory manager with a bump-allocated GPU heap
#[derive(Debug)]
pub struct DefaultMemoryManager {
    max_os_context_count: u32,
    gpu_address_limit: u64,
    next_gpu_address: AtomicU64,
    next_allocation_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl DefaultMemoryManager {
    pub fn new(max_os_context_count: u32, gpu_address_limit: u64) -> Self {
        Self {
            max_os_context_count,
            gpu_address_limit,
            next_gpu_address: AtomicU64::new(GPU_HEAP_BASE),
            next_allocation_id: AtomicU64::new(1),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn max_os_context_count(&self) -> u32 {
        self.max_os_context_count
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Each update is a single push, insert or remove.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MemoryManager for DefaultMemoryManager {
    fn create_and_register_os_context(
        &self,
        csr: &dyn CommandStreamReceiver,
        engine_type: EngineType,
        device_bitfield: DeviceBitfield,
        preemption_mode: PreemptionMode,
        low_priority: bool,
    ) -> Result<Arc<OsContext>, MemoryError> {
        let mut registry = self.registry();
        let context_id = registry.contexts.len() as u32;
        if context_id >= self.max_os_context_count {
            return Err(MemoryError::OsContextLimitReached {
                limit: self.max_os_context_count,
            });
        }

        let os_context = Arc::new(OsContext {
            context_id,
            root_device_index: csr.root_device_index(),
            engine_type,
            device_bitfield,
            preemption_mode,
            low_priority,
        });
        registry.contexts.push(os_context.clone());

        debug!(
            context_id,
            root_device_index = csr.root_device_index(),
            engine = %engine_type,
            bitfield = %device_bitfield,
            low_priority,
            "Registered OS context"
        );
        Ok(os_context)
    }

    fn registered_contexts(&self) -> Vec<Arc<OsContext>> {
        self.registry().contexts.clone()
    }

    fn allocate_graphics_memory(
        &self,
        root_device_index: u32,
        allocation_type: AllocationType,
        size: u64,
    ) -> Result<GraphicsAllocation, MemoryError> {
        let out_of_space = || MemoryError::OutOfAddressSpace { requested: size };
        let aligned = size
            .max(1)
            .div_ceil(PAGE_SIZE)
            .checked_mul(PAGE_SIZE)
            .ok_or_else(out_of_space)?;
        // the heap cursor only moves for allocations that fit
        let gpu_address = self
            .next_gpu_address
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                next.checked_add(aligned)
                    .filter(|end| *end <= self.gpu_address_limit)
            })
            .map_err(|_| out_of_space())?;

        let allocation = GraphicsAllocation {
            id: self.next_allocation_id.fetch_add(1, Ordering::AcqRel),
            root_device_index,
            allocation_type,
            gpu_address,
            size: aligned,
        };
        self.registry()
            .allocations
            .insert(allocation.id, allocation.clone());

        trace!(
            id = allocation.id,
            root_device_index,
            ?allocation_type,
            gpu_address = format_args!("{:#x}", gpu_address),
            "Allocated graphics memory"
        );
        Ok(allocation)
    }

    fn free_graphics_memory(&self, allocation: &GraphicsAllocation) {
        self.registry().allocations.remove(&allocation.id);
    }

    fn live_allocations(&self) -> usize {
        self.registry().allocations.len()
    }
}
