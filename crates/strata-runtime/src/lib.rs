//! Strata Runtime - Execution environments and the device hierarchy
//!
//! This crate owns everything that exists after discovery has populated the
//! execution environment:
//! - Root-device environments with their OS binding and simulation state
//! - The memory manager, OS contexts and residency handlers
//! - Command-stream receivers and the engines built from them
//! - Root devices, their sub-devices and the reference counts tying them

pub mod aub;
pub mod csr;
pub mod device;
pub mod environment;
pub mod memory;
pub mod memory_operations;
pub mod refcount;

pub use aub::{AubCenter, AubManager};
pub use csr::{CommandStreamReceiver, CsrFactory, DefaultCommandStreamReceiver};
pub use device::{Device, DeviceError, EngineControl, RootDevice, SubDevice};
pub use environment::{ExecutionEnvironment, HwDeviceId, OsInterface, RootDeviceEnvironment};
pub use memory::{
    AllocationType, DefaultMemoryManager, GraphicsAllocation, MemoryError, MemoryManager,
    OsContext,
};
pub use memory_operations::{
    AubMemoryOperationsHandler, MemoryOperationsHandler, ResidencyMemoryOperationsHandler,
};
pub use refcount::ReferenceCounts;
