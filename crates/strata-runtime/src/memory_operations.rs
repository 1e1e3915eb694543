//! Residency handlers attached to root-device environments

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::aub::AubManager;
use crate::memory::{GraphicsAllocation, MemoryError};

pub trait MemoryOperationsHandler: Send + Sync + std::fmt::Debug {
    fn make_resident(&self, allocations: &[&GraphicsAllocation]) -> Result<(), MemoryError>;

    fn evict(&self, allocation: &GraphicsAllocation) -> Result<(), MemoryError>;

    fn is_resident(&self, allocation: &GraphicsAllocation) -> bool;
}

/// Residency tracked by the simulation manager
#[derive(Debug)]
pub struct AubMemoryOperationsHandler {
    aub_manager: Arc<AubManager>,
}

impl AubMemoryOperationsHandler {
    pub fn new(aub_manager: Arc<AubManager>) -> Self {
        Self { aub_manager }
    }
}

impl MemoryOperationsHandler for AubMemoryOperationsHandler {
    fn make_resident(&self, allocations: &[&GraphicsAllocation]) -> Result<(), MemoryError> {
        for allocation in allocations {
            self.aub_manager.write_memory(allocation);
            self.aub_manager.make_resident(allocation.id);
        }
        Ok(())
    }

    fn evict(&self, allocation: &GraphicsAllocation) -> Result<(), MemoryError> {
        if self.aub_manager.evict(allocation.id) {
            Ok(())
        } else {
            Err(MemoryError::NotResident(allocation.id))
        }
    }

    fn is_resident(&self, allocation: &GraphicsAllocation) -> bool {
        self.aub_manager.is_resident(allocation.id)
    }
}

/// Residency set kept next to a bound OS interface
#[derive(Debug, Default)]
pub struct ResidencyMemoryOperationsHandler {
    resident: Mutex<HashSet<u64>>,
}

impl ResidencyMemoryOperationsHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryOperationsHandler for ResidencyMemoryOperationsHandler {
    fn make_resident(&self, allocations: &[&GraphicsAllocation]) -> Result<(), MemoryError> {
        let mut resident = self.resident.lock().unwrap_or_else(|e| e.into_inner());
        resident.extend(allocations.iter().map(|a| a.id));
        Ok(())
    }

    fn evict(&self, allocation: &GraphicsAllocation) -> Result<(), MemoryError> {
        let mut resident = self.resident.lock().unwrap_or_else(|e| e.into_inner());
        if resident.remove(&allocation.id) {
            Ok(())
        } else {
            Err(MemoryError::NotResident(allocation.id))
        }
    }

    fn is_resident(&self, allocation: &GraphicsAllocation) -> bool {
        self.resident
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&allocation.id)
    }
}
