//! Simulation center backing AUB/TBX receivers

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use strata_core::CommandStreamReceiverType;
use tracing::{debug, info};

use crate::memory::GraphicsAllocation;

/// Simulation manager receiving memory writes and residency changes
#[derive(Debug)]
pub struct AubManager {
    local_memory_enabled: bool,
    trace_file: Option<PathBuf>,
    receiver_type: CommandStreamReceiverType,
    bytes_written: AtomicU64,
    resident: Mutex<HashSet<u64>>,
}

impl AubManager {
    pub fn new(
        local_memory_enabled: bool,
        trace_file: Option<PathBuf>,
        receiver_type: CommandStreamReceiverType,
    ) -> Self {
        Self {
            local_memory_enabled,
            trace_file,
            receiver_type,
            bytes_written: AtomicU64::new(0),
            resident: Mutex::new(HashSet::new()),
        }
    }

    pub fn local_memory_enabled(&self) -> bool {
        self.local_memory_enabled
    }

    pub fn trace_file(&self) -> Option<&Path> {
        self.trace_file.as_deref()
    }

    pub fn receiver_type(&self) -> CommandStreamReceiverType {
        self.receiver_type
    }

    /// Mirror an allocation's contents into the simulation
    pub fn write_memory(&self, allocation: &GraphicsAllocation) {
        self.bytes_written.fetch_add(allocation.size, Ordering::AcqRel);
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Acquire)
    }

    pub fn make_resident(&self, allocation_id: u64) {
        self.resident().insert(allocation_id);
    }

    /// Returns false when the allocation was not resident
    pub fn evict(&self, allocation_id: u64) -> bool {
        self.resident().remove(&allocation_id)
    }

    pub fn is_resident(&self, allocation_id: u64) -> bool {
        self.resident().contains(&allocation_id)
    }

    fn resident(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.resident.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-root-device simulation state
#[derive(Debug)]
pub struct AubCenter {
    aub_manager: Arc<AubManager>,
}

impl AubCenter {
    /// `trace_file` may be empty, in which case no capture file is written.
    /// Receivers that do not capture AUB streams never get one.
    pub fn new(
        local_memory_enabled: bool,
        trace_file: &str,
        receiver_type: CommandStreamReceiverType,
    ) -> Self {
        if !trace_file.is_empty() && !receiver_type.captures_aub() {
            debug!(
                receiver = %receiver_type,
                trace_file,
                "Receiver does not capture AUB, ignoring trace file"
            );
        }
        let trace_file = (!trace_file.is_empty() && receiver_type.captures_aub())
            .then(|| PathBuf::from(trace_file));
        info!(
            receiver = %receiver_type,
            local_memory = local_memory_enabled,
            trace_file = ?trace_file,
            "Initialized simulation center"
        );
        Self {
            aub_manager: Arc::new(AubManager::new(
                local_memory_enabled,
                trace_file,
                receiver_type,
            )),
        }
    }

    pub fn aub_manager(&self) -> Arc<AubManager> {
        self.aub_manager.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_trace_file_means_none() {
        let center = AubCenter::new(true, "", CommandStreamReceiverType::Tbx);
        let manager = center.aub_manager();
        assert!(manager.trace_file().is_none());
        assert!(manager.local_memory_enabled());
        assert_eq!(manager.receiver_type(), CommandStreamReceiverType::Tbx);
    }

    #[test]
    fn test_trace_file_kept() {
        let center = AubCenter::new(false, "out.aub", CommandStreamReceiverType::Aub);
        assert_eq!(
            center.aub_manager().trace_file(),
            Some(Path::new("out.aub"))
        );
    }

    #[test]
    fn test_trace_file_needs_aub_capture() {
        let center = AubCenter::new(false, "out.aub", CommandStreamReceiverType::Tbx);
        assert!(center.aub_manager().trace_file().is_none());

        let center = AubCenter::new(false, "out.aub", CommandStreamReceiverType::TbxWithAub);
        assert_eq!(
            center.aub_manager().trace_file(),
            Some(Path::new("out.aub"))
        );
    }

    #[test]
    fn test_residency() {
        let manager = AubManager::new(false, None, CommandStreamReceiverType::Aub);
        manager.make_resident(7);
        assert!(manager.is_resident(7));
        assert!(manager.evict(7));
        assert!(!manager.evict(7));
    }
}
