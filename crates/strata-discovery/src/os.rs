//! OS-level discovery of render nodes

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use strata_runtime::{HwDeviceId, OsInterface};
use thiserror::Error;
use tracing::{debug, trace};

pub const DEFAULT_DRI_ROOT: &str = "/dev/dri";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to open device {device}: {source}")]
    Open {
        device: HwDeviceId,
        #[source]
        source: std::io::Error,
    },
    #[error("Device {0} rejected the binding")]
    Rejected(HwDeviceId),
}

/// Enumerates hardware and binds it through the OS
pub trait OsDiscovery: Send + Sync {
    /// Identifiers of present hardware, in a stable order
    fn discover_devices(&self) -> Vec<HwDeviceId>;

    /// Open the OS interface for one identifier
    fn bind(&self, hw_device_id: HwDeviceId) -> Result<OsInterface, DiscoveryError>;
}

/// Discovery over DRM render nodes listed in `<root>/by-path`
#[derive(Debug, Clone)]
pub struct DrmDiscovery {
    root: PathBuf,
}

impl Default for DrmDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_DRI_ROOT)
    }
}

impl DrmDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Match `pci-<bus id>-render` entries
fn is_render_node(name: &str) -> bool {
    name.starts_with("pci-") && name.ends_with("-render")
}

impl OsDiscovery for DrmDiscovery {
    fn discover_devices(&self) -> Vec<HwDeviceId> {
        let by_path = self.root.join("by-path");
        let entries = match std::fs::read_dir(&by_path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %by_path.display(), error = %e, "No render nodes to enumerate");
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(is_render_node)
            })
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        for path in &paths {
            trace!(path = %path.display(), "Found render node");
        }
        debug!(root = %self.root.display(), count = paths.len(), "Enumerated render nodes");
        paths.into_iter().map(HwDeviceId::new).collect()
    }

    fn bind(&self, hw_device_id: HwDeviceId) -> Result<OsInterface, DiscoveryError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(hw_device_id.path());
        match file {
            Ok(file) => Ok(OsInterface::new(hw_device_id, Some(file))),
            Err(source) => Err(DiscoveryError::Open {
                device: hw_device_id,
                source,
            }),
        }
    }
}
