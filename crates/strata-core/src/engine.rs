//! Engine, preemption and receiver-type enumerations

use serde::{Deserialize, Serialize};

/// Which backend a command-stream receiver submits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStreamReceiverType {
    /// Direct submission to hardware
    Hardware,
    /// AUB trace file only
    Aub,
    /// TBX protocol simulation
    Tbx,
    /// Hardware submission with a parallel AUB capture
    HardwareWithAub,
    /// TBX simulation with a parallel AUB capture
    TbxWithAub,
}

impl CommandStreamReceiverType {
    /// Map the raw `SetCommandStreamReceiver` selector
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Hardware),
            1 => Some(Self::Aub),
            2 => Some(Self::Tbx),
            3 => Some(Self::HardwareWithAub),
            4 => Some(Self::TbxWithAub),
            _ => None,
        }
    }

    pub fn raw(&self) -> i32 {
        match self {
            Self::Hardware => 0,
            Self::Aub => 1,
            Self::Tbx => 2,
            Self::HardwareWithAub => 3,
            Self::TbxWithAub => 4,
        }
    }

    /// True when no real hardware is involved
    pub fn is_simulation(&self) -> bool {
        matches!(self, Self::Aub | Self::Tbx | Self::TbxWithAub)
    }

    /// True when the receiver writes an AUB capture
    pub fn captures_aub(&self) -> bool {
        matches!(self, Self::Aub | Self::HardwareWithAub | Self::TbxWithAub)
    }
}

impl std::fmt::Display for CommandStreamReceiverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Hardware => "hw",
            Self::Aub => "aub",
            Self::Tbx => "tbx",
            Self::HardwareWithAub => "hw+aub",
            Self::TbxWithAub => "tbx+aub",
        };
        f.write_str(name)
    }
}

/// Hardware engine class a context is created on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Render
    Rcs,
    /// Blitter
    Bcs,
    /// Compute
    Ccs,
    /// Video
    Vcs,
    /// Video enhancement
    Vecs,
}

impl EngineType {
    /// Map the raw `NodeOrdinal` override
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Rcs),
            1 => Some(Self::Bcs),
            2 => Some(Self::Vcs),
            3 => Some(Self::Vecs),
            4 => Some(Self::Ccs),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rcs => "rcs",
            Self::Bcs => "bcs",
            Self::Ccs => "ccs",
            Self::Vcs => "vcs",
            Self::Vecs => "vecs",
        };
        f.write_str(name)
    }
}

/// Granularity at which submitted work can be preempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreemptionMode {
    Disabled,
    MidBatch,
    ThreadGroup,
    MidThread,
}

impl PreemptionMode {
    /// Map the raw `ForcePreemptionMode` override
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Disabled),
            2 => Some(Self::MidBatch),
            3 => Some(Self::ThreadGroup),
            4 => Some(Self::MidThread),
            _ => None,
        }
    }
}
