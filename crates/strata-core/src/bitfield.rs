//! Device bitfields identifying which sub-unit slots are addressable

use serde::{Deserialize, Serialize};

/// Number of sub-unit slots a bitfield can describe
pub const MAX_SUB_DEVICES: u32 = 32;

/// Value with the low `bits` bits set, saturating at 64 bits
pub fn max_n_bit_value(bits: u64) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Fixed-width mask of sub-unit slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceBitfield(u32);

impl DeviceBitfield {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// All slots below `count` set
    pub fn all_below(count: u32) -> Self {
        Self(max_n_bit_value(u64::from(count.min(MAX_SUB_DEVICES))) as u32)
    }

    /// Only slot `index` set
    pub fn single(index: u32) -> Self {
        assert!(
            index < MAX_SUB_DEVICES,
            "sub-device slot {index} does not fit a device bitfield"
        );
        Self(1 << index)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Number of set slots
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_set(&self, index: u32) -> bool {
        index < MAX_SUB_DEVICES && self.0 & (1 << index) != 0
    }
}

impl std::fmt::Display for DeviceBitfield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}
