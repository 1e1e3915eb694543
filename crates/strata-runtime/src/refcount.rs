//! Explicit reference counts for jointly owned devices

use std::sync::atomic::{AtomicI32, Ordering};

/// Internal and API reference counts of a shared object.
///
/// Internal references are held by other driver objects (a root device holds
/// one per sub-device); API references are held by callers. Memory is managed
/// separately; these counts only decide whether the object may be released.
#[derive(Debug, Default)]
pub struct ReferenceCounts {
    internal: AtomicI32,
    api: AtomicI32,
}

impl ReferenceCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new internal count
    pub fn inc_ref_internal(&self) -> i32 {
        self.internal.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the new internal count
    pub fn dec_ref_internal(&self) -> i32 {
        let previous = self.internal.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "internal reference count underflow");
        previous - 1
    }

    /// Returns the new API count
    pub fn inc_ref_api(&self) -> i32 {
        self.api.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the new API count
    pub fn dec_ref_api(&self) -> i32 {
        let previous = self.api.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "api reference count underflow");
        previous - 1
    }

    pub fn internal_count(&self) -> i32 {
        self.internal.load(Ordering::Acquire)
    }

    pub fn api_count(&self) -> i32 {
        self.api.load(Ordering::Acquire)
    }

    /// No owner of either kind remains
    pub fn is_releasable(&self) -> bool {
        self.internal_count() == 0 && self.api_count() == 0
    }
}
