//! # Shared Region
//!
//! A clonable, thread-safe wrapper around [`Region`]. Coalescing touches
//! blocks adjacent to the one being released, so every region operation must
//! run under the lock as a whole; this wrapper owns that discipline instead
//! of asking each call site to.
//!
//! Payload access goes through [`SharedRegion::with`], which runs a closure
//! under the lock rather than handing out references that would outlive it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RegionConfig;
use crate::error::MemoryError;
use crate::region::{BlockHandle, Region};

/// A [`Region`] behind an `Arc<Mutex>`; cheap to clone across threads.
#[derive(Clone)]
pub struct SharedRegion {
    inner: Arc<Mutex<Region>>,
}

impl SharedRegion {
    /// Wraps a fresh region with the default pool size.
    #[must_use]
    pub fn new(index: u16) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Region::new(index))),
        }
    }

    /// Wraps a fresh region built from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn with_config(index: u16, config: &RegionConfig) -> Result<Self, MemoryError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(Region::with_config(index, config)?)),
        })
    }

    /// Allocates `size` payload bytes. See [`Region::allocate`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfMemory`] if no bin can satisfy the
    /// request.
    pub fn allocate(&self, size: usize) -> Result<BlockHandle, MemoryError> {
        self.inner.lock().allocate(size)
    }

    /// Releases a block. See [`Region::release`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corruption`] if a boundary-tag check fails.
    pub fn release(&self, handle: BlockHandle) -> Result<(), MemoryError> {
        self.inner.lock().release(handle)
    }

    /// Pre-flight check under the lock. Note that another thread may win the
    /// race between this call and a subsequent [`Self::allocate`].
    #[must_use]
    pub fn can_satisfy(&self, size: usize) -> bool {
        self.inner.lock().can_satisfy(size)
    }

    /// Runs `f` with exclusive access to the region, for payload reads and
    /// writes or diagnostics.
    pub fn with<R>(&self, f: impl FnOnce(&mut Region) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
