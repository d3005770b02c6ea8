//! # Small-Object Pool
//!
//! A segregated pool for high-frequency small allocations, layered on
//! [`Chunk`]s of uniform slots. Requests are mapped to size classes in
//! `min_size` steps; each class lazily creates a [`FixedBin`] sized by the
//! first request it sees. Requests above the threshold bypass the pool and go
//! straight to the heap.
//!
//! Slot addresses are stable for the lifetime of the pool: chunks grow but
//! are never destroyed or compacted, so a [`SmallHandle`] stays valid until
//! the slot is deallocated.
//!
//! Not thread-safe; intended as a per-consumer pool, one instance per owning
//! subsystem.

use crate::chunk::Chunk;
use crate::config::PoolConfig;
use crate::error::MemoryError;

/// Handle to an allocation made by a [`SmallObjectPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmallHandle {
    size: usize,
    slot: SlotRef,
}

/// Where the bytes behind a handle actually live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotRef {
    /// A slot inside one of the pool's chunks.
    Pooled { addr: u32 },
    /// A standalone heap allocation above the pooling threshold.
    Direct { index: u32 },
}

impl SmallHandle {
    /// Requested size in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Whether the handle is empty (a zero-byte request).
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the allocation came from a pooled chunk slot rather than a
    /// direct heap allocation.
    #[inline]
    #[must_use]
    pub const fn is_pooled(&self) -> bool {
        matches!(self.slot, SlotRef::Pooled { .. })
    }
}

/// A growable set of chunks all carved into slots of one fixed size.
///
/// Keeps two caches: the chunk that served the last allocation (small
/// objects burst, so the same chunk usually has another free slot) and the
/// chunk that served the last deallocation (frees cluster the same way).
pub(crate) struct FixedBin {
    slot_size: u32,
    chunk_capacity: u32,
    chunks: Vec<Chunk>,
    last_alloc: usize,
    last_dealloc: usize,
}

impl FixedBin {
    pub(crate) const fn new(slot_size: u32, chunk_capacity: u32) -> Self {
        Self {
            slot_size,
            chunk_capacity,
            chunks: Vec::new(),
            last_alloc: 0,
            last_dealloc: 0,
        }
    }

    /// Number of chunks currently backing this bin.
    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of free slots across all chunks.
    pub(crate) fn free_slots(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| usize::from(c.free_count()))
            .sum()
    }

    /// Allocates one slot, growing by a fresh chunk when every existing
    /// chunk is full.
    pub(crate) fn alloc(&mut self) -> u32 {
        if let Some(i) = self.usable_chunk() {
            self.last_alloc = i;
            if let Some(addr) = self.chunks[i].alloc(self.slot_size) {
                return addr;
            }
        }

        let base = self.chunks.len() as u32 * self.chunk_capacity;
        let mut chunk = Chunk::new(self.slot_size, self.chunk_capacity, base);
        // The first slot of a fresh chunk is always its base.
        let addr = chunk.alloc(self.slot_size).unwrap_or(base);
        self.chunks.push(chunk);
        self.last_alloc = self.chunks.len() - 1;
        tracing::debug!(
            slot_size = self.slot_size,
            chunks = self.chunks.len(),
            "fixed bin grew by one chunk"
        );
        addr
    }

    /// Returns a slot to its owning chunk.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnknownBlock`] if no chunk owns `addr`, or
    /// [`MemoryError::Corruption`] if the address is off the slot grid.
    pub(crate) fn purge(&mut self, addr: u32) -> Result<(), MemoryError> {
        let idx = self.owner_of(addr).ok_or(MemoryError::UnknownBlock {
            addr: addr as usize,
        })?;
        self.chunks[idx].purge(addr, self.slot_size)?;
        self.last_dealloc = idx;
        Ok(())
    }

    /// Read-only view of the slot at `addr`.
    pub(crate) fn slot(&self, addr: u32) -> Result<&[u8], MemoryError> {
        let idx = self.owner_of(addr).ok_or(MemoryError::UnknownBlock {
            addr: addr as usize,
        })?;
        Ok(self.chunks[idx].slot(addr, self.slot_size))
    }

    /// Mutable view of the slot at `addr`.
    pub(crate) fn slot_mut(&mut self, addr: u32) -> Result<&mut [u8], MemoryError> {
        let idx = self.owner_of(addr).ok_or(MemoryError::UnknownBlock {
            addr: addr as usize,
        })?;
        Ok(self.chunks[idx].slot_mut(addr, self.slot_size))
    }

    /// Picks a chunk with a free slot, preferring the one that served the
    /// last allocation.
    fn usable_chunk(&self) -> Option<usize> {
        if self
            .chunks
            .get(self.last_alloc)
            .is_some_and(Chunk::has_free)
        {
            return Some(self.last_alloc);
        }
        self.chunks.iter().position(Chunk::has_free)
    }

    /// Finds the chunk owning `addr`, checking the deallocation cache first
    /// and then fanning out in both directions at once. Deallocations tend
    /// to cluster near each other, so the nearest chunks are the best bet.
    fn owner_of(&self, addr: u32) -> Option<usize> {
        if self.chunks.is_empty() {
            return None;
        }
        let start = self.last_dealloc.min(self.chunks.len() - 1);
        if self.chunks[start].contains(addr) {
            return Some(start);
        }
        let mut lo = start;
        let mut hi = start + 1;
        loop {
            let mut progressed = false;
            if lo > 0 {
                lo -= 1;
                progressed = true;
                if self.chunks[lo].contains(addr) {
                    return Some(lo);
                }
            }
            if hi < self.chunks.len() {
                progressed = true;
                if self.chunks[hi].contains(addr) {
                    return Some(hi);
                }
                hi += 1;
            }
            if !progressed {
                return None;
            }
        }
    }
}

impl Drop for FixedBin {
    fn drop(&mut self) {
        // Tear chunks down newest-first, the reverse of growth order.
        while self.chunks.pop().is_some() {}
    }
}

/// A pool of [`FixedBin`]s segregated by request size.
///
/// The class map is a direct-indexed table: a request of `count` bytes lands
/// in class `count / min_size` (truncating), so nearby sizes share a bin.
/// The bin's slot size is fixed by the first request that creates it.
pub struct SmallObjectPool {
    config: PoolConfig,
    bins: Vec<FixedBin>,
    /// Size class to bin index; `None` until a request creates the bin.
    map: Vec<Option<usize>>,
    /// Over-threshold allocations, indexed by [`SlotRef::Direct`].
    direct: Vec<Option<Box<[u8]>>>,
    /// Recycled `direct` indices.
    direct_free: Vec<u32>,
    /// Size class that served the last pooled allocation, for diagnostics.
    last_alloc_class: Option<usize>,
    /// Size class that took the last pooled deallocation, for diagnostics.
    last_dealloc_class: Option<usize>,
}

impl SmallObjectPool {
    /// Creates a pool with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(PoolConfig::default())
    }

    /// Creates a pool from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn with_config(config: &PoolConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        Ok(Self::build(*config))
    }

    fn build(config: PoolConfig) -> Self {
        let classes = config.num_classes();
        Self {
            config,
            bins: Vec::new(),
            map: vec![None; classes],
            direct: Vec::new(),
            direct_free: Vec::new(),
            last_alloc_class: None,
            last_dealloc_class: None,
        }
    }

    /// Allocates `count` bytes.
    ///
    /// Requests up to the threshold are served from a pooled chunk slot;
    /// larger requests go straight to the heap. Pooling never fails: bins
    /// grow by whole chunks on demand.
    pub fn allocate(&mut self, count: usize) -> SmallHandle {
        if count > self.config.threshold {
            let boxed = vec![0u8; count].into_boxed_slice();
            let index = if let Some(index) = self.direct_free.pop() {
                self.direct[index as usize] = Some(boxed);
                index
            } else {
                self.direct.push(Some(boxed));
                (self.direct.len() - 1) as u32
            };
            return SmallHandle {
                size: count,
                slot: SlotRef::Direct { index },
            };
        }

        let class = count / self.config.min_size;
        let bin_index = if let Some(index) = self.map[class] {
            index
        } else {
            // The first request to hit a class fixes its slot size.
            let slot_size = count.max(self.config.min_size) as u32;
            self.bins
                .push(FixedBin::new(slot_size, self.config.chunk_capacity));
            let index = self.bins.len() - 1;
            self.map[class] = Some(index);
            tracing::debug!(class, slot_size, "created size-class bin");
            index
        };
        self.last_alloc_class = Some(class);
        SmallHandle {
            size: count,
            slot: SlotRef::Pooled {
                addr: self.bins[bin_index].alloc(),
            },
        }
    }

    /// Returns an allocation to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnknownBlock`] for a handle this pool never
    /// issued or one already deallocated, [`MemoryError::Corruption`] for a
    /// pooled address off its chunk's slot grid.
    pub fn deallocate(&mut self, handle: SmallHandle) -> Result<(), MemoryError> {
        match handle.slot {
            SlotRef::Direct { index } => {
                let entry =
                    self.direct
                        .get_mut(index as usize)
                        .ok_or(MemoryError::UnknownBlock {
                            addr: index as usize,
                        })?;
                if entry.take().is_none() {
                    return Err(MemoryError::UnknownBlock {
                        addr: index as usize,
                    });
                }
                self.direct_free.push(index);
                Ok(())
            }
            SlotRef::Pooled { addr } => {
                let bin_index = self.class_bin(handle.size)?;
                self.bins[bin_index].purge(addr)?;
                self.last_dealloc_class = Some(handle.size / self.config.min_size);
                Ok(())
            }
        }
    }

    /// Read-only view of the bytes behind a handle.
    ///
    /// For pooled handles the view spans the whole slot, whose size was
    /// fixed by the first request in the class; it may differ slightly from
    /// the handle's own length.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnknownBlock`] if the handle does not name a
    /// live allocation of this pool.
    pub fn get(&self, handle: SmallHandle) -> Result<&[u8], MemoryError> {
        match handle.slot {
            SlotRef::Direct { index } => self
                .direct
                .get(index as usize)
                .and_then(|e| e.as_deref())
                .ok_or(MemoryError::UnknownBlock {
                    addr: index as usize,
                }),
            SlotRef::Pooled { addr } => {
                let bin_index = self.class_bin(handle.size)?;
                self.bins[bin_index].slot(addr)
            }
        }
    }

    /// Mutable view of the bytes behind a handle.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnknownBlock`] if the handle does not name a
    /// live allocation of this pool.
    pub fn get_mut(&mut self, handle: SmallHandle) -> Result<&mut [u8], MemoryError> {
        match handle.slot {
            SlotRef::Direct { index } => self
                .direct
                .get_mut(index as usize)
                .and_then(|e| e.as_deref_mut())
                .ok_or(MemoryError::UnknownBlock {
                    addr: index as usize,
                }),
            SlotRef::Pooled { addr } => {
                let bin_index = self.class_bin(handle.size)?;
                self.bins[bin_index].slot_mut(addr)
            }
        }
    }

    /// Number of distinct size-class bins created so far.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Number of chunks across all bins.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.bins.iter().map(FixedBin::chunk_count).sum()
    }

    /// Number of free pooled slots across all bins.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.bins.iter().map(FixedBin::free_slots).sum()
    }

    /// Size class that served the most recent pooled allocation.
    #[must_use]
    pub const fn last_alloc_class(&self) -> Option<usize> {
        self.last_alloc_class
    }

    /// Size class that took the most recent pooled deallocation.
    #[must_use]
    pub const fn last_dealloc_class(&self) -> Option<usize> {
        self.last_dealloc_class
    }

    /// Resolves a pooled handle's size to its class bin.
    fn class_bin(&self, size: usize) -> Result<usize, MemoryError> {
        self.map
            .get(size / self.config.min_size)
            .copied()
            .flatten()
            .ok_or(MemoryError::UnknownBlock { addr: size })
    }
}

impl Default for SmallObjectPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SmallObjectPool {
    fn drop(&mut self) {
        // Tear bins down newest-first, the reverse of creation order.
        while self.bins.pop().is_some() {}
    }
}
