//! # Chunk
//!
//! A fixed-capacity buffer subdivided into uniform slots for small-object
//! pooling. Free slots form an implicit singly-linked list: the first byte of
//! each free slot holds the index of the next free slot, so the list costs no
//! memory beyond the buffer itself. The one-byte index is also the hard cap:
//! a chunk can never hold more than 255 slots.

use crate::error::MemoryError;

/// Hard cap on slots per chunk, imposed by the one-byte free-list index.
pub(crate) const MAX_SLOTS_PER_CHUNK: u8 = 255;

/// A fixed-size raw buffer carved into uniform slots.
///
/// `base` is the chunk's position in its owning bin's stable address space;
/// chunks are never destroyed before their bin, so a slot address stays valid
/// for the lifetime of the pool.
#[derive(Debug)]
pub(crate) struct Chunk {
    data: Box<[u8]>,
    base: u32,
    slots: u8,
    first_free: u8,
    free_count: u8,
}

impl Chunk {
    /// Allocates the buffer and threads the free list through it.
    ///
    /// # Panics
    ///
    /// Panics if the capacity/slot-size combination implies zero slots or
    /// more than [`MAX_SLOTS_PER_CHUNK`]. Both are configuration defects,
    /// not runtime conditions.
    pub(crate) fn new(slot_size: u32, capacity: u32, base: u32) -> Self {
        let blocks = capacity / slot_size;
        assert!(blocks >= 1, "chunk capacity {capacity} cannot hold a single {slot_size}-byte slot");
        assert!(
            blocks <= u32::from(MAX_SLOTS_PER_CHUNK),
            "chunk would need {blocks} slots; the one-byte free list caps at {MAX_SLOTS_PER_CHUNK}"
        );

        let mut data = vec![0u8; capacity as usize].into_boxed_slice();
        for i in 0..blocks {
            // Each free slot's first byte points at the next slot; the last
            // one holds the out-of-range sentinel `blocks`, never followed
            // because the free count reaches zero first.
            data[(i * slot_size) as usize] = (i + 1) as u8;
        }

        Self {
            data,
            base,
            slots: blocks as u8,
            first_free: 0,
            free_count: blocks as u8,
        }
    }

    /// Pops the head of the free list. Returns the slot's address in the
    /// owning bin's space, or `None` if the chunk is full.
    pub(crate) fn alloc(&mut self, slot_size: u32) -> Option<u32> {
        if self.free_count == 0 {
            return None;
        }
        let offset = u32::from(self.first_free) * slot_size;
        self.first_free = self.data[offset as usize];
        self.free_count -= 1;
        Some(self.base + offset)
    }

    /// Returns a slot to the free list.
    ///
    /// A stray address would silently corrupt the free list, so the slot grid
    /// is verified first: the address must be slot-aligned and its index must
    /// name a real slot.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corruption`] for an address off the grid.
    pub(crate) fn purge(&mut self, addr: u32, slot_size: u32) -> Result<(), MemoryError> {
        let offset = addr - self.base;
        if offset % slot_size != 0 {
            return Err(MemoryError::Corruption {
                offset: addr as usize,
                detail: format!("address not aligned to the {slot_size}-byte slot grid"),
            });
        }
        let index = offset / slot_size;
        if index >= u32::from(self.slots()) {
            return Err(MemoryError::Corruption {
                offset: addr as usize,
                detail: format!("slot index {index} out of range ({} slots)", self.slots),
            });
        }
        self.data[offset as usize] = self.first_free;
        self.first_free = index as u8;
        self.free_count += 1;
        Ok(())
    }

    /// Whether `addr` falls inside this chunk's address range.
    pub(crate) fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.base + self.data.len() as u32
    }

    /// Whether at least one slot is free.
    pub(crate) const fn has_free(&self) -> bool {
        self.free_count > 0
    }

    /// Number of free slots.
    pub(crate) const fn free_count(&self) -> u8 {
        self.free_count
    }

    /// Total number of slots.
    pub(crate) const fn slots(&self) -> u8 {
        self.slots
    }

    /// Read-only view of the slot at `addr`.
    pub(crate) fn slot(&self, addr: u32, slot_size: u32) -> &[u8] {
        let offset = (addr - self.base) as usize;
        &self.data[offset..offset + slot_size as usize]
    }

    /// Mutable view of the slot at `addr`.
    pub(crate) fn slot_mut(&mut self, addr: u32, slot_size: u32) -> &mut [u8] {
        let offset = (addr - self.base) as usize;
        &mut self.data[offset..offset + slot_size as usize]
    }
}
