//! # Arena Region
//!
//! A fixed-capacity memory pool subdivided into power-of-two size classes
//! with intrusive free lists, boundary-tag headers/footers for O(1) physical
//! coalescing, and magic-number corruption checks.
//!
//! The pool is one contiguous byte buffer owned by the region for its whole
//! lifetime; it is never resized. At every quiescent point the occupied
//! blocks and the blocks held in bins exactly tile the pool with no gaps and
//! no overlaps.
//!
//! ## Why a 24-byte bin
//!
//! Free blocks carry a 12-byte intrusive node, so an 8-byte fragment can
//! never stand alone as a free block. Whenever carving or redistribution
//! would end in a 16+8 split, the run is stopped at 24 bytes and the whole
//! remainder parked in a dedicated 24-byte bin.
//!
//! ## Thread Safety
//!
//! A region is NOT thread-safe. Coalescing inspects and mutates blocks
//! physically adjacent to the one being released, so concurrent consumers
//! must serialize whole operations; see [`SharedRegion`](crate::SharedRegion).
//!
//! # Example
//!
//! ```rust,ignore
//! let mut region = Region::new(0);
//!
//! let handle = region.allocate(40)?;
//! region.get_mut(handle)?[0] = 7;
//! region.release(handle)?;
//! ```

use std::fmt::Write;

use crate::bin::Bin;
use crate::block::{
    align_granule, read_size_field, read_tag, write_tag, BoundaryTag, BLOCK_OVERHEAD, MAGIC,
    MIN_GRANULE, OCCUPIED_MASK, TAG_SIZE,
};
use crate::config::RegionConfig;
use crate::error::MemoryError;

/// Block size of the fragmentation-absorbing odd bin.
const ODD_BIN_SIZE: usize = 24;

/// Handle to an occupied block in a [`Region`].
///
/// Obtained from [`Region::allocate`]; resolves to payload bytes through
/// [`Region::get`] / [`Region::get_mut`]. Stale handles (released blocks)
/// are detected by the boundary-tag checks rather than by the type system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    offset: usize,
}

impl BlockHandle {
    /// Byte offset of the payload inside the region's pool.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

/// A fixed-capacity arena with segregated free-list bins.
pub struct Region {
    /// The backing pool. All free-list links and boundary tags live inside
    /// these bytes at computed offsets.
    pool: Box<[u8]>,
    /// One bin per power-of-two class, smallest (8 bytes) first.
    bins: Vec<Bin>,
    /// The 24-byte fragmentation absorber; not a power-of-two class.
    odd_bin: Bin,
    /// Index stamped into every tag this region writes.
    index: u16,
    /// Bytes currently occupied, tag overhead included.
    allocated: usize,
}

impl Region {
    /// Creates a region with the default 32768-byte pool.
    #[must_use]
    pub fn new(index: u16) -> Self {
        Self::build(index, RegionConfig::default().pool_size)
    }

    /// Creates a region from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn with_config(index: u16, config: &RegionConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        Ok(Self::build(index, config.pool_size))
    }

    fn build(index: u16, pool_size: usize) -> Self {
        let mut pool = vec![0u8; pool_size].into_boxed_slice();
        let num_bins = pool_size.trailing_zeros() as usize - 2;
        let mut bins: Vec<Bin> = (0..num_bins).map(|i| Bin::new(1 << (i + 3))).collect();

        // Prime the largest bin with the whole pool as one free block.
        if let Some(largest) = bins.last_mut() {
            largest.push(&mut pool, 0);
        }

        Self {
            pool,
            bins,
            odd_bin: Bin::new(ODD_BIN_SIZE as u32),
            index,
            allocated: 0,
        }
    }

    /// Total pool capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    /// Bytes currently occupied, including the 16 bytes of tag overhead
    /// carried by every block.
    #[inline]
    #[must_use]
    pub const fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Bytes currently held across all bins (free-list walk). Together with
    /// [`Self::allocated_bytes`] this always accounts for the whole pool.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        let from_bins: usize = self.bins.iter().map(|b| b.free_bytes(&self.pool)).sum();
        from_bins + self.odd_bin.free_bytes(&self.pool)
    }

    /// Allocates `size` payload bytes.
    ///
    /// The request is rounded up to the 8-byte granule and carries 16 bytes
    /// of boundary-tag overhead. The search is first-fit among power-of-two
    /// classes starting from the smallest: if small classes are empty a much
    /// larger block may be carved, accepting internal fragmentation. Any
    /// remainder of the carved block is redistributed back into the bins.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfMemory`] if no bin can satisfy the
    /// request. Callers that cannot undo work cheaply should pre-flight with
    /// [`Self::can_satisfy`].
    pub fn allocate(&mut self, size: usize) -> Result<BlockHandle, MemoryError> {
        let total = align_granule(size)
            .and_then(|aligned| aligned.checked_add(BLOCK_OVERHEAD))
            .ok_or(MemoryError::OutOfMemory { requested: size })?;

        let mut chosen = None;
        for (i, bin) in self.bins.iter().enumerate() {
            if bin.size() as usize >= total && !bin.is_empty() {
                chosen = Some(i);
                break;
            }
        }
        let Some(idx) = chosen else {
            return Err(MemoryError::OutOfMemory { requested: size });
        };
        let Some(offset) = self.bins[idx].pop(&mut self.pool) else {
            return Err(MemoryError::OutOfMemory { requested: size });
        };
        let block_size = self.bins[idx].size() as usize;

        // An 8-byte remainder cannot host a free node; absorb it into the
        // carved block instead.
        let mut carve = total;
        if block_size - carve == MIN_GRANULE {
            carve += MIN_GRANULE;
        }

        let start = offset as usize;
        let tag = BoundaryTag::occupied(carve as u32, self.index);
        write_tag(&mut self.pool, start, tag);
        write_tag(&mut self.pool, start + carve - TAG_SIZE, tag);

        let remainder = block_size - carve;
        if remainder > 0 {
            self.distribute_core(start + carve, remainder);
        }

        self.allocated += carve;
        Ok(BlockHandle {
            offset: start + TAG_SIZE,
        })
    }

    /// Releases a block, coalescing it with free physical neighbors.
    ///
    /// Forward coalescing: successive physically-adjacent free blocks are
    /// absorbed and unlinked from their bins until an occupied block or the
    /// end of the pool stops the run. The merged block is then redistributed
    /// into the bins.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corruption`] if a boundary-tag check fails,
    /// meaning a buffer overrun or a double release. The full internal state is
    /// logged at `error` level first; callers are not expected to continue
    /// using the region afterwards.
    pub fn release(&mut self, handle: BlockHandle) -> Result<(), MemoryError> {
        let (head, size) = match self.checked_header(handle) {
            Ok(v) => v,
            Err(e) => return Err(self.report_corruption(e)),
        };
        self.allocated -= size;

        let pool_len = self.pool.len();
        let block = head;
        let mut block_size = size;
        while block + block_size < pool_len {
            let field = read_size_field(&self.pool, block + block_size);
            if field & OCCUPIED_MASK != 0 {
                break;
            }
            let neighbor = block + block_size;
            let neighbor_size = field as usize;
            if neighbor_size == 0 || !self.unlink_free(neighbor as u32, neighbor_size) {
                return Err(self.report_corruption(MemoryError::Corruption {
                    offset: neighbor,
                    detail: format!(
                        "free neighbor of size {neighbor_size} missing from every bin"
                    ),
                }));
            }
            block_size += neighbor_size;
        }

        self.distribute_core(block, block_size);
        Ok(())
    }

    /// Pre-flight check: can any bin currently satisfy `size` payload bytes?
    ///
    /// Scans from the largest class down; returns `false` as soon as a class
    /// is too small (all remaining classes are smaller still), `true` at the
    /// first non-empty class that fits.
    #[must_use]
    pub fn can_satisfy(&self, size: usize) -> bool {
        let Some(total) = align_granule(size).and_then(|a| a.checked_add(BLOCK_OVERHEAD)) else {
            return false;
        };
        for bin in self.bins.iter().rev() {
            if (bin.size() as usize) < total {
                return false;
            }
            if !bin.is_empty() {
                return true;
            }
        }
        false
    }

    /// Checked read-only access to a block's payload bytes.
    ///
    /// The payload is the granule-rounded request plus any absorbed 8-byte
    /// remainder, so it may be slightly larger than asked for.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corruption`] / [`MemoryError::UnknownBlock`]
    /// if the handle does not name a live, intact block.
    pub fn get(&self, handle: BlockHandle) -> Result<&[u8], MemoryError> {
        let (head, size) = self.checked_header(handle)?;
        Ok(&self.pool[handle.offset..head + size - TAG_SIZE])
    }

    /// Checked mutable access to a block's payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corruption`] / [`MemoryError::UnknownBlock`]
    /// if the handle does not name a live, intact block.
    pub fn get_mut(&mut self, handle: BlockHandle) -> Result<&mut [u8], MemoryError> {
        let (head, size) = self.checked_header(handle)?;
        Ok(&mut self.pool[handle.offset..head + size - TAG_SIZE])
    }

    /// Renders the full bin and pool layout as text, for a logging
    /// collaborator. Purely observational; occupied blocks print as
    /// `1 : offset : size`, free blocks as `0 : offset : size`.
    #[must_use]
    pub fn dump_internals(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "region {} ({} bytes)", self.index, self.pool.len());
        for bin in &self.bins {
            bin.dump(&self.pool, &mut out);
        }
        let _ = writeln!(out, "24 byte bin");
        self.odd_bin.dump(&self.pool, &mut out);

        let _ = writeln!(out, "pool map:");
        let mut offset = 0;
        while offset < self.pool.len() {
            let field = read_size_field(&self.pool, offset);
            if field == 0 {
                let _ = writeln!(out, "!! zero-sized block at {offset:#07x}, walk aborted");
                break;
            }
            if field & OCCUPIED_MASK != 0 {
                let size = (field & !OCCUPIED_MASK) as usize;
                let _ = writeln!(out, "1 : {offset:#07x} : {size}");
                offset += size;
            } else {
                let _ = writeln!(out, "0 : {offset:#07x} : {field}");
                offset += field as usize;
            }
        }
        out
    }

    /// Verifies the boundary tags of the block behind `handle` and returns
    /// `(header offset, block size)`.
    fn checked_header(&self, handle: BlockHandle) -> Result<(usize, usize), MemoryError> {
        if handle.offset < TAG_SIZE || handle.offset > self.pool.len() {
            return Err(MemoryError::UnknownBlock {
                addr: handle.offset,
            });
        }
        let head = handle.offset - TAG_SIZE;
        let tag = read_tag(&self.pool, head);
        if tag.magic != MAGIC || !tag.is_occupied() || tag.region != self.index {
            return Err(MemoryError::Corruption {
                offset: head,
                detail: "bad header tag: double release or memory corruption".to_string(),
            });
        }
        let size = tag.block_size();
        if size < BLOCK_OVERHEAD || head + size > self.pool.len() {
            return Err(MemoryError::Corruption {
                offset: head,
                detail: format!("header size {size} out of range"),
            });
        }
        let footer = read_tag(&self.pool, head + size - TAG_SIZE);
        if footer.magic != MAGIC || footer.size != tag.size {
            return Err(MemoryError::Corruption {
                offset: head + size - TAG_SIZE,
                detail: "footer tag disagrees with header".to_string(),
            });
        }
        Ok((head, size))
    }

    /// Unlinks a free block of known size from whichever bin holds it. The
    /// 24-byte bin is checked as a distinct case since it is not a
    /// power-of-two class.
    fn unlink_free(&mut self, offset: u32, size: usize) -> bool {
        if size == ODD_BIN_SIZE {
            return self.odd_bin.remove(&mut self.pool, offset);
        }
        for bin in &mut self.bins {
            if bin.size() as usize == size {
                return bin.remove(&mut self.pool, offset);
            }
        }
        false
    }

    /// Redistributes a free block back into the bins, greedily from the
    /// largest class down. Must consume the entire block: an unconsumed
    /// remainder is a defect and fails loudly.
    fn distribute_core(&mut self, mut offset: usize, mut size: usize) {
        assert!(
            size > MIN_GRANULE,
            "block of {size} bytes cannot host a free node"
        );
        let pool = &mut self.pool;
        for bin in self.bins.iter_mut().rev() {
            if size == 0 {
                break;
            }
            // A run that would end 16+8 is stopped here and parked whole,
            // since an 8-byte block can never stand alone.
            if size == ODD_BIN_SIZE {
                self.odd_bin.push(pool, offset as u32);
                size = 0;
                break;
            }
            let bin_size = bin.size() as usize;
            if bin_size <= size && size - bin_size != MIN_GRANULE {
                bin.push(pool, offset as u32);
                offset += bin_size;
                size -= bin_size;
            }
        }
        assert!(size == 0, "distribute left {size} orphan bytes at {offset}");
    }

    /// Logs the failure and the full internal dump before handing the error
    /// back to the caller.
    fn report_corruption(&self, error: MemoryError) -> MemoryError {
        tracing::error!(
            region = self.index,
            "{error}; dumping internals:\n{}",
            self.dump_internals()
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_region_holds_whole_pool_in_largest_bin() {
        let region = Region::new(0);
        assert_eq!(region.capacity(), 32_768);
        assert_eq!(region.allocated_bytes(), 0);
        assert_eq!(region.free_bytes(), 32_768);
    }

    #[test]
    fn allocate_carves_and_redistributes_exactly() {
        let mut region = Region::new(0);
        let handle = region.allocate(40).unwrap();

        // 40 + 16 overhead = 56 carved; the rest must be back in bins.
        assert_eq!(region.allocated_bytes(), 56);
        assert_eq!(region.free_bytes(), 32_768 - 56);
        assert_eq!(region.get(handle).unwrap().len(), 40);
    }

    #[test]
    fn eight_byte_remainder_is_absorbed() {
        let mut region = Region::new(0);
        // The first carve's redistribution ends in an exact 32-byte run,
        // priming the 32-byte bin.
        let first = region.allocate(16).unwrap();

        // Payload 8 needs 24 bytes; the 32-byte block leaves an 8-byte
        // remainder, which is absorbed instead of redistributed.
        let absorbed = region.allocate(8).unwrap();
        assert_eq!(region.get(absorbed).unwrap().len(), 16);
        assert_eq!(region.allocated_bytes(), 32 + 32);

        region.release(absorbed).unwrap();
        region.release(first).unwrap();
        assert_eq!(region.free_bytes(), 32_768);
    }

    #[test]
    fn release_restores_full_tiling() {
        let mut region = Region::new(0);
        let a = region.allocate(100).unwrap();
        let b = region.allocate(500).unwrap();
        region.release(a).unwrap();
        region.release(b).unwrap();

        assert_eq!(region.allocated_bytes(), 0);
        assert_eq!(region.free_bytes(), 32_768);
    }

    #[test]
    fn payload_writes_round_trip() {
        let mut region = Region::new(7);
        let handle = region.allocate(64).unwrap();
        region.get_mut(handle).unwrap().fill(0xAB);
        assert!(region.get(handle).unwrap().iter().all(|&b| b == 0xAB));
        region.release(handle).unwrap();
    }

    #[test]
    fn footer_overwrite_is_detected_on_release() {
        let mut region = Region::new(0);
        let handle = region.allocate(40).unwrap();

        // Scribble one byte past the payload, into the footer tag.
        let end = handle.offset() + region.get(handle).unwrap().len();
        region.pool[end] ^= 0xFF;

        assert!(matches!(
            region.release(handle),
            Err(MemoryError::Corruption { .. })
        ));
    }

    #[test]
    fn double_release_is_detected() {
        let mut region = Region::new(0);
        let handle = region.allocate(40).unwrap();
        region.release(handle).unwrap();

        assert!(matches!(
            region.release(handle),
            Err(MemoryError::Corruption { .. })
        ));
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut region = Region::new(0);
        let foreign = BlockHandle { offset: 0 };
        assert!(matches!(
            region.release(foreign),
            Err(MemoryError::UnknownBlock { .. })
        ));
    }

    #[test]
    fn foreign_region_stamp_is_rejected() {
        let mut region = Region::new(5);
        let handle = region.allocate(32).unwrap();

        // Re-stamp both tags with another region's index; the block is
        // otherwise intact.
        let head = handle.offset() - TAG_SIZE;
        let forged = BoundaryTag::occupied(48, 4);
        write_tag(&mut region.pool, head, forged);
        write_tag(&mut region.pool, head + 48 - TAG_SIZE, forged);

        assert!(matches!(
            region.release(handle),
            Err(MemoryError::Corruption { .. })
        ));
    }

    #[test]
    fn near_max_requests_are_out_of_memory() {
        let mut region = Region::new(0);
        // Sizes where even granule rounding would overflow must come back
        // as a clean denial, never wrap.
        for size in [usize::MAX, usize::MAX - 6, usize::MAX - 16] {
            assert!(matches!(
                region.allocate(size),
                Err(MemoryError::OutOfMemory { .. })
            ));
            assert!(!region.can_satisfy(size));
        }
        assert_eq!(region.allocated_bytes(), 0);
        assert_eq!(region.free_bytes(), 32_768);
    }

    #[test]
    fn can_satisfy_tracks_bin_state() {
        let mut region = Region::new(0);
        assert!(region.can_satisfy(1_000));
        assert!(!region.can_satisfy(40_000));

        let handle = region.allocate(16_400).unwrap();
        assert!(!region.can_satisfy(16_400));
        region.release(handle).unwrap();
        assert!(region.can_satisfy(16_400));
    }

    #[test]
    fn dump_internals_walks_the_whole_map() {
        let mut region = Region::new(0);
        let _keep = region.allocate(100).unwrap();
        let dump = region.dump_internals();

        assert!(dump.contains("pool map:"));
        assert!(dump.contains("1 : "));
        assert!(dump.contains("0 : "));
        assert!(!dump.contains("walk aborted"));
    }
}
