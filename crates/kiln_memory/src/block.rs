//! # Block Metadata
//!
//! Typed overlays for the two shapes a region block can take:
//!
//! - [`BoundaryTag`]: written at the start and mirrored at the end of every
//!   *occupied* block. Header and footer of a live block always agree; a
//!   mismatch means corruption or a double release.
//! - [`FreeNode`]: overlays the first bytes of a *free* block and carries the
//!   intrusive free-list links. Only valid while the block is free; the
//!   allocation header overwrites it when the block is carved out.
//!
//! Both are `Pod` structs read and written at computed byte offsets, so the
//! boundary-tag algorithm needs no pointer casts and no `unsafe`.

use bytemuck::{Pod, Zeroable};

/// The magic value stamped into every boundary tag, checked on release.
pub(crate) const MAGIC: u16 = 0xAAAA;

/// Top bit of the tag size field: set while the block is occupied.
pub(crate) const OCCUPIED_MASK: u32 = 0x8000_0000;

/// Size of one boundary tag in bytes.
pub(crate) const TAG_SIZE: usize = 8;

/// Per-block overhead: one tag at the head, one mirrored at the tail.
pub(crate) const BLOCK_OVERHEAD: usize = 2 * TAG_SIZE;

/// Size of an intrusive free node in bytes. An 8-byte block cannot host one,
/// which is why the region keeps a dedicated 24-byte bin.
pub(crate) const FREE_NODE_SIZE: usize = 12;

/// Minimum allocation granule; all block sizes are multiples of this.
pub(crate) const MIN_GRANULE: usize = 8;

/// Null link for intrusive offset-valued lists.
pub(crate) const NIL: u32 = u32::MAX;

/// Allocation header/footer written at both ends of an occupied block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct BoundaryTag {
    /// Block size in bytes (including both tags); top bit = occupied flag.
    pub size: u32,
    /// Magic value, for detecting corruption.
    pub magic: u16,
    /// Index of the owning region.
    pub region: u16,
}

impl BoundaryTag {
    /// Builds an occupied tag for a block of `size` bytes.
    pub(crate) fn occupied(size: u32, region: u16) -> Self {
        Self {
            size: size | OCCUPIED_MASK,
            magic: MAGIC,
            region,
        }
    }

    /// Block size with the occupied flag masked off.
    pub(crate) const fn block_size(self) -> usize {
        (self.size & !OCCUPIED_MASK) as usize
    }

    /// Whether the occupied flag is set.
    pub(crate) const fn is_occupied(self) -> bool {
        self.size & OCCUPIED_MASK != 0
    }
}

/// Intrusive free-list node overlaying the first bytes of a free block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct FreeNode {
    /// Block size in bytes; never carries the occupied flag.
    pub size: u32,
    /// Offset of the previous free block in the same bin, or [`NIL`].
    pub prev: u32,
    /// Offset of the next free block in the same bin, or [`NIL`].
    pub next: u32,
}

/// Reads a boundary tag at `offset`.
pub(crate) fn read_tag(pool: &[u8], offset: usize) -> BoundaryTag {
    bytemuck::pod_read_unaligned(&pool[offset..offset + TAG_SIZE])
}

/// Writes a boundary tag at `offset`.
pub(crate) fn write_tag(pool: &mut [u8], offset: usize, tag: BoundaryTag) {
    pool[offset..offset + TAG_SIZE].copy_from_slice(bytemuck::bytes_of(&tag));
}

/// Reads a free node at `offset`.
pub(crate) fn read_node(pool: &[u8], offset: usize) -> FreeNode {
    bytemuck::pod_read_unaligned(&pool[offset..offset + FREE_NODE_SIZE])
}

/// Writes a free node at `offset`.
pub(crate) fn write_node(pool: &mut [u8], offset: usize, node: FreeNode) {
    pool[offset..offset + FREE_NODE_SIZE].copy_from_slice(bytemuck::bytes_of(&node));
}

/// Reads the leading `size` field shared by both overlays. Occupied blocks
/// carry [`OCCUPIED_MASK`] in it, free blocks do not, which is what lets the
/// coalescing walk classify a neighbor without knowing its shape.
pub(crate) fn read_size_field(pool: &[u8], offset: usize) -> u32 {
    bytemuck::pod_read_unaligned(&pool[offset..offset + 4])
}

/// Rounds `size` up to the next multiple of the allocation granule, or
/// `None` when the rounding itself would overflow.
pub(crate) const fn align_granule(size: usize) -> Option<usize> {
    match size.checked_add(MIN_GRANULE - 1) {
        Some(bumped) => Some(bumped & !(MIN_GRANULE - 1)),
        None => None,
    }
}
