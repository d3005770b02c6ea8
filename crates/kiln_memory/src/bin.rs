//! # Free-List Bin
//!
//! An intrusive doubly-linked list of same-sized free blocks. The bin owns no
//! memory of its own: the links live inside the pool bytes as [`FreeNode`]
//! overlays, and every operation borrows the pool it works over.
//!
//! Invariant: every node reachable from `head` has `size == self.size`.

use std::fmt::Write;

use crate::block::{read_node, write_node, FreeNode, NIL};

/// A size class: one fixed block size and the head of its free list.
#[derive(Debug)]
pub(crate) struct Bin {
    size: u32,
    head: u32,
}

impl Bin {
    /// Creates an empty bin for blocks of `size` bytes.
    pub(crate) const fn new(size: u32) -> Self {
        Self { size, head: NIL }
    }

    /// The fixed block size this bin manages.
    pub(crate) const fn size(&self) -> u32 {
        self.size
    }

    /// O(1) head check.
    pub(crate) const fn is_empty(&self) -> bool {
        self.head == NIL
    }

    /// Prepends the block at `offset` to the list, stamping the bin's size
    /// into its free node.
    pub(crate) fn push(&mut self, pool: &mut [u8], offset: u32) {
        if self.head != NIL {
            let mut old = read_node(pool, self.head as usize);
            old.prev = offset;
            write_node(pool, self.head as usize, old);
        }
        write_node(
            pool,
            offset as usize,
            FreeNode {
                size: self.size,
                prev: NIL,
                next: self.head,
            },
        );
        self.head = offset;
    }

    /// Removes and returns the head block, or `None` if the bin is empty.
    pub(crate) fn pop(&mut self, pool: &mut [u8]) -> Option<u32> {
        if self.head == NIL {
            return None;
        }
        let offset = self.head;
        let node = read_node(pool, offset as usize);
        self.head = node.next;
        if self.head != NIL {
            let mut next = read_node(pool, self.head as usize);
            next.prev = NIL;
            write_node(pool, self.head as usize, next);
        }
        Some(offset)
    }

    /// Unlinks an arbitrary block from the middle of the list. Used during
    /// coalescing, when a physical neighbor is absorbed and must leave
    /// whichever bin currently holds it.
    ///
    /// Returns `false` if the node's stamped size does not match this bin.
    pub(crate) fn remove(&mut self, pool: &mut [u8], offset: u32) -> bool {
        let node = read_node(pool, offset as usize);
        if node.size != self.size {
            return false;
        }
        if node.next != NIL {
            let mut next = read_node(pool, node.next as usize);
            next.prev = node.prev;
            write_node(pool, node.next as usize, next);
        }
        if node.prev == NIL {
            self.head = node.next;
        } else {
            let mut prev = read_node(pool, node.prev as usize);
            prev.next = node.next;
            write_node(pool, node.prev as usize, prev);
        }
        true
    }

    /// Total bytes held by this bin (list walk).
    pub(crate) fn free_bytes(&self, pool: &[u8]) -> usize {
        self.len(pool) * self.size as usize
    }

    /// Number of blocks in the list (list walk).
    pub(crate) fn len(&self, pool: &[u8]) -> usize {
        let mut count = 0;
        let mut cursor = self.head;
        while cursor != NIL {
            count += 1;
            cursor = read_node(pool, cursor as usize).next;
        }
        count
    }

    /// Renders the bin's list into `out`, one line per block.
    pub(crate) fn dump(&self, pool: &[u8], out: &mut String) {
        let _ = writeln!(out, "bin size {}", self.size);
        let mut cursor = self.head;
        while cursor != NIL {
            let node = read_node(pool, cursor as usize);
            let _ = writeln!(out, "  block {:#07x} size {}", cursor, node.size);
            cursor = node.next;
        }
    }
}
