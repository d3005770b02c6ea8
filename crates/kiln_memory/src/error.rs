//! # Memory Error Types
//!
//! All errors that can escape the kiln allocators.
//!
//! Only [`MemoryError::OutOfMemory`] is expected to be handled in normal
//! operation (free something and retry, or fall back to the host heap).
//! The remaining variants indicate a misused or damaged allocator and are
//! logged with a full internal dump before being returned.

use thiserror::Error;

/// Errors that can occur in the memory subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// No free block can satisfy the request. The allocator never grows its
    /// pool; the caller may retry after releasing something.
    #[error("out of memory: no free block can satisfy {requested} bytes")]
    OutOfMemory {
        /// The payload size that was requested, in bytes.
        requested: usize,
    },

    /// A boundary tag failed its magic/size check, or a slot address fell off
    /// its chunk's grid. Indicates a buffer overrun, a double release, or a
    /// damaged pool. Not recoverable.
    #[error("memory corruption at offset {offset}: {detail}")]
    Corruption {
        /// Pool/chunk offset at which the damage was detected.
        offset: usize,
        /// Human-readable description of the failed check.
        detail: String,
    },

    /// A release was attempted for an address this allocator does not own.
    #[error("address {addr} is not owned by this allocator")]
    UnknownBlock {
        /// The unowned address.
        addr: usize,
    },

    /// Invalid configuration file or parameter combination.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
