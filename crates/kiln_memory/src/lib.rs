//! # KILN Memory
//!
//! Fixed-capacity allocation arenas for subsystems that must not touch the
//! general heap on their hot path:
//!
//! - [`Region`]: a boundary-tagged arena with power-of-two free-list bins,
//!   O(1) physical coalescing, and magic-number corruption detection
//! - [`SmallObjectPool`]: chunked uniform-slot pools for high-frequency
//!   small allocations, with an over-threshold heap bypass
//!
//! ## Architecture Rules
//!
//! 1. **Fixed capacity** - A region's pool is allocated once and never
//!    resized; exhaustion is a recoverable error, not a growth event
//! 2. **Perfect tiling** - Occupied blocks and binned free blocks always
//!    account for every byte of the pool, with no gaps and no overlaps
//! 3. **Fail loudly on corruption** - Boundary tags are verified on every
//!    release; a failed check logs the full internal state before returning
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_memory::Region;
//!
//! let mut region = Region::new(0);
//! let handle = region.allocate(256)?;
//! region.get_mut(handle)?.fill(0);
//! region.release(handle)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod bin;
mod block;
mod chunk;
pub mod config;
pub mod error;
pub mod pool;
pub mod region;
pub mod sync;

pub use config::{
    MemoryConfig, PoolConfig, RegionConfig, DEFAULT_CHUNK_CAPACITY, DEFAULT_MIN_SIZE,
    DEFAULT_POOL_SIZE, DEFAULT_THRESHOLD,
};
pub use error::MemoryError;
pub use pool::{SmallHandle, SmallObjectPool};
pub use region::{BlockHandle, Region};
pub use sync::SharedRegion;
