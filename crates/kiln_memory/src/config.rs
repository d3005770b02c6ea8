//! # Memory Configuration
//!
//! Contract constants for the kiln allocators, loaded once at startup from a
//! TOML file or taken from [`Default`]s. Every constant that defines the
//! allocation contract lives here: pool capacity (bin count derives from it),
//! chunk capacity, small-object threshold, and the minimum granule.
//!
//! **CRITICAL:** These values shape every boundary tag in a region's pool.
//! Changing them invalidates any serialized handle from a previous run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::block::MIN_GRANULE;
use crate::chunk::MAX_SLOTS_PER_CHUNK;
use crate::error::MemoryError;

// =============================================================================
// REFERENCE CONSTANTS
// =============================================================================

/// Default region pool capacity in bytes (2^15).
pub const DEFAULT_POOL_SIZE: usize = 32_768;

/// Default chunk capacity in bytes. 2040 yields exactly 255 slots at the
/// 8-byte granule, the hard cap of the one-byte slot index.
pub const DEFAULT_CHUNK_CAPACITY: u32 = 2_040;

/// Default small-object threshold: requests above this bypass the pool.
pub const DEFAULT_THRESHOLD: usize = 256;

/// Default minimum slot size for the small-object pool.
pub const DEFAULT_MIN_SIZE: usize = 8;

/// Configuration for the whole memory subsystem.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Arena region parameters.
    pub region: RegionConfig,
    /// Small-object pool parameters.
    pub pool: PoolConfig,
}

/// Configuration for an arena [`Region`](crate::Region).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Fixed pool capacity in bytes. Must be a power of two, at least 64,
    /// and below 2^31 (the top bit of the tag size field is the occupied
    /// flag).
    pub pool_size: usize,
}

/// Configuration for a [`SmallObjectPool`](crate::SmallObjectPool).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Capacity of each chunk in bytes.
    pub chunk_capacity: u32,
    /// Requests larger than this bypass the pool entirely.
    pub threshold: usize,
    /// Minimum slot size; size classes step in multiples of this.
    pub min_size: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            threshold: DEFAULT_THRESHOLD,
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

impl MemoryConfig {
    /// Loads and validates a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] if the file cannot be read or
    /// parsed, or if validation fails.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, MemoryError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MemoryError::InvalidConfig(format!("cannot read config file: {e}")))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| MemoryError::InvalidConfig(format!("cannot parse config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), MemoryError> {
        self.region.validate()?;
        self.pool.validate()
    }
}

impl RegionConfig {
    /// Number of power-of-two bins this pool size implies: classes
    /// `2^3 ..= pool_size` (13 bins for the 32768-byte default).
    #[must_use]
    pub const fn num_bins(&self) -> usize {
        self.pool_size.trailing_zeros() as usize - 2
    }

    /// Validates the region parameters.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if !self.pool_size.is_power_of_two() {
            return Err(MemoryError::InvalidConfig(format!(
                "region.pool_size must be a power of two, got {}",
                self.pool_size
            )));
        }
        if self.pool_size < 64 {
            return Err(MemoryError::InvalidConfig(format!(
                "region.pool_size must be at least 64 bytes, got {}",
                self.pool_size
            )));
        }
        if self.pool_size >= 1 << 31 {
            return Err(MemoryError::InvalidConfig(format!(
                "region.pool_size must stay below 2^31, got {}",
                self.pool_size
            )));
        }
        Ok(())
    }
}

impl PoolConfig {
    /// Number of entries in the size-class map. One more than
    /// `threshold / min_size`: a request of exactly `threshold` bytes is
    /// still pooled and floor-divides to the last entry.
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        self.threshold / self.min_size + 1
    }

    /// Validates the pool parameters.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.min_size < MIN_GRANULE || self.min_size % MIN_GRANULE != 0 {
            return Err(MemoryError::InvalidConfig(format!(
                "pool.min_size must be a multiple of {MIN_GRANULE}, got {}",
                self.min_size
            )));
        }
        if self.threshold < self.min_size || self.threshold % self.min_size != 0 {
            return Err(MemoryError::InvalidConfig(format!(
                "pool.threshold must be a multiple of pool.min_size, got {}",
                self.threshold
            )));
        }
        if (self.chunk_capacity as usize) < self.threshold {
            return Err(MemoryError::InvalidConfig(format!(
                "pool.chunk_capacity {} cannot hold one slot of the largest pooled size {}",
                self.chunk_capacity, self.threshold
            )));
        }
        if self.chunk_capacity as usize / self.min_size > MAX_SLOTS_PER_CHUNK as usize {
            return Err(MemoryError::InvalidConfig(format!(
                "pool.chunk_capacity {} / pool.min_size {} exceeds {} slots per chunk",
                self.chunk_capacity, self.min_size, MAX_SLOTS_PER_CHUNK
            )));
        }
        Ok(())
    }
}
