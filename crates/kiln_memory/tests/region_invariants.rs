//! Whole-pool invariant tests for the arena region: perfect tiling, block
//! disjointness, pre-flight agreement, and exhaustion behavior.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kiln_memory::{BlockHandle, MemoryError, Region, RegionConfig};

/// Every byte of the pool is either occupied or binned, at every step.
fn assert_tiled(region: &Region) {
    assert_eq!(
        region.allocated_bytes() + region.free_bytes(),
        region.capacity(),
        "pool tiling broken"
    );
}

#[test]
fn random_churn_preserves_tiling() {
    let mut rng = StdRng::seed_from_u64(0x6B69_6C6E);
    let mut region = Region::new(0);
    let mut live: Vec<BlockHandle> = Vec::new();

    for _ in 0..2_000 {
        if live.is_empty() || (rng.gen_bool(0.6) && live.len() < 64) {
            let size = rng.gen_range(1..=2_048);
            match region.allocate(size) {
                Ok(handle) => live.push(handle),
                Err(MemoryError::OutOfMemory { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        } else {
            let victim = live.swap_remove(rng.gen_range(0..live.len()));
            region.release(victim).unwrap();
        }
        assert_tiled(&region);
    }

    for handle in live {
        region.release(handle).unwrap();
    }
    assert_eq!(region.allocated_bytes(), 0);
    assert_eq!(region.free_bytes(), region.capacity());
}

#[test]
fn live_blocks_never_overlap() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut region = Region::new(0);
    let mut live: Vec<BlockHandle> = Vec::new();

    for _ in 0..200 {
        let size = rng.gen_range(8..=512);
        if let Ok(handle) = region.allocate(size) {
            live.push(handle);
        }
    }
    assert!(live.len() > 10, "churn produced too few blocks to check");

    // Payload spans, extended by the 8-byte tag on each side, must be
    // pairwise disjoint.
    let mut spans: Vec<(usize, usize)> = live
        .iter()
        .map(|&h| {
            let len = region.get(h).unwrap().len();
            (h.offset() - 8, h.offset() + len + 8)
        })
        .collect();
    spans.sort_unstable();
    for pair in spans.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "blocks {:?} and {:?} overlap",
            pair[0],
            pair[1]
        );
    }

    for handle in live {
        region.release(handle).unwrap();
    }
}

#[test]
fn can_satisfy_agrees_with_allocate() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut region = Region::new(0);
    let mut live: Vec<BlockHandle> = Vec::new();

    for _ in 0..500 {
        let size = rng.gen_range(1..=4_096);
        let promised = region.can_satisfy(size);
        match region.allocate(size) {
            Ok(handle) => {
                assert!(promised, "allocate succeeded after can_satisfy said no");
                if rng.gen_bool(0.5) {
                    region.release(handle).unwrap();
                } else {
                    live.push(handle);
                }
            }
            Err(MemoryError::OutOfMemory { .. }) => {
                assert!(!promised, "can_satisfy promised a block allocate denied");
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn half_pool_block_cannot_be_doubled() {
    let mut region = Region::new(0);

    // A small round trip leaves the pool fully usable.
    let probe = region.allocate(40).unwrap();
    region.release(probe).unwrap();
    assert!(region.can_satisfy(40));

    // 16400 + 16 overhead exceeds the 16384 class, so the first request
    // carves the whole-pool block.
    let first = region.allocate(16_400).unwrap();

    // More than 16000 bytes remain free, but the largest surviving class is
    // 8192: a second identical request must be denied up front.
    assert!(region.free_bytes() > 16_000);
    assert!(!region.can_satisfy(16_400));
    assert!(matches!(
        region.allocate(16_400),
        Err(MemoryError::OutOfMemory { .. })
    ));

    // Small requests are unaffected.
    let small = region.allocate(40).unwrap();
    region.release(small).unwrap();

    region.release(first).unwrap();
    assert!(region.can_satisfy(16_400));
    assert_eq!(region.free_bytes(), region.capacity());
}

#[test]
fn coalescing_rebuilds_large_classes() {
    let mut region = Region::new(0);
    let first = region.allocate(16_400).unwrap();
    let second = region.allocate(8_000).unwrap();

    // Coalescing only looks forward, so the higher-addressed block goes
    // back first; the front block then merges across it to the pool end.
    region.release(second).unwrap();
    assert!(!region.can_satisfy(16_400));
    region.release(first).unwrap();
    assert!(region.can_satisfy(16_400));
}

#[test]
fn custom_pool_size_scales_the_bins() {
    let config = RegionConfig { pool_size: 1 << 16 };
    let mut region = Region::with_config(0, &config).unwrap();
    assert_eq!(region.capacity(), 65_536);

    // A request over half the default pool fits in one piece here.
    let handle = region.allocate(40_000).unwrap();
    region.release(handle).unwrap();
    assert_eq!(region.free_bytes(), 65_536);
}

#[test]
fn rejects_invalid_pool_size() {
    let config = RegionConfig { pool_size: 12_345 };
    assert!(matches!(
        Region::with_config(0, &config),
        Err(MemoryError::InvalidConfig(_))
    ));
}

#[test]
fn payloads_are_isolated() {
    let mut region = Region::new(0);
    let a = region.allocate(64).unwrap();
    let b = region.allocate(64).unwrap();

    region.get_mut(a).unwrap().fill(0x11);
    region.get_mut(b).unwrap().fill(0x22);

    assert!(region.get(a).unwrap().iter().all(|&x| x == 0x11));
    assert!(region.get(b).unwrap().iter().all(|&x| x == 0x22));

    region.release(a).unwrap();
    region.release(b).unwrap();
}
