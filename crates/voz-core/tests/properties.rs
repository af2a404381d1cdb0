//! Property-based tests for the arena memory pool and the fast-math
//! kernels, using proptest for randomized input generation.

use proptest::prelude::*;
use voz_core::{Align, Arena, ErrorKind, fast_exp, fast_log};

fn align_from_index(i: usize) -> Align {
    match i % 3 {
        0 => Align::A16,
        1 => Align::A32,
        _ => Align::A64,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Any sequence of allocations whose aligned total fits the capacity
    /// succeeds, and no two live allocations alias.
    #[test]
    fn arena_live_allocations_never_alias(
        sizes in prop::collection::vec(1usize..2048, 1..32),
        aligns in prop::collection::vec(0usize..3, 32),
    ) {
        // Worst-case padding is align-1 per allocation; capacity covers it.
        let capacity: usize = sizes.iter().map(|s| s + 64).sum::<usize>().max(1024);
        let mut arena = Arena::with_capacity(capacity).unwrap();

        let mut live: Vec<(usize, usize)> = Vec::new();
        for (i, &size) in sizes.iter().enumerate() {
            let r = arena.alloc(size, align_from_index(aligns[i])).unwrap();
            for &(off, len) in &live {
                let disjoint = r.offset() + r.size() <= off || off + len <= r.offset();
                prop_assert!(
                    disjoint,
                    "allocation [{}, {}) overlaps live [{}, {})",
                    r.offset(), r.offset() + r.size(), off, off + len
                );
            }
            live.push((r.offset(), r.size()));
        }
    }

    /// Free + realloc cycles keep the no-aliasing property: a reused block
    /// only overlaps allocations that were freed, never live ones.
    #[test]
    fn arena_reuse_respects_liveness(
        rounds in prop::collection::vec((1024usize..8192, prop::bool::ANY), 2..16),
    ) {
        let capacity: usize = rounds.iter().map(|(s, _)| s + 64).sum();
        let mut arena = Arena::with_capacity(capacity).unwrap();

        let mut live: Vec<(usize, usize)> = Vec::new();
        for &(size, free_after) in &rounds {
            let r = arena.alloc(size, Align::A64).unwrap();
            for &(off, len) in &live {
                let disjoint = r.offset() + r.size() <= off || off + len <= r.offset();
                prop_assert!(disjoint);
            }
            if free_after {
                arena.free(r);
            } else {
                live.push((r.offset(), r.size()));
            }
        }
    }

    /// A request exceeding remaining capacity fails with
    /// `MemoryPoolExhausted` and leaves prior allocations intact.
    #[test]
    fn arena_exhaustion_is_clean(fill in 1usize..4096) {
        let mut arena = Arena::with_capacity(4096).unwrap();
        let first = arena.alloc(fill, Align::A16).unwrap();
        let err = arena.alloc(8192, Align::A16).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::MemoryPoolExhausted);
        prop_assert_eq!(first.size(), fill);
        prop_assert_eq!(arena.used(), fill);
    }

    /// exp/log round-trip inside the documented 5e-3 relative budget.
    #[test]
    fn exp_log_roundtrip_holds(x in 1e-6f32..1e6f32) {
        let rt = fast_exp(fast_log(x));
        let rel = (rt - x).abs() / x;
        prop_assert!(rel <= 5e-3, "x={x}, roundtrip={rt}, rel={rel}");
    }
}
