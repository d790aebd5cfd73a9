//! Property-based tests for ring geometry and bounded waits.
//! Verifies invariants hold for ALL inputs, not just the production constants.

#![allow(clippy::arithmetic_side_effects, clippy::unwrap_used)]

use smi_platform::{busy_wait_while, BounceGeometry, BounceRing, DmaDirection};

proptest::proptest! {
    /// A geometry is accepted exactly when segments are whole 32-bit
    /// transfers and there are at least two of them.
    #[test]
    fn geometry_accepts_only_aligned_multi_segment_rings(size in 0usize..4096, count in 0usize..16) {
        let ok = BounceGeometry::new(size, count).is_ok();
        assert_eq!(ok, size > 0 && size % 4 == 0 && count >= 2,
            "size {} count {} accepted = {}", size, count, ok);
    }

    /// Segments tile the ring back to back from the base address.
    #[test]
    fn segments_tile_the_ring(words in 1usize..64, count in 2usize..8, base in 0u64..0x1_0000_0000) {
        let g = BounceGeometry::new(words * 4, count).unwrap();
        let ring = BounceRing::allocate(g, base).unwrap();
        for i in 0..count {
            assert_eq!(ring.phys_addr(i), Some(base + (i * g.segment_size()) as u64));
            assert_eq!(ring.segment(i).map(<[u8]>::len), Some(g.segment_size()));
        }
        assert_eq!(ring.phys_addr(count), None);
        assert!(ring.segment(count).is_none());
        let d = ring.descriptor(DmaDirection::DeviceToMemory);
        assert_eq!(d.buf_len, g.segment_size() * count);
        assert_eq!(d.period_len, g.segment_size());
    }

    /// A condition that clears after `k` polls is observed within budget
    /// exactly when `k <= budget`.
    #[test]
    fn busy_wait_reports_within_budget(budget in 0u32..64, k in 0u32..128) {
        let mut polls = 0u32;
        let cleared = busy_wait_while(budget, || {
            let still = polls < k;
            polls += 1;
            still
        });
        assert_eq!(cleared, k <= budget, "budget {} k {}", budget, k);
    }
}
