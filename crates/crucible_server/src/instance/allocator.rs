//! Region allocator for the shared instances world.
//!
//! Allocates non-overlapping regions so concurrently-running dynamic
//! instances cannot collide. Packing is first-fit along the X axis: the
//! address space is unbounded in that direction, so a reservation always
//! succeeds. Released gaps are reused by later scans that reach them;
//! there is no compaction.

use crucible_protocol::Bounds;
use std::collections::HashMap;
use std::sync::Mutex;

/// The result of a reservation: where the template was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// X offset that shifts the template bounds onto the reserved region
    pub offset_x: i32,
    /// The shifted, now-reserved region
    pub bounds: Bounds,
}

/// Mutex-guarded map of live reservations keyed by slot id.
///
/// Reservations may be taken from the coordinator task and released from
/// provisioning completions on worker tasks, hence the internal lock.
#[derive(Debug, Default)]
pub struct InstanceAllocator {
    reservations: Mutex<HashMap<u32, Bounds>>,
}

impl InstanceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a region for `slot` by shifting `template` to the first gap
    /// that fits it with at least `spacing` on both sides.
    ///
    /// Existing reservations are scanned in ascending min-X order; the
    /// candidate start advances past each region that blocks it, so the new
    /// region lands in the first sufficient gap or past the last region.
    pub fn reserve(&self, slot: u32, template: &Bounds, spacing: i32) -> Allocation {
        let mut reservations = self
            .reservations
            .lock()
            .expect("allocator lock poisoned");

        let width = template.width();
        let mut candidate_min_x = 0;

        let mut sorted: Vec<Bounds> = reservations.values().copied().collect();
        sorted.sort_by_key(|b| b.min_x);

        for existing in &sorted {
            let available_end = existing.min_x - spacing;
            if candidate_min_x + width <= available_end {
                break;
            }

            candidate_min_x = existing.max_x + spacing;
        }

        let offset_x = candidate_min_x - template.min_x;
        let shifted = template.shift(offset_x, 0, 0);
        reservations.insert(slot, shifted);

        Allocation {
            offset_x,
            bounds: shifted,
        }
    }

    /// Releases the reservation held by `slot`, freeing its gap for future
    /// scans. Unknown slots are ignored.
    pub fn release(&self, slot: u32) {
        let mut reservations = self
            .reservations
            .lock()
            .expect("allocator lock poisoned");
        reservations.remove(&slot);
    }

    /// Snapshot of every live reservation.
    pub fn reserved(&self) -> Vec<Bounds> {
        let reservations = self
            .reservations
            .lock()
            .expect("allocator lock poisoned");
        reservations.values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(width: i32) -> Bounds {
        Bounds::new(0, width, 0, 64, 0, 100)
    }

    fn assert_invariants(allocator: &InstanceAllocator, spacing: i32) {
        let regions = allocator.reserved();
        for (i, a) in regions.iter().enumerate() {
            for b in regions.iter().skip(i + 1) {
                assert!(!a.overlaps(b), "regions overlap: {a:?} and {b:?}");
                let gap = (a.min_x.max(b.min_x)) - (a.max_x.min(b.max_x));
                assert!(
                    gap >= spacing,
                    "regions closer than spacing {spacing}: {a:?} and {b:?}"
                );
            }
        }
    }

    #[test]
    fn first_fit_packs_left_to_right() {
        let allocator = InstanceAllocator::new();

        let a = allocator.reserve(0, &template(100), 10);
        let b = allocator.reserve(1, &template(100), 10);
        let c = allocator.reserve(2, &template(100), 10);

        assert_eq!(a.offset_x, 0);
        assert_eq!(b.offset_x, 110);
        assert_eq!(c.offset_x, 220);
        assert_invariants(&allocator, 10);
    }

    #[test]
    fn released_gap_is_reused_when_it_fits() {
        let allocator = InstanceAllocator::new();

        allocator.reserve(0, &template(100), 10);
        allocator.reserve(1, &template(100), 10);
        allocator.reserve(2, &template(100), 10);

        allocator.release(1);

        // same width fits back into the hole
        let again = allocator.reserve(3, &template(100), 10);
        assert_eq!(again.offset_x, 110);
        assert_invariants(&allocator, 10);
    }

    #[test]
    fn wider_template_skips_too_small_gaps() {
        let allocator = InstanceAllocator::new();

        allocator.reserve(0, &template(100), 10);
        allocator.reserve(1, &template(100), 10);
        allocator.reserve(2, &template(100), 10);
        allocator.release(1);

        // 150 wide cannot fit the 100-wide hole, must go past the end
        let wide = allocator.reserve(3, &template(150), 10);
        assert_eq!(wide.offset_x, 330);
        assert_invariants(&allocator, 10);
    }

    #[test]
    fn offset_accounts_for_nonzero_template_origin() {
        let allocator = InstanceAllocator::new();
        let offset_template = Bounds::new(500, 600, 0, 64, 0, 100);

        let allocation = allocator.reserve(0, &offset_template, 10);
        assert_eq!(allocation.offset_x, -500);
        assert_eq!(allocation.bounds.min_x, 0);
        assert_eq!(allocation.bounds.max_x, 100);
    }

    #[test]
    fn invariants_hold_across_mixed_reserve_release_sequences() {
        let allocator = InstanceAllocator::new();
        let spacing = 16;

        let mut slot = 0u32;
        for round in 0..20 {
            let width = 50 + (round % 5) * 37;
            allocator.reserve(slot, &template(width), spacing);
            slot += 1;

            if round % 3 == 0 && slot > 2 {
                allocator.release(slot - 2);
            }

            assert_invariants(&allocator, spacing);
        }
    }
}
