//! Slot pool handing out the lowest free integer id.
//!
//! Every dynamic instance holds exactly one slot for its lifetime; the slot
//! is the handle its region reservation is keyed by. Ids are unbounded, so
//! `acquire` never fails.

use std::sync::Mutex;

const WORD_BITS: usize = u64::BITS as usize;

/// A growable bitset of used slot ids behind a single mutex.
///
/// The pool is touched both from the coordinator task and from provisioning
/// completions running on worker tasks, hence the internal lock. The linear
/// scan is O(n) in the worst case, which is fine at the slot counts one host
/// ever holds.
#[derive(Debug, Default)]
pub struct SlotPool {
    used: Mutex<Vec<u64>>,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lowest currently-unused id and marks it used.
    pub fn acquire(&self) -> u32 {
        let mut used = self.used.lock().expect("slot pool lock poisoned");

        for (word_index, word) in used.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = word.trailing_ones() as usize;
                *word |= 1 << bit;
                return (word_index * WORD_BITS + bit) as u32;
            }
        }

        used.push(1);
        ((used.len() - 1) * WORD_BITS) as u32
    }

    /// Marks `slot` free again. Releasing an already-free slot is a no-op.
    pub fn release(&self, slot: u32) {
        let mut used = self.used.lock().expect("slot pool lock poisoned");

        let word_index = slot as usize / WORD_BITS;
        if let Some(word) = used.get_mut(word_index) {
            *word &= !(1 << (slot as usize % WORD_BITS));
        }
    }

    /// Number of ids currently held.
    pub fn used_count(&self) -> usize {
        let used = self.used.lock().expect("slot pool lock poisoned");
        used.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn acquire_returns_lowest_free() {
        let pool = SlotPool::new();
        assert_eq!(pool.acquire(), 0);
        assert_eq!(pool.acquire(), 1);
        assert_eq!(pool.acquire(), 2);

        pool.release(1);
        assert_eq!(pool.acquire(), 1);
        assert_eq!(pool.acquire(), 3);
    }

    #[test]
    fn acquire_grows_past_word_boundaries() {
        let pool = SlotPool::new();
        for expected in 0..130u32 {
            assert_eq!(pool.acquire(), expected);
        }
        assert_eq!(pool.used_count(), 130);
    }

    #[test]
    fn release_is_idempotent() {
        let pool = SlotPool::new();
        let slot = pool.acquire();
        pool.release(slot);
        pool.release(slot);
        assert_eq!(pool.used_count(), 0);
        assert_eq!(pool.acquire(), slot);
    }

    #[test]
    fn concurrent_acquire_never_double_assigns() {
        let pool = Arc::new(SlotPool::new());
        let threads = 8;
        let ops = 10_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for i in 0..ops {
                        if i % 3 == 2 {
                            if let Some(slot) = held.pop() {
                                pool.release(slot);
                            }
                        } else {
                            held.push(pool.acquire());
                        }
                    }
                    held
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for slot in handle.join().unwrap() {
                // every id still held at the end must be unique across threads
                assert!(seen.insert(slot), "slot {slot} assigned twice");
            }
        }

        assert_eq!(pool.used_count(), seen.len());
    }
}
