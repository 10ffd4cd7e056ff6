//! Recycling cache for finished dynamic instances.
//!
//! Tearing an instance down and re-provisioning it later is the expensive
//! path; parking the finished copy and handing it back out for the next
//! match of the same template skips both the slot/region churn and the
//! block work. A copy is either live (owned by a match) or pooled (waiting
//! in here) — never both.

use crate::directory::{MapTemplate, TemplateKey};
use crate::instance::allocator::InstanceAllocator;
use crate::instance::provision::Provisioner;
use crate::instance::slot::SlotPool;
use crucible_protocol::Bounds;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A live, playable copy of a template at a reserved region.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceCopy {
    /// The slot whose reservation this copy occupies
    pub slot: u32,
    /// X offset from the template's source region
    pub offset_x: i32,
    /// The copy's region in the instances world
    pub bounds: Bounds,
    /// The template this copy was made from
    pub template: TemplateKey,
}

/// Pools finished instance copies per template key for reuse.
pub struct InstanceCache {
    /// Global switch from configuration; per-template parking is gated by
    /// the template's own cache flag at track time
    enabled: bool,
    use_schematics: bool,
    suspended: AtomicBool,
    pools: DashMap<TemplateKey, VecDeque<InstanceCopy>>,
    tracked: DashMap<u32, MapTemplate>,
    provisioner: Arc<dyn Provisioner>,
}

impl InstanceCache {
    pub fn new(enabled: bool, use_schematics: bool, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            enabled,
            use_schematics,
            suspended: AtomicBool::new(false),
            pools: DashMap::new(),
            tracked: DashMap::new(),
            provisioner,
        }
    }

    fn is_active(&self) -> bool {
        self.enabled && !self.suspended.load(Ordering::Acquire)
    }

    /// Pops the oldest pooled copy for the template, if any.
    ///
    /// Returns `None` when the pool is empty, caching is disabled, or the
    /// cache is suspended.
    pub fn borrow(&self, template: &MapTemplate) -> Option<InstanceCopy> {
        if !self.is_active() {
            return None;
        }

        let mut pool = self.pools.get_mut(&template.key())?;
        pool.pop_front()
    }

    /// Records that `copy` originated from `template`, enabling later
    /// recycling. Copies of templates that opt out of caching are not
    /// tracked.
    pub fn track(&self, template: &MapTemplate, copy: &InstanceCopy) {
        if !self.enabled || !template.cache {
            return;
        }

        self.tracked.insert(copy.slot, template.clone());
    }

    /// Parks a finished copy for reuse.
    ///
    /// Returns `false` when caching is disabled or the copy was never
    /// tracked; the caller must then fully release the copy's slot and
    /// region. Returns `true` once the copy is pooled; if the template
    /// requests a reset-on-cache, the copy's blocks are repopulated
    /// asynchronously without blocking the caller.
    pub fn recycle(&self, copy: InstanceCopy) -> bool {
        if !self.is_active() {
            self.tracked.remove(&copy.slot);
            return false;
        }

        let Some(template) = self.tracked.get(&copy.slot).map(|t| t.clone()) else {
            return false;
        };

        let key = copy.template.clone();
        let destination = copy.bounds;
        self.pools
            .entry(key.clone())
            .or_default()
            .push_back(copy);

        if template.cache_reset {
            debug!("Scheduling reset for cached instance of {}", key);
            self.reset_async(template, destination);
        }

        true
    }

    /// Repopulates a parked copy's blocks from its template on a worker
    /// task. A failed reset is logged and the copy stays reusable in its
    /// current state.
    fn reset_async(&self, template: MapTemplate, destination: Bounds) {
        let provisioner = Arc::clone(&self.provisioner);
        let use_schematics = self.use_schematics;

        tokio::spawn(async move {
            let key = template.key();

            let result = if use_schematics {
                match provisioner.paste_schematic(&template, destination).await {
                    Ok(()) => Ok(()),
                    Err(_) => provisioner.copy_region(&template, destination).await,
                }
            } else {
                provisioner.copy_region(&template, destination).await
            };

            if let Err(e) = result {
                warn!(
                    "Failed to reset cached instance of {key} - leaving current state in place: {e}"
                );
            }
        });
    }

    /// Stops lending out pooled copies without discarding them. Used while
    /// the process sequences a shutdown.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    /// Allows borrowing again after a [`suspend`](Self::suspend).
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    /// Releases every pooled and tracked copy's slot and region and clears
    /// all pools. Only meaningful during full shutdown.
    pub fn flush(&self, allocator: &InstanceAllocator, slots: &SlotPool) {
        let tracked_slots: Vec<u32> = self.tracked.iter().map(|e| *e.key()).collect();
        for slot in tracked_slots {
            self.tracked.remove(&slot);
            allocator.release(slot);
            slots.release(slot);
        }

        self.pools.clear();
    }

    /// Number of copies currently pooled for the given template.
    pub fn pooled_count(&self, key: &TemplateKey) -> usize {
        self.pools.get(key).map(|p| p.len()).unwrap_or(0)
    }
}
