//! Composition of the slot pool, region allocator, cache and provisioner
//! into the one operation the coordinator cares about: "give me a ready
//! instance of this template", plus the matching retirement path.

use crate::directory::MapTemplate;
use crate::error::ProvisionError;
use crate::instance::allocator::InstanceAllocator;
use crate::instance::cache::{InstanceCache, InstanceCopy};
use crate::instance::provision::Provisioner;
use crate::instance::slot::SlotPool;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates and retires dynamic instances on the host.
///
/// All region allocation on the process funnels through the single
/// allocator held here, so no two instances can ever hold overlapping
/// regions.
pub struct InstanceManager {
    slots: Arc<SlotPool>,
    allocator: Arc<InstanceAllocator>,
    cache: Arc<InstanceCache>,
    provisioner: Arc<dyn Provisioner>,
    spacing: i32,
    use_schematics: bool,
}

impl InstanceManager {
    pub fn new(
        cache: Arc<InstanceCache>,
        provisioner: Arc<dyn Provisioner>,
        spacing: i32,
        use_schematics: bool,
    ) -> Self {
        Self {
            slots: Arc::new(SlotPool::new()),
            allocator: Arc::new(InstanceAllocator::new()),
            cache,
            provisioner,
            spacing,
            use_schematics,
        }
    }

    /// Produces a playable instance of `template`.
    ///
    /// A parked copy is reused when the cache has one; otherwise a slot and
    /// region are reserved and the template content is provisioned into it
    /// (schematic first when configured, falling back to a region copy).
    /// Every failure path releases the slot and region it took.
    pub async fn create_instance(
        &self,
        template: &MapTemplate,
    ) -> Result<InstanceCopy, ProvisionError> {
        if let Some(copy) = self.cache.borrow(template) {
            debug!("Reusing cached instance of {} at slot {}", copy.template, copy.slot);
            return Ok(copy);
        }

        let bounds = template
            .bounds
            .ok_or_else(|| ProvisionError::MissingBounds(template.key().to_string()))?;

        let slot = self.slots.acquire();
        let allocation = self.allocator.reserve(slot, &bounds, self.spacing);

        let result = if self.use_schematics {
            match self
                .provisioner
                .paste_schematic(template, allocation.bounds)
                .await
            {
                Ok(()) => Ok(()),
                Err(_) => {
                    self.provisioner
                        .copy_region(template, allocation.bounds)
                        .await
                }
            }
        } else {
            self.provisioner
                .copy_region(template, allocation.bounds)
                .await
        };

        match result {
            Ok(()) => {
                let copy = InstanceCopy {
                    slot,
                    offset_x: allocation.offset_x,
                    bounds: allocation.bounds,
                    template: template.key(),
                };
                self.cache.track(template, &copy);
                info!(
                    "Provisioned instance of {} at slot {} (offset {})",
                    copy.template, slot, allocation.offset_x
                );
                Ok(copy)
            }
            Err(e) => {
                self.allocator.release(slot);
                self.slots.release(slot);
                Err(e)
            }
        }
    }

    /// Retires a finished instance: parks it for reuse when the cache takes
    /// it, otherwise releases its region and slot.
    pub fn retire(&self, copy: InstanceCopy) {
        let slot = copy.slot;
        if !self.cache.recycle(copy) {
            self.allocator.release(slot);
            self.slots.release(slot);
        }
    }

    /// Shutdown sequencing: stop lending cached copies, then release
    /// everything still tracked.
    pub fn shutdown(&self) {
        self.cache.suspend();
        self.cache.flush(&self.allocator, &self.slots);
    }

    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    pub fn allocator(&self) -> &InstanceAllocator {
        &self.allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MapKind;
    use crate::instance::provision::NullProvisioner;
    use async_trait::async_trait;
    use crucible_protocol::Bounds;

    struct FailingProvisioner;

    #[async_trait]
    impl Provisioner for FailingProvisioner {
        async fn paste_schematic(
            &self,
            template: &MapTemplate,
            _destination: Bounds,
        ) -> Result<(), ProvisionError> {
            Err(ProvisionError::SchematicUnavailable(
                template.key().to_string(),
            ))
        }

        async fn copy_region(
            &self,
            template: &MapTemplate,
            _destination: Bounds,
        ) -> Result<(), ProvisionError> {
            Err(ProvisionError::CopyFailed {
                template: template.key().to_string(),
                reason: "simulated".to_string(),
            })
        }
    }

    fn template() -> MapTemplate {
        MapTemplate {
            arena: "skirmish".to_string(),
            name: "ravine".to_string(),
            kind: MapKind::Dynamic,
            remote: true,
            bounds: Some(Bounds::new(0, 100, 0, 64, 0, 100)),
            spawn_points: Vec::new(),
            cache: true,
            cache_reset: false,
            matchup: None,
        }
    }

    fn manager(provisioner: Arc<dyn Provisioner>, cache_enabled: bool) -> InstanceManager {
        let cache = Arc::new(InstanceCache::new(
            cache_enabled,
            false,
            Arc::clone(&provisioner),
        ));
        InstanceManager::new(cache, provisioner, 16, false)
    }

    #[tokio::test]
    async fn create_reserves_and_retire_recycles() {
        let manager = manager(Arc::new(NullProvisioner), true);
        let template = template();

        let copy = manager.create_instance(&template).await.unwrap();
        assert_eq!(copy.slot, 0);
        assert_eq!(manager.slots().used_count(), 1);

        manager.retire(copy.clone());
        // recycled, so the slot and region stay reserved for the next borrow
        assert_eq!(manager.slots().used_count(), 1);

        let again = manager.create_instance(&template).await.unwrap();
        assert_eq!(again, copy);
    }

    #[tokio::test]
    async fn retire_releases_when_cache_is_disabled() {
        let manager = manager(Arc::new(NullProvisioner), false);
        let template = template();

        let copy = manager.create_instance(&template).await.unwrap();
        assert_eq!(manager.slots().used_count(), 1);

        manager.retire(copy);
        assert_eq!(manager.slots().used_count(), 0);
        assert!(manager.allocator().reserved().is_empty());
    }

    #[tokio::test]
    async fn failed_provisioning_releases_the_slot() {
        let manager = manager(Arc::new(FailingProvisioner), true);
        let template = template();

        let result = manager.create_instance(&template).await;
        assert!(result.is_err());
        assert_eq!(manager.slots().used_count(), 0);
        assert!(manager.allocator().reserved().is_empty());
    }

    #[tokio::test]
    async fn concurrent_instances_get_distinct_regions() {
        let manager = manager(Arc::new(NullProvisioner), true);
        let template = template();

        let a = manager.create_instance(&template).await.unwrap();
        let b = manager.create_instance(&template).await.unwrap();

        assert_ne!(a.slot, b.slot);
        assert!(!a.bounds.overlaps(&b.bounds));
    }

    #[tokio::test]
    async fn missing_bounds_is_an_error() {
        let manager = manager(Arc::new(NullProvisioner), true);
        let mut template = template();
        template.bounds = None;

        assert!(manager.create_instance(&template).await.is_err());
        assert_eq!(manager.slots().used_count(), 0);
    }
}
