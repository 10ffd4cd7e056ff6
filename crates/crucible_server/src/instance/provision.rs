//! Interface to the world copy/paste engine.
//!
//! Physically materializing an instance — pasting a saved schematic or
//! copying a source region block by block — is owned by an external engine.
//! The core only needs the two async operations below; they run on worker
//! tasks and their completions are marshalled back to the coordinator.

use crate::directory::MapTemplate;
use crate::error::ProvisionError;
use async_trait::async_trait;
use crucible_protocol::Bounds;
use tracing::debug;

/// Opaque async materialization of template content at a destination region.
///
/// Either operation succeeds or fails; there is no cooperative cancellation,
/// a started operation always runs to completion and the caller discards the
/// outcome if the consuming slot has been released in the meantime.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Pastes the template's saved schematic into `destination`.
    ///
    /// Fails with [`ProvisionError::SchematicUnavailable`] when no schematic
    /// exists for the template, letting the caller fall back to a region
    /// copy.
    async fn paste_schematic(
        &self,
        template: &MapTemplate,
        destination: Bounds,
    ) -> Result<(), ProvisionError>;

    /// Copies the template's source region into `destination`.
    async fn copy_region(
        &self,
        template: &MapTemplate,
        destination: Bounds,
    ) -> Result<(), ProvisionError>;
}

/// Stand-in provisioner for deployments where no world engine is wired in.
///
/// Reports success for region copies so the coordination pipeline can run
/// end to end, and no schematics for paste requests.
#[derive(Debug, Default)]
pub struct NullProvisioner;

#[async_trait]
impl Provisioner for NullProvisioner {
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
        destination: Bounds,
    ) -> Result<(), ProvisionError> {
        debug!(
            "Simulated region copy for template {} into {:?}",
            template.key(),
            destination
        );
        Ok(())
    }
}
