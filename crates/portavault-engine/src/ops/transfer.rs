//! Transfer: back a tenant up to staging, then restore it into another
//! tenant on the same deployment.

use super::{run_backup, run_restore, OpContext, RestorePlan};
use crate::error::EngineError;
use crate::source::{TenantDestination, TenantSource};
use portavault_core::{RestoreMode, TransformStats};
use std::sync::Arc;

/// Run a tenant-to-tenant transfer. The backup phase maps to 0..=50% of
/// task progress and the restore phase to 50..=100%. Returns the staging
/// archive locator and the merged transform stats.
pub(crate) async fn run_transfer(
    ctx: &OpContext,
    source: &Arc<dyn TenantSource>,
    destination: &Arc<dyn TenantDestination>,
    src_tenant: &str,
    dest_tenant: &str,
) -> Result<(String, TransformStats), EngineError> {
    tracing::info!(src_tenant, dest_tenant, "starting transfer");

    let (locator, mut stats) = run_backup(ctx, source, src_tenant, 0, 50).await?;

    let plan = RestorePlan {
        archive: locator.clone(),
        dest_tenant: dest_tenant.to_string(),
        mode: RestoreMode::Remap,
        blob_target_prefix: None,
    };
    let restore_stats = run_restore(ctx, destination, &plan, 50, 50).await?;
    stats.merge(&restore_stats);

    tracing::info!(src_tenant, dest_tenant, locator = %locator, "transfer complete");
    Ok((locator, stats))
}
