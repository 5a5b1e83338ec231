//! Backup: scan every registered table for one tenant and write an archive.

use super::{with_retries, OpContext};
use crate::error::EngineError;
use crate::source::TenantSource;
use portavault_archive::ArchiveWriter;
use portavault_core::{TransformPipeline, TransformStats};
use std::sync::Arc;

/// Export all registered tables for `tenant` into a fresh archive under the
/// staging prefix. Returns the archive locator and the transform stats.
pub(crate) async fn run_backup(
    ctx: &OpContext,
    source: &Arc<dyn TenantSource>,
    tenant: &str,
    progress_base: u8,
    progress_span: u8,
) -> Result<(String, TransformStats), EngineError> {
    let prefix = format!(
        "{}/{}/{}",
        ctx.config.staging_prefix,
        tenant,
        ctx.handle.id()
    );
    tracing::info!(tenant, prefix = %prefix, "starting backup");

    let mut writer = ArchiveWriter::new(Arc::clone(&ctx.backend), prefix.as_str(), tenant)
        .with_chunk_size(ctx.config.chunk_size);
    let pipeline = TransformPipeline::new(ctx.registry.as_ref());
    let mut stats = TransformStats::default();

    let tables = ctx.registry.tables();
    let total = tables.len();

    for (done, table) in tables.iter().enumerate() {
        ctx.check_cancelled()?;

        let rows = with_retries(&ctx.config, "scan", || source.scan(table, tenant)).await?;
        writer.begin_table(&table.name)?;

        let mut kept = 0u64;
        for row in rows {
            ctx.check_cancelled()?;
            if let Some(row) = pipeline.export_row(table, row, &mut stats)? {
                writer.write_row(&row)?;
                kept += 1;
            }
        }
        writer.finish_table().await?;

        tracing::debug!(table = %table.name, rows = kept, "table unit written");
        ctx.report_progress(progress_base, progress_span, done + 1, total)?;
    }

    let (locator, manifest) = writer.finalize().await?;
    tracing::info!(
        tenant,
        locator = %locator,
        tables = manifest.tables.len(),
        rows = manifest.total_rows(),
        dropped = stats.rows_dropped,
        "backup complete"
    );
    Ok((locator, stats))
}
