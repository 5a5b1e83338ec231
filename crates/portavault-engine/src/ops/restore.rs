//! Restore: replay an archive into a destination tenant, remapping
//! identifiers and walking tables in relation order.

use super::{with_retries, OpContext};
use crate::error::EngineError;
use crate::source::TenantDestination;
use portavault_archive::{ArchiveReader, BlobPath};
use portavault_core::{
    IdentifierMapper, RelationGraph, RestoreContext, RestoreMode, RowOutcome, TransformPipeline,
    TransformStats, Value,
};
use std::sync::Arc;

/// Parameters for one restore run.
pub(crate) struct RestorePlan {
    /// Archive locator (backend prefix) to read from.
    pub archive: String,
    /// Tenant identifier to stamp onto every restored row.
    pub dest_tenant: String,
    /// Remap or preserve identifiers.
    pub mode: RestoreMode,
    /// Destination prefix for blob payloads; `None` skips blob restore.
    pub blob_target_prefix: Option<String>,
}

/// A pointer left unresolved during the main pass of a table, fixed up
/// after the table (and thus any self-referenced parent rows) is inserted.
struct DeferredPatch {
    new_id: Value,
    column: String,
    original: Value,
}

/// Restore an archive into `dest_tenant`. Returns the transform stats.
pub(crate) async fn run_restore(
    ctx: &OpContext,
    destination: &Arc<dyn TenantDestination>,
    plan: &RestorePlan,
    progress_base: u8,
    progress_span: u8,
) -> Result<TransformStats, EngineError> {
    let reader = ArchiveReader::open(Arc::clone(&ctx.backend), plan.archive.as_str()).await?;
    tracing::info!(
        archive = %plan.archive,
        source_tenant = %reader.manifest().tenant_id,
        dest_tenant = %plan.dest_tenant,
        mode = ?plan.mode,
        "starting restore"
    );

    // A required-edge cycle is a model bug; fail before touching anything.
    let graph = RelationGraph::build(ctx.registry.as_ref())?;

    let mapper = IdentifierMapper::new(ctx.config.sentinels.clone());
    mapper.set_tenant_mapping(&plan.dest_tenant)?;

    let pipeline = TransformPipeline::new(ctx.registry.as_ref());
    let mut restore_ctx = RestoreContext::new(&mapper).with_mode(plan.mode);
    if let Some((table, column)) = &ctx.config.user_mapping {
        restore_ctx = restore_ctx.with_user_mapping(table.clone(), column.clone());
    }

    let mut stats = TransformStats::default();
    let order = graph.restore_order();
    let total = order.len();

    for (done, table_name) in order.iter().enumerate() {
        ctx.check_cancelled()?;

        let table = match ctx.registry.table(table_name) {
            Some(t) => t,
            None => continue,
        };
        // Archives written by an older deployment may lack newer tables.
        if reader.manifest().table(table_name).is_none() {
            tracing::debug!(table = %table_name, "not in archive, skipping");
            ctx.report_progress(progress_base, progress_span, done + 1, total)?;
            continue;
        }

        let rows = reader.read_table(table_name).await?;
        let deferred_edges = graph.deferred_edges_into(table_name);
        let mut patches: Vec<DeferredPatch> = Vec::new();
        let preserve = plan.mode == RestoreMode::PreserveIds;

        for row in rows {
            ctx.check_cancelled()?;

            let old_id = row.get(&table.id_column).cloned();
            // Capture the source-side values of deferred columns so the
            // patch pass can tell an unresolved pointer from a resolved one.
            let before: Vec<(String, Value)> = deferred_edges
                .iter()
                .filter(|e| e.applies_to(&row))
                .filter_map(|e| {
                    row.get(&e.child_column)
                        .filter(|v| !v.is_null())
                        .map(|v| (e.child_column.clone(), v.clone()))
                })
                .collect();

            // The pipeline logs dropped rows with their id and column.
            let row = match pipeline.restore_row(table, row, &restore_ctx, &mut stats)? {
                RowOutcome::Insert(row) => row,
                RowOutcome::Dropped { .. } => continue,
            };

            let new_id = {
                let row = row.clone();
                with_retries(&ctx.config, "insert", move || {
                    let row = row.clone();
                    async move { destination.insert(table, row, preserve).await }
                })
                .await?
            };

            if let (Some(old), Some(new)) = (
                old_id.as_ref().and_then(Value::as_key_string),
                new_id.as_key_string(),
            ) {
                mapper.set(table_name, &table.id_column, old, new)?;
            }

            for (column, original) in before {
                // Still carrying the source-side value means the main pass
                // could not resolve it yet (typically a forward reference
                // within the same table).
                if row.get(&column) == Some(&original) {
                    patches.push(DeferredPatch {
                        new_id: new_id.clone(),
                        column,
                        original: original.clone(),
                    });
                }
            }
        }

        apply_patches(ctx, destination, &mapper, table, &deferred_edges, patches).await?;
        graph.run_remap_hooks(table_name, &mapper)?;

        if ctx.config.blob_table.as_deref() == Some(table_name.as_str()) {
            if let Some(target) = &plan.blob_target_prefix {
                restore_blobs(ctx, &reader, &mapper, table_name, &table.id_column, target)
                    .await?;
            }
        }

        ctx.report_progress(progress_base, progress_span, done + 1, total)?;
    }

    tracing::info!(
        dest_tenant = %plan.dest_tenant,
        kept = stats.rows_kept,
        dropped = stats.rows_dropped,
        mappings = mapper.len(),
        "restore complete"
    );
    Ok(stats)
}

/// Second pass over a table: resolve pointers deferred during insertion.
/// A pointer that still fails to resolve keeps its original value.
async fn apply_patches(
    ctx: &OpContext,
    destination: &Arc<dyn TenantDestination>,
    mapper: &IdentifierMapper,
    table: &portavault_core::TableDescriptor,
    edges: &[&portavault_core::RelationEdge],
    patches: Vec<DeferredPatch>,
) -> Result<(), EngineError> {
    for patch in patches {
        let old_key = match patch.original.as_key_string() {
            Some(k) => k,
            None => continue,
        };
        let mapped = edges
            .iter()
            .filter(|e| e.child_column == patch.column)
            .find_map(|e| mapper.get(&e.parent_table, &e.parent_column, &old_key));
        let Some(mapped) = mapped else {
            tracing::debug!(
                table = %table.name,
                column = %patch.column,
                "deferred pointer still unresolved, keeping original"
            );
            continue;
        };

        let value = patch.original.coerce_like(&mapped);
        with_retries(&ctx.config, "patch", || {
            destination.patch(table, &patch.new_id, &patch.column, value.clone())
        })
        .await?;
    }
    Ok(())
}

/// Copy blob payloads out of the archive, rewriting bucketed paths with the
/// remapped owning file id.
async fn restore_blobs(
    ctx: &OpContext,
    reader: &ArchiveReader,
    mapper: &IdentifierMapper,
    blob_table: &str,
    id_column: &str,
    target_prefix: &str,
) -> Result<(), EngineError> {
    for entry in &reader.manifest().blobs {
        ctx.check_cancelled()?;

        let path = match BlobPath::parse(&entry.original_path) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %entry.original_path, error = %e, "unparseable blob path, copying as-is");
                let data = reader.read_blob(entry).await?;
                ctx.backend
                    .save(&format!("{target_prefix}/{}", entry.original_path), data)
                    .await?;
                continue;
            }
        };

        let rewritten = mapper
            .get(blob_table, id_column, &path.file_id.to_string())
            .and_then(|new| new.parse::<i64>().ok())
            .map(|new_id| path.remapped(new_id))
            .unwrap_or(path);

        let data = reader.read_blob(entry).await?;
        ctx.backend
            .save(&format!("{target_prefix}/{rewritten}"), data)
            .await?;
    }
    Ok(())
}
