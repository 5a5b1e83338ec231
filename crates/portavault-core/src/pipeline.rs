//! Row transform pipeline.
//!
//! Applies module hooks and identifier remapping to each row, on the export
//! side (veto + unconditional rewrites) and the restore side (veto,
//! rewrites, relation resolution through the mapper, tenant stamping, and
//! datetime normalization).

use crate::error::Error;
use crate::mapper::IdentifierMapper;
use crate::spec::{ModuleRegistry, RelationEdge, RowDecision, TableDescriptor, ValueDecision};
use crate::value::{Row, Value};

/// How unresolved `Required` references are treated during restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// Normal restore/transfer: identifiers are remapped; a row whose
    /// `Required` reference cannot be resolved is dropped.
    Remap,
    /// Dump re-import into a fresh instance: unresolved `Required` values
    /// are kept as-is.
    PreserveIds,
}

/// Per-operation context threaded through restore-side transforms.
pub struct RestoreContext<'a> {
    /// The operation's identifier mapper.
    pub mapper: &'a IdentifierMapper,
    /// Restore mode.
    pub mode: RestoreMode,
    /// Table/column that user-identity columns resolve through.
    pub user_mapping: Option<(String, String)>,
    /// Shift applied to datetime columns, in microseconds.
    pub datetime_shift_micros: i64,
}

impl<'a> RestoreContext<'a> {
    /// Create a context with default mode (`Remap`) and no user mapping.
    pub fn new(mapper: &'a IdentifierMapper) -> Self {
        Self {
            mapper,
            mode: RestoreMode::Remap,
            user_mapping: None,
            datetime_shift_micros: 0,
        }
    }

    /// Set the restore mode.
    pub fn with_mode(mut self, mode: RestoreMode) -> Self {
        self.mode = mode;
        self
    }

    /// Route user-identity columns through the given table/column mapping.
    pub fn with_user_mapping(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.user_mapping = Some((table.into(), column.into()));
        self
    }

    /// Set the datetime normalization shift.
    pub fn with_datetime_shift(mut self, micros: i64) -> Self {
        self.datetime_shift_micros = micros;
        self
    }
}

/// Counters accumulated over one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Rows that passed the pipeline.
    pub rows_kept: u64,
    /// Rows dropped by a module veto or an unresolved `Required` reference.
    pub rows_dropped: u64,
    /// Column values kept at their original value after a tolerated
    /// resolution miss.
    pub values_kept_original: u64,
}

impl TransformStats {
    /// Fold another counter set into this one.
    pub fn merge(&mut self, other: &TransformStats) {
        self.rows_kept += other.rows_kept;
        self.rows_dropped += other.rows_dropped;
        self.values_kept_original += other.values_kept_original;
    }
}

/// Result of restoring one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The transformed row, ready for insertion.
    Insert(Row),
    /// The row was dropped; `column` names the unresolved column when the
    /// drop came from a failed `Required` resolution.
    Dropped {
        /// Unresolved column, if any.
        column: Option<String>,
    },
}

enum ColumnResolution {
    Set(Value),
    Keep,
    DropRow,
}

/// Drives module hooks and mapper resolution for export and restore.
pub struct TransformPipeline<'a> {
    registry: &'a ModuleRegistry,
}

impl<'a> TransformPipeline<'a> {
    /// Create a pipeline over the registry.
    pub fn new(registry: &'a ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Export-side transform: row veto/rewrite plus unconditional column
    /// rewrites. Returns `None` when a module dropped the row.
    pub fn export_row(
        &self,
        table: &TableDescriptor,
        row: Row,
        stats: &mut TransformStats,
    ) -> Result<Option<Row>, Error> {
        let mut row = match self.apply_row_hooks(table, row)? {
            Some(row) => row,
            None => {
                stats.rows_dropped += 1;
                return Ok(None);
            }
        };

        for column in row.column_names() {
            let value = match row.get(&column) {
                Some(v) if !v.is_null() => v.clone(),
                _ => continue,
            };
            if let Some(rewritten) = self.apply_value_hooks(table, &column, &value)? {
                row.set(column, rewritten);
            }
        }

        stats.rows_kept += 1;
        Ok(Some(row))
    }

    /// Restore-side transform: full hook precedence, relation resolution
    /// through the mapper, tenant stamping, and datetime normalization.
    ///
    /// The row's own primary-key column is left untouched; the destination
    /// assigns the new identifier and the caller records the mapping.
    pub fn restore_row(
        &self,
        table: &TableDescriptor,
        row: Row,
        ctx: &RestoreContext<'_>,
        stats: &mut TransformStats,
    ) -> Result<RowOutcome, Error> {
        // Predicates see source-side values, before any column rewriting.
        let snapshot = row.clone();

        let mut row = match self.apply_row_hooks(table, row)? {
            Some(row) => row,
            None => {
                stats.rows_dropped += 1;
                return Ok(RowOutcome::Dropped { column: None });
            }
        };

        for column in row.column_names() {
            if column == table.id_column {
                continue;
            }
            if table.tenant_column.as_deref() == Some(column.as_str()) {
                continue;
            }

            let value = match row.get(&column) {
                Some(v) if !v.is_null() => v.clone(),
                _ => continue,
            };

            let resolution =
                self.resolve_column(table, &column, &value, &snapshot, ctx, stats)?;
            let mut value = match resolution {
                ColumnResolution::Set(v) => v,
                ColumnResolution::Keep => value,
                ColumnResolution::DropRow => {
                    tracing::warn!(
                        table = %table.name,
                        row_id = %row_id_for_log(table, &snapshot),
                        column = %column,
                        "required reference unresolved, dropping row"
                    );
                    stats.rows_dropped += 1;
                    return Ok(RowOutcome::Dropped {
                        column: Some(column),
                    });
                }
            };

            if ctx.datetime_shift_micros != 0
                && table.datetime_columns.iter().any(|c| c == &column)
            {
                if let Value::Timestamp(t) = value {
                    value = Value::Timestamp(t + ctx.datetime_shift_micros);
                }
            }

            row.set(column, value);
        }

        if let Some(tenant_column) = &table.tenant_column {
            let new_tenant = ctx.mapper.tenant_mapping()?;
            let stamped = match row.get(tenant_column) {
                Some(old) if !old.is_null() => old.coerce_like(&new_tenant),
                _ => Value::String(new_tenant),
            };
            row.set(tenant_column.clone(), stamped);
        }

        stats.rows_kept += 1;
        Ok(RowOutcome::Insert(row))
    }

    /// Run every module's row hook in registration order, chaining rewrites.
    fn apply_row_hooks(
        &self,
        table: &TableDescriptor,
        mut row: Row,
    ) -> Result<Option<Row>, Error> {
        for module in self.registry.modules() {
            match module.prepare_row(table, row)? {
                RowDecision::Keep(kept) => row = kept,
                RowDecision::Drop => return Ok(None),
            }
        }
        Ok(Some(row))
    }

    /// First module handling the unconditional column rewrite wins.
    fn apply_value_hooks(
        &self,
        table: &TableDescriptor,
        column: &str,
        value: &Value,
    ) -> Result<Option<Value>, Error> {
        for module in self.registry.modules() {
            if let ValueDecision::Handled(v) = module.prepare_value(table, column, value)? {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    fn resolve_column(
        &self,
        table: &TableDescriptor,
        column: &str,
        value: &Value,
        snapshot: &Row,
        ctx: &RestoreContext<'_>,
        stats: &mut TransformStats,
    ) -> Result<ColumnResolution, Error> {
        if let Some(rewritten) = self.apply_value_hooks(table, column, value)? {
            return Ok(ColumnResolution::Set(rewritten));
        }

        let edges: Vec<&RelationEdge> = self
            .registry
            .edges_into(&table.name, column)
            .into_iter()
            .filter(|e| e.applies_to(snapshot))
            .collect();

        if edges.is_empty() {
            return self.resolve_user_column(table, column, value, ctx, stats);
        }

        // Sentinels ("no user", "everyone", ...) are copied unchanged and
        // never looked up.
        if ctx.mapper.is_sentinel(value) {
            return Ok(ColumnResolution::Keep);
        }

        for module in self.registry.modules() {
            if let ValueDecision::Handled(v) =
                module.prepare_related_value(table, column, &edges, value, ctx.mapper)?
            {
                return Ok(ColumnResolution::Set(v));
            }
        }

        if let Some(key) = value.as_key_string() {
            for edge in &edges {
                if let Some(mapped) =
                    ctx.mapper.get(&edge.parent_table, &edge.parent_column, &key)
                {
                    return Ok(ColumnResolution::Set(value.coerce_like(&mapped)));
                }
            }
        }

        let required = edges.iter().any(|e| e.is_required());
        if required && ctx.mode == RestoreMode::Remap {
            return Ok(ColumnResolution::DropRow);
        }

        // Tolerated miss: Low edges always keep the original value, and so
        // does an unresolved Required value in preserve-ids mode.
        tracing::debug!(
            table = %table.name,
            column = %column,
            "reference unresolved, keeping original value"
        );
        stats.values_kept_original += 1;
        Ok(ColumnResolution::Keep)
    }

    fn resolve_user_column(
        &self,
        table: &TableDescriptor,
        column: &str,
        value: &Value,
        ctx: &RestoreContext<'_>,
        stats: &mut TransformStats,
    ) -> Result<ColumnResolution, Error> {
        if !table.user_columns.iter().any(|c| c == column) {
            return Ok(ColumnResolution::Keep);
        }
        let Some((user_table, user_column)) = &ctx.user_mapping else {
            return Ok(ColumnResolution::Keep);
        };
        if ctx.mapper.is_sentinel(value) {
            return Ok(ColumnResolution::Keep);
        }
        match value.as_key_string() {
            Some(key) => match ctx.mapper.get(user_table, user_column, &key) {
                Some(mapped) => Ok(ColumnResolution::Set(value.coerce_like(&mapped))),
                None => {
                    stats.values_kept_original += 1;
                    Ok(ColumnResolution::Keep)
                }
            },
            None => Ok(ColumnResolution::Keep),
        }
    }
}

fn row_id_for_log(table: &TableDescriptor, row: &Row) -> String {
    row.get(&table.id_column)
        .and_then(|v| v.as_key_string())
        .unwrap_or_else(|| "<missing>".to_string())
}
