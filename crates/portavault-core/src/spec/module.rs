//! The module capability interface.

use super::relation::RelationEdge;
use super::table::TableDescriptor;
use crate::error::Error;
use crate::mapper::IdentifierMapper;
use crate::value::{Row, Value};

/// Outcome of a whole-row hook.
#[derive(Debug, Clone, PartialEq)]
pub enum RowDecision {
    /// Keep the row (possibly rewritten).
    Keep(Row),
    /// Drop the row from the operation.
    Drop,
}

/// Outcome of a column-value hook.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueDecision {
    /// The module does not handle this column; fall through.
    Unhandled,
    /// The module produced the final value for this column.
    Handled(Value),
}

/// Capability interface each functional module implements.
///
/// The engine holds a collection of `dyn ModuleSpec` and never needs to know
/// concrete module types. Hooks are consulted in registration order; the
/// first module returning a handled decision wins. Hook precedence per row
/// is: [`prepare_row`](ModuleSpec::prepare_row), then
/// [`prepare_value`](ModuleSpec::prepare_value) per column, then
/// [`prepare_related_value`](ModuleSpec::prepare_related_value) for columns
/// with incoming relation edges.
pub trait ModuleSpec: Send + Sync {
    /// Module name, for logging and registry diagnostics.
    fn name(&self) -> &str;

    /// The tables this module owns.
    fn tables(&self) -> Vec<TableDescriptor>;

    /// The relation edges this module declares. Edges may reference tables
    /// owned by other modules.
    fn relations(&self) -> Vec<RelationEdge> {
        Vec::new()
    }

    /// Whole-row veto/rewrite hook.
    ///
    /// Used for dropping tenant-singleton placeholder rows, folding legacy
    /// columns into one, or re-deriving a value from an already-resolved
    /// foreign key. Default keeps the row unchanged.
    fn prepare_row(&self, _table: &TableDescriptor, row: Row) -> Result<RowDecision, Error> {
        Ok(RowDecision::Keep(row))
    }

    /// Unconditional column rewrite, independent of relations (force a
    /// timestamp to now, hash a stored credential before archiving, ...).
    fn prepare_value(
        &self,
        _table: &TableDescriptor,
        _column: &str,
        _value: &Value,
    ) -> Result<ValueDecision, Error> {
        Ok(ValueDecision::Unhandled)
    }

    /// Relation-aware column rewrite for values the generic resolution
    /// cannot handle: composite encoded ids, path-embedded ids, and the
    /// like. `edges` are the relation edges whose child column matches,
    /// already filtered to those applying to the row.
    fn prepare_related_value(
        &self,
        _table: &TableDescriptor,
        _column: &str,
        _edges: &[&RelationEdge],
        _value: &Value,
        _mapper: &IdentifierMapper,
    ) -> Result<ValueDecision, Error> {
        Ok(ValueDecision::Unhandled)
    }
}
