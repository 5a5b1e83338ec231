//! Relation edges between tables.

use crate::value::Row;
use std::fmt;
use std::sync::Arc;

/// Importance of a relation edge during restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    /// Remap failure drops the child row. Required edges must admit a
    /// topological order across the whole graph.
    Required,
    /// Remap failure is tolerated; the original value is kept. Low edges
    /// may form cycles and are excluded from ordering.
    Low,
}

/// Predicate over a child row, used to disambiguate polymorphic columns
/// (e.g. an `entry_id` whose target table depends on a sibling
/// `entry_type` column).
pub type RowPredicate = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// A directed foreign-key-like dependency: `parent.parent_column` is
/// referenced by `child.child_column`.
#[derive(Clone)]
pub struct RelationEdge {
    /// Parent (referenced) table.
    pub parent_table: String,
    /// Parent column, usually the primary key.
    pub parent_column: String,
    /// Child (referencing) table.
    pub child_table: String,
    /// Child column holding the reference.
    pub child_column: String,
    /// Optional guard; the edge applies to a row only when the predicate
    /// holds. `None` means the edge always applies.
    pub predicate: Option<RowPredicate>,
    /// Importance level.
    pub importance: Importance,
}

impl RelationEdge {
    /// Create a `Required` edge.
    pub fn required(
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
        child_table: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            child_table: child_table.into(),
            child_column: child_column.into(),
            predicate: None,
            importance: Importance::Required,
        }
    }

    /// Create a `Low` importance edge.
    pub fn low(
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
        child_table: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        Self {
            importance: Importance::Low,
            ..Self::required(parent_table, parent_column, child_table, child_column)
        }
    }

    /// Guard the edge with a row predicate.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether the edge applies to the given row.
    pub fn applies_to(&self, row: &Row) -> bool {
        match &self.predicate {
            Some(p) => p(row),
            None => true,
        }
    }

    /// Whether this edge is required.
    pub fn is_required(&self) -> bool {
        self.importance == Importance::Required
    }

    /// Whether the edge points from a table back into itself.
    pub fn is_self_referential(&self) -> bool {
        self.parent_table == self.child_table
    }
}

impl fmt::Debug for RelationEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationEdge")
            .field("parent", &format!("{}.{}", self.parent_table, self.parent_column))
            .field("child", &format!("{}.{}", self.child_table, self.child_column))
            .field("guarded", &self.predicate.is_some())
            .field("importance", &self.importance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Row, Value};

    #[test]
    fn test_edge_constructors() {
        let edge = RelationEdge::required("rooms", "id", "room_members", "room_id");
        assert!(edge.is_required());
        assert!(!edge.is_self_referential());

        let edge = RelationEdge::low("rooms", "id", "rooms", "parent_id");
        assert!(!edge.is_required());
        assert!(edge.is_self_referential());
    }

    #[test]
    fn test_predicate_guard() {
        let edge = RelationEdge::required("mail_tag", "id", "mail_tag_mail", "id_tag")
            .with_predicate(|row: &Row| row.get("tag_kind") == Some(&Value::Int(0)));

        let tagged = Row::new().with("tag_kind", 0i64);
        let crm = Row::new().with("tag_kind", 1i64);
        assert!(edge.applies_to(&tagged));
        assert!(!edge.applies_to(&crm));

        let unguarded = RelationEdge::required("a", "id", "b", "a_id");
        assert!(unguarded.applies_to(&crm));
    }
}
