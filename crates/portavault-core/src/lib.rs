//! Portavault Core - Declarative schema model and row remapping.
//!
//! This crate provides the schema-driven heart of the export/import engine:
//! the per-module table and relation declarations, the relation graph walker
//! that computes restore order, the per-operation identifier mapper, and the
//! row transform pipeline applied during export and restore.

pub mod error;
#[cfg(test)]
pub(crate) mod test_support;
pub mod graph;
pub mod mapper;
pub mod pipeline;
pub mod spec;
pub mod value;

pub use error::Error;
pub use graph::RelationGraph;
pub use mapper::{IdentifierMapper, Sentinels};
pub use pipeline::{
    RestoreContext, RestoreMode, RowOutcome, TransformPipeline, TransformStats,
};
pub use spec::{
    ConflictPolicy, IdKind, Importance, ModuleRegistry, ModuleRegistryBuilder, ModuleSpec,
    RelationEdge, RowDecision, RowPredicate, TableDescriptor, ValueDecision,
};
pub use value::{Row, Value};
