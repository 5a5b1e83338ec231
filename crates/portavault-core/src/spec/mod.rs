//! Declarative module specifications.
//!
//! Each functional module of the product registers one [`ModuleSpec`]
//! describing the tables it owns, the directed relations between them, and
//! optional row/value transform hooks. The [`ModuleRegistry`] is the merged,
//! validated view over all registered modules.

mod module;
mod registry;
mod relation;
mod table;

pub use module::{ModuleSpec, RowDecision, ValueDecision};
pub use registry::{ModuleRegistry, ModuleRegistryBuilder};
pub use relation::{Importance, RelationEdge, RowPredicate};
pub use table::{ConflictPolicy, IdKind, TableDescriptor};
