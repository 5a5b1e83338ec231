//! Core error types.

use thiserror::Error;

/// Errors produced by the schema model, graph walker, and mapper.
#[derive(Debug, Error)]
pub enum Error {
    /// Two modules declared a table with the same name.
    #[error("table '{table}' declared by module '{module}' already registered")]
    DuplicateTable {
        /// The conflicting table name.
        table: String,
        /// The module attempting the second declaration.
        module: String,
    },

    /// A relation edge references a table no module declared.
    #[error("relation '{parent}.{parent_column}' -> '{child}.{child_column}' references unknown table '{unknown}'")]
    UnknownTable {
        /// Parent table of the edge.
        parent: String,
        /// Parent column of the edge.
        parent_column: String,
        /// Child table of the edge.
        child: String,
        /// Child column of the edge.
        child_column: String,
        /// The endpoint that is not registered.
        unknown: String,
    },

    /// The required-edge subgraph admits no topological order.
    #[error("required relations form a cycle through tables: {}", tables.join(", "))]
    RequiredCycle {
        /// Tables participating in the cycle.
        tables: Vec<String>,
    },

    /// A mapping key was set twice with different values.
    #[error("conflicting mapping for {table}.{column} '{old}': already '{existing}', rejected '{rejected}'")]
    MappingConflict {
        /// Table component of the key.
        table: String,
        /// Column component of the key.
        column: String,
        /// The source-side value.
        old: String,
        /// The mapping already recorded.
        existing: String,
        /// The mapping that was rejected.
        rejected: String,
    },

    /// A tenant-scoped row was transformed before the destination tenant
    /// mapping was recorded.
    #[error("tenant mapping not set; destination tenant must be created before rows are remapped")]
    TenantMappingMissing,

    /// Persistence layer error for the optional durable mapper.
    #[error("mapper storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A persisted mapper entry could not be decoded.
    #[error("corrupt mapper entry: {0}")]
    CorruptEntry(String),
}
