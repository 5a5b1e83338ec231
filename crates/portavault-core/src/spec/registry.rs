//! Merged, validated view over all registered modules.

use super::module::ModuleSpec;
use super::relation::RelationEdge;
use super::table::TableDescriptor;
use crate::error::Error;
use std::collections::HashMap;
use std::fmt;

/// Builder for [`ModuleRegistry`]. Modules are registered once at start-up.
#[derive(Default)]
pub struct ModuleRegistryBuilder {
    modules: Vec<Box<dyn ModuleSpec>>,
}

impl ModuleRegistryBuilder {
    /// Register a module. Registration order is significant: it decides
    /// hook precedence and breaks ties in restore ordering.
    pub fn register(mut self, module: Box<dyn ModuleSpec>) -> Self {
        self.modules.push(module);
        self
    }

    /// Validate and build the registry.
    ///
    /// Fails if two modules declare the same table name or if any relation
    /// edge references a table no module declared.
    pub fn build(self) -> Result<ModuleRegistry, Error> {
        let mut tables = Vec::new();
        let mut by_name = HashMap::new();
        let mut relations = Vec::new();

        for module in &self.modules {
            for table in module.tables() {
                if by_name.contains_key(&table.name) {
                    return Err(Error::DuplicateTable {
                        table: table.name,
                        module: module.name().to_string(),
                    });
                }
                by_name.insert(table.name.clone(), tables.len());
                tables.push(table);
            }
            relations.extend(module.relations());
        }

        for edge in &relations {
            for endpoint in [&edge.parent_table, &edge.child_table] {
                if !by_name.contains_key(endpoint) {
                    return Err(Error::UnknownTable {
                        parent: edge.parent_table.clone(),
                        parent_column: edge.parent_column.clone(),
                        child: edge.child_table.clone(),
                        child_column: edge.child_column.clone(),
                        unknown: endpoint.clone(),
                    });
                }
            }
        }

        tracing::debug!(
            modules = self.modules.len(),
            tables = tables.len(),
            relations = relations.len(),
            "module registry built"
        );

        Ok(ModuleRegistry {
            modules: self.modules,
            tables,
            by_name,
            relations,
        })
    }
}

/// The combined table/relation catalog over all registered modules.
pub struct ModuleRegistry {
    modules: Vec<Box<dyn ModuleSpec>>,
    tables: Vec<TableDescriptor>,
    by_name: HashMap<String, usize>,
    relations: Vec<RelationEdge>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modules: Vec<&str> = self.modules.iter().map(|m| m.name()).collect();
        f.debug_struct("ModuleRegistry")
            .field("modules", &modules)
            .field("tables", &self.tables.len())
            .field("relations", &self.relations.len())
            .finish()
    }
}

impl ModuleRegistry {
    /// Start building a registry.
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::default()
    }

    /// All tables in declaration order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Look up a table descriptor by name.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.by_name.get(name).map(|&idx| &self.tables[idx])
    }

    /// All relation edges in declaration order.
    pub fn relations(&self) -> &[RelationEdge] {
        &self.relations
    }

    /// Edges whose child endpoint is the given table/column, in declaration
    /// order.
    pub fn edges_into(&self, child_table: &str, child_column: &str) -> Vec<&RelationEdge> {
        self.relations
            .iter()
            .filter(|e| e.child_table == child_table && e.child_column == child_column)
            .collect()
    }

    /// The registered modules, in registration order.
    pub fn modules(&self) -> &[Box<dyn ModuleSpec>] {
        &self.modules
    }
}
