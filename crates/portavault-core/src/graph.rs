//! Relation graph walker.
//!
//! Builds the union of all relation edges from the registry and computes the
//! order in which tables must be restored: a strict topological order over
//! `Required` edges, with roots and ties resolved by declaration order so the
//! walk is deterministic. `Low` edges are excluded from the ordering and
//! handled by a secondary, best-effort patch pass.

use crate::error::Error;
use crate::mapper::IdentifierMapper;
use crate::spec::{ModuleRegistry, RelationEdge};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

/// Hook invoked after a table's rows are fully remapped, e.g. to rewrite
/// blob paths embedding the table's ids.
pub type RemapHook = Box<dyn Fn(&IdentifierMapper) -> Result<(), Error> + Send + Sync>;

/// The computed restore plan over the combined relation graph.
pub struct RelationGraph {
    order: Vec<String>,
    deferred: Vec<RelationEdge>,
    hooks: HashMap<String, Vec<RemapHook>>,
}

impl fmt::Debug for RelationGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationGraph")
            .field("order", &self.order)
            .field("deferred", &self.deferred)
            .field("hooked_tables", &self.hooks.len())
            .finish()
    }
}

impl RelationGraph {
    /// Build the graph and compute the topological restore order.
    ///
    /// Fails with [`Error::RequiredCycle`] when the `Required` subgraph
    /// admits no topological order.
    pub fn build(registry: &ModuleRegistry) -> Result<Self, Error> {
        let tables = registry.tables();
        let index: HashMap<&str, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.as_str(), i))
            .collect();

        let mut indegree = vec![0usize; tables.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
        let mut deferred = Vec::new();

        for edge in registry.relations() {
            if !edge.is_required() {
                deferred.push(edge.clone());
                continue;
            }
            // Endpoints were validated at registry build.
            let parent = index[edge.parent_table.as_str()];
            let child = index[edge.child_table.as_str()];
            children[parent].push(child);
            indegree[child] += 1;
        }

        // Kahn's algorithm; the min-heap keeps declaration order for roots
        // and ties.
        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(tables.len());
        while let Some(Reverse(table)) = ready.pop() {
            order.push(tables[table].name.clone());
            for &child in &children[table] {
                indegree[child] -= 1;
                if indegree[child] == 0 {
                    ready.push(Reverse(child));
                }
            }
        }

        if order.len() != tables.len() {
            let stuck = indegree
                .iter()
                .enumerate()
                .filter(|(_, &d)| d > 0)
                .map(|(i, _)| tables[i].name.clone())
                .collect();
            return Err(Error::RequiredCycle { tables: stuck });
        }

        tracing::debug!(
            tables = order.len(),
            deferred_edges = deferred.len(),
            "restore order computed"
        );

        Ok(Self {
            order,
            deferred,
            hooks: HashMap::new(),
        })
    }

    /// Tables in restore order: every table appears after all tables it
    /// depends on through `Required` edges.
    pub fn restore_order(&self) -> &[String] {
        &self.order
    }

    /// `Low` importance edges, excluded from the ordering and patched in a
    /// secondary pass.
    pub fn deferred_edges(&self) -> &[RelationEdge] {
        &self.deferred
    }

    /// Deferred edges whose child is the given table.
    pub fn deferred_edges_into(&self, child_table: &str) -> Vec<&RelationEdge> {
        self.deferred
            .iter()
            .filter(|e| e.child_table == child_table)
            .collect()
    }

    /// Register a hook to run once the table's rows are fully remapped.
    pub fn add_remap_hook(&mut self, table: impl Into<String>, hook: RemapHook) {
        self.hooks.entry(table.into()).or_default().push(hook);
    }

    /// Run the registered hooks for a table.
    pub fn run_remap_hooks(&self, table: &str, mapper: &IdentifierMapper) -> Result<(), Error> {
        if let Some(hooks) = self.hooks.get(table) {
            for hook in hooks {
                hook(mapper)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::Sentinels;
    use crate::spec::{IdKind, ModuleSpec, TableDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct GraphModule {
        name: &'static str,
        tables: Vec<&'static str>,
        edges: Vec<RelationEdge>,
    }

    impl ModuleSpec for GraphModule {
        fn name(&self) -> &str {
            self.name
        }

        fn tables(&self) -> Vec<TableDescriptor> {
            self.tables
                .iter()
                .map(|t| TableDescriptor::new(*t, "id", IdKind::Integer))
                .collect()
        }

        fn relations(&self) -> Vec<RelationEdge> {
            self.edges.clone()
        }
    }

    fn registry(tables: Vec<&'static str>, edges: Vec<RelationEdge>) -> ModuleRegistry {
        ModuleRegistry::builder()
            .register(Box::new(GraphModule {
                name: "graph",
                tables,
                edges,
            }))
            .build()
            .unwrap()
    }

    fn position(order: &[String], table: &str) -> usize {
        order.iter().position(|t| t == table).unwrap()
    }

    #[test]
    fn test_parents_before_children() {
        let registry = registry(
            vec!["files", "folders", "projects", "tasks"],
            vec![
                RelationEdge::required("projects", "id", "tasks", "project_id"),
                RelationEdge::required("folders", "id", "files", "folder_id"),
                RelationEdge::required("projects", "id", "folders", "project_id"),
            ],
        );
        let graph = RelationGraph::build(&registry).unwrap();
        let order = graph.restore_order();

        // Every required edge places the parent strictly before the child.
        for edge in registry.relations() {
            assert!(
                position(order, &edge.parent_table) < position(order, &edge.child_table),
                "{:?} out of order in {:?}",
                edge,
                order
            );
        }
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let registry = registry(vec!["zeta", "alpha", "mid"], vec![]);
        let graph = RelationGraph::build(&registry).unwrap();
        // No edges: all roots, declaration order preserved.
        assert_eq!(graph.restore_order(), &["zeta", "alpha", "mid"]);
        assert!(format!("{graph:?}").contains("zeta"));
    }

    #[test]
    fn test_low_edges_excluded_from_ordering() {
        let registry = registry(
            vec!["rooms"],
            vec![RelationEdge::low("rooms", "id", "rooms", "parent_id")],
        );
        let graph = RelationGraph::build(&registry).unwrap();
        assert_eq!(graph.restore_order(), &["rooms"]);
        assert_eq!(graph.deferred_edges().len(), 1);
        assert_eq!(graph.deferred_edges_into("rooms").len(), 1);
    }

    #[test]
    fn test_required_cycle_is_fatal() {
        let registry = registry(
            vec!["a", "b"],
            vec![
                RelationEdge::required("a", "id", "b", "a_id"),
                RelationEdge::required("b", "id", "a", "b_id"),
            ],
        );
        let err = RelationGraph::build(&registry).unwrap_err();
        assert!(matches!(err, Error::RequiredCycle { tables } if tables.len() == 2));
    }

    #[test]
    fn test_remap_hooks_run_after_table() {
        let registry = registry(vec!["files"], vec![]);
        let mut graph = RelationGraph::build(&registry).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        graph.add_remap_hook(
            "files",
            Box::new(move |_mapper| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let mapper = IdentifierMapper::new(Sentinels::new());
        graph.run_remap_hooks("files", &mapper).unwrap();
        graph.run_remap_hooks("unhooked", &mapper).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
