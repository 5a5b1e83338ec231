//! Shared fixtures for crate tests.

use crate::spec::{IdKind, ModuleSpec, RelationEdge, TableDescriptor};

/// Minimal module used across core tests: a rooms tree plus membership.
pub(crate) struct RoomsModule;

impl ModuleSpec for RoomsModule {
    fn name(&self) -> &str {
        "rooms"
    }

    fn tables(&self) -> Vec<TableDescriptor> {
        vec![
            TableDescriptor::new("rooms", "id", IdKind::Integer).with_tenant_column("tenant_id"),
            TableDescriptor::new("room_members", "id", IdKind::Integer)
                .with_tenant_column("tenant_id")
                .with_user_column("user_id"),
        ]
    }

    fn relations(&self) -> Vec<RelationEdge> {
        vec![
            RelationEdge::required("rooms", "id", "room_members", "room_id"),
            RelationEdge::low("rooms", "id", "rooms", "parent_id"),
        ]
    }
}
