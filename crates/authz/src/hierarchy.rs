//! Hierarchical permission resolution.
//!
//! [`HierarchyResolver::resolve`] turns raw store rows into an in-memory
//! graph of [`PermissionNode`]s keyed by target id, with parent and library
//! references held as ids into that map (arena + index, never owning
//! pointers). After resolution, walking `parent` from any node terminates:
//! the resolver cuts the edge that closes a cycle, it does not merely
//! assume acyclic input.
//!
//! Library references are treated as flat (a library is a secondary
//! container, not a chain) and are not cycle-checked. If libraries can
//! themselves be chained that assumption must be revisited.

use std::collections::{HashMap, HashSet};

use casevault_core::{AuthorityId, TargetId};

use crate::error::AuthzResult;
use crate::roles::{RoleAssignment, RoleId};
use crate::traits::HierarchyStore;

/// A single node of the resolved permission graph.
///
/// Built transiently per resolution call from raw rows; never persisted and
/// never cached across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionNode {
    target_id: TargetId,
    parent_id: Option<TargetId>,
    library_id: Option<TargetId>,
    inherit_from_parent: bool,
    inherit_from_library: bool,
    is_library: bool,
    direct_assignments: HashSet<RoleAssignment>,
}

impl PermissionNode {
    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    /// Weak reference to the parent container; `None` for roots, for nodes
    /// whose parent lies outside the fetched scope, and for nodes whose
    /// parent edge was severed to break a cycle.
    pub fn parent_id(&self) -> Option<&TargetId> {
        self.parent_id.as_ref()
    }

    pub fn library_id(&self) -> Option<&TargetId> {
        self.library_id.as_ref()
    }

    pub fn inherit_from_parent(&self) -> bool {
        self.inherit_from_parent
    }

    pub fn inherit_from_library(&self) -> bool {
        self.inherit_from_library
    }

    pub fn is_library(&self) -> bool {
        self.is_library
    }

    pub fn direct_assignments(&self) -> &HashSet<RoleAssignment> {
        &self.direct_assignments
    }
}

/// The resolved, acyclic permission graph for one resolution call.
#[derive(Debug, Clone, Default)]
pub struct PermissionHierarchy {
    nodes: HashMap<TargetId, PermissionNode>,
}

impl PermissionHierarchy {
    pub fn node(&self, id: &TargetId) -> Option<&PermissionNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &TargetId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PermissionNode> {
        self.nodes.values()
    }

    pub(crate) fn node_mut(&mut self, id: &TargetId) -> Option<&mut PermissionNode> {
        self.nodes.get_mut(id)
    }
}

/// Builds the permission graph from raw store rows.
pub struct HierarchyResolver<'a> {
    store: &'a dyn HierarchyStore,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(store: &'a dyn HierarchyStore) -> Self {
        Self { store }
    }

    /// Resolve the permission graph for `targets`.
    ///
    /// One batched node fetch, one batched assignment fetch. Rows with a
    /// blank target id are skipped; parent/library columns referencing ids
    /// absent from the fetched scope leave the reference unset (the node
    /// acts as a root). The returned graph is guaranteed acyclic along
    /// parent references.
    pub fn resolve(&self, targets: &[TargetId]) -> AuthzResult<PermissionHierarchy> {
        if targets.is_empty() {
            return Ok(PermissionHierarchy::default());
        }

        let rows = self.store.fetch_nodes(targets)?;

        // First pass: one node per distinct target id, flags decoded.
        let mut nodes: HashMap<TargetId, PermissionNode> = HashMap::new();
        let mut raw_refs: HashMap<TargetId, (Option<TargetId>, Option<TargetId>)> = HashMap::new();
        for row in &rows {
            let Some(target_id) = decode_id(&row.target_id) else {
                continue;
            };
            raw_refs.insert(
                target_id.clone(),
                (decode_id(&row.parent_id), decode_id(&row.library_id)),
            );
            nodes.insert(
                target_id.clone(),
                PermissionNode {
                    target_id,
                    parent_id: None,
                    library_id: None,
                    inherit_from_parent: decode_flag(&row.inherit_from_parent),
                    inherit_from_library: decode_flag(&row.inherit_from_library),
                    is_library: decode_flag(&row.is_library),
                    direct_assignments: HashSet::new(),
                },
            );
        }

        // Second pass: link weak references, but only to nodes we actually
        // fetched. A parent outside the scope leaves the node a root.
        for (target_id, (parent, library)) in raw_refs {
            let parent = parent.filter(|id| *id != target_id && nodes.contains_key(id));
            let library = library.filter(|id| nodes.contains_key(id));
            if let Some(node) = nodes.get_mut(&target_id) {
                node.parent_id = parent;
                node.library_id = library;
            }
        }

        // Attach direct assignments, batched over every fetched node.
        let node_ids: Vec<TargetId> = nodes.keys().cloned().collect();
        for row in self.store.fetch_assignments(&node_ids)? {
            let (Some(target_id), Some(authority), Some(role)) = (
                decode_id(&row.target_id),
                decode_id_raw(&row.authority_id),
                decode_id_raw(&row.role_id),
            ) else {
                continue;
            };
            if let Some(node) = nodes.get_mut(&target_id) {
                node.direct_assignments.insert(RoleAssignment::new(
                    AuthorityId::new(authority)?,
                    RoleId::new(role.to_string()),
                ));
            }
        }

        let mut hierarchy = PermissionHierarchy { nodes };

        // Cycle removal. Requested targets are walked first, in caller
        // order, then the remaining nodes in sorted order, so the edge that
        // gets cut is deterministic for a given input.
        let mut remaining: Vec<TargetId> = hierarchy
            .nodes
            .keys()
            .filter(|id| !targets.contains(*id))
            .cloned()
            .collect();
        remaining.sort();
        for root in targets.iter().chain(remaining.iter()) {
            cut_cycle_from(&mut hierarchy, root);
        }

        Ok(hierarchy)
    }
}

/// Walk the parent chain from `root`; the first time the next parent was
/// already visited on this walk, sever the edge that closes the cycle and
/// stop. Only that one edge is cut, nothing else is restructured.
///
/// This defends against a move operation that re-parents an instance into
/// its own descendant, which otherwise makes two nodes mutual ancestors.
fn cut_cycle_from(hierarchy: &mut PermissionHierarchy, root: &TargetId) {
    let mut visited: HashSet<TargetId> = HashSet::new();
    let mut current = root.clone();
    visited.insert(current.clone());

    loop {
        let Some(parent) = hierarchy.node(&current).and_then(|n| n.parent_id().cloned()) else {
            return;
        };
        if visited.contains(&parent) {
            if let Some(node) = hierarchy.node_mut(&current) {
                tracing::debug!(
                    node = %current,
                    severed_parent = %parent,
                    "cycle detected in permission hierarchy, severing parent edge"
                );
                node.parent_id = None;
            }
            return;
        }
        visited.insert(parent.clone());
        current = parent;
    }
}

/// Decode a raw id column: blank (or whitespace-only) means absent.
fn decode_id(raw: &str) -> Option<TargetId> {
    TargetId::new(raw.trim()).ok()
}

fn decode_id_raw(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Decode a boolean-ish flag column. Only "1" and "true" (any case) count
/// as true; every other representation is defensively false.
fn decode_flag(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed == "1" || trimmed.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{AssignmentRow, NodeRow};
    use proptest::prelude::*;

    /// Minimal in-crate store over canned rows; the real in-memory store
    /// lives in casevault-infra.
    struct RowStore {
        nodes: Vec<NodeRow>,
        assignments: Vec<AssignmentRow>,
    }

    impl HierarchyStore for RowStore {
        fn fetch_nodes(&self, _ids: &[TargetId]) -> anyhow::Result<Vec<NodeRow>> {
            Ok(self.nodes.clone())
        }

        fn fetch_assignments(&self, _ids: &[TargetId]) -> anyhow::Result<Vec<AssignmentRow>> {
            Ok(self.assignments.clone())
        }
    }

    fn node(target: &str, parent: &str, inherit_parent: &str) -> NodeRow {
        NodeRow {
            target_id: target.to_string(),
            parent_id: parent.to_string(),
            library_id: String::new(),
            inherit_from_parent: inherit_parent.to_string(),
            inherit_from_library: "0".to_string(),
            is_library: "0".to_string(),
        }
    }

    fn target(id: &str) -> TargetId {
        TargetId::new(id).unwrap()
    }

    #[test]
    fn empty_request_yields_empty_hierarchy() {
        let store = RowStore {
            nodes: vec![],
            assignments: vec![],
        };
        let hierarchy = HierarchyResolver::new(&store).resolve(&[]).unwrap();
        assert!(hierarchy.is_empty());
    }

    #[test]
    fn unknown_target_is_no_data_not_an_error() {
        let store = RowStore {
            nodes: vec![],
            assignments: vec![],
        };
        let hierarchy = HierarchyResolver::new(&store)
            .resolve(&[target("missing")])
            .unwrap();
        assert!(hierarchy.node(&target("missing")).is_none());
    }

    #[test]
    fn acyclic_edges_are_preserved_unchanged() {
        let store = RowStore {
            nodes: vec![
                node("project", "", "0"),
                node("case", "project", "1"),
                node("document", "case", "1"),
            ],
            assignments: vec![],
        };
        let hierarchy = HierarchyResolver::new(&store)
            .resolve(&[target("document")])
            .unwrap();

        assert_eq!(
            hierarchy.node(&target("document")).unwrap().parent_id(),
            Some(&target("case"))
        );
        assert_eq!(
            hierarchy.node(&target("case")).unwrap().parent_id(),
            Some(&target("project"))
        );
        assert_eq!(hierarchy.node(&target("project")).unwrap().parent_id(), None);
    }

    #[test]
    fn flags_decode_defensively() {
        let store = RowStore {
            nodes: vec![
                node("a", "", "1"),
                node("b", "", "TRUE"),
                node("c", "", "yes"),
                node("d", "", ""),
            ],
            assignments: vec![],
        };
        let hierarchy = HierarchyResolver::new(&store)
            .resolve(&[target("a")])
            .unwrap();

        assert!(hierarchy.node(&target("a")).unwrap().inherit_from_parent());
        assert!(hierarchy.node(&target("b")).unwrap().inherit_from_parent());
        assert!(!hierarchy.node(&target("c")).unwrap().inherit_from_parent());
        assert!(!hierarchy.node(&target("d")).unwrap().inherit_from_parent());
    }

    #[test]
    fn parent_outside_scope_leaves_reference_unset() {
        let store = RowStore {
            nodes: vec![node("document", "unfetched-parent", "1")],
            assignments: vec![],
        };
        let hierarchy = HierarchyResolver::new(&store)
            .resolve(&[target("document")])
            .unwrap();
        assert_eq!(hierarchy.node(&target("document")).unwrap().parent_id(), None);
    }

    #[test]
    fn blank_assignment_columns_are_skipped() {
        let store = RowStore {
            nodes: vec![node("doc", "", "0")],
            assignments: vec![
                AssignmentRow {
                    target_id: "doc".to_string(),
                    authority_id: String::new(),
                    role_id: "viewer".to_string(),
                },
                AssignmentRow {
                    target_id: "doc".to_string(),
                    authority_id: "user1".to_string(),
                    role_id: "viewer".to_string(),
                },
            ],
        };
        let hierarchy = HierarchyResolver::new(&store)
            .resolve(&[target("doc")])
            .unwrap();
        assert_eq!(
            hierarchy.node(&target("doc")).unwrap().direct_assignments().len(),
            1
        );
    }

    /// The move-into-own-descendant scenario: project -> case -> document ->
    /// picture, then an erroneous move re-parents `case` under `picture`,
    /// making the chain loop. Resolving the picture must terminate, severing
    /// exactly the edge that closes the cycle: `case` loses its parent.
    #[test]
    fn cycle_from_bad_move_is_cut_at_first_revisit() {
        let store = RowStore {
            nodes: vec![
                node("project", "", "1"),
                node("case", "picture", "1"),
                node("document", "case", "1"),
                node("picture", "document", "1"),
            ],
            assignments: vec![],
        };
        let hierarchy = HierarchyResolver::new(&store)
            .resolve(&[target("picture")])
            .unwrap();

        // Walk from `picture`: picture -> document -> case, whose parent
        // (`picture`) was already visited, so case's parent edge is cut.
        assert_eq!(hierarchy.node(&target("case")).unwrap().parent_id(), None);
        assert_eq!(
            hierarchy.node(&target("document")).unwrap().parent_id(),
            Some(&target("case"))
        );
        assert_eq!(
            hierarchy.node(&target("picture")).unwrap().parent_id(),
            Some(&target("document"))
        );

        // Every parent walk now terminates.
        for n in hierarchy.nodes() {
            let mut seen = HashSet::new();
            let mut cur = Some(n.target_id().clone());
            while let Some(id) = cur {
                assert!(seen.insert(id.clone()), "walk revisited {id}");
                cur = hierarchy.node(&id).and_then(|n| n.parent_id().cloned());
            }
        }
    }

    #[test]
    fn self_parent_is_dropped_at_link_time() {
        let store = RowStore {
            nodes: vec![node("loop", "loop", "1")],
            assignments: vec![],
        };
        let hierarchy = HierarchyResolver::new(&store)
            .resolve(&[target("loop")])
            .unwrap();
        assert_eq!(hierarchy.node(&target("loop")).unwrap().parent_id(), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: for any parent wiring over a small id universe, even
        /// arbitrarily cyclic, resolution terminates and every parent walk
        /// in the result is finite.
        #[test]
        fn resolution_is_always_acyclic(
            parents in prop::collection::vec(prop::option::of(0usize..8), 8)
        ) {
            let nodes: Vec<NodeRow> = parents
                .iter()
                .enumerate()
                .map(|(i, parent)| node(
                    &format!("n{i}"),
                    &parent.map(|p| format!("n{p}")).unwrap_or_default(),
                    "1",
                ))
                .collect();
            let store = RowStore { nodes, assignments: vec![] };
            let requested: Vec<TargetId> = (0..8).map(|i| target(&format!("n{i}"))).collect();

            let hierarchy = HierarchyResolver::new(&store).resolve(&requested).unwrap();

            for n in hierarchy.nodes() {
                let mut steps = 0;
                let mut cur = Some(n.target_id().clone());
                while let Some(id) = cur {
                    steps += 1;
                    prop_assert!(steps <= hierarchy.len() + 1, "parent walk did not terminate");
                    cur = hierarchy.node(&id).and_then(|p| p.parent_id().cloned());
                }
            }
        }
    }
}
