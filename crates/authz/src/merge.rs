//! Effective-assignment merge over a resolved hierarchy.
//!
//! Pure, read-only and reentrant: a merge borrows the hierarchy immutably
//! and keeps its memo local, so independent graphs can be merged from any
//! number of threads concurrently.

use std::collections::{HashMap, HashSet};

use casevault_core::TargetId;

use crate::hierarchy::PermissionHierarchy;
use crate::roles::RoleAssignment;

impl PermissionHierarchy {
    /// The merged assignment set for `target`: its direct assignments,
    /// unioned with the parent's effective set when `inherit_from_parent`
    /// is on, and with the library's when `inherit_from_library` is on.
    ///
    /// Unknown targets yield the empty set. Turning an inherit flag off
    /// only ever removes inherited contributions, never direct ones.
    pub fn effective_assignments(&self, target: &TargetId) -> HashSet<RoleAssignment> {
        AssignmentMerger::new(self).effective(target)
    }

    /// A merger that memoizes shared ancestors across several queries
    /// against the same resolved graph.
    pub fn merger(&self) -> AssignmentMerger<'_> {
        AssignmentMerger::new(self)
    }
}

/// Memoizing merge over one [`PermissionHierarchy`].
///
/// The memo is keyed by target id and lives only as long as the merger;
/// nothing is cached across resolution calls. Recursion is bounded because
/// the resolver guarantees acyclic parent chains (library references are
/// assumed flat, see the resolver notes).
pub struct AssignmentMerger<'h> {
    hierarchy: &'h PermissionHierarchy,
    memo: HashMap<TargetId, HashSet<RoleAssignment>>,
}

impl<'h> AssignmentMerger<'h> {
    pub fn new(hierarchy: &'h PermissionHierarchy) -> Self {
        Self {
            hierarchy,
            memo: HashMap::new(),
        }
    }

    pub fn effective(&mut self, target: &TargetId) -> HashSet<RoleAssignment> {
        if let Some(cached) = self.memo.get(target) {
            return cached.clone();
        }

        let Some(node) = self.hierarchy.node(target) else {
            return HashSet::new();
        };

        let mut merged = node.direct_assignments().clone();
        if node.inherit_from_parent() {
            if let Some(parent) = node.parent_id().cloned() {
                merged.extend(self.effective(&parent));
            }
        }
        if node.inherit_from_library() {
            if let Some(library) = node.library_id().cloned() {
                merged.extend(self.effective(&library));
            }
        }

        self.memo.insert(target.clone(), merged.clone());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyResolver;
    use crate::traits::{AssignmentRow, HierarchyStore, NodeRow};
    use casevault_core::AuthorityId;
    use crate::roles::RoleId;
    use proptest::prelude::*;

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

    fn target(id: &str) -> TargetId {
        TargetId::new(id).unwrap()
    }

    fn assignment(authority: &str, role: &str) -> RoleAssignment {
        RoleAssignment::new(
            AuthorityId::new(authority).unwrap(),
            RoleId::new(role.to_string()),
        )
    }

    fn row(target: &str, authority: &str, role: &str) -> AssignmentRow {
        AssignmentRow {
            target_id: target.to_string(),
            authority_id: authority.to_string(),
            role_id: role.to_string(),
        }
    }

    fn node(
        target: &str,
        parent: &str,
        library: &str,
        inherit_parent: bool,
        inherit_library: bool,
    ) -> NodeRow {
        NodeRow {
            target_id: target.to_string(),
            parent_id: parent.to_string(),
            library_id: library.to_string(),
            inherit_from_parent: if inherit_parent { "1" } else { "0" }.to_string(),
            inherit_from_library: if inherit_library { "1" } else { "0" }.to_string(),
            is_library: "0".to_string(),
        }
    }

    fn resolve(store: &RowStore, targets: &[TargetId]) -> PermissionHierarchy {
        HierarchyResolver::new(store).resolve(targets).unwrap()
    }

    #[test]
    fn child_inherits_parent_assignments() {
        let store = RowStore {
            nodes: vec![
                node("a", "", "", false, false),
                node("b", "a", "", true, false),
            ],
            assignments: vec![row("a", "user1", "viewer")],
        };
        let hierarchy = resolve(&store, &[target("b")]);

        let effective = hierarchy.effective_assignments(&target("b"));
        assert_eq!(effective, HashSet::from([assignment("user1", "viewer")]));
    }

    #[test]
    fn inherit_flag_off_blocks_parent_contributions() {
        let store = RowStore {
            nodes: vec![
                node("a", "", "", false, false),
                node("b", "a", "", false, false),
            ],
            assignments: vec![row("a", "user1", "viewer")],
        };
        let hierarchy = resolve(&store, &[target("b")]);

        assert!(hierarchy.effective_assignments(&target("b")).is_empty());
    }

    #[test]
    fn library_contributions_merge_independently_of_parent() {
        let store = RowStore {
            nodes: vec![
                node("parent", "", "", false, false),
                node("lib", "", "", false, false),
                node("doc", "parent", "lib", false, true),
            ],
            assignments: vec![
                row("parent", "user1", "manager"),
                row("lib", "group1", "viewer"),
                row("doc", "user2", "editor"),
            ],
        };
        let hierarchy = resolve(&store, &[target("doc")]);

        let effective = hierarchy.effective_assignments(&target("doc"));
        assert_eq!(
            effective,
            HashSet::from([assignment("group1", "viewer"), assignment("user2", "editor")])
        );
    }

    #[test]
    fn unknown_target_yields_empty_set() {
        let store = RowStore {
            nodes: vec![],
            assignments: vec![],
        };
        let hierarchy = resolve(&store, &[target("x")]);
        assert!(hierarchy.effective_assignments(&target("x")).is_empty());
    }

    #[test]
    fn merger_memoizes_shared_ancestors() {
        let store = RowStore {
            nodes: vec![
                node("root", "", "", false, false),
                node("left", "root", "", true, false),
                node("right", "root", "", true, false),
            ],
            assignments: vec![row("root", "user1", "viewer")],
        };
        let hierarchy = resolve(&store, &[target("left"), target("right")]);

        let mut merger = hierarchy.merger();
        let left = merger.effective(&target("left"));
        let right = merger.effective(&target("right"));
        assert_eq!(left, right);
        assert_eq!(left, HashSet::from([assignment("user1", "viewer")]));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: the merge is monotonic in the inherit flags. Disabling
        /// `inherit_from_parent` on a node never adds assignments to its
        /// effective set, and its direct assignments always survive.
        #[test]
        fn disabling_inheritance_never_adds_assignments(
            chain_len in 2usize..6,
            cut_at in 1usize..5,
        ) {
            let cut_at = cut_at.min(chain_len - 1);

            let build = |inherit_at_cut: bool| {
                let nodes: Vec<NodeRow> = (0..chain_len)
                    .map(|i| {
                        let parent = if i == 0 { String::new() } else { format!("n{}", i - 1) };
                        let inherit = i != cut_at || inherit_at_cut;
                        node(&format!("n{i}"), &parent, "", inherit, false)
                    })
                    .collect();
                let assignments: Vec<AssignmentRow> = (0..chain_len)
                    .map(|i| row(&format!("n{i}"), &format!("user{i}"), "viewer"))
                    .collect();
                RowStore { nodes, assignments }
            };

            let leaf = target(&format!("n{}", chain_len - 1));
            let with_inherit = resolve(&build(true), &[leaf.clone()])
                .effective_assignments(&leaf);
            let without_inherit = resolve(&build(false), &[leaf.clone()])
                .effective_assignments(&leaf);

            prop_assert!(without_inherit.is_subset(&with_inherit));
            // Direct assignments on the node with the flag off survive.
            let cut = target(&format!("n{cut_at}"));
            let cut_direct = resolve(&build(false), &[cut.clone()])
                .effective_assignments(&cut);
            let expected = assignment(&format!("user{cut_at}"), "viewer");
            prop_assert!(cut_direct.contains(&expected));
        }
    }
}
