//! In-memory implementations of the authorization boundary traits.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::bail;
use chrono::{DateTime, Utc};

use casevault_authz::{
    ActionCatalog, AssignmentRow, HierarchyStore, NodeRow, PermissionChange, PermissionWriter,
    PrincipalDirectory, Role, RoleId,
};
use casevault_core::{AuthorityId, InstanceRef, TargetId};

/// In-memory hierarchy store over raw rows.
///
/// `fetch_nodes` emulates the production store's contract: given a set of
/// target ids it returns the rows for those targets *and* every
/// ancestor/library container reachable from them, in one call. Reachable
/// rows are collected with a visited set, so even corrupt (cyclic) wiring
/// terminates here and is handed to the resolver as-is.
#[derive(Debug, Default)]
pub struct MemoryHierarchyStore {
    nodes: RwLock<HashMap<String, NodeRow>>,
    assignments: RwLock<Vec<AssignmentRow>>,
}

impl MemoryHierarchyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&self, row: NodeRow) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.insert(row.target_id.clone(), row);
        }
    }

    pub fn insert_assignment(&self, row: AssignmentRow) {
        if let Ok(mut assignments) = self.assignments.write() {
            assignments.push(row);
        }
    }
}

impl HierarchyStore for MemoryHierarchyStore {
    fn fetch_nodes(&self, ids: &[TargetId]) -> anyhow::Result<Vec<NodeRow>> {
        let nodes = self
            .nodes
            .read()
            .map_err(|_| anyhow::anyhow!("hierarchy store lock poisoned"))?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let mut rows = Vec::new();

        while let Some(id) = frontier.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(row) = nodes.get(&id) else {
                continue;
            };
            for next in [&row.parent_id, &row.library_id] {
                let next = next.trim();
                if !next.is_empty() {
                    frontier.push(next.to_string());
                }
            }
            rows.push(row.clone());
        }

        Ok(rows)
    }

    fn fetch_assignments(&self, ids: &[TargetId]) -> anyhow::Result<Vec<AssignmentRow>> {
        let wanted: HashSet<&str> = ids.iter().map(|id| id.as_str()).collect();
        let assignments = self
            .assignments
            .read()
            .map_err(|_| anyhow::anyhow!("hierarchy store lock poisoned"))?;
        Ok(assignments
            .iter()
            .filter(|row| wanted.contains(row.target_id.trim()))
            .cloned()
            .collect())
    }
}

/// A batch of changes as the writer received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedBatch {
    pub instance: InstanceRef,
    pub ops: Vec<PermissionChange>,
    pub applied_at: DateTime<Utc>,
}

/// Permission writer that records everything it is asked to persist.
///
/// `fail_next` makes the next apply call fail, for exercising the fatal
/// flush-failure path.
#[derive(Debug, Default)]
pub struct RecordingPermissionWriter {
    applied: RwLock<Vec<AppliedBatch>>,
    fail_next: AtomicBool,
}

impl RecordingPermissionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::Release);
    }

    pub fn applied(&self) -> Vec<AppliedBatch> {
        self.applied.read().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.read().map(|a| a.is_empty()).unwrap_or(true)
    }
}

impl PermissionWriter for RecordingPermissionWriter {
    fn apply(&self, instance: &InstanceRef, ops: &[PermissionChange]) -> anyhow::Result<()> {
        if self.fail_next.swap(false, Ordering::AcqRel) {
            bail!("permission writer unavailable");
        }
        self.applied
            .write()
            .map_err(|_| anyhow::anyhow!("writer lock poisoned"))?
            .push(AppliedBatch {
                instance: instance.clone(),
                ops: ops.to_vec(),
                applied_at: Utc::now(),
            });
        Ok(())
    }
}

/// Static principal-to-groups directory.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    memberships: RwLock<HashMap<AuthorityId, HashSet<AuthorityId>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_membership(&self, member: AuthorityId, group: AuthorityId) {
        if let Ok(mut memberships) = self.memberships.write() {
            memberships.entry(member).or_default().insert(group);
        }
    }
}

impl PrincipalDirectory for StaticDirectory {
    fn groups_of(&self, authority: &AuthorityId) -> anyhow::Result<HashSet<AuthorityId>> {
        let memberships = self
            .memberships
            .read()
            .map_err(|_| anyhow::anyhow!("directory lock poisoned"))?;
        Ok(memberships.get(authority).cloned().unwrap_or_default())
    }
}

/// Static role catalog.
#[derive(Debug, Default)]
pub struct StaticActionCatalog {
    roles: RwLock<HashMap<RoleId, Role>>,
}

impl StaticActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, role: Role) {
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(role.id.clone(), role);
        }
    }
}

impl ActionCatalog for StaticActionCatalog {
    fn lookup(&self, role: &RoleId) -> anyhow::Result<Role> {
        let roles = self
            .roles
            .read()
            .map_err(|_| anyhow::anyhow!("catalog lock poisoned"))?;
        roles
            .get(role)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown role '{role}' in catalog"))
    }
}
