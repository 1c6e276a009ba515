//! Boundary traits for the authorization core.
//!
//! Everything behind these traits is an external collaborator: persistence,
//! the principal/group directory, the static action catalog and the ambient
//! transaction manager. The core never talks to SQL, HTTP or a directory
//! server itself. Implementations return `anyhow::Result` at this edge; the
//! core wraps failures into its own error types.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use casevault_core::{AuthorityId, InstanceRef, TargetId};

use crate::changes::PermissionChange;
use crate::error::ChangeError;
use crate::roles::{Role, RoleId};

/// A raw hierarchy row as the content store returns it.
///
/// Columns are raw strings: id columns may be blank (meaning "absent") and
/// the flag columns carry a boolean-ish encoding ("1"/"true" is true,
/// anything else is defensively treated as false). Decoding happens in the
/// resolver, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub target_id: String,
    pub parent_id: String,
    pub library_id: String,
    pub inherit_from_parent: String,
    pub inherit_from_library: String,
    pub is_library: String,
}

impl NodeRow {
    /// Row with no parent, no library and all flags off.
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            parent_id: String::new(),
            library_id: String::new(),
            inherit_from_parent: "0".to_string(),
            inherit_from_library: "0".to_string(),
            is_library: "0".to_string(),
        }
    }
}

/// A raw assignment row: `(target, authority, role)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub target_id: String,
    pub authority_id: String,
    pub role_id: String,
}

/// Batched access to raw permission and assignment rows.
///
/// Both calls are batched: given a set of target ids, the store returns the
/// rows for those targets *and* every ancestor/library container reachable
/// from them, in one round trip. The resolver never issues per-node
/// queries. Unknown or blank ids simply produce no rows.
pub trait HierarchyStore: Send + Sync {
    fn fetch_nodes(&self, ids: &[TargetId]) -> anyhow::Result<Vec<NodeRow>>;

    fn fetch_assignments(&self, ids: &[TargetId]) -> anyhow::Result<Vec<AssignmentRow>>;
}

/// Persists drained permission changes.
///
/// `apply` must be idempotent from the caller's perspective. A failure is
/// fatal for the enclosing transaction: it is propagated, never retried.
pub trait PermissionWriter: Send + Sync {
    fn apply(&self, instance: &InstanceRef, ops: &[PermissionChange]) -> anyhow::Result<()>;
}

/// Resolves the groups an authority belongs to.
pub trait PrincipalDirectory: Send + Sync {
    /// Groups of `authority`, not including the authority itself. Unknown
    /// authorities yield the empty set.
    fn groups_of(&self, authority: &AuthorityId) -> anyhow::Result<HashSet<AuthorityId>>;
}

/// Static/slow-changing role definitions.
pub trait ActionCatalog: Send + Sync {
    fn lookup(&self, role: &RoleId) -> anyhow::Result<Role>;
}

/// Outcome of a fully completed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionOutcome {
    Committed,
    RolledBack,
}

/// Callback interface registered with the ambient transaction.
///
/// `before_completion` runs once on the thread driving transaction
/// completion, before the commit decision is final; an error here must
/// abort the transaction. `after_completion` runs unconditionally after
/// the transaction fully completed, commit or rollback alike.
pub trait TransactionSynchronization: Send + Sync {
    fn before_completion(&self, tx: &dyn TransactionContext) -> Result<(), ChangeError>;

    fn after_completion(&self, outcome: CompletionOutcome);
}

/// The minimal transaction-manager surface this core depends on.
pub trait TransactionContext: Send + Sync {
    fn register_synchronization(&self, sync: Box<dyn TransactionSynchronization>);

    fn is_rollback_only(&self) -> bool;
}
