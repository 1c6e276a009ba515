//! Roles, actions and role assignments.
//!
//! Role and action identifiers are intentionally opaque strings at this
//! layer; mapping a role to its action set is done by an external catalog
//! (see [`crate::traits::ActionCatalog`]).

use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use casevault_core::AuthorityId;

/// Role identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(Cow<'static, str>);

impl RoleId {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RoleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Action identifier (e.g. "document.read", "case.close").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Cow<'static, str>);

impl ActionId {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ActionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single invocable action in a role's catalog entry.
///
/// Equality and hashing are by id alone: two catalog entries with the same
/// id are the same action regardless of any attached constraint hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    id: ActionId,
    /// Optional name of an instance-specific filter rule that an
    /// [`crate::evaluate::ActionFilter`] implementation may interpret
    /// (e.g. "not_self" for an admin deactivating their own account).
    constraint: Option<Cow<'static, str>>,
}

impl Action {
    pub fn new(id: ActionId) -> Self {
        Self {
            id,
            constraint: None,
        }
    }

    pub fn with_constraint(id: ActionId, constraint: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id,
            constraint: Some(constraint.into()),
        }
    }

    pub fn id(&self) -> &ActionId {
        &self.id
    }

    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Action {}

impl core::hash::Hash for Action {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// An immutable `(authority, role)` pair attached to a permission node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub authority: AuthorityId,
    pub role: RoleId,
}

impl RoleAssignment {
    pub fn new(authority: AuthorityId, role: RoleId) -> Self {
        Self { authority, role }
    }
}

/// A role definition loaded from the action catalog.
///
/// `rank` is a total order used for precedence: when a principal matches
/// several assignments, the evaluator's precedence policy picks one role
/// among the candidates (highest rank by default).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub rank: u32,
    pub base_actions: HashSet<Action>,
}

impl Role {
    pub fn new(id: RoleId, rank: u32, base_actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            id,
            rank,
            base_actions: base_actions.into_iter().collect(),
        }
    }

    /// The sentinel role returned when a principal matches no assignment.
    ///
    /// Rank 0, no actions. Real roles should use rank >= 1 so this never
    /// wins a precedence comparison.
    pub fn no_permission() -> Self {
        Self {
            id: RoleId::new("no_permission"),
            rank: 0,
            base_actions: HashSet::new(),
        }
    }

    pub fn is_no_permission(&self) -> bool {
        self.rank == 0 && self.base_actions.is_empty()
    }
}
