//! Role and action evaluation.
//!
//! Turns a merged assignment set plus a principal's identity into one
//! effective role, then filters that role's action catalog for a concrete
//! instance. Evaluation is a pure function of its inputs: identical
//! assignments, principal and group memberships always yield the identical
//! role.

use std::collections::HashSet;

use casevault_core::{AuthorityId, InstanceRef};

use crate::error::AuthzResult;
use crate::roles::{Action, ActionId, Role, RoleAssignment, RoleId};
use crate::traits::{ActionCatalog, PrincipalDirectory};

/// Picks one effective role among the candidates a principal holds.
///
/// The platform's default is "highest rank wins", but cross-level
/// precedence is an overridable policy, not a hard rule.
pub trait PrecedencePolicy: Send + Sync {
    /// `candidates` is non-empty and free of duplicate role ids.
    fn select(&self, candidates: Vec<Role>) -> Role;
}

/// Default policy: highest `rank` wins; equal ranks break on role id so the
/// outcome stays deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestRank;

impl PrecedencePolicy for HighestRank {
    fn select(&self, candidates: Vec<Role>) -> Role {
        candidates
            .into_iter()
            .max_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)))
            .unwrap_or_else(Role::no_permission)
    }
}

static HIGHEST_RANK: HighestRank = HighestRank;

/// Instance-specific action filtering hook.
///
/// Applied after a role resolved: it can only *remove* actions from the
/// role's base set (e.g. an admin account may not deactivate itself),
/// never add ones. Read access implied by the resolved role survives
/// filtering unless a rule explicitly removes it.
pub trait ActionFilter: Send + Sync {
    fn permits(
        &self,
        action: &Action,
        instance: &InstanceRef,
        principal: &AuthorityId,
    ) -> bool;
}

/// Filter that removes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ActionFilter for AllowAll {
    fn permits(
        &self,
        _action: &Action,
        _instance: &InstanceRef,
        _principal: &AuthorityId,
    ) -> bool {
        true
    }
}

/// Combines merged assignments with a principal's identity to pick the
/// effective role and its allowed actions.
pub struct RoleEvaluator<'a> {
    directory: &'a dyn PrincipalDirectory,
    catalog: &'a dyn ActionCatalog,
    precedence: &'a dyn PrecedencePolicy,
}

impl<'a> RoleEvaluator<'a> {
    pub fn new(directory: &'a dyn PrincipalDirectory, catalog: &'a dyn ActionCatalog) -> Self {
        Self {
            directory,
            catalog,
            precedence: &HIGHEST_RANK,
        }
    }

    pub fn with_precedence(
        directory: &'a dyn PrincipalDirectory,
        catalog: &'a dyn ActionCatalog,
        precedence: &'a dyn PrecedencePolicy,
    ) -> Self {
        Self {
            directory,
            catalog,
            precedence,
        }
    }

    /// Resolve the effective role for `principal` given the merged
    /// assignment set of a node.
    ///
    /// The principal is expanded to itself plus its groups; every
    /// assignment whose authority falls in that expanded set contributes a
    /// candidate role. No match yields [`Role::no_permission`]. Directory
    /// and catalog failures are propagated, never masked.
    pub fn evaluate(
        &self,
        assignments: &HashSet<RoleAssignment>,
        principal: &AuthorityId,
    ) -> AuthzResult<Role> {
        let mut identities = self.directory.groups_of(principal)?;
        identities.insert(principal.clone());

        let mut matching: Vec<&RoleId> = assignments
            .iter()
            .filter(|a| identities.contains(&a.authority))
            .map(|a| &a.role)
            .collect();
        matching.sort();
        matching.dedup();

        if matching.is_empty() {
            return Ok(Role::no_permission());
        }

        let mut candidates = Vec::with_capacity(matching.len());
        for role_id in matching {
            candidates.push(self.catalog.lookup(role_id)?);
        }

        Ok(self.precedence.select(candidates))
    }

    /// The actions `principal` may invoke on `instance` under `role`.
    ///
    /// Starts from the role's base action set and retains what the filter
    /// permits. Nothing outside the base set is ever added.
    pub fn allowed_actions(
        &self,
        role: &Role,
        instance: &InstanceRef,
        principal: &AuthorityId,
        filter: &dyn ActionFilter,
    ) -> HashSet<ActionId> {
        role.base_actions
            .iter()
            .filter(|action| filter.permits(action, instance, principal))
            .map(|action| action.id().clone())
            .collect()
    }
}
