//! High-level read-path entry point.
//!
//! Bundles store, directory and catalog behind one object so higher-level
//! services can ask "what is this principal's role on this node" without
//! wiring the resolver, merge and evaluator themselves. Each query builds
//! its own graph from freshly fetched rows; nothing is cached across calls.

use std::collections::HashSet;

use casevault_core::{AuthorityId, TargetId};

use crate::error::AuthzResult;
use crate::evaluate::{ActionFilter, PrecedencePolicy, RoleEvaluator};
use crate::hierarchy::HierarchyResolver;
use crate::roles::{ActionId, Role};
use crate::traits::{ActionCatalog, HierarchyStore, PrincipalDirectory};

pub struct PermissionService<'a> {
    store: &'a dyn HierarchyStore,
    directory: &'a dyn PrincipalDirectory,
    catalog: &'a dyn ActionCatalog,
    precedence: Option<&'a dyn PrecedencePolicy>,
}

impl<'a> PermissionService<'a> {
    pub fn new(
        store: &'a dyn HierarchyStore,
        directory: &'a dyn PrincipalDirectory,
        catalog: &'a dyn ActionCatalog,
    ) -> Self {
        Self {
            store,
            directory,
            catalog,
            precedence: None,
        }
    }

    pub fn with_precedence(mut self, precedence: &'a dyn PrecedencePolicy) -> Self {
        self.precedence = Some(precedence);
        self
    }

    fn evaluator(&self) -> RoleEvaluator<'a> {
        match self.precedence {
            Some(precedence) => {
                RoleEvaluator::with_precedence(self.directory, self.catalog, precedence)
            }
            None => RoleEvaluator::new(self.directory, self.catalog),
        }
    }

    /// The effective role of `principal` on `target`, honoring inheritance.
    pub fn role_for(&self, target: &TargetId, principal: &AuthorityId) -> AuthzResult<Role> {
        let hierarchy = HierarchyResolver::new(self.store).resolve(std::slice::from_ref(target))?;
        let assignments = hierarchy.effective_assignments(target);
        self.evaluator().evaluate(&assignments, principal)
    }

    /// The actions `principal` may invoke on `target`, after instance
    /// filtering.
    pub fn allowed_actions_for(
        &self,
        target: &TargetId,
        principal: &AuthorityId,
        filter: &dyn ActionFilter,
    ) -> AuthzResult<HashSet<ActionId>> {
        let role = self.role_for(target, principal)?;
        let instance = target.clone().into();
        Ok(self
            .evaluator()
            .allowed_actions(&role, &instance, principal, filter))
    }
}
