//! `casevault-authz` — in-process authorization core.
//!
//! Resolves *effective* permissions for content instances embedded in a
//! hierarchical tree (inheritance from parent and library containers, with
//! cycle safety), evaluates a principal's effective role and allowed
//! actions, and aggregates pending permission mutations per transaction,
//! flushing them at-most-once in lock-step with the transaction outcome.
//!
//! This crate is intentionally decoupled from persistence, HTTP and
//! directory servers; those are boundary traits in [`traits`].

pub mod changes;
pub mod error;
pub mod evaluate;
pub mod hierarchy;
pub mod merge;
pub mod roles;
pub mod service;
pub mod traits;

pub use changes::{ChangeAggregator, ChangeBuilder, PermissionChange};
pub use error::{AuthzError, AuthzResult, ChangeError};
pub use evaluate::{ActionFilter, AllowAll, HighestRank, PrecedencePolicy, RoleEvaluator};
pub use hierarchy::{HierarchyResolver, PermissionHierarchy, PermissionNode};
pub use merge::AssignmentMerger;
pub use roles::{Action, ActionId, Role, RoleAssignment, RoleId};
pub use service::PermissionService;
pub use traits::{
    ActionCatalog, AssignmentRow, CompletionOutcome, HierarchyStore, NodeRow, PermissionWriter,
    PrincipalDirectory, TransactionContext, TransactionSynchronization,
};
