//! Error model for the authorization core.
//!
//! Read-path failures (`AuthzError`) are almost always a wrapped backend
//! failure from one of the boundary collaborators; the core itself treats
//! blank ids, unknown targets and empty row sets as "no data", not errors.
//! Mutation-path failures (`ChangeError`) are mostly state errors that
//! indicate a programming bug in the caller's transaction handling.

use thiserror::Error;

use casevault_core::DomainError;

/// Result type for the read path (resolve/merge/evaluate).
pub type AuthzResult<T> = Result<T, AuthzError>;

#[derive(Debug, Error)]
pub enum AuthzError {
    /// A boundary collaborator (store, directory, catalog) failed.
    /// External failures are propagated, never masked.
    #[error("authorization backend failure: {0}")]
    Backend(#[source] anyhow::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<anyhow::Error> for AuthzError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(err)
    }
}

/// Mutation-path error for the transaction-scoped change aggregator.
#[derive(Debug, Error)]
pub enum ChangeError {
    /// The aggregator already flushed for this transaction; no further
    /// mutation is accepted.
    #[error("permission changes already flushed for this transaction")]
    AlreadyFlushed,

    /// The owning transaction fully completed; this builder handle is stale.
    #[error("owning transaction already completed")]
    TransactionCompleted,

    /// A lock guarding pending changes was poisoned by a panicking thread.
    #[error("pending permission changes lock poisoned")]
    Poisoned,

    /// The permission writer failed during the pre-commit flush. Fatal for
    /// the enclosing transaction; never retried here.
    #[error("permission writer failed: {0}")]
    Writer(#[source] anyhow::Error),
}
