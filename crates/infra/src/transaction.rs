//! A local, in-process transaction context.
//!
//! Stands in for the platform's transaction manager in tests and
//! single-process deployments: synchronizations registered during the
//! transaction run on the completing thread, in registration order.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use casevault_authz::{ChangeError, CompletionOutcome, TransactionContext, TransactionSynchronization};

#[derive(Default)]
pub struct LocalTransaction {
    synchronizations: Mutex<Vec<Box<dyn TransactionSynchronization>>>,
    rollback_only: AtomicBool,
}

impl LocalTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::Release);
    }

    /// Drive the transaction to completion.
    ///
    /// Runs every `before_completion` hook; the first failure marks the
    /// transaction rollback-only and is returned after the remaining
    /// lifecycle ran. A transaction already marked rollback-only completes
    /// as a rollback. `after_completion` runs unconditionally for every
    /// synchronization with the final outcome.
    pub fn commit(self) -> Result<CompletionOutcome, ChangeError> {
        let synchronizations = self.take_synchronizations();

        let mut failure: Option<ChangeError> = None;
        for sync in &synchronizations {
            if let Err(err) = sync.before_completion(&self) {
                tracing::warn!(error = %err, "before-completion hook failed, rolling back");
                self.set_rollback_only();
                failure = Some(err);
                break;
            }
        }

        let outcome = if self.is_rollback_only() {
            CompletionOutcome::RolledBack
        } else {
            CompletionOutcome::Committed
        };
        for sync in &synchronizations {
            sync.after_completion(outcome);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }

    /// Abandon the transaction: no before-completion hooks, state is
    /// discarded through `after_completion` only.
    pub fn rollback(self) {
        self.set_rollback_only();
        for sync in self.take_synchronizations() {
            sync.after_completion(CompletionOutcome::RolledBack);
        }
    }

    fn take_synchronizations(&self) -> Vec<Box<dyn TransactionSynchronization>> {
        self.synchronizations
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

impl TransactionContext for LocalTransaction {
    fn register_synchronization(&self, sync: Box<dyn TransactionSynchronization>) {
        if let Ok(mut synchronizations) = self.synchronizations.lock() {
            synchronizations.push(sync);
        }
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::Acquire)
    }
}
