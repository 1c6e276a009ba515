//! Transaction-scoped aggregation of pending permission changes.
//!
//! A [`ChangeAggregator`] collects grant/revoke operations contributed from
//! anywhere inside one business transaction and flushes them exactly once,
//! just before that transaction commits. Per transaction it moves through
//! `ACCEPTING -> FLUSHING -> FLUSHED -> COMPLETED(reset)`:
//!
//! - while accepting, callers get-or-create a per-instance [`ChangeBuilder`]
//!   and append operations (FIFO per instance);
//! - the pre-commit hook drains everything and forwards it to the
//!   [`PermissionWriter`], unless automatic flush was disabled or the
//!   transaction is marked rollback-only;
//! - once flushed, all further mutation is rejected;
//! - after the transaction fully completed (commit or rollback), state is
//!   cleared and flags return to their initial values.
//!
//! Aggregators are meant to be created fresh per transaction via
//! [`ChangeAggregator::for_transaction`] and discarded afterwards; the
//! post-completion reset is defensive, not load-bearing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use casevault_core::{AuthorityId, InstanceRef};

use crate::error::ChangeError;
use crate::roles::RoleId;
use crate::traits::{
    CompletionOutcome, PermissionWriter, TransactionContext, TransactionSynchronization,
};

/// One pending permission mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionChange {
    Grant { authority: AuthorityId, role: RoleId },
    Revoke { authority: AuthorityId, role: RoleId },
}

/// Per-instance accumulator of pending operations.
///
/// Appends from different call sites inside the same transaction are
/// serialized by the internal lock; per-instance order is FIFO as
/// contributed. A builder rejects new operations once the owning
/// aggregator flushed, and permanently once the transaction completed.
#[derive(Debug)]
pub struct ChangeBuilder {
    instance: InstanceRef,
    ops: Mutex<Vec<PermissionChange>>,
    flushed: Arc<AtomicBool>,
    detached: AtomicBool,
}

impl ChangeBuilder {
    pub fn instance(&self) -> &InstanceRef {
        &self.instance
    }

    pub fn grant(&self, authority: AuthorityId, role: RoleId) -> Result<(), ChangeError> {
        self.push(PermissionChange::Grant { authority, role })
    }

    pub fn revoke(&self, authority: AuthorityId, role: RoleId) -> Result<(), ChangeError> {
        self.push(PermissionChange::Revoke { authority, role })
    }

    pub fn push(&self, op: PermissionChange) -> Result<(), ChangeError> {
        if self.detached.load(Ordering::Acquire) {
            return Err(ChangeError::TransactionCompleted);
        }
        if self.flushed.load(Ordering::Acquire) {
            return Err(ChangeError::AlreadyFlushed);
        }
        self.ops
            .lock()
            .map_err(|_| ChangeError::Poisoned)?
            .push(op);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().map(|ops| ops.is_empty()).unwrap_or(true)
    }

    /// Destructively take the pending operations (the drain primitive).
    fn take(&self) -> Result<Vec<PermissionChange>, ChangeError> {
        let mut ops = self.ops.lock().map_err(|_| ChangeError::Poisoned)?;
        Ok(std::mem::take(&mut *ops))
    }
}

#[derive(Debug)]
struct AggregatorState {
    builders: RwLock<HashMap<InstanceRef, Arc<ChangeBuilder>>>,
    flushed: Arc<AtomicBool>,
    auto_flush: AtomicBool,
}

impl Default for AggregatorState {
    fn default() -> Self {
        Self {
            builders: RwLock::new(HashMap::new()),
            flushed: Arc::new(AtomicBool::new(false)),
            auto_flush: AtomicBool::new(true),
        }
    }
}

/// Transaction-scoped accumulator of pending permission changes.
///
/// Cheap to clone (shared state); every clone refers to the same
/// transaction's pending changes. Must never be shared across unrelated
/// transactions.
#[derive(Debug, Clone, Default)]
pub struct ChangeAggregator {
    state: Arc<AggregatorState>,
}

impl ChangeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh aggregator for `tx` and register its flush
    /// synchronization: pending changes are written through `writer` just
    /// before commit and cleared after completion, commit or rollback
    /// alike.
    pub fn for_transaction(
        tx: &dyn TransactionContext,
        writer: Arc<dyn PermissionWriter>,
    ) -> Self {
        let aggregator = Self::new();
        tx.register_synchronization(Box::new(FlushSynchronization {
            aggregator: aggregator.clone(),
            writer,
        }));
        aggregator
    }

    /// Get or create the builder for `instance`.
    ///
    /// Race-free under concurrent calls: different instances never block
    /// each other beyond the map guard, and concurrent creation for the
    /// same instance yields the same builder. Fails once the aggregator
    /// flushed.
    pub fn builder(&self, instance: InstanceRef) -> Result<Arc<ChangeBuilder>, ChangeError> {
        if self.is_flushed() {
            return Err(ChangeError::AlreadyFlushed);
        }

        {
            let builders = self
                .state
                .builders
                .read()
                .map_err(|_| ChangeError::Poisoned)?;
            if let Some(existing) = builders.get(&instance) {
                return Ok(Arc::clone(existing));
            }
        }

        let mut builders = self
            .state
            .builders
            .write()
            .map_err(|_| ChangeError::Poisoned)?;
        let builder = builders
            .entry(instance.clone())
            .or_insert_with(|| {
                Arc::new(ChangeBuilder {
                    instance,
                    ops: Mutex::new(Vec::new()),
                    flushed: Arc::clone(&self.state.flushed),
                    detached: AtomicBool::new(false),
                })
            });
        Ok(Arc::clone(builder))
    }

    /// Opt out of the automatic pre-commit flush for this transaction.
    ///
    /// Intended for callers that drain and persist changes themselves,
    /// e.g. batch flows spanning many instances. Pending operations then
    /// stay drainable until the post-completion reset clears them, so a
    /// caller opting out must drain before the transaction fully
    /// completes (typically from its own synchronization). Callable only
    /// before the flush ran.
    pub fn disable_automatic_flush(&self) -> Result<(), ChangeError> {
        if self.is_flushed() {
            return Err(ChangeError::AlreadyFlushed);
        }
        self.state.auto_flush.store(false, Ordering::Release);
        Ok(())
    }

    pub fn automatic_flush_enabled(&self) -> bool {
        self.state.auto_flush.load(Ordering::Acquire)
    }

    pub fn is_flushed(&self) -> bool {
        self.state.flushed.load(Ordering::Acquire)
    }

    /// Destructively drain every instance's pending operations.
    ///
    /// For each instance with pending operations, the operation list is
    /// atomically taken and handed to `consumer`; a second drain without
    /// new contributions yields nothing for that instance. Cross-instance
    /// order during a drain is unspecified.
    pub fn drain_changes(
        &self,
        consumer: &mut dyn FnMut(&InstanceRef, Vec<PermissionChange>),
    ) -> Result<(), ChangeError> {
        // Snapshot the builders so the consumer runs outside the map guard.
        let snapshot: Vec<Arc<ChangeBuilder>> = {
            let builders = self
                .state
                .builders
                .read()
                .map_err(|_| ChangeError::Poisoned)?;
            builders.values().cloned().collect()
        };

        for builder in snapshot {
            let ops = builder.take()?;
            if !ops.is_empty() {
                consumer(builder.instance(), ops);
            }
        }
        Ok(())
    }

    /// The pre-commit flush: drain and forward everything to `writer`,
    /// unless automatic flush was disabled or `tx` is rollback-only (the
    /// latter is expected control flow, not an error). Transitions to
    /// FLUSHED either way; a writer failure is propagated after the
    /// transition and must abort the enclosing transaction.
    fn flush_pending(
        &self,
        tx: &dyn TransactionContext,
        writer: &dyn PermissionWriter,
    ) -> Result<(), ChangeError> {
        if self.is_flushed() {
            return Ok(());
        }

        let result = if !self.automatic_flush_enabled() {
            tracing::debug!("automatic permission flush disabled, leaving changes pending");
            Ok(())
        } else if tx.is_rollback_only() {
            tracing::debug!("transaction is rollback-only, skipping permission flush");
            Ok(())
        } else {
            let mut failure: Option<anyhow::Error> = None;
            let mut flushed_instances = 0usize;
            self.drain_changes(&mut |instance, ops| {
                if failure.is_none() {
                    match writer.apply(instance, &ops) {
                        Ok(()) => flushed_instances += 1,
                        Err(err) => failure = Some(err),
                    }
                }
            })?;
            match failure {
                Some(err) => Err(ChangeError::Writer(err)),
                None => {
                    tracing::debug!(instances = flushed_instances, "permission changes flushed");
                    Ok(())
                }
            }
        };

        self.state.flushed.store(true, Ordering::Release);
        result
    }

    /// Post-completion reset: detach outstanding builder handles, clear
    /// the map and return the flags to their initial values.
    fn reset(&self) {
        if let Ok(mut builders) = self.state.builders.write() {
            for builder in builders.values() {
                builder.detached.store(true, Ordering::Release);
            }
            builders.clear();
        }
        self.state.flushed.store(false, Ordering::Release);
        self.state.auto_flush.store(true, Ordering::Release);
    }
}

/// The synchronization registered with the ambient transaction.
struct FlushSynchronization {
    aggregator: ChangeAggregator,
    writer: Arc<dyn PermissionWriter>,
}

impl TransactionSynchronization for FlushSynchronization {
    fn before_completion(&self, tx: &dyn TransactionContext) -> Result<(), ChangeError> {
        self.aggregator.flush_pending(tx, self.writer.as_ref())
    }

    fn after_completion(&self, outcome: CompletionOutcome) {
        tracing::debug!(?outcome, "clearing transaction-scoped permission changes");
        self.aggregator.reset();
    }
}
