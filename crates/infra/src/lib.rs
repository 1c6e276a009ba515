//! `casevault-infra` — in-memory infrastructure for the authorization core.
//!
//! Provides test/dev implementations of the boundary traits and a local
//! transaction context. Production deployments supply their own store,
//! writer, directory, catalog and transaction manager.

pub mod stores;
pub mod transaction;


pub use stores::{
    AppliedBatch, MemoryHierarchyStore, RecordingPermissionWriter, StaticActionCatalog,
    StaticDirectory,
};
pub use transaction::LocalTransaction;

/// Initialize tracing for tests (JSON off, RUST_LOG respected).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
