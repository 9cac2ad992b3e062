//! Installation execution and rollback
//!
//! Applying a component's install action is split across three pieces:
//! the runner boundary (external process invocation), the executor
//! (effect snapshots, timeout, post-condition verification), and the
//! rollback manager (persisted ledgers, reverse-order undo).
//!
//! # Module Organization
//!
//! - [`action`] - Install runner boundary trait and process implementation
//! - [`executor`] - Install execution with snapshots and verification
//! - [`rollback`] - Ledger persistence and best-effort reversal

pub mod action;
pub mod executor;
pub mod rollback;

pub use action::{ActionOutput, InstallRunner, ProcessRunner};
pub use executor::InstallationExecutor;
pub use rollback::RollbackManager;
