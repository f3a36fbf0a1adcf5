//! External collaborator seams
//!
//! Trait-based abstractions for everything the pipeline core consumes from
//! the outside world: the remote sync store, the identity source and the
//! backup automation trigger. Dependency injection keeps the engine
//! testable with mock implementations.

pub mod backup;
pub mod identity;
pub mod sync;

pub use backup::{BackupDispatcher, CommandBackupDispatcher, NoopBackupDispatcher};
pub use identity::{AuditContext, EnvIdentity, IdentityProvider};
pub use sync::{BatchSyncer, FileSyncAdapter, SyncAdapter, SyncError, SyncReport};
