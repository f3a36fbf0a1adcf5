// Shopflow Library - Vehicle-Service Order Pipeline
// This exposes the core components for testing and integration

pub mod config;
pub mod external;
pub mod pipeline;
pub mod session;
pub mod telemetry;

// Re-export key types for easy access
pub use config::ShopflowConfig;
pub use external::{
    AuditContext, BackupDispatcher, BatchSyncer, CommandBackupDispatcher, EnvIdentity,
    FileSyncAdapter, IdentityProvider, NoopBackupDispatcher, SyncAdapter, SyncError, SyncReport,
};
pub use pipeline::{
    ActionOutcome, CommandHistory, CommandLogEntry, GuardState, HistoryError, Notification,
    OrderRecord, PartStatus, PipelineEngine, PipelineError, PipelineState, PromotionNotice,
    RecordPatch, RepairType, SmsTemplate, Stage, StageRegistry, VinMonitor,
};
pub use session::{SessionLock, SessionState, SessionStore};
pub use telemetry::{create_action_span, init_telemetry};
