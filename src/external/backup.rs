//! Fire-and-forget backup dispatch.
//!
//! An outbound trigger to an external automation system. It is unrelated to
//! in-memory state and never awaited by the core: the child process is
//! spawned and left to run, and failures are logged rather than surfaced.

use tracing::{debug, warn};

pub trait BackupDispatcher: Send + Sync {
    fn dispatch(&self, reason: &str);
}

/// Spawns a configured external command without waiting for it.
#[derive(Debug, Clone)]
pub struct CommandBackupDispatcher {
    program: String,
    args: Vec<String>,
}

impl CommandBackupDispatcher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl BackupDispatcher for CommandBackupDispatcher {
    fn dispatch(&self, reason: &str) {
        match std::process::Command::new(&self.program)
            .args(&self.args)
            .env("SHOPFLOW_BACKUP_REASON", reason)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            Ok(child) => {
                debug!(
                    program = %self.program,
                    pid = child.id(),
                    reason,
                    "Backup dispatch triggered"
                );
            }
            Err(err) => {
                warn!(program = %self.program, error = %err, "Backup dispatch failed to start");
            }
        }
    }
}

/// Used when backup dispatch is disabled in configuration.
#[derive(Debug, Clone, Default)]
pub struct NoopBackupDispatcher;

impl BackupDispatcher for NoopBackupDispatcher {
    fn dispatch(&self, _reason: &str) {}
}
