use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::errors::HistoryError;
use super::registry::PipelineState;

pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// One point-in-time capture of the complete pipeline state, tagged with the
/// action that was about to run. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub id: Uuid,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub snapshot: PipelineState,
}

impl CommandLogEntry {
    fn new(action: impl Into<String>, snapshot: PipelineState) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            timestamp: Utc::now(),
            snapshot,
        }
    }
}

/// Snapshot-based undo/redo over the whole pipeline state.
///
/// `commits` holds past states (most recent last), `redos` holds future
/// states made reachable by undo. Any new mutating action clears `redos`.
/// Snapshots are deep, independent copies; restoring one must reproduce the
/// captured state bit for bit.
///
/// History depth is capped: when the cap is exceeded the oldest commit is
/// dropped, bounding memory for long sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandHistory {
    commits: Vec<CommandLogEntry>,
    redos: Vec<CommandLogEntry>,
    max_depth: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl CommandHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            commits: Vec::new(),
            redos: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Re-apply a depth cap, trimming the oldest commits if needed.
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth.max(1);
        while self.commits.len() > self.max_depth {
            self.commits.remove(0);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.commits.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redos.is_empty()
    }

    pub fn commits(&self) -> &[CommandLogEntry] {
        &self.commits
    }

    pub fn redo_depth(&self) -> usize {
        self.redos.len()
    }

    /// Record the pre-action state of a new mutating action. Clears the redo
    /// stack: once the timeline diverges, the undone future is gone.
    pub fn record(&mut self, action: &str, snapshot: PipelineState) {
        self.redos.clear();
        self.commits.push(CommandLogEntry::new(action, snapshot));
        if self.commits.len() > self.max_depth {
            self.commits.remove(0);
        }
        debug!(action, depth = self.commits.len(), "Snapshot recorded");
    }

    /// Pop the most recent commit, park the current state as a redo point,
    /// and hand back the popped snapshot for restoration.
    pub fn undo(&mut self, current: &PipelineState) -> Result<PipelineState, HistoryError> {
        let entry = self.commits.pop().ok_or(HistoryError::NothingToUndo)?;
        self.redos
            .push(CommandLogEntry::new(entry.action.clone(), current.clone()));
        debug!(action = %entry.action, "Undo");
        Ok(entry.snapshot)
    }

    /// Pop the most recent redo point, park the current state back on the
    /// commit stack, and hand back the snapshot for restoration.
    pub fn redo(&mut self, current: &PipelineState) -> Result<PipelineState, HistoryError> {
        let entry = self.redos.pop().ok_or(HistoryError::NothingToRedo)?;
        self.commits
            .push(CommandLogEntry::new(entry.action.clone(), current.clone()));
        debug!(action = %entry.action, "Redo");
        Ok(entry.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{OrderRecord, Stage};

    fn state_with(ids: &[&str]) -> PipelineState {
        let mut state = PipelineState::default();
        for id in ids {
            state
                .registry
                .insert(
                    Stage::Pending,
                    OrderRecord::new("1HGCM82633A004352", "Dana Li").with_id(*id),
                )
                .unwrap();
        }
        state
    }

    #[test]
    fn test_undo_restores_pre_action_snapshot() {
        let mut history = CommandHistory::default();
        let before = state_with(&[]);
        let after = state_with(&["o1"]);

        history.record("intake", before.clone());
        let restored = history.undo(&after).unwrap();
        assert_eq!(restored, before);
        assert!(!history.can_undo());
        assert!(history.can_redo());
    }

    #[test]
    fn test_redo_restores_post_action_state() {
        let mut history = CommandHistory::default();
        let before = state_with(&[]);
        let after = state_with(&["o1"]);

        history.record("intake", before.clone());
        let undone = history.undo(&after).unwrap();
        let redone = history.redo(&undone).unwrap();
        assert_eq!(redone, after);
        // The commit stack is rebuilt, so a second undo works again.
        assert!(history.can_undo());
        assert_eq!(history.undo(&redone).unwrap(), before);
    }

    #[test]
    fn test_new_action_clears_redo_stack() {
        let mut history = CommandHistory::default();
        let a = state_with(&[]);
        let b = state_with(&["o1"]);

        history.record("intake", a.clone());
        history.undo(&b).unwrap();
        assert!(history.can_redo());

        history.record("intake", a);
        assert!(!history.can_redo());
        assert_eq!(history.redo(&b).unwrap_err(), HistoryError::NothingToRedo);
    }

    #[test]
    fn test_empty_stacks_report_no_ops() {
        let mut history = CommandHistory::default();
        let current = state_with(&[]);
        assert_eq!(
            history.undo(&current).unwrap_err(),
            HistoryError::NothingToUndo
        );
        assert_eq!(
            history.redo(&current).unwrap_err(),
            HistoryError::NothingToRedo
        );
    }

    #[test]
    fn test_depth_cap_drops_oldest_commit() {
        let mut history = CommandHistory::new(2);
        history.record("first", state_with(&[]));
        history.record("second", state_with(&["o1"]));
        history.record("third", state_with(&["o1", "o2"]));

        assert_eq!(history.commits().len(), 2);
        assert_eq!(history.commits()[0].action, "second");
        assert_eq!(history.commits()[1].action, "third");
    }

    #[test]
    fn test_set_max_depth_trims_existing_commits() {
        let mut history = CommandHistory::new(10);
        for i in 0..5 {
            history.record(&format!("a{i}"), state_with(&[]));
        }
        history.set_max_depth(3);
        assert_eq!(history.commits().len(), 3);
        assert_eq!(history.commits()[0].action, "a2");
    }

    #[test]
    fn test_snapshot_is_independent_of_live_state() {
        let mut history = CommandHistory::default();
        let mut live = state_with(&["o1"]);
        history.record("update", live.clone());

        // Mutating the live state after recording must not corrupt history.
        live.registry
            .insert(
                Stage::Pending,
                OrderRecord::new("5YJ3E1EA7KF000316", "Sam Ito").with_id("o2"),
            )
            .unwrap();

        let restored = history.undo(&live).unwrap();
        assert_eq!(restored.registry.total_len(), 1);
        assert!(restored.registry.find("o2").is_none());
    }
}
