//! In-memory order-pipeline engine
//!
//! Vehicle-service orders move through sequential workflow stages (intake →
//! main queue → call list → booking → archive). This module owns the pieces
//! with real invariants:
//!
//! - **Stage registry**: one ordered collection per stage, sole source of
//!   truth for membership, atomic multi-record transitions
//! - **VIN monitor**: re-evaluates the watched stage after every mutation and
//!   promotes fully-arrived VIN groups, guarded against re-entrancy
//! - **Command history**: full-state snapshots before every mutating action,
//!   giving undo/redo with bit-for-bit restoration
//!
//! `PipelineEngine` is the composition root: it owns the state explicitly
//! and is passed by reference wherever it is needed. There are no hidden
//! globals. All mutations arrive as discrete, serialized events on one
//! logical thread; the monitor's guard exists for re-entrant triggering, not
//! for parallelism.

pub mod errors;
pub mod history;
pub mod registry;
pub mod types;
pub mod watcher;

pub use errors::{HistoryError, PipelineError};
pub use history::{CommandHistory, CommandLogEntry, DEFAULT_HISTORY_DEPTH};
pub use registry::{PipelineState, StageRegistry};
pub use types::{
    normalize_vin, Notification, OrderRecord, PartStatus, RecordPatch, RepairType, SmsTemplate,
    Stage, WARRANTY_MILEAGE_LIMIT,
};
pub use watcher::{GuardState, PromotionNotice, VinMonitor};

use tracing::info;

/// What a single mutating action did, for presentation. The promotion
/// notice, when present, is the monitor's observation surface (toast/log);
/// it is not state.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: String,
    pub promoted: Option<PromotionNotice>,
}

/// Owns the pipeline state, the command history and the VIN monitor, and
/// runs every mutating action through the same cycle:
///
/// 1. validate (nothing mutates on failure)
/// 2. capture a pre-action snapshot
/// 3. apply the mutation to the registry
/// 4. run one monitor evaluation cycle, which may promote VIN groups
///
/// The promotion belongs to the action's cycle: it records no separate
/// history entry, so undo reverts the action together with the promotion it
/// triggered.
#[derive(Debug)]
pub struct PipelineEngine {
    state: PipelineState,
    history: CommandHistory,
    monitor: VinMonitor,
    actor: Option<String>,
}

impl PipelineEngine {
    pub fn new(watched: Stage, target: Stage, history_depth: usize) -> Self {
        Self {
            state: PipelineState::default(),
            history: CommandHistory::new(history_depth),
            monitor: VinMonitor::new(watched, target),
            actor: None,
        }
    }

    /// Resume from previously saved state.
    pub fn with_state(mut self, state: PipelineState) -> Self {
        self.state = state;
        self
    }

    /// Resume a saved history; the engine's depth cap is re-applied.
    pub fn with_history(mut self, mut history: CommandHistory) -> Self {
        history.set_max_depth(self.history.max_depth());
        self.history = history;
        self
    }

    /// Audit context from the identity collaborator, used for logging and
    /// promotion notifications only.
    pub fn with_actor(mut self, actor: Option<String>) -> Self {
        self.actor = actor;
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.state.registry
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn monitor(&self) -> &VinMonitor {
        &self.monitor
    }

    pub fn into_parts(self) -> (PipelineState, CommandHistory) {
        (self.state, self.history)
    }

    /// Create a new order in the intake stage.
    pub fn intake(&mut self, record: OrderRecord) -> Result<ActionOutcome, PipelineError> {
        record.validate()?;
        self.mutate("intake", move |state| {
            state.registry.insert(Stage::Pending, record)
        })
    }

    /// Merge a patch into an order. The merged result is validated before
    /// anything is touched.
    pub fn update_order(
        &mut self,
        stage: Stage,
        id: &str,
        patch: RecordPatch,
    ) -> Result<ActionOutcome, PipelineError> {
        let mut merged = self
            .state
            .registry
            .records(stage)
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| PipelineError::NotFound {
                id: id.to_string(),
                stage,
            })?
            .clone();
        patch.apply(&mut merged);
        merged.validate()?;

        self.mutate("update", move |state| {
            state.registry.update(stage, id, &patch)
        })
    }

    /// Atomically move a set of orders between stages.
    pub fn move_orders(
        &mut self,
        ids: &[String],
        from: Stage,
        to: Stage,
    ) -> Result<ActionOutcome, PipelineError> {
        if ids.is_empty() {
            return Err(PipelineError::Validation {
                reason: "No record ids given".to_string(),
            });
        }
        self.mutate("move", move |state| {
            state.registry.move_records(ids, from, to)
        })
    }

    /// Move an order to the archive stage.
    pub fn archive_order(&mut self, from: Stage, id: &str) -> Result<ActionOutcome, PipelineError> {
        let ids = vec![id.to_string()];
        self.mutate("archive", move |state| {
            state.registry.move_records(&ids, from, Stage::Archive)
        })
    }

    /// Permanently delete an order.
    pub fn delete_order(&mut self, stage: Stage, id: &str) -> Result<ActionOutcome, PipelineError> {
        self.mutate("delete", move |state| {
            state.registry.remove(stage, id).map(|_| ())
        })
    }

    /// Restore the state captured immediately before the last action. Does
    /// not run the monitor: historical states are restored exactly as they
    /// were observed.
    pub fn undo(&mut self) -> Result<(), HistoryError> {
        let restored = self.history.undo(&self.state)?;
        self.state = restored;
        info!(actor = self.actor.as_deref(), "Last action reverted");
        Ok(())
    }

    /// Restore the state most recently parked by an undo.
    pub fn redo(&mut self) -> Result<(), HistoryError> {
        let restored = self.history.redo(&self.state)?;
        self.state = restored;
        info!(actor = self.actor.as_deref(), "Undone action re-applied");
        Ok(())
    }

    /// The shared action cycle. Registry operations are atomic, so a failed
    /// `op` leaves the state untouched and records no history entry.
    fn mutate<F>(&mut self, action: &str, op: F) -> Result<ActionOutcome, PipelineError>
    where
        F: FnOnce(&mut PipelineState) -> Result<(), PipelineError>,
    {
        let snapshot = self.state.clone();
        op(&mut self.state)?;
        self.history.record(action, snapshot);

        let promoted = self.run_monitor_cycle()?;
        Ok(ActionOutcome {
            action: action.to_string(),
            promoted,
        })
    }

    /// One monitor evaluation after a mutation. The guard re-arms only once
    /// the promotion's downstream effects (notification, logging) are done.
    fn run_monitor_cycle(&mut self) -> Result<Option<PromotionNotice>, PipelineError> {
        let promoted = self.monitor.evaluate(&mut self.state.registry)?;

        if let Some(notice) = &promoted {
            self.state.notifications.push(Notification::new(
                format!("{} order(s) moved to {}", notice.count(), notice.to),
                notice.moved.clone(),
                self.actor.clone(),
            ));
            info!(
                actor = self.actor.as_deref(),
                moved = notice.count(),
                to = %notice.to,
                "Promotion notification emitted"
            );
            self.monitor.settle();
        }
        Ok(promoted)
    }
}
