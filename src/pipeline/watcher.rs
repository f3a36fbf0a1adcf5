use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::errors::PipelineError;
use super::registry::StageRegistry;
use super::types::{normalize_vin, OrderRecord, PartStatus, Stage};

/// Re-entrancy guard for the VIN monitor.
///
/// The transition rules are the whole contract: `Idle -> Processing` via
/// `begin_cycle` (which refuses when already processing), `Processing ->
/// Idle` via `settle`. The guard only returns to `Idle` after the promotion
/// and its downstream effects have finished, so a mutation caused by the
/// promotion itself can never re-trigger an evaluation mid-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GuardState {
    #[default]
    Idle,
    Processing,
}

impl GuardState {
    /// Arm the guard. Returns `false` (and stays put) if a cycle is already
    /// in flight.
    pub fn begin_cycle(&mut self) -> bool {
        match self {
            GuardState::Idle => {
                *self = GuardState::Processing;
                true
            }
            GuardState::Processing => false,
        }
    }

    pub fn settle(&mut self) {
        *self = GuardState::Idle;
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, GuardState::Processing)
    }
}

/// What one evaluation cycle moved: the observation point for toasts and
/// logs, not state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionNotice {
    pub moved: Vec<String>,
    pub vins: Vec<String>,
    pub from: Stage,
    pub to: Stage,
}

impl PromotionNotice {
    pub fn count(&self) -> usize {
        self.moved.len()
    }
}

/// Watches one stage and promotes fully-arrived VIN groups to the target
/// stage after every mutation that touches the watched stage.
#[derive(Debug)]
pub struct VinMonitor {
    watched: Stage,
    target: Stage,
    guard: GuardState,
}

impl VinMonitor {
    pub fn new(watched: Stage, target: Stage) -> Self {
        Self {
            watched,
            target,
            guard: GuardState::default(),
        }
    }

    pub fn watched(&self) -> Stage {
        self.watched
    }

    pub fn target(&self) -> Stage {
        self.target
    }

    pub fn guard(&self) -> GuardState {
        self.guard
    }

    /// Arm the guard without evaluating. Exposed so the owner of the monitor
    /// can hold evaluation off while a cycle's side effects are in flight.
    pub fn begin_cycle(&mut self) -> bool {
        self.guard.begin_cycle()
    }

    /// Re-arm after a cycle's downstream effects have settled.
    pub fn settle(&mut self) {
        self.guard.settle();
    }

    /// One evaluation cycle: group the watched stage by normalized VIN,
    /// collect every group whose members have all arrived, and relocate the
    /// collected ids with a single atomic move.
    ///
    /// A group with any member still outstanding is left entirely alone;
    /// movement is all-or-nothing per VIN group. Returns `None` without
    /// touching anything when the guard is already processing.
    ///
    /// On a promotion the guard stays `Processing` until the caller invokes
    /// `settle`; on a no-op cycle it re-arms immediately.
    pub fn evaluate(
        &mut self,
        registry: &mut StageRegistry,
    ) -> Result<Option<PromotionNotice>, PipelineError> {
        if !self.guard.begin_cycle() {
            debug!(stage = %self.watched, "Evaluation skipped, cycle already in flight");
            return Ok(None);
        }

        let (ready_ids, ready_vins) = {
            let mut groups: BTreeMap<String, Vec<&OrderRecord>> = BTreeMap::new();
            for record in registry.records(self.watched) {
                groups
                    .entry(normalize_vin(&record.vin))
                    .or_default()
                    .push(record);
            }

            let mut ready_ids = Vec::new();
            let mut ready_vins = Vec::new();
            for (vin, members) in &groups {
                if members
                    .iter()
                    .all(|r| r.part_status == PartStatus::Arrived)
                {
                    ready_vins.push(vin.clone());
                    ready_ids.extend(members.iter().map(|r| r.id.clone()));
                }
            }
            (ready_ids, ready_vins)
        };

        if ready_ids.is_empty() {
            // Nothing moved, so there are no downstream effects to wait out.
            self.guard.settle();
            return Ok(None);
        }

        if let Err(err) = registry.move_records(&ready_ids, self.watched, self.target) {
            self.guard.settle();
            return Err(err);
        }

        info!(
            moved = ready_ids.len(),
            vins = ?ready_vins,
            from = %self.watched,
            to = %self.target,
            "Fully-arrived VIN groups promoted"
        );
        Ok(Some(PromotionNotice {
            moved: ready_ids,
            vins: ready_vins,
            from: self.watched,
            to: self.target,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::OrderRecord;

    const VIN_A: &str = "1HGCM82633A004352";
    const VIN_B: &str = "5YJ3E1EA7KF000316";

    fn monitor() -> VinMonitor {
        VinMonitor::new(Stage::Pending, Stage::Call)
    }

    fn seed(registry: &mut StageRegistry, id: &str, vin: &str, status: PartStatus) {
        registry
            .insert(
                Stage::Pending,
                OrderRecord::new(vin, "Dana Li").with_id(id).with_status(status),
            )
            .unwrap();
    }

    #[test]
    fn test_guard_transition_rules() {
        let mut guard = GuardState::default();
        assert!(!guard.is_processing());
        assert!(guard.begin_cycle());
        assert!(guard.is_processing());
        // Nested arming is refused while a cycle is in flight.
        assert!(!guard.begin_cycle());
        guard.settle();
        assert!(!guard.is_processing());
        assert!(guard.begin_cycle());
    }

    #[test]
    fn test_fully_arrived_group_moves_wholly() {
        let mut registry = StageRegistry::new();
        seed(&mut registry, "o1", VIN_A, PartStatus::Arrived);
        seed(&mut registry, "o2", VIN_A, PartStatus::Arrived);

        let notice = monitor().evaluate(&mut registry).unwrap().unwrap();
        assert_eq!(notice.count(), 2);
        assert_eq!(notice.vins, vec![VIN_A.to_string()]);
        assert!(registry.records(Stage::Pending).is_empty());
        assert_eq!(registry.records(Stage::Call).len(), 2);
    }

    #[test]
    fn test_partial_group_never_moves() {
        let mut registry = StageRegistry::new();
        seed(&mut registry, "o1", VIN_A, PartStatus::Arrived);
        seed(&mut registry, "o2", VIN_A, PartStatus::Ordered);

        let notice = monitor().evaluate(&mut registry).unwrap();
        assert!(notice.is_none());
        assert_eq!(registry.records(Stage::Pending).len(), 2);
        assert!(registry.records(Stage::Call).is_empty());
    }

    #[test]
    fn test_only_ready_groups_move_when_mixed() {
        let mut registry = StageRegistry::new();
        seed(&mut registry, "a1", VIN_A, PartStatus::Arrived);
        seed(&mut registry, "a2", VIN_A, PartStatus::Arrived);
        seed(&mut registry, "b1", VIN_B, PartStatus::Backordered);

        let notice = monitor().evaluate(&mut registry).unwrap().unwrap();
        assert_eq!(notice.moved, vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(registry.records(Stage::Pending).len(), 1);
        assert_eq!(registry.records(Stage::Pending)[0].id, "b1");
        assert_eq!(registry.records(Stage::Call).len(), 2);
    }

    #[test]
    fn test_vin_grouping_is_case_and_whitespace_insensitive() {
        let mut registry = StageRegistry::new();
        seed(&mut registry, "o1", "1hgcm82633a004352", PartStatus::Arrived);
        seed(&mut registry, "o2", " 1HGCM82633A004352 ", PartStatus::Ordered);

        // Same normalized VIN, one member outstanding: nothing moves.
        assert!(monitor().evaluate(&mut registry).unwrap().is_none());
        assert_eq!(registry.records(Stage::Pending).len(), 2);
    }

    #[test]
    fn test_reentrant_evaluation_is_a_no_op() {
        let mut registry = StageRegistry::new();
        seed(&mut registry, "o1", VIN_A, PartStatus::Arrived);

        let mut monitor = monitor();
        assert!(monitor.begin_cycle());
        // A ready group exists, but the in-flight cycle blocks evaluation.
        let notice = monitor.evaluate(&mut registry).unwrap();
        assert!(notice.is_none());
        assert_eq!(registry.records(Stage::Pending).len(), 1);

        monitor.settle();
        let notice = monitor.evaluate(&mut registry).unwrap();
        assert_eq!(notice.unwrap().count(), 1);
    }

    #[test]
    fn test_guard_stays_armed_until_settle_after_promotion() {
        let mut registry = StageRegistry::new();
        seed(&mut registry, "o1", VIN_A, PartStatus::Arrived);

        let mut monitor = monitor();
        monitor.evaluate(&mut registry).unwrap().unwrap();
        assert!(monitor.guard().is_processing());
        monitor.settle();
        assert!(!monitor.guard().is_processing());
    }

    #[test]
    fn test_empty_watched_stage_settles_immediately() {
        let mut registry = StageRegistry::new();
        let mut monitor = monitor();
        assert!(monitor.evaluate(&mut registry).unwrap().is_none());
        assert!(!monitor.guard().is_processing());
    }
}
