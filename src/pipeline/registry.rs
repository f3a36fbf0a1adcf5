use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::errors::PipelineError;
use super::types::{Notification, OrderRecord, PartStatus, RecordPatch, SmsTemplate, Stage};

/// One ordered collection of records per pipeline stage; the sole source of
/// truth for stage membership.
///
/// Invariant: an id belongs to exactly one stage collection at any time.
/// Every operation either completes fully or leaves the registry untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRegistry {
    stages: BTreeMap<Stage, Vec<OrderRecord>>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        let stages = Stage::ALL.iter().map(|stage| (*stage, Vec::new())).collect();
        Self { stages }
    }
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut Vec<OrderRecord> {
        self.stages.entry(stage).or_default()
    }

    pub fn records(&self, stage: Stage) -> &[OrderRecord] {
        self.stages.get(&stage).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Look up a record by id across all stages.
    pub fn find(&self, id: &str) -> Option<&OrderRecord> {
        self.stages.values().flatten().find(|r| r.id == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn counts(&self) -> BTreeMap<Stage, usize> {
        Stage::ALL
            .iter()
            .map(|stage| (*stage, self.records(*stage).len()))
            .collect()
    }

    pub fn total_len(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Add a record to a stage. The record's own `stage` field is stamped to
    /// match. Rejects ids that already exist in any stage.
    pub fn insert(&mut self, stage: Stage, mut record: OrderRecord) -> Result<(), PipelineError> {
        if let Some(existing) = self.find(&record.id) {
            return Err(PipelineError::DuplicateId {
                id: record.id.clone(),
                stage: existing.stage,
            });
        }
        record.stage = stage;
        debug!(id = %record.id, stage = %stage, "Record inserted");
        self.stage_mut(stage).push(record);
        Ok(())
    }

    /// Merge a patch into the record with `id` in `stage`.
    pub fn update(
        &mut self,
        stage: Stage,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<(), PipelineError> {
        let record = self
            .stage_mut(stage)
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PipelineError::NotFound {
                id: id.to_string(),
                stage,
            })?;
        patch.apply(record);
        debug!(id = %id, stage = %stage, "Record updated");
        Ok(())
    }

    /// Atomically relocate a set of records between two stages.
    ///
    /// Every id is checked against `from` before anything moves: any missing
    /// id aborts the whole call and both collections stay untouched. On
    /// success the records keep their relative order and their `stage` field
    /// is restamped.
    pub fn move_records(
        &mut self,
        ids: &[String],
        from: Stage,
        to: Stage,
    ) -> Result<(), PipelineError> {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !self.records(from).iter().any(|r| &r.id == *id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Transition { from, to, missing });
        }
        if from == to || ids.is_empty() {
            return Ok(());
        }

        let source = self.stage_mut(from);
        let mut moved = Vec::with_capacity(ids.len());
        let mut i = 0;
        while i < source.len() {
            if ids.contains(&source[i].id) {
                moved.push(source.remove(i));
            } else {
                i += 1;
            }
        }
        for mut record in moved {
            record.stage = to;
            self.stage_mut(to).push(record);
        }
        debug!(count = ids.len(), from = %from, to = %to, "Records moved");
        Ok(())
    }

    /// Permanently delete a record.
    pub fn remove(&mut self, stage: Stage, id: &str) -> Result<OrderRecord, PipelineError> {
        let records = self.stage_mut(stage);
        match records.iter().position(|r| r.id == id) {
            Some(index) => Ok(records.remove(index)),
            None => Err(PipelineError::NotFound {
                id: id.to_string(),
                stage,
            }),
        }
    }
}

/// The complete mutable pipeline state: the stage collections plus the
/// auxiliary lists that ride along in every history snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub registry: StageRegistry,
    #[serde(default)]
    pub status_options: Vec<String>,
    #[serde(default)]
    pub sms_templates: Vec<SmsTemplate>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            registry: StageRegistry::default(),
            status_options: PartStatus::ALL.iter().map(|s| s.to_string()).collect(),
            sms_templates: vec![SmsTemplate {
                name: "parts_arrived".to_string(),
                body: "Hi {customer}, the parts for your vehicle ({vin}) have arrived. \
                       Give us a call to book a time."
                    .to_string(),
            }],
            notifications: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, vin: &str) -> OrderRecord {
        OrderRecord::new(vin, "Dana Li").with_id(id)
    }

    #[test]
    fn test_insert_stamps_stage_and_is_findable() {
        let mut registry = StageRegistry::new();
        registry
            .insert(Stage::Orders, order("o1", "1HGCM82633A004352"))
            .unwrap();

        let found = registry.find("o1").unwrap();
        assert_eq!(found.stage, Stage::Orders);
        assert_eq!(registry.records(Stage::Orders).len(), 1);
        assert!(registry.records(Stage::Pending).is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected_across_stages() {
        let mut registry = StageRegistry::new();
        registry
            .insert(Stage::Pending, order("o1", "1HGCM82633A004352"))
            .unwrap();

        let err = registry
            .insert(Stage::Call, order("o1", "5YJ3E1EA7KF000316"))
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::DuplicateId {
                id: "o1".to_string(),
                stage: Stage::Pending,
            }
        );
        assert_eq!(registry.total_len(), 1);
    }

    #[test]
    fn test_update_merges_patch() {
        let mut registry = StageRegistry::new();
        registry
            .insert(Stage::Pending, order("o1", "1HGCM82633A004352"))
            .unwrap();

        registry
            .update(Stage::Pending, "o1", &RecordPatch::status(PartStatus::Arrived))
            .unwrap();
        assert_eq!(
            registry.find("o1").unwrap().part_status,
            PartStatus::Arrived
        );
    }

    #[test]
    fn test_update_misses_record_in_other_stage() {
        let mut registry = StageRegistry::new();
        registry
            .insert(Stage::Pending, order("o1", "1HGCM82633A004352"))
            .unwrap();

        let err = registry
            .update(Stage::Call, "o1", &RecordPatch::status(PartStatus::Arrived))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[test]
    fn test_move_relocates_and_restamps() {
        let mut registry = StageRegistry::new();
        registry
            .insert(Stage::Pending, order("o1", "1HGCM82633A004352"))
            .unwrap();
        registry
            .insert(Stage::Pending, order("o2", "1HGCM82633A004352"))
            .unwrap();

        registry
            .move_records(
                &["o1".to_string(), "o2".to_string()],
                Stage::Pending,
                Stage::Call,
            )
            .unwrap();

        assert!(registry.records(Stage::Pending).is_empty());
        let call = registry.records(Stage::Call);
        assert_eq!(call.len(), 2);
        assert!(call.iter().all(|r| r.stage == Stage::Call));
        // Relative order survives the move.
        assert_eq!(call[0].id, "o1");
        assert_eq!(call[1].id, "o2");
    }

    #[test]
    fn test_move_with_missing_id_mutates_nothing() {
        let mut registry = StageRegistry::new();
        registry
            .insert(Stage::Pending, order("o1", "1HGCM82633A004352"))
            .unwrap();
        let before = registry.clone();

        let err = registry
            .move_records(
                &["o1".to_string(), "ghost".to_string()],
                Stage::Pending,
                Stage::Call,
            )
            .unwrap_err();

        assert_eq!(
            err,
            PipelineError::Transition {
                from: Stage::Pending,
                to: Stage::Call,
                missing: vec!["ghost".to_string()],
            }
        );
        assert_eq!(registry, before);
    }

    #[test]
    fn test_remove_returns_record() {
        let mut registry = StageRegistry::new();
        registry
            .insert(Stage::Archive, order("o1", "1HGCM82633A004352"))
            .unwrap();

        let removed = registry.remove(Stage::Archive, "o1").unwrap();
        assert_eq!(removed.id, "o1");
        assert!(registry.is_empty());
        assert!(registry.remove(Stage::Archive, "o1").is_err());
    }

    #[test]
    fn test_counts_cover_all_stages() {
        let mut registry = StageRegistry::new();
        registry
            .insert(Stage::Booking, order("o1", "1HGCM82633A004352"))
            .unwrap();

        let counts = registry.counts();
        assert_eq!(counts.len(), Stage::ALL.len());
        assert_eq!(counts[&Stage::Booking], 1);
        assert_eq!(counts[&Stage::Pending], 0);
    }

    #[test]
    fn test_state_snapshot_round_trips_through_json() {
        let mut state = PipelineState::default();
        state
            .registry
            .insert(Stage::Pending, order("o1", "1HGCM82633A004352"))
            .unwrap();
        state
            .notifications
            .push(Notification::new("moved", vec!["o1".to_string()], None));

        let json = serde_json::to_string(&state).unwrap();
        let restored: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
