//! Remote-store sync adapter and the serialized batch runner.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::pipeline::{OrderRecord, Stage, StageRegistry};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote save failed for record {id}: {reason}")]
    Save { id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Batch aborted after {saved} save(s); record {failed_id} failed: {source}")]
    BatchAborted {
        saved: usize,
        failed_id: String,
        #[source]
        source: Box<SyncError>,
    },
}

/// Persists one local record to the remote store.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    async fn save(&self, record: &OrderRecord, stage: Stage) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub saved: usize,
    pub per_stage: BTreeMap<Stage, usize>,
}

/// Pushes every stage collection to the remote store, one stage at a time,
/// one record at a time.
///
/// The await-in-loop is deliberate: it caps outstanding writes against the
/// remote store's connection budget, with a rate limiter pacing the stream.
/// The batch is not cancellable mid-flight; a failure leaves the local state
/// and the remote store diverged until a later full resync.
pub struct BatchSyncer {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl BatchSyncer {
    pub fn new(writes_per_second: u32, burst_capacity: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(writes_per_second.max(1)).unwrap())
            .allow_burst(NonZeroU32::new(burst_capacity.max(1)).unwrap());
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// First failure aborts the remainder and surfaces an aggregate error.
    /// Already-saved records are not rolled back.
    pub async fn run(
        &self,
        adapter: &dyn SyncAdapter,
        registry: &StageRegistry,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        for stage in Stage::ALL {
            for record in registry.records(stage) {
                self.limiter
                    .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
                    .await;
                if let Err(err) = adapter.save(record, stage).await {
                    warn!(
                        id = %record.id,
                        stage = %stage,
                        saved = report.saved,
                        error = %err,
                        "Remote save failed, aborting batch"
                    );
                    return Err(SyncError::BatchAborted {
                        saved: report.saved,
                        failed_id: record.id.clone(),
                        source: Box::new(err),
                    });
                }
                report.saved += 1;
                *report.per_stage.entry(stage).or_default() += 1;
            }
        }
        info!(saved = report.saved, "Batch sync complete");
        Ok(report)
    }
}

/// Reference remote-store stand-in: each record lands as one JSON document
/// under `<root>/<stage>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileSyncAdapter {
    root: PathBuf,
}

impl FileSyncAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl SyncAdapter for FileSyncAdapter {
    async fn save(&self, record: &OrderRecord, stage: Stage) -> Result<(), SyncError> {
        let dir = self.root.join(stage.as_str());
        fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.json", record.id));
        let payload = serde_json::to_vec_pretty(record)?;
        fs::write(&path, payload).await?;
        debug!(id = %record.id, path = %path.display(), "Record saved to remote store");
        Ok(())
    }
}
