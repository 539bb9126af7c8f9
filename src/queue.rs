use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::advisory::{CropRecommendation, DiseaseFinding, SoilSample, WeatherSnapshot};
use crate::store::{get_json, keys, set_json, KeyValueStore, StoreError};

/// Failed attempts after which a queue item is abandoned.
pub const MAX_ATTEMPTS: u32 = 3;

/// Unix timestamp in milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }
}

/// Queue item identifier, unique within a client session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(String);

impl QueueItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One pending offline operation. The serialized tag/data shape matches the
/// persisted `offline_queue` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Submission {
    CropAdvisory {
        soil: SoilSample,
        weather: WeatherSnapshot,
        recommendations: Vec<CropRecommendation>,
    },
    DiseaseDetection {
        image_name: String,
        finding: DiseaseFinding,
    },
}

impl Submission {
    pub fn submission_type(&self) -> &'static str {
        match self {
            Submission::CropAdvisory { .. } => "crop_advisory",
            Submission::DiseaseDetection { .. } => "disease_detection",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub submission: Submission,
    pub enqueued_at: UnixTimeMs,
    pub retry_count: u32,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
#[error("processor error: {0}")]
pub struct ProcessorError(pub String);

/// Integration point with whatever backend eventually receives the queued
/// submissions. Returning `Ok(false)` and returning `Err(_)` are treated
/// identically: one failed attempt.
#[async_trait]
pub trait QueueProcessor: Send + Sync {
    async fn process(&self, item: &QueueItem) -> Result<bool, ProcessorError>;
}

/// Outcome of one `process_queue` pass.
///
/// `gave_up` lists items permanently abandoned after [`MAX_ATTEMPTS`] failed
/// attempts. Removal from the queue is NOT a success signal for these.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessReport {
    pub succeeded: Vec<QueueItemId>,
    pub retried: Vec<QueueItemId>,
    pub gave_up: Vec<QueueItemId>,
}

impl ProcessReport {
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.retried.len() + self.gave_up.len()
    }
}

/// Ordered queue of pending submissions, persisted whole under the
/// `offline_queue` key.
///
/// Every mutation is a read-modify-write of the full list from this context.
/// Two contexts (tabs, or page vs. worker) writing concurrently race
/// last-writer-wins on the persisted value; there is no cross-context
/// coordination and an append can be lost. Within one context operations
/// execute in call order and processing is FIFO.
pub struct OfflineQueue<S: KeyValueStore> {
    store: Arc<S>,
}

impl<S: KeyValueStore> OfflineQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Current persisted sequence, oldest first. Absent record reads as empty.
    pub async fn items(&self) -> Result<Vec<QueueItem>, QueueError> {
        Ok(get_json(self.store.as_ref(), keys::OFFLINE_QUEUE)
            .await?
            .unwrap_or_default())
    }

    /// Appends a new item with `retry_count = 0`. If the store write fails
    /// the item is not added and the previous sequence stays intact.
    #[instrument(skip(self, submission), fields(kind = submission.submission_type()))]
    pub async fn add_to_queue(&self, submission: Submission) -> Result<QueueItem, QueueError> {
        let item = QueueItem {
            id: QueueItemId::generate(),
            submission,
            enqueued_at: UnixTimeMs::now(),
            retry_count: 0,
        };

        let mut queue = self.items().await?;
        queue.push(item.clone());
        set_json(self.store.as_ref(), keys::OFFLINE_QUEUE, &queue).await?;

        info!(id = item.id.as_str(), "queued offline submission");
        Ok(item)
    }

    /// Removes the item with the given id. Returns whether anything was
    /// removed; an absent id is a no-op with no store write.
    #[instrument(skip(self), fields(id = id.as_str()))]
    pub async fn remove_from_queue(&self, id: &QueueItemId) -> Result<bool, QueueError> {
        let queue = self.items().await?;
        let before = queue.len();

        let remaining: Vec<QueueItem> = queue.into_iter().filter(|item| item.id != *id).collect();
        if remaining.len() == before {
            return Ok(false);
        }

        set_json(self.store.as_ref(), keys::OFFLINE_QUEUE, &remaining).await?;
        Ok(true)
    }

    /// Runs one FIFO pass over the queue with the given processor.
    ///
    /// Per item: success removes it; a failed attempt (processor returned
    /// `false` or errored) increments `retry_count`, and an item reaching
    /// [`MAX_ATTEMPTS`] is dropped regardless of outcome. A single bad item
    /// never blocks the rest of the pass; processor failures are logged, not
    /// propagated. The surviving sequence is persisted once at the end of the
    /// pass. An empty queue is a no-op and performs no store write.
    #[instrument(skip_all)]
    pub async fn process_queue<P: QueueProcessor + ?Sized>(
        &self,
        processor: &P,
    ) -> Result<ProcessReport, QueueError> {
        let queue = self.items().await?;
        if queue.is_empty() {
            return Ok(ProcessReport::default());
        }

        let mut report = ProcessReport::default();
        let mut remaining = Vec::with_capacity(queue.len());

        for mut item in queue {
            let attempt = match processor.process(&item).await {
                Ok(success) => success,
                Err(e) => {
                    error!(id = item.id.as_str(), "queue processing error: {e}");
                    false
                }
            };

            if attempt {
                report.succeeded.push(item.id);
                continue;
            }

            item.retry_count += 1;
            if item.retry_count >= MAX_ATTEMPTS {
                warn!(
                    id = item.id.as_str(),
                    kind = item.submission.submission_type(),
                    "giving up on submission after {MAX_ATTEMPTS} failed attempts"
                );
                report.gave_up.push(item.id);
            } else {
                report.retried.push(item.id.clone());
                remaining.push(item);
            }
        }

        set_json(self.store.as_ref(), keys::OFFLINE_QUEUE, &remaining).await?;

        info!(
            succeeded = report.succeeded.len(),
            retried = report.retried.len(),
            gave_up = report.gave_up.len(),
            "queue pass complete"
        );
        Ok(report)
    }
}
