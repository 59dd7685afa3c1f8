use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

/// Redeliveries before a message is parked on the dead-letter queue.
pub const MAX_RECEIVE_COUNT: i64 = 3;

/// One queued image reference, serialized into the batch's work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageJob {
    pub bucket: String,
    pub key: String,
    pub batch_id: String,
    /// Original relative path inside the source archive.
    pub file_name: String,
}

/// Redis-backed work queue for one batch's ephemeral infra.
///
/// A message moves jobs -> processing on dequeue and is removed on
/// `complete`. `release` returns it for redelivery until the receive count
/// exceeds [`MAX_RECEIVE_COUNT`], after which it is parked on the DLQ.
pub struct BatchQueue {
    client: redis::Client,
    jobs_key: String,
    processing_key: String,
    dlq_key: String,
    receives_key: String,
}

impl BatchQueue {
    pub fn for_infra(client: redis::Client, infra_name: &str) -> Self {
        Self {
            client,
            jobs_key: format!("{infra_name}:jobs"),
            processing_key: format!("{infra_name}:processing"),
            dlq_key: format!("{infra_name}:dlq"),
            receives_key: format!("{infra_name}:receives"),
        }
    }

    /// Enqueue an image reference for processing.
    pub async fn enqueue(&self, job: &ImageJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lpush::<_, _, ()>(&self.jobs_key, &payload).await?;
        Ok(())
    }

    /// Dequeue a job (move to the in-flight list, bump its receive count).
    pub async fn dequeue(&self) -> Result<Option<ImageJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn
            .rpoplpush(&self.jobs_key, &self.processing_key)
            .await?;

        match result {
            Some(payload) => {
                conn.hincr::<_, _, _, ()>(&self.receives_key, &payload, 1)
                    .await?;
                let job: ImageJob = serde_json::from_str(&payload)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Mark a job as done (remove from the in-flight list).
    pub async fn complete(&self, job: &ImageJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, &payload)
            .await?;
        conn.hdel::<_, _, ()>(&self.receives_key, &payload).await?;
        Ok(())
    }

    /// Return a failed job for redelivery, or park it on the DLQ once its
    /// receive count is exhausted.
    pub async fn release(&self, job: &ImageJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, &payload)
            .await?;

        let receives: i64 = conn
            .hget::<_, _, Option<i64>>(&self.receives_key, &payload)
            .await?
            .unwrap_or(0);

        if receives >= MAX_RECEIVE_COUNT {
            conn.lpush::<_, _, ()>(&self.dlq_key, &payload).await?;
            conn.hdel::<_, _, ()>(&self.receives_key, &payload).await?;
        } else {
            conn.lpush::<_, _, ()>(&self.jobs_key, &payload).await?;
        }
        Ok(())
    }

    /// Visible + in-flight message count across the queue and its DLQ.
    /// This is the quantity the completion alarm evaluates.
    pub async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let visible: u64 = conn.llen(&self.jobs_key).await?;
        let in_flight: u64 = conn.llen(&self.processing_key).await?;
        let parked: u64 = conn.llen(&self.dlq_key).await?;
        Ok(visible + in_flight + parked)
    }

    /// Drop every key belonging to this queue. Safe to call repeatedly.
    pub async fn purge(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys = vec![
            self.jobs_key.clone(),
            self.processing_key.clone(),
            self.dlq_key.clone(),
            self.receives_key.clone(),
        ];
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
