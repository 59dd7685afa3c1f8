use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::batch::ObjectRef;
use crate::models::infra::{AlarmState, InfraEvent, InfraRecord, InfraState};
use crate::services::queue::{BatchQueue, QueueError};

/// Completion notification published when a batch queue has drained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub alarm: String,
}

/// Handle to a provisioned (or provisioning) infra instance. The event
/// receiver is the coordinator's only suspension point during setup.
pub struct InfraHandle {
    pub record: InfraRecord,
    events: mpsc::Receiver<InfraEvent>,
}

impl InfraHandle {
    pub async fn next_event(&mut self) -> Option<InfraEvent> {
        self.events.recv().await
    }

    /// Consume lifecycle events until the infra is STABLE or errored.
    pub async fn wait_until_stable(&mut self) -> Result<(), InfraError> {
        while let Some(event) = self.next_event().await {
            match event {
                InfraEvent::Creating => continue,
                InfraEvent::Stable => return Ok(()),
                InfraEvent::Error(message) => return Err(InfraError::Provision(message)),
            }
        }
        Err(InfraError::Provision(
            "provisioning event stream ended before a terminal event".to_string(),
        ))
    }
}

/// Classify recorded depth samples into an alarm state. Newest first.
pub fn classify_alarm(samples: &[i64], required: usize) -> AlarmState {
    if samples.is_empty() {
        return AlarmState::NoData;
    }
    let required = required.max(1);
    if samples.len() >= required && samples.iter().take(required).all(|&d| d <= 0) {
        AlarmState::Firing
    } else {
        AlarmState::Active
    }
}

/// Publish only on the first transition into `Firing`; the persisted
/// `notified` flag keeps a restarted sampler from re-announcing a batch.
pub fn should_notify(samples: &[i64], required: usize, already_notified: bool) -> bool {
    !already_notified && classify_alarm(samples, required) == AlarmState::Firing
}

/// Provisions and monitors per-batch work-distribution infra: a work queue
/// plus DLQ (redis key family), a depth-sample window for completion
/// detection, and a registry record the scheduled sweep can enumerate.
pub struct InfraProvisioner {
    client: redis::Client,
    app_name: String,
    poll_interval: Duration,
    required_empty_polls: usize,
}

impl InfraProvisioner {
    pub fn new(
        client: redis::Client,
        app_name: &str,
        poll_interval: Duration,
        required_empty_polls: usize,
    ) -> Self {
        Self {
            client,
            app_name: app_name.to_string(),
            poll_interval,
            required_empty_polls,
        }
    }

    pub fn infra_name(&self, batch_id: &str) -> String {
        format!("{}-{}", self.app_name, batch_id)
    }

    fn registry_key(&self) -> String {
        format!("{}:infra", self.app_name)
    }

    fn completions_key(&self) -> String {
        format!("{}:completions", self.app_name)
    }

    fn alarm_key(&self, alarm_name: &str) -> String {
        format!("{}:alarm:{}", self.app_name, alarm_name)
    }

    /// Depth samples outlive a stopped sampler by a bounded window; once
    /// they expire the alarm reads as NoData, the sweep's teardown signal.
    fn alarm_ttl(&self) -> i64 {
        (self.poll_interval.as_secs() as i64 * self.required_empty_polls as i64 * 4).max(600)
    }

    /// Queue bound to an infra instance's key family.
    pub fn queue(&self, infra_name: &str) -> BatchQueue {
        BatchQueue::for_infra(self.client.clone(), infra_name)
    }

    /// Provision infra for a batch and register it for completion sampling.
    ///
    /// Lifecycle events arrive on the returned handle; the caller blocks on
    /// them until a terminal STABLE or ERROR event.
    pub async fn create(
        &self,
        batch_id: &str,
        source: &ObjectRef,
    ) -> Result<InfraHandle, InfraError> {
        let name = self.infra_name(batch_id);
        let record = InfraRecord {
            stack_id: Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            name: name.clone(),
            created_at: Utc::now(),
            state: InfraState::Creating,
            source: Some(source.clone()),
            notified: false,
        };

        self.write_record(&record).await?;

        let (tx, rx) = mpsc::channel(8);
        let provisioner = self.fork();
        let mut stable = record.clone();
        tokio::spawn(async move {
            let _ = tx.send(InfraEvent::Creating).await;

            // Stabilize: the broker must answer before any message flows.
            match provisioner.ping().await {
                Ok(()) => {
                    stable.state = InfraState::Stable;
                    if let Err(e) = provisioner.write_record(&stable).await {
                        let _ = tx.send(InfraEvent::Error(e.to_string())).await;
                        return;
                    }
                    let _ = tx.send(InfraEvent::Stable).await;
                }
                Err(e) => {
                    let _ = tx.send(InfraEvent::Error(e.to_string())).await;
                }
            }
        });

        Ok(InfraHandle { record, events: rx })
    }

    /// Tear down an infra instance. Idempotent: missing or already-deleted
    /// infra is a no-op success.
    pub async fn delete(&self, infra_name: &str) -> Result<(), InfraError> {
        let mut record = match self.read_record(infra_name).await? {
            Some(record) => record,
            None => return Ok(()),
        };
        if record.state == InfraState::Deleted {
            return Ok(());
        }

        record.state = InfraState::Deleting;
        self.write_record(&record).await?;

        self.queue(infra_name).purge().await?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(self.alarm_key(&record.alarm_name())).await?;

        record.state = InfraState::Deleted;
        self.write_record(&record).await?;
        Ok(())
    }

    /// Every registry record, deleted instances included.
    pub async fn list(&self) -> Result<Vec<InfraRecord>, InfraError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: std::collections::HashMap<String, String> =
            conn.hgetall(self.registry_key()).await?;
        let mut records = Vec::with_capacity(raw.len());
        for payload in raw.values() {
            records.push(serde_json::from_str(payload)?);
        }
        Ok(records)
    }

    /// Observed alarm state, derived from recorded depth samples.
    pub async fn alarm_state(&self, alarm_name: &str) -> Result<AlarmState, InfraError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let samples: Vec<i64> = conn
            .lrange(self.alarm_key(alarm_name), 0, self.required_empty_polls as isize - 1)
            .await?;
        Ok(classify_alarm(&samples, self.required_empty_polls))
    }

    /// Block up to `timeout` for the next completion notification.
    pub async fn pop_completion(
        &self,
        timeout: Duration,
    ) -> Result<Option<CompletionNotice>, InfraError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<(String, String)> = conn
            .brpop(self.completions_key(), timeout.as_secs_f64())
            .await?;
        match result {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    fn fork(&self) -> Self {
        Self {
            client: self.client.clone(),
            app_name: self.app_name.clone(),
            poll_interval: self.poll_interval,
            required_empty_polls: self.required_empty_polls,
        }
    }

    async fn ping(&self) -> Result<(), InfraError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await?;
        Ok(())
    }

    async fn write_record(&self, record: &InfraRecord) -> Result<(), InfraError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        conn.hset::<_, _, _, ()>(self.registry_key(), &record.name, payload)
            .await?;
        Ok(())
    }

    async fn read_record(&self, infra_name: &str) -> Result<Option<InfraRecord>, InfraError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.hget(self.registry_key(), infra_name).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// One sampling pass over every stable registry record: record each
    /// queue's depth and publish a completion notice the first time the
    /// alarm fires. The teardown daemon drives this on the poll interval,
    /// so detection outlives the intake process and survives a daemon
    /// restart (the sample window and the notified flag live in the
    /// broker, not in task-local state).
    ///
    /// Returns the number of notices published this pass.
    pub async fn sample_completions(&self) -> Result<usize, InfraError> {
        let mut published = 0;
        for record in self.list().await? {
            if record.state != InfraState::Stable {
                continue;
            }
            if self.sample_one(&record).await? {
                published += 1;
            }
        }
        Ok(published)
    }

    async fn sample_one(&self, record: &InfraRecord) -> Result<bool, InfraError> {
        let depth = self.queue(&record.name).depth().await?;
        let alarm_key = self.alarm_key(&record.alarm_name());

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lpush::<_, _, ()>(&alarm_key, depth as i64).await?;
        conn.ltrim::<_, ()>(&alarm_key, 0, self.required_empty_polls as isize - 1)
            .await?;
        conn.expire::<_, ()>(&alarm_key, self.alarm_ttl()).await?;

        let samples: Vec<i64> = conn
            .lrange(&alarm_key, 0, self.required_empty_polls as isize - 1)
            .await?;
        if !should_notify(&samples, self.required_empty_polls, record.notified) {
            return Ok(false);
        }

        let notice = CompletionNotice {
            alarm: record.alarm_name(),
        };
        let payload = serde_json::to_string(&notice)?;
        conn.lpush::<_, _, ()>(self.completions_key(), payload).await?;

        let mut updated = record.clone();
        updated.notified = true;
        self.write_record(&updated).await?;

        tracing::info!(
            batch_id = %record.batch_id,
            infra = %record.name,
            "queue drained, completion notification published"
        );
        Ok(true)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Provisioning failed: {0}")]
    Provision(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_requires_sustained_empty_window() {
        assert!(!should_notify(&[0], 3, false));
        assert!(!should_notify(&[0, 0], 3, false));
        assert!(should_notify(&[0, 0, 0], 3, false));
        assert!(!should_notify(&[0, 2, 0], 3, false));
    }

    #[test]
    fn notification_fires_at_most_once() {
        assert!(!should_notify(&[0, 0, 0], 3, true));
    }

    #[test]
    fn alarm_no_samples_is_no_data() {
        assert_eq!(classify_alarm(&[], 10), AlarmState::NoData);
    }

    #[test]
    fn alarm_sustained_zero_fires() {
        assert_eq!(classify_alarm(&[0, 0, 0], 3), AlarmState::Firing);
    }

    #[test]
    fn alarm_short_or_busy_run_is_active() {
        // Not enough samples yet for a sustained-empty verdict.
        assert_eq!(classify_alarm(&[0, 0], 3), AlarmState::Active);
        // Activity inside the window.
        assert_eq!(classify_alarm(&[0, 4, 0], 3), AlarmState::Active);
    }
}
