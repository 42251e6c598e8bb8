//! Event publishing
//!
//! Every accepted mutation becomes exactly one record on the rights topic,
//! keyed by [`CompactionKey`](permgate_core::CompactionKey). The topic has a
//! single partition, so records for the same key are read back in the
//! order they were acknowledged.

use crate::broker::{BrokerError, LogRecord, LogWriter, RecordPosition};
use crate::topic::ProvisionedTopic;
use permgate_core::{ChangeEvent, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default total attempts for one event
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 10;

/// Terminal publish failure
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Event could not be encoded; never retried
    #[error("cannot serialize change event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker refused the record; never retried
    #[error("broker rejected change event: {0}")]
    Rejected(BrokerError),

    /// Transient failures outlasted the retry budget
    #[error("change event not published after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Last failure
        last: BrokerError,
    },
}

/// Appends change events to the provisioned rights topic
pub struct EventPublisher {
    topic: ProvisionedTopic,
    writer: Arc<dyn LogWriter>,
    retry: RetryPolicy,
}

impl EventPublisher {
    /// Publisher for `topic`, with [`DEFAULT_PUBLISH_ATTEMPTS`] attempts
    /// and exponential backoff from 50ms up to 2s
    pub fn new(topic: ProvisionedTopic, writer: Arc<dyn LogWriter>) -> Self {
        Self {
            topic,
            writer,
            retry: RetryPolicy::exponential()
                .with_max_attempts(DEFAULT_PUBLISH_ATTEMPTS)
                .with_initial_delay(Duration::from_millis(50))
                .with_max_delay(Duration::from_secs(2)),
        }
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep the backoff, change the total attempts per event
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry = self.retry.with_max_attempts(attempts);
        self
    }

    /// Topic written to
    pub fn topic(&self) -> &ProvisionedTopic {
        &self.topic
    }

    /// Serialize `event` and append it, retrying transient broker errors
    pub async fn publish(&self, event: &ChangeEvent) -> Result<RecordPosition, PublishError> {
        let record = LogRecord {
            topic: self.topic.name().to_string(),
            key: event.compaction_key().as_bytes().to_vec(),
            payload: event.to_json()?,
        };

        let outcome = self
            .retry
            .execute_when(BrokerError::is_retryable, |attempt| {
                if attempt > 1 {
                    debug!(attempt, key = %event.compaction_key(), "retrying publish");
                }
                self.writer.append(&record)
            })
            .await;

        let attempts = outcome.attempts;
        match outcome.into_result() {
            Ok(position) => {
                debug!(
                    command = %event.command(),
                    resource = %event.resource(),
                    principal = %event.principal(),
                    partition = position.partition,
                    offset = position.offset,
                    attempts,
                    "published change event"
                );
                Ok(position)
            }
            Err(err) if !err.is_retryable() => {
                warn!(error = %err, "broker rejected change event");
                Err(PublishError::Rejected(err))
            }
            Err(last) => {
                warn!(error = %last, attempts, "publish retries exhausted");
                Err(PublishError::Exhausted { attempts, last })
            }
        }
    }

    /// Drain in-flight writes
    pub async fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        self.writer.flush(timeout).await
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("topic", &self.topic.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
