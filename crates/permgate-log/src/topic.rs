//! Topic provisioning
//!
//! The rights topic is the system of record for current assignments, so it
//! is compacted rather than time-retained: the latest event per key is kept
//! forever, superseded values are reclaimed promptly, and tombstones stay
//! for a day so slow consumers still observe deletions.
//!
//! [`TopicProvisioner::ensure_topic`] is idempotent and runs once at
//! startup. Its [`ProvisionedTopic`] is the only way to obtain an
//! [`EventPublisher`](crate::EventPublisher).

use crate::broker::{BrokerAddress, BrokerError, ClusterAdmin, CreateTopicOutcome, TopicConfig};
use permgate_core::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Partitions of the rights topic
pub const PARTITIONS: i32 = 1;

/// Replication factor of the rights topic
pub const REPLICATION_FACTOR: i32 = 1;

/// Tombstone retention: 24 hours
pub const DELETE_RETENTION_MS: u64 = 24 * 60 * 60 * 1000;

/// Segment roll interval: 7 days
pub const SEGMENT_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Dirty ratio at which a segment becomes eligible for compaction
pub const MIN_CLEANABLE_DIRTY_RATIO: &str = "0.1";

/// Desired shape of a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name
    pub name: String,
    /// Partition count
    pub partitions: i32,
    /// Replication factor
    pub replication_factor: i32,
    /// Topic-level configuration entries
    pub config: TopicConfig,
}

impl TopicSpec {
    /// The compacted rights topic called `name`
    pub fn compacted(name: impl Into<String>) -> Self {
        let config = [
            ("cleanup.policy", "compact".to_string()),
            ("retention.ms", "-1".to_string()),
            ("retention.bytes", "-1".to_string()),
            ("delete.retention.ms", DELETE_RETENTION_MS.to_string()),
            ("segment.ms", SEGMENT_MS.to_string()),
            (
                "min.cleanable.dirty.ratio",
                MIN_CLEANABLE_DIRTY_RATIO.to_string(),
            ),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        Self {
            name: name.into(),
            partitions: PARTITIONS,
            replication_factor: REPLICATION_FACTOR,
            config,
        }
    }

    /// Entries of `actual` that differ from this spec, as
    /// `(name, expected, actual)`
    pub fn drift<'a>(
        &'a self,
        actual: &'a TopicConfig,
    ) -> Vec<(&'a str, &'a str, Option<&'a str>)> {
        self.config
            .iter()
            .filter_map(|(name, expected)| {
                let found = actual.get(name).map(String::as_str);
                (found != Some(expected.as_str())).then_some((
                    name.as_str(),
                    expected.as_str(),
                    found,
                ))
            })
            .collect()
    }
}

/// Startup cannot continue without the topic
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    /// Metadata lists no brokers at all
    #[error("cluster metadata lists no brokers")]
    NoBrokers,

    /// Cluster metadata could not be read
    #[error("cannot read cluster metadata after {attempts} attempts: {source}")]
    Discovery {
        /// Attempts made
        attempts: u32,
        /// Last failure
        source: BrokerError,
    },

    /// Topic could not be created
    #[error("cannot create topic {topic} after {attempts} attempts: {source}")]
    Create {
        /// Topic name
        topic: String,
        /// Attempts made
        attempts: u32,
        /// Last failure
        source: BrokerError,
    },
}

/// Proof that the rights topic exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedTopic {
    name: String,
    brokers: Vec<BrokerAddress>,
    controller: Option<BrokerAddress>,
}

impl ProvisionedTopic {
    /// Topic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Brokers discovered while provisioning
    pub fn brokers(&self) -> &[BrokerAddress] {
        &self.brokers
    }

    /// Controller discovered while provisioning, if reported
    pub fn controller(&self) -> Option<&BrokerAddress> {
        self.controller.as_ref()
    }

    /// `host:port` list for a producer's bootstrap configuration
    pub fn bootstrap_servers(&self) -> Vec<String> {
        self.brokers.iter().map(ToString::to_string).collect()
    }
}

/// Ensures the rights topic exists before anything is published
pub struct TopicProvisioner {
    admin: Arc<dyn ClusterAdmin>,
    retry: RetryPolicy,
}

impl TopicProvisioner {
    /// Provisioner with exponential backoff: 5 attempts, 500ms doubling to 10s
    pub fn new(admin: Arc<dyn ClusterAdmin>) -> Self {
        Self {
            admin,
            retry: RetryPolicy::exponential()
                .with_max_attempts(5)
                .with_initial_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(10))
                .with_jitter(),
        }
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Discover the cluster and create `spec`'s topic if absent
    pub async fn ensure_topic(&self, spec: &TopicSpec) -> Result<ProvisionedTopic, ProvisionError> {
        let discovery = self
            .retry
            .execute_when(BrokerError::is_retryable, |attempt| {
                debug!(attempt, "reading cluster metadata");
                self.admin.describe_cluster()
            })
            .await;
        let attempts = discovery.attempts;
        let view = discovery
            .into_result()
            .map_err(|source| ProvisionError::Discovery { attempts, source })?;

        if view.brokers.is_empty() {
            return Err(ProvisionError::NoBrokers);
        }
        let controller = view.controller_address().cloned();
        info!(
            brokers = ?view.bootstrap_servers(),
            controller = ?controller.as_ref().map(ToString::to_string),
            "discovered cluster"
        );

        let existed = if view.has_topic(&spec.name) {
            true
        } else {
            let creation = self
                .retry
                .execute_when(BrokerError::is_retryable, |attempt| {
                    debug!(attempt, topic = %spec.name, "creating topic");
                    self.admin.create_topic(spec)
                })
                .await;
            let attempts = creation.attempts;
            match creation.into_result() {
                Ok(CreateTopicOutcome::Created) => {
                    info!(topic = %spec.name, partitions = spec.partitions, "created compacted topic");
                    false
                }
                Ok(CreateTopicOutcome::AlreadyExists) => {
                    debug!(topic = %spec.name, "topic created concurrently");
                    true
                }
                Err(source) => {
                    return Err(ProvisionError::Create {
                        topic: spec.name.clone(),
                        attempts,
                        source,
                    })
                }
            }
        };

        if existed {
            self.report_drift(spec).await;
            if let Some(leaders) = view.topics.get(&spec.name) {
                debug!(topic = %spec.name, leaders = ?leaders.partition_leaders, "partition leaders");
            }
        }

        Ok(ProvisionedTopic {
            name: spec.name.clone(),
            brokers: view.brokers,
            controller,
        })
    }

    async fn report_drift(&self, spec: &TopicSpec) {
        match self.admin.topic_config(&spec.name).await {
            Ok(actual) => {
                for (entry, expected, found) in spec.drift(&actual) {
                    warn!(
                        topic = %spec.name,
                        entry,
                        expected,
                        actual = found.unwrap_or("<unset>"),
                        "existing topic configuration differs; leaving it unchanged"
                    );
                }
            }
            Err(error) => {
                warn!(topic = %spec.name, %error, "cannot read topic configuration");
            }
        }
    }
}
