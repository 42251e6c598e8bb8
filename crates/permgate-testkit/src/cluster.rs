//! In-memory cluster
//!
//! [`MemoryCluster`] implements both [`ClusterAdmin`] and [`LogWriter`], so
//! one value can back a provisioner and a publisher. Failures are injected
//! per operation as a queue: each call pops the next queued error, and once
//! the queue is empty calls succeed.
//!
//! Uses `std::sync::Mutex`; no lock is held across an await point.

use async_trait::async_trait;
use permgate_core::{ChangeEvent, DecodeError, RetryPolicy};
use permgate_log::{
    BrokerAddress, BrokerError, ClusterAdmin, ClusterView, CreateTopicOutcome, LogRecord,
    LogWriter, ProvisionError, ProvisionedTopic, RecordPosition, TopicConfig, TopicMetadata,
    TopicProvisioner, TopicSpec,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct StoredTopic {
    partitions: i32,
    config: TopicConfig,
    records: Vec<LogRecord>,
}

#[derive(Debug, Default)]
struct ClusterState {
    brokers: Vec<BrokerAddress>,
    controller: Option<i32>,
    topics: BTreeMap<String, StoredTopic>,
    racing_creator: bool,
    describe_failures: VecDeque<BrokerError>,
    create_failures: VecDeque<BrokerError>,
    append_failures: VecDeque<BrokerError>,
    describe_calls: usize,
    create_calls: usize,
    append_calls: usize,
    flush_calls: usize,
}

/// Single-process stand-in for a broker cluster
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    /// One broker (`localhost:9092`, id 1) acting as controller, no topics
    pub fn new() -> Self {
        Self::with_brokers(vec![broker(1, "localhost", 9092)], Some(1))
    }

    /// Cluster advertising `brokers`, with `controller` as controller id
    pub fn with_brokers(brokers: Vec<BrokerAddress>, controller: Option<i32>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                brokers,
                controller,
                ..ClusterState::default()
            })),
        }
    }

    /// Cluster whose metadata lists no brokers
    pub fn without_brokers() -> Self {
        Self::with_brokers(Vec::new(), None)
    }

    /// Pre-create `name` with `config`, as if provisioned earlier
    pub fn with_existing_topic(self, name: &str, config: TopicConfig) -> Self {
        self.state.lock().unwrap().topics.insert(
            name.to_string(),
            StoredTopic {
                partitions: 1,
                config,
                records: Vec::new(),
            },
        );
        self
    }

    /// Make every create request lose a race: the topic appears, created by
    /// "someone else", and the request reports it already exists
    pub fn with_racing_creator(self) -> Self {
        self.state.lock().unwrap().racing_creator = true;
        self
    }

    /// Queue a failure for the next metadata request
    pub fn fail_describe(&self, error: BrokerError) -> &Self {
        self.state.lock().unwrap().describe_failures.push_back(error);
        self
    }

    /// Queue a failure for the next create request
    pub fn fail_create(&self, error: BrokerError) -> &Self {
        self.state.lock().unwrap().create_failures.push_back(error);
        self
    }

    /// Queue a failure for the next append
    pub fn fail_append(&self, error: BrokerError) -> &Self {
        self.state.lock().unwrap().append_failures.push_back(error);
        self
    }

    /// Whether `topic` exists
    pub fn has_topic(&self, topic: &str) -> bool {
        self.state.lock().unwrap().topics.contains_key(topic)
    }

    /// Partition count and configuration `topic` was created with
    pub fn stored_topic(&self, topic: &str) -> Option<(i32, TopicConfig)> {
        let state = self.state.lock().unwrap();
        state
            .topics
            .get(topic)
            .map(|stored| (stored.partitions, stored.config.clone()))
    }

    /// Records appended to `topic`, in offset order
    pub fn records(&self, topic: &str) -> Vec<LogRecord> {
        let state = self.state.lock().unwrap();
        state
            .topics
            .get(topic)
            .map(|stored| stored.records.clone())
            .unwrap_or_default()
    }

    /// Records of `topic` decoded as change events
    pub fn events(&self, topic: &str) -> Result<Vec<ChangeEvent>, DecodeError> {
        self.records(topic)
            .iter()
            .map(|record| ChangeEvent::from_json(&record.payload))
            .collect()
    }

    /// What a compacted read of `topic` would return: the last record per key
    pub fn latest_by_key(&self, topic: &str) -> BTreeMap<Vec<u8>, LogRecord> {
        self.records(topic)
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect()
    }

    /// Metadata requests served, including failed ones
    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }

    /// Create requests served, including failed ones
    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    /// Appends attempted, including failed ones
    pub fn append_calls(&self) -> usize {
        self.state.lock().unwrap().append_calls
    }

    /// Flushes requested
    pub fn flush_calls(&self) -> usize {
        self.state.lock().unwrap().flush_calls
    }
}

#[async_trait]
impl ClusterAdmin for MemoryCluster {
    async fn describe_cluster(&self) -> Result<ClusterView, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        if let Some(error) = state.describe_failures.pop_front() {
            return Err(error);
        }

        let topics = state
            .topics
            .iter()
            .map(|(name, stored)| {
                let leader = state.controller.unwrap_or(1);
                let partitions = usize::try_from(stored.partitions).unwrap_or(1);
                (
                    name.clone(),
                    TopicMetadata {
                        partition_leaders: vec![leader; partitions],
                    },
                )
            })
            .collect();

        Ok(ClusterView {
            brokers: state.brokers.clone(),
            controller: state.controller,
            topics,
        })
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<CreateTopicOutcome, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if let Some(error) = state.create_failures.pop_front() {
            return Err(error);
        }

        let racing = state.racing_creator;
        if state.topics.contains_key(&spec.name) {
            return Ok(CreateTopicOutcome::AlreadyExists);
        }
        state.topics.insert(
            spec.name.clone(),
            StoredTopic {
                partitions: spec.partitions,
                config: spec.config.clone(),
                records: Vec::new(),
            },
        );
        if racing {
            Ok(CreateTopicOutcome::AlreadyExists)
        } else {
            Ok(CreateTopicOutcome::Created)
        }
    }

    async fn topic_config(&self, topic: &str) -> Result<TopicConfig, BrokerError> {
        let state = self.state.lock().unwrap();
        state
            .topics
            .get(topic)
            .map(|stored| stored.config.clone())
            .ok_or_else(|| BrokerError::rejected(format!("unknown topic {topic}")))
    }
}

#[async_trait]
impl LogWriter for MemoryCluster {
    async fn append(&self, record: &LogRecord) -> Result<RecordPosition, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.append_calls += 1;
        if let Some(error) = state.append_failures.pop_front() {
            return Err(error);
        }

        let stored = state
            .topics
            .get_mut(&record.topic)
            .ok_or_else(|| BrokerError::rejected(format!("unknown topic {}", record.topic)))?;
        stored.records.push(record.clone());
        let offset = i64::try_from(stored.records.len() - 1).unwrap_or(i64::MAX);
        Ok(RecordPosition {
            partition: 0,
            offset,
        })
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
        self.state.lock().unwrap().flush_calls += 1;
        Ok(())
    }
}

/// Broker address fixture
pub fn broker(id: i32, host: &str, port: u16) -> BrokerAddress {
    BrokerAddress {
        id,
        host: host.to_string(),
        port,
    }
}

/// Retry policy with `attempts` total attempts and no delay
pub fn instant_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::fixed(Duration::ZERO).with_max_attempts(attempts)
}

/// Provision the compacted topic `name` on `cluster` without delays
pub async fn provision(
    cluster: &MemoryCluster,
    name: &str,
) -> Result<ProvisionedTopic, ProvisionError> {
    TopicProvisioner::new(Arc::new(cluster.clone()))
        .with_retry_policy(instant_retry(3))
        .ensure_topic(&TopicSpec::compacted(name))
        .await
}
