//! Broker seams
//!
//! The provisioner and publisher only talk to the cluster through
//! [`ClusterAdmin`] and [`LogWriter`]. The Kafka adapters live in
//! `crate::kafka`; in-memory doubles live in `permgate-testkit`.

use crate::topic::TopicSpec;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A broker as advertised in cluster metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    /// Broker id
    pub id: i32,
    /// Advertised host
    pub host: String,
    /// Advertised port
    pub port: u16,
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Per-topic metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMetadata {
    /// Leader broker id of each partition, indexed by partition
    pub partition_leaders: Vec<i32>,
}

/// What the cluster says about itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterView {
    /// Live brokers
    pub brokers: Vec<BrokerAddress>,
    /// Controller broker id, if the metadata source reports it
    pub controller: Option<i32>,
    /// Existing topics by name
    pub topics: BTreeMap<String, TopicMetadata>,
}

impl ClusterView {
    /// Address of the controller broker
    pub fn controller_address(&self) -> Option<&BrokerAddress> {
        let id = self.controller?;
        self.brokers.iter().find(|broker| broker.id == id)
    }

    /// `host:port` of every broker, for a producer's bootstrap list
    pub fn bootstrap_servers(&self) -> Vec<String> {
        self.brokers.iter().map(ToString::to_string).collect()
    }

    /// Whether `topic` already exists
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }
}

/// Topic-level configuration entries
pub type TopicConfig = BTreeMap<String, String>;

/// Result of a create request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateTopicOutcome {
    /// This request created the topic
    Created,
    /// Someone else created it first
    AlreadyExists,
}

/// A record to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Destination topic
    pub topic: String,
    /// Compaction and partitioning key
    pub key: Vec<u8>,
    /// Serialized payload
    pub payload: Vec<u8>,
}

/// Where an appended record landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordPosition {
    /// Partition written to
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
}

/// Broker operation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// No broker could be contacted
    #[error("broker unreachable: {message}")]
    Unreachable {
        /// Transport failure description
        message: String,
    },

    /// Temporary failure; the same request may succeed later
    #[error("transient broker error: {message}")]
    Transient {
        /// Broker error description
        message: String,
    },

    /// The broker refused the request; retrying will not help
    #[error("broker rejected request: {message}")]
    Rejected {
        /// Broker error description
        message: String,
    },
}

impl BrokerError {
    /// Create an unreachable error
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Create a transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a rejection
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Whether the operation is worth retrying
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Cluster metadata and topic administration
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// Current brokers, controller, and topics
    async fn describe_cluster(&self) -> Result<ClusterView, BrokerError>;

    /// Create `spec`'s topic. An existing topic is reported as
    /// [`CreateTopicOutcome::AlreadyExists`], not as an error.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<CreateTopicOutcome, BrokerError>;

    /// Configuration entries of an existing topic
    async fn topic_config(&self, topic: &str) -> Result<TopicConfig, BrokerError>;
}

/// Durable append to the log
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Append one record, returning once the broker acknowledged it
    async fn append(&self, record: &LogRecord) -> Result<RecordPosition, BrokerError>;

    /// Wait for in-flight records
    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ClusterView {
        ClusterView {
            brokers: vec![
                BrokerAddress {
                    id: 1,
                    host: "kafka-1".into(),
                    port: 9092,
                },
                BrokerAddress {
                    id: 2,
                    host: "kafka-2".into(),
                    port: 9093,
                },
            ],
            controller: Some(2),
            topics: BTreeMap::new(),
        }
    }

    #[test]
    fn test_controller_lookup() {
        let view = view();
        assert_eq!(
            view.controller_address().map(ToString::to_string),
            Some("kafka-2:9093".to_string())
        );

        let unknown = ClusterView {
            controller: Some(7),
            ..view
        };
        assert!(unknown.controller_address().is_none());
    }

    #[test]
    fn test_bootstrap_servers() {
        assert_eq!(view().bootstrap_servers(), vec!["kafka-1:9092", "kafka-2:9093"]);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BrokerError::unreachable("down").is_retryable());
        assert!(BrokerError::transient("leader moved").is_retryable());
        assert!(!BrokerError::rejected("message too large").is_retryable());
    }
}
