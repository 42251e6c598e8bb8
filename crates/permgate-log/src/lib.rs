//! # Permgate Log
//!
//! The publish path for rights change events:
//!
//! - [`TopicProvisioner`] discovers the cluster and makes sure the
//!   compacted rights topic exists, once per process start
//! - [`EventPublisher`] appends events under their compaction key,
//!   retrying transient broker failures
//!
//! Both talk to the cluster through the traits in [`broker`]. With the
//! `kafka` feature, `kafka` provides rdkafka-backed implementations.

#![forbid(unsafe_code)]

pub mod broker;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod publisher;
pub mod topic;

pub use broker::{
    BrokerAddress, BrokerError, ClusterAdmin, ClusterView, CreateTopicOutcome, LogRecord,
    LogWriter, RecordPosition, TopicConfig, TopicMetadata,
};
pub use publisher::{EventPublisher, PublishError, DEFAULT_PUBLISH_ATTEMPTS};
pub use topic::{ProvisionError, ProvisionedTopic, TopicProvisioner, TopicSpec};
