//! Kafka adapters (rdkafka)
//!
//! [`KafkaCluster`] reads metadata and administers topics through the
//! bootstrap address; [`KafkaWriter`] produces to the brokers discovered
//! during provisioning. librdkafka's own logging is forwarded to tracing
//! under the `librdkafka` target.
//!
//! librdkafka's metadata response does not carry the controller id;
//! CreateTopics requests are routed to the controller by the client
//! itself, so [`ClusterView::controller`] is left unset here.

use crate::broker::{
    BrokerAddress, BrokerError, ClusterAdmin, ClusterView, CreateTopicOutcome, LogRecord,
    LogWriter, RecordPosition, TopicConfig, TopicMetadata,
};
use crate::topic::{ProvisionedTopic, TopicSpec};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, ResourceSpecifier, TopicReplication};
use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

/// Routes librdkafka log lines and client errors into tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingContext;

impl ClientContext for TracingContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => {
                tracing::error!(target: "librdkafka", fac, "{log_message}");
            }
            RDKafkaLogLevel::Warning => tracing::warn!(target: "librdkafka", fac, "{log_message}"),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                tracing::info!(target: "librdkafka", fac, "{log_message}");
            }
            RDKafkaLogLevel::Debug => tracing::debug!(target: "librdkafka", fac, "{log_message}"),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        tracing::error!(target: "librdkafka", %error, reason, "client error");
    }
}

fn classify(error: &KafkaError) -> BrokerError {
    let message = error.to_string();
    match error.rdkafka_error_code() {
        Some(code) => classify_code(code, message),
        None => match error {
            KafkaError::ClientCreation(_) | KafkaError::ClientConfig(..) => {
                BrokerError::rejected(message)
            }
            _ => BrokerError::transient(message),
        },
    }
}

fn classify_code(code: RDKafkaErrorCode, message: String) -> BrokerError {
    match code {
        RDKafkaErrorCode::AllBrokersDown
        | RDKafkaErrorCode::BrokerTransportFailure
        | RDKafkaErrorCode::Resolve => BrokerError::unreachable(message),
        RDKafkaErrorCode::MessageSizeTooLarge
        | RDKafkaErrorCode::InvalidMessageSize
        | RDKafkaErrorCode::InvalidMessage
        | RDKafkaErrorCode::MessageBatchTooLarge
        | RDKafkaErrorCode::TopicAuthorizationFailed
        | RDKafkaErrorCode::ClusterAuthorizationFailed
        | RDKafkaErrorCode::InvalidConfig
        | RDKafkaErrorCode::InvalidRequest
        | RDKafkaErrorCode::PolicyViolation => BrokerError::rejected(message),
        _ => BrokerError::transient(message),
    }
}

/// Cluster administration through the bootstrap address
pub struct KafkaCluster {
    admin: Arc<AdminClient<TracingContext>>,
    timeout: Duration,
}

impl KafkaCluster {
    /// Connect to the cluster at `bootstrap` (`host:port[,host:port]`)
    pub fn connect(bootstrap: &str, timeout: Duration) -> Result<Self, BrokerError> {
        let admin = ClientConfig::new()
            .set("bootstrap.servers", bootstrap)
            .create_with_context(TracingContext)
            .map_err(|e| classify(&e))?;
        Ok(Self {
            admin: Arc::new(admin),
            timeout,
        })
    }

    fn options(&self) -> AdminOptions {
        AdminOptions::new().operation_timeout(Some(Timeout::After(self.timeout)))
    }
}

#[async_trait]
impl ClusterAdmin for KafkaCluster {
    async fn describe_cluster(&self) -> Result<ClusterView, BrokerError> {
        let admin = Arc::clone(&self.admin);
        let timeout = self.timeout;
        let metadata = tokio::task::spawn_blocking(move || {
            admin.inner().fetch_metadata(None, Timeout::After(timeout))
        })
        .await
        .map_err(|e| BrokerError::transient(format!("metadata task failed: {e}")))?
        .map_err(|e| classify(&e))?;

        let brokers = metadata
            .brokers()
            .iter()
            .filter_map(|broker| {
                Some(BrokerAddress {
                    id: broker.id(),
                    host: broker.host().to_string(),
                    port: u16::try_from(broker.port()).ok()?,
                })
            })
            .collect();

        let topics = metadata
            .topics()
            .iter()
            .filter(|topic| topic.error().is_none())
            .map(|topic| {
                let partition_leaders = topic.partitions().iter().map(|p| p.leader()).collect();
                (topic.name().to_string(), TopicMetadata { partition_leaders })
            })
            .collect();

        Ok(ClusterView {
            brokers,
            controller: None,
            topics,
        })
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<CreateTopicOutcome, BrokerError> {
        let mut topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );
        for (name, value) in &spec.config {
            topic = topic.set(name, value);
        }

        let results = self
            .admin
            .create_topics([&topic], &self.options())
            .await
            .map_err(|e| classify(&e))?;

        match results.into_iter().next() {
            Some(Ok(_)) => Ok(CreateTopicOutcome::Created),
            Some(Err((_, RDKafkaErrorCode::TopicAlreadyExists))) => {
                Ok(CreateTopicOutcome::AlreadyExists)
            }
            Some(Err((name, code))) => {
                Err(classify_code(code, format!("create topic {name}: {code}")))
            }
            None => Err(BrokerError::transient("empty CreateTopics response")),
        }
    }

    async fn topic_config(&self, topic: &str) -> Result<TopicConfig, BrokerError> {
        let specifier = ResourceSpecifier::Topic(topic);
        let results = self
            .admin
            .describe_configs([&specifier], &self.options())
            .await
            .map_err(|e| classify(&e))?;

        match results.into_iter().next() {
            Some(Ok(resource)) => Ok(resource
                .entries
                .into_iter()
                .filter_map(|entry| Some((entry.name, entry.value?)))
                .collect()),
            Some(Err(code)) => Err(classify_code(code, format!("describe {topic}: {code}"))),
            None => Err(BrokerError::transient("empty DescribeConfigs response")),
        }
    }
}

/// Producer for the provisioned rights topic
#[derive(Clone)]
pub struct KafkaWriter {
    producer: FutureProducer<TracingContext>,
    timeout: Duration,
}

impl KafkaWriter {
    /// Producer bootstrapped from the brokers found while provisioning.
    /// `timeout` bounds a single delivery attempt.
    pub fn connect(topic: &ProvisionedTopic, timeout: Duration) -> Result<Self, BrokerError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", topic.bootstrap_servers().join(","))
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .create_with_context(TracingContext)
            .map_err(|e| classify(&e))?;
        Ok(Self { producer, timeout })
    }
}

#[async_trait]
impl LogWriter for KafkaWriter {
    async fn append(&self, record: &LogRecord) -> Result<RecordPosition, BrokerError> {
        let delivery = self
            .producer
            .send(
                FutureRecord::to(&record.topic)
                    .key(record.key.as_slice())
                    .payload(record.payload.as_slice()),
                Timeout::After(self.timeout),
            )
            .await;

        match delivery {
            Ok((partition, offset)) => Ok(RecordPosition { partition, offset }),
            Err((error, _message)) => Err(classify(&error)),
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| BrokerError::transient(format!("flush task failed: {e}")))?
            .map_err(|e| classify(&e))
    }
}
