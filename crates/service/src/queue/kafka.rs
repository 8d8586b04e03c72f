//! Kafka implementations of the queue traits.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::Message;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info, instrument};

use super::{MessageSource, OrderPublisher, QueueError};
use crate::config::KafkaConfig;

/// Publisher backed by an `rdkafka` [`FutureProducer`].
///
/// Requires one broker acknowledgement per message (`acks=1`).
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaPublisher {
    /// Create a producer for the configured topic.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Kafka` if the client configuration is rejected.
    pub fn new(config: &KafkaConfig) -> Result<Self, QueueError> {
        let timeout_ms = config.produce_timeout.as_millis().to_string();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "1")
            .set("message.timeout.ms", &timeout_ms)
            .create()?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            timeout: config.produce_timeout,
        })
    }

    /// Verify that the broker answers and knows the topic.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Kafka` if metadata cannot be fetched in time.
    pub async fn check_connectivity(&self) -> Result<(), QueueError> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let timeout = self.timeout;

        let metadata = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(&topic), Timeout::After(timeout))
        })
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))??;

        info!(
            brokers = metadata.brokers().len(),
            topic = %self.topic,
            "Kafka reachable"
        );
        Ok(())
    }
}

#[async_trait]
impl OrderPublisher for KafkaPublisher {
    #[instrument(skip_all, fields(topic = %self.topic, bytes = payload.len()))]
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(err, _message)| QueueError::Kafka(err))?;

        debug!(partition, offset, "Message acknowledged");
        Ok(())
    }
}

/// Message source backed by an `rdkafka` [`StreamConsumer`].
///
/// Offsets are auto-committed by the client; a fresh group starts from the
/// earliest retained message.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    /// Create a consumer in the configured group and subscribe to the topic.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Kafka` if the client cannot be created or the
    /// subscription fails.
    pub fn new(config: &KafkaConfig) -> Result<Self, QueueError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn recv(&mut self) -> Result<Bytes, QueueError> {
        let message = self.consumer.recv().await?;
        Ok(message
            .payload()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default())
    }
}
