use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

use super::{EventPublisher, PublishError};
use crate::metrics::Metrics;
use crate::outbox::OutboxMessage;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaClient {
    pub fn new(brokers: &str, metrics: Option<Arc<Metrics>>) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| PublishError::Config(format!("failed to create producer: {}", e)))?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        };
        let mut circuit_breaker = CircuitBreaker::new("redpanda", cb_config);
        if let Some(metrics) = metrics {
            circuit_breaker = circuit_breaker
                .with_observer(Arc::new(move |state| metrics.record_circuit_state(state)));
        }

        tracing::info!(brokers = %brokers, "Redpanda producer ready");

        Ok(Self {
            producer,
            circuit_breaker,
        })
    }
}

#[async_trait]
impl EventPublisher for RedpandaClient {
    fn name(&self) -> &'static str {
        "redpanda"
    }

    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError> {
        let result = self
            .circuit_breaker
            .call(async {
                let headers = OwnedHeaders::new()
                    .insert(Header {
                        key: "event_type",
                        value: Some(message.event_type.as_str()),
                    })
                    .insert(Header {
                        key: "correlation_id",
                        value: Some(message.correlation_id.to_string().as_str()),
                    });

                let record = FutureRecord::to(&message.topic)
                    .key(&message.partition_key)
                    .payload(&message.payload)
                    .headers(headers);

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| PublishError::Broker(e.to_string()))
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    topic = %message.topic,
                    key = %message.partition_key,
                    event_type = %message.event_type,
                    "Published to Redpanda"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %message.topic, "Circuit breaker open - Redpanda unavailable");
                Err(PublishError::CircuitOpen("redpanda"))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %message.topic, "Failed to publish to Redpanda");
                Err(e)
            }
        }
    }

    async fn circuit_state(&self) -> Option<CircuitState> {
        Some(self.circuit_breaker.get_state().await)
    }
}
