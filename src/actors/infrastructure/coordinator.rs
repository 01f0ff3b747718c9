use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use super::{DlqActor, GetDlqMessages, GetSystemHealth, HealthMonitorActor, OutboxRelayActor, SystemHealth, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::outbox::{DeadLetter, OutboxRelay, RelaySettings};
use crate::store::MarketStore;

// ============================================================================
// Coordinator Actor - Orchestrates all background actors
// ============================================================================
//
// Actor Hierarchy:
//   CoordinatorActor
//   ├── HealthMonitorActor
//   ├── DlqActor
//   └── OutboxRelayActor
//
// ============================================================================

pub struct CoordinatorActor {
    store: Arc<dyn MarketStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    relay_settings: RelaySettings,
    poll_interval: Duration,
    health_monitor: Option<Addr<HealthMonitorActor>>,
    dlq_actor: Option<Addr<DlqActor>>,
    relay_actor: Option<Addr<OutboxRelayActor>>,
}

impl CoordinatorActor {
    pub fn new(
        store: Arc<dyn MarketStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        relay_settings: RelaySettings,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
            relay_settings,
            poll_interval,
            health_monitor: None,
            dlq_actor: None,
            relay_actor: None,
        }
    }

    fn start_child_actors(&mut self) {
        tracing::info!("Starting background actors");

        let health_monitor =
            HealthMonitorActor::new(self.store.clone(), self.publisher.clone(), self.metrics.clone()).start();

        let dlq_actor = DlqActor::new(self.store.clone(), self.metrics.clone()).start();
        health_monitor.do_send(UpdateHealth {
            component: "dlq_actor".to_string(),
            status: HealthStatus::Healthy,
            details: Some("DLQ actor started".to_string()),
        });

        let relay = OutboxRelay::new(
            self.store.clone(),
            self.publisher.clone(),
            self.metrics.clone(),
            self.relay_settings.clone(),
        )
        .with_dlq(dlq_actor.clone().recipient());

        let relay_actor =
            OutboxRelayActor::new(Arc::new(relay), self.poll_interval, Some(health_monitor.clone())).start();
        health_monitor.do_send(UpdateHealth {
            component: "outbox_relay".to_string(),
            status: HealthStatus::Healthy,
            details: Some("Outbox relay started".to_string()),
        });

        self.health_monitor = Some(health_monitor);
        self.dlq_actor = Some(dlq_actor);
        self.relay_actor = Some(relay_actor);

        tracing::info!("✅ All background actors started");
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("🎯 CoordinatorActor started");
        self.start_child_actors();

        ctx.run_interval(Duration::from_secs(30), |act, _ctx| {
            if let Some(health_monitor) = act.health_monitor.clone() {
                actix::spawn(async move {
                    match health_monitor.send(GetSystemHealth).await {
                        Ok(health) => match health.overall_status {
                            HealthStatus::Healthy => tracing::debug!("System health check: Healthy"),
                            HealthStatus::Degraded(ref msg) => {
                                tracing::warn!("System health check: Degraded - {}", msg)
                            }
                            HealthStatus::Unhealthy(ref msg) => {
                                tracing::error!("System health check: Unhealthy - {}", msg)
                            }
                        },
                        Err(e) => tracing::error!("Failed to get system health: {}", e),
                    }
                });
            }
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("🛑 CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) {
        tracing::info!("Received shutdown signal");

        // Relay first so no batch hands rows to a stopped DLQ
        if let Some(relay_actor) = self.relay_actor.take() {
            relay_actor.do_send(StopActor);
        }
        if let Some(dlq_actor) = self.dlq_actor.take() {
            dlq_actor.do_send(StopActor);
        }
        if let Some(health_monitor) = self.health_monitor.take() {
            health_monitor.do_send(StopActor);
        }

        ctx.stop();
    }
}

impl Handler<GetSystemHealth> for CoordinatorActor {
    type Result = ResponseFuture<SystemHealth>;

    fn handle(&mut self, msg: GetSystemHealth, _ctx: &mut Self::Context) -> Self::Result {
        let health_monitor = self.health_monitor.clone();
        Box::pin(async move {
            let unavailable = |reason: &str| SystemHealth {
                overall_status: HealthStatus::Unhealthy(reason.to_string()),
                components: Default::default(),
                check_time: chrono::Utc::now(),
            };
            match health_monitor {
                Some(addr) => addr
                    .send(msg)
                    .await
                    .unwrap_or_else(|e| unavailable(&format!("health monitor unreachable: {}", e))),
                None => unavailable("health monitor not running"),
            }
        })
    }
}

impl Handler<GetDlqMessages> for CoordinatorActor {
    type Result = ResponseFuture<Result<Vec<DeadLetter>, String>>;

    fn handle(&mut self, msg: GetDlqMessages, _ctx: &mut Self::Context) -> Self::Result {
        let dlq_actor = self.dlq_actor.clone();
        Box::pin(async move {
            match dlq_actor {
                Some(addr) => addr
                    .send(msg)
                    .await
                    .map_err(|e| format!("DLQ actor unreachable: {}", e))?,
                None => Err("DLQ actor not running".to_string()),
            }
        })
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct StopActor;

impl Handler<StopActor> for OutboxRelayActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("OutboxRelayActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for DlqActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("DlqActor received stop signal");
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::LogPublisher;
    use crate::store::MemoryStore;

    #[actix::test]
    async fn test_coordinator_reports_children_healthy() {
        let coordinator = CoordinatorActor::new(
            Arc::new(MemoryStore::new()),
            Arc::new(LogPublisher),
            Arc::new(Metrics::new().unwrap()),
            RelaySettings::default(),
            Duration::from_millis(20),
        )
        .start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let health = coordinator.send(GetSystemHealth).await.unwrap();

        assert!(health.overall_status.is_healthy(), "{:?}", health.overall_status);
        assert!(health.components.contains_key("dlq_actor"));
        assert!(health.components.contains_key("store"));

        let parked = coordinator.send(GetDlqMessages { limit: 10 }).await.unwrap().unwrap();
        assert!(parked.is_empty());

        coordinator.send(Shutdown).await.unwrap();
    }

    #[actix::test]
    async fn test_coordinator_forwards_dead_letter_queries() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = CoordinatorActor::new(
            store.clone(),
            Arc::new(LogPublisher),
            Arc::new(Metrics::new().unwrap()),
            RelaySettings::default(),
            Duration::from_millis(20),
        )
        .start();

        let message = crate::outbox::OutboxMessage {
            id: uuid::Uuid::now_v7(),
            aggregate_id: uuid::Uuid::new_v4(),
            event_id: uuid::Uuid::new_v4(),
            event_type: "OrderPlaced".to_string(),
            topic: "order-events".to_string(),
            partition_key: "k".to_string(),
            payload: "{}".to_string(),
            correlation_id: uuid::Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            attempts: 5,
            last_error: None,
        };
        store
            .record_dead_letter(&DeadLetter::from_message(&message, "broker rejected", 5))
            .await
            .unwrap();

        let parked = coordinator.send(GetDlqMessages { limit: 10 }).await.unwrap().unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].message_id, message.id);

        coordinator.send(Shutdown).await.unwrap();
    }
}
