use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::store::MarketStore;
use crate::utils::CircuitState;

// ============================================================================
// Health Monitor Actor - aggregates component health
// ============================================================================
//
// Every `probe_interval` it pings the store and reads the publisher's
// circuit breaker; other actors push their own status with UpdateHealth.
//
// ============================================================================

#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(MessageResponse, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    store: Arc<dyn MarketStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    probe_interval: Duration,
}

impl HealthMonitorActor {
    pub fn new(
        store: Arc<dyn MarketStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            components: BTreeMap::new(),
            store,
            publisher,
            metrics,
            probe_interval: Duration::from_secs(10),
        }
    }

    pub fn with_probe_interval(mut self, probe_interval: Duration) -> Self {
        self.probe_interval = probe_interval;
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => unhealthy_components.push(format!("{}: {}", name, msg)),
                HealthStatus::Degraded(_) => has_degraded = true,
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }

    fn probe(&self, ctx: &mut Context<Self>) {
        let store = self.store.clone();
        let publisher = self.publisher.clone();
        let me = ctx.address();

        actix::spawn(async move {
            let store_status = match store.ping().await {
                Ok(()) => HealthStatus::Healthy,
                Err(e) => HealthStatus::Unhealthy(e.to_string()),
            };
            me.do_send(UpdateHealth {
                component: "store".to_string(),
                status: store_status,
                details: None,
            });

            if let Some(state) = publisher.circuit_state().await {
                let status = match state {
                    CircuitState::Closed => HealthStatus::Healthy,
                    CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
                    CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
                };
                me.do_send(UpdateHealth {
                    component: publisher.name().to_string(),
                    status,
                    details: None,
                });
            }
        });
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor started");
        self.probe(ctx);
        ctx.run_interval(self.probe_interval, |act, ctx| act.probe(ctx));
    }
}

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Self::Context) {
        tracing::debug!(component = %msg.component, status = ?msg.status, "Updated component health");

        let health = ComponentHealth::new(msg.component.clone(), msg.status);
        let health = match msg.details {
            Some(details) => health.with_details(details),
            None => health,
        };
        self.components.insert(msg.component, health);

        self.metrics
            .actor_health_status
            .set(self.compute_overall_status().gauge_value());
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = SystemHealth;

    fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Self::Context) -> SystemHealth {
        SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::LogPublisher;
    use crate::store::MemoryStore;

    fn monitor() -> HealthMonitorActor {
        HealthMonitorActor::new(
            Arc::new(MemoryStore::new()),
            Arc::new(LogPublisher),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_probe_interval(Duration::from_secs(3600))
    }

    #[actix::test]
    async fn test_unhealthy_component_dominates() {
        let addr = monitor().start();

        addr.send(UpdateHealth {
            component: "outbox_relay".to_string(),
            status: HealthStatus::Degraded("backlog".to_string()),
            details: None,
        })
        .await
        .unwrap();
        let health = addr.send(GetSystemHealth).await.unwrap();
        assert!(matches!(health.overall_status, HealthStatus::Degraded(_)));

        addr.send(UpdateHealth {
            component: "dlq_actor".to_string(),
            status: HealthStatus::Unhealthy("stopped".to_string()),
            details: None,
        })
        .await
        .unwrap();
        let health = addr.send(GetSystemHealth).await.unwrap();
        assert!(health.overall_status.is_unhealthy());
        assert!(health.components.contains_key("outbox_relay"));
    }

    #[actix::test]
    async fn test_probe_reports_store() {
        let addr = monitor().start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let health = addr.send(GetSystemHealth).await.unwrap();
        assert!(health.components["store"].status.is_healthy());
    }
}
