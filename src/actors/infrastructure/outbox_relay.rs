use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use super::health_monitor::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::outbox::{OutboxRelay, RelayReport};

// ============================================================================
// Outbox Relay Actor - drives OutboxRelay on a fixed interval
// ============================================================================
//
// At most one batch is in flight; a tick that lands while the previous batch
// is still publishing is skipped.
//
// ============================================================================

pub struct OutboxRelayActor {
    relay: Arc<OutboxRelay>,
    poll_interval: Duration,
    in_flight: bool,
    health_monitor: Option<Addr<HealthMonitorActor>>,
}

impl OutboxRelayActor {
    pub fn new(
        relay: Arc<OutboxRelay>,
        poll_interval: Duration,
        health_monitor: Option<Addr<HealthMonitorActor>>,
    ) -> Self {
        Self {
            relay,
            poll_interval,
            in_flight: false,
            health_monitor,
        }
    }

    fn poll(&mut self, ctx: &mut Context<Self>) {
        if self.in_flight {
            tracing::debug!("Previous outbox batch still running, skipping tick");
            return;
        }
        self.in_flight = true;

        let relay = self.relay.clone();
        let batch = async move { relay.run_once().await };

        ctx.spawn(batch.into_actor(self).map(|result, act, _ctx| {
            act.in_flight = false;
            act.report(result);
        }));
    }

    fn report(&self, result: anyhow::Result<RelayReport>) {
        let status = match &result {
            Ok(report) if report.failed > 0 || report.dead_lettered > 0 => HealthStatus::Degraded(format!(
                "{} failed, {} dead-lettered in last batch",
                report.failed, report.dead_lettered
            )),
            Ok(report) if report.deferred > 0 && report.published == 0 => {
                HealthStatus::Degraded(format!("{} events deferred", report.deferred))
            }
            Ok(_) => HealthStatus::Healthy,
            Err(e) => {
                tracing::error!(error = %e, "Outbox relay batch failed");
                HealthStatus::Unhealthy(e.to_string())
            }
        };

        if let Some(health_monitor) = &self.health_monitor {
            health_monitor.do_send(UpdateHealth {
                component: "outbox_relay".to_string(),
                status,
                details: None,
            });
        }
    }
}

impl Actor for OutboxRelayActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            publisher = self.relay.publisher().name(),
            "🚀 OutboxRelayActor started"
        );
        ctx.run_interval(self.poll_interval, |act, ctx| act.poll(ctx));
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("OutboxRelayActor stopped");
    }
}
