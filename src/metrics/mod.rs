use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::utils::CircuitState;

// ============================================================================
// Metrics - Prometheus registry for the order core
// ============================================================================
//
// Covers:
// - placement throughput, latency and failure reasons
// - lifecycle transitions and version conflicts
// - reserved / restocked units
// - outbox relay, dead letter queue and broker circuit breaker
//
// Scraped via GET /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Placement
    pub orders_placed: IntCounter,
    pub placement_failures: IntCounterVec,
    pub placement_duration: HistogramVec,

    // Lifecycle
    pub status_transitions: IntCounterVec,
    pub status_conflicts: IntCounter,

    // Inventory
    pub units_reserved: IntCounter,
    pub units_restocked: IntCounter,

    // Outbox
    pub outbox_published: IntCounterVec,
    pub outbox_publish_failures: IntCounterVec,
    pub outbox_pending: IntGauge,

    // DLQ
    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_event_type: IntCounterVec,

    // Circuit Breaker
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,

    // Actors
    pub actor_health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_placed = IntCounter::new("orders_placed_total", "Orders successfully placed")?;
        registry.register(Box::new(orders_placed.clone()))?;

        let placement_failures = IntCounterVec::new(
            Opts::new("order_placement_failures_total", "Rejected or failed placements"),
            &["reason"],
        )?;
        registry.register(Box::new(placement_failures.clone()))?;

        let placement_duration = HistogramVec::new(
            HistogramOpts::new("order_placement_duration_seconds", "Placement transaction duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(placement_duration.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Applied order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let status_conflicts = IntCounter::new(
            "order_status_conflicts_total",
            "Status updates that lost an optimistic version check",
        )?;
        registry.register(Box::new(status_conflicts.clone()))?;

        let units_reserved = IntCounter::new("inventory_units_reserved_total", "Units reserved by placements")?;
        registry.register(Box::new(units_reserved.clone()))?;

        let units_restocked = IntCounter::new(
            "inventory_units_restocked_total",
            "Units returned to stock by cancellations",
        )?;
        registry.register(Box::new(units_restocked.clone()))?;

        let outbox_published = IntCounterVec::new(
            Opts::new("outbox_published_total", "Outbox events published to the broker"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_published.clone()))?;

        let outbox_publish_failures = IntCounterVec::new(
            Opts::new("outbox_publish_failures_total", "Outbox publish attempts that failed"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_publish_failures.clone()))?;

        let outbox_pending = IntGauge::new("outbox_pending", "Unpublished rows seen by the last relay poll")?;
        registry.register(Box::new(outbox_pending.clone()))?;

        let dlq_messages_total = IntCounter::new("dlq_messages_total", "Total messages in dead letter queue")?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_event_type = IntCounterVec::new(
            Opts::new("dlq_messages_by_event_type", "DLQ messages by event type"),
            &["event_type"],
        )?;
        registry.register(Box::new(dlq_messages_by_event_type.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Broker circuit breaker state (0=Closed, 1=HalfOpen, 2=Open)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        let actor_health_status = IntGauge::new(
            "actor_health_status",
            "System health (0=Unhealthy, 1=Degraded, 2=Healthy)",
        )?;
        registry.register(Box::new(actor_health_status.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            placement_failures,
            placement_duration,
            status_transitions,
            status_conflicts,
            units_reserved,
            units_restocked,
            outbox_published,
            outbox_publish_failures,
            outbox_pending,
            dlq_messages_total,
            dlq_messages_by_event_type,
            circuit_breaker_state,
            circuit_breaker_transitions,
            actor_health_status,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format for the /metrics endpoint.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_placement(&self, units: u64, duration_secs: f64) {
        self.orders_placed.inc();
        self.units_reserved.inc_by(units);
        self.placement_duration.with_label_values(&["placed"]).observe(duration_secs);
    }

    pub fn record_placement_failure(&self, reason: &str, duration_secs: f64) {
        self.placement_failures.with_label_values(&[reason]).inc();
        self.placement_duration.with_label_values(&["rejected"]).observe(duration_secs);
    }

    pub fn record_transition(&self, from: &str, to: &str, restocked_units: u64) {
        self.status_transitions.with_label_values(&[from, to]).inc();
        self.units_restocked.inc_by(restocked_units);
    }

    pub fn record_publish(&self, event_type: &str, success: bool) {
        if success {
            self.outbox_published.with_label_values(&[event_type]).inc();
        } else {
            self.outbox_publish_failures.with_label_values(&[event_type]).inc();
        }
    }

    pub fn record_dlq_message(&self, event_type: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_event_type.with_label_values(&[event_type]).inc();
    }

    pub fn record_circuit_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.gauge_value());
        self.circuit_breaker_transitions.with_label_values(&[state.as_str()]).inc();
    }
}
