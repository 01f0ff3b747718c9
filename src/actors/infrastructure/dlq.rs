use actix::prelude::*;
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::outbox::DeadLetter;
use crate::store::MarketStore;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Receives outbox rows that ran out of deliveries, persists them and takes
// them out of the relay's pending set. Parked rows are queryable for manual
// replay.
//
// ============================================================================

pub struct DlqActor {
    store: Arc<dyn MarketStore>,
    metrics: Arc<Metrics>,
}

impl DlqActor {
    pub fn new(store: Arc<dyn MarketStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }
}

impl Actor for DlqActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("DlqActor started - Dead Letter Queue ready");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), String>")]
pub struct AddToDlq {
    pub dead_letter: DeadLetter,
}

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "Result<Vec<DeadLetter>, String>")]
pub struct GetDlqMessages {
    pub limit: usize,
}

// ============================================================================
// Handlers
// ============================================================================

impl Handler<AddToDlq> for DlqActor {
    type Result = ResponseFuture<Result<(), String>>;

    fn handle(&mut self, msg: AddToDlq, _: &mut Self::Context) -> Self::Result {
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let dead_letter = msg.dead_letter;

        tracing::error!(
            message_id = %dead_letter.message_id,
            event_type = %dead_letter.event_type,
            aggregate_id = %dead_letter.aggregate_id,
            error = %dead_letter.error_message,
            attempts = dead_letter.attempts,
            "💀 Adding message to Dead Letter Queue"
        );

        Box::pin(async move {
            store
                .record_dead_letter(&dead_letter)
                .await
                .map_err(|e| format!("Failed to insert into DLQ: {}", e))?;
            metrics.record_dlq_message(&dead_letter.event_type);

            tracing::info!(message_id = %dead_letter.message_id, "Message stored in DLQ");
            Ok(())
        })
    }
}

impl Handler<GetDlqMessages> for DlqActor {
    type Result = ResponseFuture<Result<Vec<DeadLetter>, String>>;

    fn handle(&mut self, msg: GetDlqMessages, _: &mut Self::Context) -> Self::Result {
        let store = self.store.clone();
        Box::pin(async move {
            store
                .list_dead_letters(msg.limit)
                .await
                .map_err(|e| format!("Failed to query DLQ: {}", e))
        })
    }
}
