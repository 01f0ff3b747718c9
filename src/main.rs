use actix::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use farm_market::actors::{CoordinatorActor, Shutdown};
use farm_market::config::{AppConfig, StorageBackend};
use farm_market::domain::inventory::Product;
use farm_market::domain::order::{HandlerSettings, OrderCommandHandler};
use farm_market::http::{start_http_server, AppState};
use farm_market::messaging::{EventPublisher, LogPublisher, RedpandaClient};
use farm_market::metrics::Metrics;
use farm_market::outbox::RelaySettings;
use farm_market::store::{MarketStore, MemoryStore, PgStore};
use farm_market::utils::RetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,farm_market=debug")),
        )
        .init();

    tracing::info!("🚀 Starting farm marketplace order service");
    let config = AppConfig::from_env()?;

    // === 1. Storage ===
    let store: Arc<dyn MarketStore> = match config.storage {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
            tracing::info!("Connecting to PostgreSQL...");
            let pg = PgStore::connect(url, config.database_max_connections).await?;
            pg.apply_schema().await?;
            Arc::new(pg)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store, all state is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    if config.seed_demo_catalog {
        seed_demo_catalog(store.as_ref()).await?;
    }

    // === 2. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Event publisher ===
    let publisher: Arc<dyn EventPublisher> = match &config.kafka_brokers {
        Some(brokers) => Arc::new(RedpandaClient::new(brokers, Some(metrics.clone()))?),
        None => {
            tracing::warn!("KAFKA_BROKERS not set, lifecycle events will only be logged");
            Arc::new(LogPublisher)
        }
    };

    // === 4. Background actors ===
    let relay_settings = RelaySettings {
        batch_size: config.outbox_batch_size,
        ..RelaySettings::default()
    };
    let coordinator = CoordinatorActor::new(
        store.clone(),
        publisher,
        metrics.clone(),
        relay_settings,
        config.outbox_poll_interval,
    )
    .start();

    // === 5. HTTP boundary ===
    let orders = Arc::new(OrderCommandHandler::new(
        store,
        metrics.clone(),
        HandlerSettings {
            placement_timeout: config.placement_timeout,
            events_topic: config.order_events_topic.clone(),
            status_retry: RetryConfig::status_conflicts(),
        },
    ));
    let state = AppState {
        orders,
        metrics,
        health: coordinator.clone().recipient(),
        dead_letters: coordinator.clone().recipient(),
    };

    let served = start_http_server(&config.server_host, config.server_port, state).await;

    tracing::info!("🛑 HTTP server stopped, shutting down actors");
    coordinator.send(Shutdown).await?;
    served?;

    Ok(())
}

async fn seed_demo_catalog(store: &dyn MarketStore) -> anyhow::Result<()> {
    let farmer_id = Uuid::new_v4();
    let catalog = [
        ("Free-range eggs (dozen)", Decimal::new(650, 2), 40),
        ("Raw wildflower honey", Decimal::new(1200, 2), 15),
        ("Heirloom tomatoes (kg)", Decimal::new(480, 2), 60),
    ];

    for (name, price, quantity) in catalog {
        let product = Product::listed(farmer_id, name, price, quantity);
        store.upsert_product(&product).await?;
        tracing::info!(product_id = %product.id, farmer_id = %farmer_id, product = name, "🌱 Seeded product");
    }
    Ok(())
}
