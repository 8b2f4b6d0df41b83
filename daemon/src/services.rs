//! Wiring of backends into the two services.

use anyhow::Context;
use ballot_aggregator::{AggregationService, AggregatorConfig, AggregatorMetrics};
use ballot_queue::Broker;
use ballot_queue_amqp::AmqpBroker;
use ballot_store::{AuditStore, DedupStore, TallyStore};
use ballot_store_postgres::{PgPoolSettings, PostgresStore};
use ballot_store_redis::RedisDedupStore;
use ballot_utils::{serve_metrics, ShutdownController};
use ballot_validator::{ValidationWorker, ValidatorConfig, ValidatorMetrics};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

async fn connect_postgres(url: &str, min: u32, max: u32) -> anyhow::Result<PostgresStore> {
    let settings = PgPoolSettings {
        min_connections: min,
        max_connections: max,
        ..Default::default()
    };
    let store = PostgresStore::connect(url, &settings)
        .await
        .context("connecting to postgres")?;
    store.migrate().await.context("bootstrapping schema")?;
    Ok(store)
}

async fn connect_broker(
    url: &str,
    prefetch: u16,
    attempts: u32,
    delay_ms: u64,
) -> anyhow::Result<Arc<dyn Broker>> {
    let broker =
        AmqpBroker::connect_with_retry(url, prefetch, attempts, Duration::from_millis(delay_ms))
            .await
            .context("connecting to broker")?;
    Ok(Arc::new(broker))
}

pub async fn run_validator(
    config: ValidatorConfig,
    shutdown: ShutdownController,
) -> anyhow::Result<()> {
    info!(worker_id = %config.worker_id, "starting validation worker");

    let dedup = RedisDedupStore::connect(&config.redis_url)
        .await
        .context("connecting to redis")?;
    let postgres = connect_postgres(
        &config.database_url,
        config.db_min_connections,
        config.db_max_connections,
    )
    .await?;
    let broker = connect_broker(
        &config.amqp_url,
        config.prefetch,
        config.broker_connect_attempts,
        config.broker_connect_delay_ms,
    )
    .await?;

    let dedup: Arc<dyn DedupStore> = Arc::new(dedup);
    let audit: Arc<dyn AuditStore> = Arc::new(postgres.clone());
    dedup.ping().await.context("redis health check")?;
    audit.ping().await.context("postgres health check")?;
    info!("backends healthy");

    let metrics = Arc::new(ValidatorMetrics::new());
    let server = spawn_metrics(metrics.registry.clone(), config.metrics_port, &shutdown);

    let worker = ValidationWorker::new(config, dedup, audit, broker, metrics);
    let result = worker.run(shutdown.subscribe()).await;

    shutdown.shutdown();
    join_metrics(server).await;
    postgres.close().await;
    result.context("validation worker failed")
}

pub async fn run_aggregator(
    config: AggregatorConfig,
    shutdown: ShutdownController,
) -> anyhow::Result<()> {
    info!(consumer_tag = %config.consumer_tag, "starting aggregation service");

    let postgres = connect_postgres(
        &config.database_url,
        config.db_min_connections,
        config.db_max_connections,
    )
    .await?;
    let broker = connect_broker(
        &config.amqp_url,
        config.prefetch,
        config.broker_connect_attempts,
        config.broker_connect_delay_ms,
    )
    .await?;

    let tally: Arc<dyn TallyStore> = Arc::new(postgres.clone());
    tally.ping().await.context("postgres health check")?;
    info!("backends healthy");

    let metrics = Arc::new(AggregatorMetrics::new());
    let server = spawn_metrics(metrics.registry.clone(), config.metrics_port, &shutdown);

    let service = Arc::new(AggregationService::new(config, tally, broker, metrics));
    let result = service.run(shutdown.subscribe()).await;

    shutdown.shutdown();
    join_metrics(server).await;
    postgres.close().await;
    result.context("aggregation service failed")
}

pub async fn rebuild_tallies(config: &AggregatorConfig) -> anyhow::Result<()> {
    let postgres = connect_postgres(
        &config.database_url,
        config.db_min_connections,
        config.db_max_connections,
    )
    .await?;
    let summary = postgres
        .rebuild_tallies()
        .await
        .context("rebuilding tallies")?;
    info!(
        laws = summary.laws,
        candidates = summary.candidates,
        "rebuild complete"
    );
    postgres.close().await;
    Ok(())
}

fn spawn_metrics(registry: Registry, port: u16, shutdown: &ShutdownController) -> JoinHandle<()> {
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(registry, port, rx).await {
            error!(port, error = %e, "metrics endpoint failed");
        }
    })
}

async fn join_metrics(server: JoinHandle<()>) {
    if let Err(e) = server.await {
        error!(error = %e, "metrics task panicked");
    }
}
