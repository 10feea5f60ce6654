//! Inventory Ingestion & Change-Detection Pipeline — entry point.
//!
//! Wires configuration, the database pool, the Redis queue transport, and
//! every worker task (consumer loop, inventory worker, diff worker,
//! notification worker, delayed scheduler, cleanup worker) together, then
//! serves the operator health/stats surface (spec §6) until a shutdown
//! signal arrives.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invpipe_core::breaker::CircuitBreaker;
use invpipe_core::config::AppConfig;
use invpipe_core::shutdown::{ShutdownController, ShutdownHandle};
use invpipe_database::repository::{
    AlertRepository, ApplicationRepository, DiffRepository, InventoryRepository, SystemRepository,
};
use invpipe_database::{create_initial_migrations, DatabasePool, Migrator, PoolConfig};
use invpipe_health::{HealthChecker, HealthConfig as OperatorHealthConfig, HealthRouter, HealthState};
use invpipe_queue::QueueManager;
use invpipe_workers::{
    CleanupConfig, CleanupWorker, ConsumerLoop, DelayedScheduler, DiffWorker, InventoryWorker,
    LogSink, NotificationWorker,
};

/// Inventory ingestion and change-detection pipeline.
#[derive(Parser, Debug)]
#[command(name = "invpipe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Operator HTTP surface host (overrides config and environment).
    #[arg(long)]
    host: Option<String>,

    /// Operator HTTP surface port.
    #[arg(short, long)]
    port: Option<u16>,
}

mod env_vars {
    pub const CONFIG_PATH: &str = "INVPIPE_CONFIG";
    pub const OPERATOR_HOST: &str = "INVPIPE_HOST";
    pub const OPERATOR_PORT: &str = "INVPIPE_PORT";
}

/// Delayed-message promotion tick (spec §4.6: "a 10-30s tick").
const DELAYED_SCHEDULER_TICK: Duration = Duration::from_secs(15);

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_config_path() -> Option<PathBuf> {
    env::var(env_vars::CONFIG_PATH).ok().map(PathBuf::from)
}

/// CLI flags win, then environment, then the default `0.0.0.0:8080`.
fn resolve_bind_address(cli_host: Option<String>, cli_port: Option<u16>) -> (String, u16) {
    let host = cli_host
        .or_else(|| env::var(env_vars::OPERATOR_HOST).ok())
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let port = cli_port
        .or_else(|| env::var(env_vars::OPERATOR_PORT).ok().and_then(|v| v.parse().ok()))
        .unwrap_or(8080);
    (host, port)
}

fn print_banner() {
    println!(
        r#"
  _             ____  _
 (_)_ ____   __|  _ \(_)_ __   ___
 | | '_ \ \ / /| |_) | | '_ \ / _ \
 | | | | \ V / |  __/| | |_) |  __/
 |_|_| |_|\_/  |_|   |_| .__/ \___|
                        |_|
    "#
    );
    println!("  Inventory Ingestion & Change-Detection Pipeline");
    println!("  Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

async fn init_database(config: &AppConfig) -> Result<DatabasePool, Box<dyn std::error::Error>> {
    info!("Connecting to database...");

    let mut pool_config = PoolConfig::new(config.database.url.clone());
    pool_config.max_connections = config.database.pool_max;
    pool_config.min_connections = config.database.pool_min;
    pool_config.connect_timeout = config.database.connect_timeout();
    pool_config.idle_timeout = config.database.idle_timeout();

    let pool = DatabasePool::new(pool_config).await?;
    pool.health_check().await?;
    info!("Database connection established");

    if config.database.run_migrations {
        info!("Running database migrations...");
        let migrator = Migrator::new().with_migrations(create_initial_migrations());
        let applied = migrator.run(pool.inner()).await?;
        if applied.is_empty() {
            info!("No pending migrations");
        } else {
            info!(?applied, "Applied migrations");
        }
    }

    Ok(pool)
}

async fn init_queue(config: &AppConfig) -> Result<Arc<QueueManager>, Box<dyn std::error::Error>> {
    info!("Connecting to Redis...");

    let redis_config = deadpool_redis::Config::from_url(config.redis.url.clone());
    let pool = redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;

    let retry = invpipe_queue::RetryPolicy {
        max_attempts: config.retry.max_attempts,
        backoff_base: Duration::from_secs(config.retry.backoff_base_secs),
        backoff_cap: Duration::from_secs(config.retry.backoff_cap_secs),
    };

    let queue = Arc::new(QueueManager::new(pool, config.queues.key_prefix.clone(), retry));
    queue.health_check().await?;
    info!("Redis connection established");

    Ok(queue)
}

/// Spawns every worker as its own task, wired to the shared shutdown handle.
///
/// Returns the handle list so `main` can await them all on the way down,
/// each worker's stats accessor for the health/stats surface, and the
/// consumer's circuit breaker so the operator surface can expose its state.
#[allow(clippy::too_many_arguments)]
fn spawn_workers(
    config: &AppConfig,
    db: &DatabasePool,
    queue: Arc<QueueManager>,
    shutdown: ShutdownHandle,
) -> (
    Vec<tokio::task::JoinHandle<()>>,
    Vec<invpipe_workers::WorkerStatsHandle>,
    Arc<CircuitBreaker>,
) {
    let mut handles = Vec::new();
    let mut stats = Vec::new();

    let (batch_tx, batch_rx) = tokio::sync::mpsc::channel(config.batch.channel_capacity());
    let breaker = CircuitBreaker::shared(config.breaker.max_failures, config.breaker.reset_timeout());

    let consumer = ConsumerLoop::new(
        queue.clone(),
        config.queues.inventory.clone(),
        batch_tx,
        breaker.clone(),
        config.breaker.drop_threshold,
        config.batch.queue_poll_timeout(),
        config.batch.channel_send_timeout(),
    );
    stats.push(consumer.stats());
    let consumer_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        consumer.run(consumer_shutdown).await;
    }));

    let mut inventory_worker = InventoryWorker::new(
        batch_rx,
        db.inner().clone(),
        SystemRepository::new(db.inner().clone()),
        InventoryRepository::new(db.inner().clone()),
        ApplicationRepository::new(db.inner().clone()),
        queue.clone(),
        config.queues.inventory.clone(),
        queue.clone(),
        config.queues.processing.clone(),
        config.batch.batch_size,
        config.batch.flush_interval(),
    );
    stats.push(inventory_worker.stats());
    let inventory_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        inventory_worker.run(inventory_shutdown).await;
    }));

    let diff_worker = DiffWorker::new(
        queue.clone(),
        config.queues.processing.clone(),
        config.queues.notification.clone(),
        InventoryRepository::new(db.inner().clone()),
        DiffRepository::new(db.inner().clone()),
        AlertRepository::new(db.inner().clone()),
        config.batch.queue_poll_timeout(),
    );
    stats.push(diff_worker.stats());
    let diff_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        diff_worker.run(diff_shutdown).await;
    }));

    let notification_worker = NotificationWorker::new(
        queue.clone(),
        config.queues.notification.clone(),
        DiffRepository::new(db.inner().clone()),
        Arc::new(LogSink),
        config.batch.queue_poll_timeout(),
    );
    stats.push(notification_worker.stats());
    let notification_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        notification_worker.run(notification_shutdown).await;
    }));

    let scheduler = DelayedScheduler::new(
        queue.clone(),
        vec![
            config.queues.inventory.clone(),
            config.queues.processing.clone(),
            config.queues.notification.clone(),
        ],
        AlertRepository::new(db.inner().clone()),
        DELAYED_SCHEDULER_TICK,
    );
    let scheduler_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    }));

    let cleanup_worker = CleanupWorker::new(
        InventoryRepository::new(db.inner().clone()),
        DiffRepository::new(db.inner().clone()),
        AlertRepository::new(db.inner().clone()),
        CleanupConfig {
            record_retention_per_system: config.cleanup.retention_floor as i64,
            max_age: chrono::Duration::hours(config.cleanup.max_age_hours as i64),
            run_interval: config.cleanup.interval(),
        },
    );
    let cleanup_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        cleanup_worker.run(cleanup_shutdown).await;
    }));

    (handles, stats, breaker)
}

async fn run_operator_surface(
    config: &AppConfig,
    host: String,
    port: u16,
    db: &DatabasePool,
    queue: Arc<QueueManager>,
    worker_stats: Vec<invpipe_workers::WorkerStatsHandle>,
    breaker: Arc<CircuitBreaker>,
    shutdown: ShutdownController,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = HealthChecker::builder()
        .with_database(db.inner().clone())
        .with_queue(queue)
        .with_breaker(breaker)
        .with_timeout(config.health.check_timeout());
    for handle in worker_stats {
        builder = builder.with_worker(handle);
    }
    let checker = builder.build();

    let state = Arc::new(HealthState::new(checker, OperatorHealthConfig::default()));
    let router = HealthRouter::new(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("operator health/stats surface listening on http://{addr}");

    let mut shutdown_rx = shutdown.subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(get_config_path().as_deref())?;
    config.modules.load()?;

    init_tracing(&config.logging.level);
    print_banner();

    info!("loading pipeline configuration");

    let (host, port) = resolve_bind_address(cli.host, cli.port);

    let db = match init_database(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!("failed to connect to database: {e}");
            error!("make sure PostgreSQL is running and DATABASE_URL is set correctly");
            return Err(e);
        }
    };
    let queue = init_queue(&config).await?;

    let shutdown_controller = ShutdownController::new(Duration::from_secs(30));
    let shutdown_handle = ShutdownHandle::new(shutdown_controller.clone());

    let (worker_handles, worker_stats, breaker) =
        spawn_workers(&config, &db, queue.clone(), shutdown_handle.clone());

    tokio::spawn({
        let controller = shutdown_controller.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            controller.shutdown();
        }
    });

    info!("=================================================");
    info!("pipeline running, queues: {}, {}, {}", config.queues.inventory, config.queues.processing, config.queues.notification);
    info!("=================================================");

    run_operator_surface(
        &config,
        host,
        port,
        &db,
        queue,
        worker_stats,
        breaker,
        shutdown_controller.clone(),
    )
    .await?;

    shutdown_controller.shutdown();
    for handle in worker_handles {
        let _ = handle.await;
    }

    info!("pipeline shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bind_address_cli_overrides_take_priority() {
        let (host, port) = resolve_bind_address(Some("10.0.0.5".to_string()), Some(9999));
        assert_eq!(host, "10.0.0.5");
        assert_eq!(port, 9999);
    }

    #[test]
    fn test_resolve_bind_address_defaults_without_cli_or_env() {
        env::remove_var(env_vars::OPERATOR_HOST);
        env::remove_var(env_vars::OPERATOR_PORT);
        let (host, port) = resolve_bind_address(None, None);
        assert_eq!(host, "0.0.0.0");
        assert_eq!(port, 8080);
    }
}
