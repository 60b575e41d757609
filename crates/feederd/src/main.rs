//! feederd: the control-plane controller process.

use std::sync::Arc;

use feederd::compute::LoggingComputeApi;
use feederd::config::Config;
use feederd::controller::Controller;
use feederd::{api, cache::JobCache, notifier, AppState};
use nommer_queue::InMemoryQueue;
use nommer_store::sqlite::{SqliteJobStore, SqliteNodeStore};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    tracing::info!(
        host = %config.http_host,
        port = config.http_port,
        "starting feederd"
    );

    let job_store = Arc::new(SqliteJobStore::open(&config.job_store_path).await?);
    let node_store = Arc::new(SqliteNodeStore::open(&config.node_store_path).await?);
    let new_job_queue = Arc::new(InMemoryQueue::new());
    let state_change_queue = Arc::new(InMemoryQueue::new());
    let cache = JobCache::new();

    let controller = Arc::new(Controller {
        job_store: job_store.clone(),
        node_store,
        new_job_queue: new_job_queue.clone(),
        state_change_queue,
        compute: Arc::new(LoggingComputeApi),
        cache: cache.clone(),
        config: config.clone(),
        http_client: notifier::build_client(),
    });
    controller.bootstrap().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let loops = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    let app_state = AppState {
        job_store,
        new_job_queue,
        cache,
    };
    let app = api::router(app_state);

    let addr = format!("{}:{}", config.http_host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "submit API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_tx.send(());
        })
        .await?;

    let _ = loops.await;
    Ok(())
}
