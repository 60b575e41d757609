//! nommerd: the worker process.

use std::sync::Arc;

use nommer_queue::InMemoryQueue;
use nommer_storage::{FileStorage, MemStorage, StorageRegistry};
use nommer_store::sqlite::{SqliteJobStore, SqliteNodeStore};
use nommerd::compute::LoggingComputeApi;
use nommerd::config::Config;
use nommerd::nommers;
use nommerd::pipeline::PipelineContext;
use nommerd::worker::Worker;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    tracing::info!(node_id = %config.node_id, max_jobs = config.max_jobs_per_node, "starting nommerd");

    let job_store = Arc::new(SqliteJobStore::open(&config.job_store_path).await?);
    let node_store = Arc::new(SqliteNodeStore::open(&config.node_store_path).await?);
    let new_job_queue = Arc::new(InMemoryQueue::new());
    let state_change_queue = Arc::new(InMemoryQueue::new());

    let mut storage = StorageRegistry::new();
    storage.register("mem", Arc::new(MemStorage::new()));
    storage.register("file", Arc::new(FileStorage::new(".")));

    let pipeline = Arc::new(PipelineContext {
        job_store,
        state_change_queue,
        storage,
        encoders: nommers::default_registry(),
    });

    let worker = Arc::new(Worker::new(
        config.node_id.clone(),
        node_store,
        new_job_queue,
        pipeline,
        Arc::new(LoggingComputeApi),
        config,
    ));
    worker.bootstrap().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let loops = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(());
    let _ = loops.await;
    Ok(())
}
