//! Worker loops: job intake (pop new job ids, spawn one pipeline task per
//! slot of spare capacity) and heartbeat (report liveness, optionally
//! self-terminate once idle past a threshold).
//!
//! Idle tracking uses a plain `active_encoder_tasks` counter with no fudge
//! factor: a node is idle exactly when that counter is zero, for exactly as
//! long as it has been zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nommer_queue::{dedup_preserve_order, Queue, MAX_POP_BATCH};
use nommer_store::NodeStore;
use nommer_types::{Node, NodeState};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::compute::ComputeApi;
use crate::config::Config;
use crate::pipeline::{self, PipelineContext};

pub struct Worker {
    node_id: String,
    node_store: Arc<dyn NodeStore>,
    new_job_queue: Arc<dyn Queue>,
    pipeline: Arc<PipelineContext>,
    compute: Arc<dyn ComputeApi>,
    config: Config,
    active_jobs: Arc<AtomicUsize>,
    idle_since: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl Worker {
    pub fn new(
        node_id: String,
        node_store: Arc<dyn NodeStore>,
        new_job_queue: Arc<dyn Queue>,
        pipeline: Arc<PipelineContext>,
        compute: Arc<dyn ComputeApi>,
        config: Config,
    ) -> Self {
        Worker {
            node_id,
            node_store,
            new_job_queue,
            pipeline,
            compute,
            config,
            active_jobs: Arc::new(AtomicUsize::new(0)),
            idle_since: Arc::new(Mutex::new(Some(Utc::now()))),
        }
    }

    /// Register this node as `ACTIVE` before either loop starts.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        self.node_store.put(&Node::new(self.node_id.clone())).await?;
        info!(node_id = %self.node_id, "node registered");
        Ok(())
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<()>) {
        let (terminate_tx, terminate_rx) = watch::channel(false);

        let intake = {
            let this = self.clone();
            let mut shutdown = shutdown.clone();
            let mut terminate = terminate_rx.clone();
            tokio::spawn(async move { this.run_intake_loop(&mut shutdown, &mut terminate).await })
        };
        let heartbeat = {
            let this = self.clone();
            tokio::spawn(async move { this.run_heartbeat_loop(&mut shutdown, terminate_tx).await })
        };

        let _ = tokio::join!(intake, heartbeat);
    }

    async fn run_intake_loop(&self, shutdown: &mut watch::Receiver<()>, terminate: &mut watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.new_job_check_interval_s));
        info!(period_s = self.config.new_job_check_interval_s, "job intake loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.intake_tick().await;
                }
                _ = shutdown.changed() => {
                    info!("job intake loop shutting down");
                    break;
                }
                _ = terminate.changed() => {
                    if *terminate.borrow() {
                        info!("job intake loop stopping after self-termination");
                        break;
                    }
                }
            }
        }
    }

    async fn intake_tick(&self) {
        let in_flight = self.active_jobs.load(Ordering::SeqCst);
        let capacity = self.config.max_jobs_per_node as usize;
        let slots = capacity.saturating_sub(in_flight);
        if slots == 0 {
            return;
        }

        let batch = slots.min(MAX_POP_BATCH);
        let popped = match self.new_job_queue.pop_batch(batch).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "job intake: could not pop new job queue");
                return;
            }
        };
        if popped.is_empty() {
            return;
        }

        for id in dedup_preserve_order(popped) {
            self.spawn_pipeline(id).await;
        }
    }

    async fn spawn_pipeline(&self, job_id: String) {
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
        *self.idle_since.lock().await = None;

        let pipeline = self.pipeline.clone();
        let active_jobs = self.active_jobs.clone();
        let idle_since = self.idle_since.clone();

        tokio::spawn(async move {
            pipeline::process_job(&pipeline, &job_id).await;
            let remaining = active_jobs.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining == 0 {
                *idle_since.lock().await = Some(Utc::now());
            }
        });
    }

    async fn run_heartbeat_loop(&self, shutdown: &mut watch::Receiver<()>, terminate: watch::Sender<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval_s));
        info!(period_s = self.config.heartbeat_interval_s, "heartbeat loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.heartbeat_tick().await {
                        let _ = terminate.send(true);
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    info!("heartbeat loop shutting down");
                    break;
                }
            }
        }
    }

    /// Reports liveness and, if idle termination is enabled, decides whether
    /// this node should terminate itself. Returns true on that decision.
    async fn heartbeat_tick(&self) -> bool {
        let active = self.active_jobs.load(Ordering::SeqCst) as u32;
        let node = Node {
            id: self.node_id.clone(),
            active_jobs: active,
            state: NodeState::Active,
            last_report_at: Utc::now(),
        };
        if let Err(e) = self.node_store.put(&node).await {
            warn!(error = %e, "heartbeat: failed to report node status");
        }

        if !self.config.idle_termination_enabled || active > 0 {
            return false;
        }

        let idle_since = *self.idle_since.lock().await;
        let Some(idle_since) = idle_since else {
            return false;
        };
        let idle_for = Utc::now() - idle_since;
        if idle_for <= chrono::Duration::seconds(self.config.idle_threshold_s) {
            return false;
        }

        info!(node_id = %self.node_id, idle_s = idle_for.num_seconds(), "node idle past threshold, self-terminating");
        let mut terminated = node;
        terminated.state = NodeState::Terminated;
        if let Err(e) = self.node_store.put(&terminated).await {
            warn!(error = %e, "failed to record self-termination");
        }
        if let Err(e) = self.compute.terminate_node(&self.node_id).await {
            warn!(error = %e, "compute API termination call failed");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::LoggingComputeApi;
    use nommer_queue::InMemoryQueue;
    use nommer_store::{InMemoryJobStore, InMemoryNodeStore};
    use nommer_storage::StorageRegistry;

    fn worker(config: Config) -> Worker {
        let pipeline = Arc::new(PipelineContext {
            job_store: Arc::new(InMemoryJobStore::new()),
            state_change_queue: Arc::new(InMemoryQueue::new()),
            storage: StorageRegistry::new(),
            encoders: crate::nommers::default_registry(),
        });
        Worker::new(
            "node-a".to_string(),
            Arc::new(InMemoryNodeStore::new()),
            Arc::new(InMemoryQueue::new()),
            pipeline,
            Arc::new(LoggingComputeApi),
            config,
        )
    }

    #[tokio::test]
    async fn bootstrap_registers_node_as_active() {
        let w = worker(Config::default());
        w.bootstrap().await.unwrap();
        let nodes = w.node_store.list_active().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "node-a");
    }

    #[tokio::test]
    async fn idle_node_self_terminates_past_threshold() {
        let mut config = Config::default();
        config.idle_termination_enabled = true;
        config.idle_threshold_s = 0;
        let w = worker(config);
        w.bootstrap().await.unwrap();

        *w.idle_since.lock().await = Some(Utc::now() - chrono::Duration::seconds(10));
        assert!(w.heartbeat_tick().await);

        let nodes = w.node_store.list_active().await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn busy_node_never_self_terminates() {
        let mut config = Config::default();
        config.idle_termination_enabled = true;
        config.idle_threshold_s = 0;
        let w = worker(config);
        w.bootstrap().await.unwrap();
        w.active_jobs.fetch_add(1, Ordering::SeqCst);

        assert!(!w.heartbeat_tick().await);
    }
}
