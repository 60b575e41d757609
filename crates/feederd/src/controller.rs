//! Controller loops: state-change ingestion, stale-job sweep, autoscaler,
//! callback dispatch. Each runs as an independent periodic task; `run()`
//! spawns all three and waits on a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use nommer_autoscale::{decide, AutoscalePolicy};
use nommer_queue::{dedup_preserve_order, Queue, MAX_POP_BATCH};
use nommer_store::{JobStore, NodeStore};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::JobCache;
use crate::compute::ComputeApi;
use crate::config::Config;
use crate::notifier;

pub struct Controller {
    pub job_store: Arc<dyn JobStore>,
    pub node_store: Arc<dyn NodeStore>,
    pub new_job_queue: Arc<dyn Queue>,
    pub state_change_queue: Arc<dyn Queue>,
    pub compute: Arc<dyn ComputeApi>,
    pub cache: JobCache,
    pub config: Config,
    pub http_client: reqwest::Client,
}

impl Controller {
    /// Startup: scan `list_active()` into the cache.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        let n = self.cache.load_from_store(self.job_store.as_ref()).await?;
        info!(cached_jobs = n, "controller cache primed from job store");
        Ok(())
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<()>) {
        let state_change = {
            let this = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move { this.run_state_change_loop(&mut shutdown).await })
        };
        let sweep = {
            let this = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move { this.run_sweep_loop(&mut shutdown).await })
        };
        let autoscale = {
            let this = self.clone();
            tokio::spawn(async move { this.run_autoscale_loop(&mut shutdown).await })
        };

        let _ = tokio::join!(state_change, sweep, autoscale);
    }

    async fn run_state_change_loop(&self, shutdown: &mut watch::Receiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.state_change_interval_s));
        info!(period_s = self.config.state_change_interval_s, "state-change ingestion loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.ingest_state_changes().await {
                        warn!(error = %e, "state-change ingestion tick failed, retrying next tick");
                    }
                }
                _ = shutdown.changed() => {
                    info!("state-change ingestion loop shutting down");
                    break;
                }
            }
        }
    }

    async fn run_sweep_loop(&self, shutdown: &mut watch::Receiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.prune_interval_s));
        info!(period_s = self.config.prune_interval_s, "stale-job sweep loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_stale_jobs().await;
                }
                _ = shutdown.changed() => {
                    info!("stale-job sweep loop shutting down");
                    break;
                }
            }
        }
    }

    async fn run_autoscale_loop(&self, shutdown: &mut watch::Receiver<()>) {
        if !self.config.autoscale_enabled {
            info!("autoscaler disabled by configuration");
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.autoscale_interval_s));
        info!(period_s = self.config.autoscale_interval_s, "autoscaler loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.autoscale_tick().await {
                        warn!(error = %e, "autoscaler tick failed, retrying next tick");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler loop shutting down");
                    break;
                }
            }
        }
    }

    /// Pop <=10 ids from StateChangeQueue, dedup, refresh each from
    /// JobStore, diff against the cache, emit callbacks on real diffs, then
    /// purge terminal entries.
    pub async fn ingest_state_changes(&self) -> anyhow::Result<()> {
        let popped = self.state_change_queue.pop_batch(MAX_POP_BATCH).await?;
        if popped.is_empty() {
            debug!("no state changes pending");
            return Ok(());
        }
        let ids = dedup_preserve_order(popped);

        for id in ids {
            let job = match self.job_store.get(&id).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(job_id = %id, error = %e, "could not refresh job from store");
                    continue;
                }
            };

            let changed = match self.cache.get(&id).await {
                Some(cached) => cached.state != job.state,
                None => true,
            };

            if changed {
                notifier::send_notification(&self.http_client, &job).await;
                if job.state.is_terminal() {
                    warn!(job_id = %job.id, state = %job.state, "job reached terminal state");
                }
            }

            self.cache.update(job).await;
        }

        self.cache.uncache_finished().await;
        Ok(())
    }

    /// For every cached active job whose `updated_at` is older than
    /// `abandon_threshold`, force ABANDONED.
    pub async fn sweep_stale_jobs(&self) {
        let now = chrono::Utc::now();
        let threshold = chrono::Duration::seconds(self.config.abandon_threshold_s);

        for id in self.cache.active_ids().await {
            let Some(job) = self.cache.get(&id).await else {
                continue;
            };
            if job.inactive_for(now) <= threshold {
                continue;
            }

            // Remove from the cache before writing ABANDONED so the
            // state-change loop's own ingestion of this job cannot race
            // and double-fire a callback for the same transition.
            self.cache.remove(&id).await;

            let mut abandoned = job;
            abandoned.force_abandon();

            if let Err(e) = self.job_store.put(&abandoned).await {
                warn!(job_id = %id, error = %e, "failed to persist abandonment, will retry next sweep");
                continue;
            }
            if let Err(e) = self.state_change_queue.push(abandoned.id.clone()).await {
                warn!(job_id = %id, error = %e, "failed to enqueue abandonment notice");
            }
            notifier::send_notification(&self.http_client, &abandoned).await;
            warn!(job_id = %abandoned.id, "job abandoned after exceeding inactivity threshold");
        }
    }

    /// The autoscaler's capacity/deficit/bootstrap decision, executed
    /// against live node and job counts.
    pub async fn autoscale_tick(&self) -> anyhow::Result<()> {
        let active_nodes = self.node_store.list_active().await?;
        let unfinished = self.job_store.list_active().await?;

        let policy = AutoscalePolicy {
            max_per_node: self.config.max_jobs_per_node,
            max_nodes: self.config.max_nodes,
            overflow_threshold: self.config.job_overflow_threshold,
        };

        let decision = decide(&policy, active_nodes.len() as u32, unfinished.len() as u32);
        if !decision.launch_needed || decision.to_launch == 0 {
            debug!(
                active_nodes = active_nodes.len(),
                unfinished_jobs = unfinished.len(),
                "autoscaler: no action this tick"
            );
            return Ok(());
        }

        if let Err(e) = self.compute.launch_nodes(decision.to_launch).await {
            warn!(error = %e, "compute API call failed, autoscaler will retry next tick");
        }
        Ok(())
    }
}
