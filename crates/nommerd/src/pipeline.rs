//! The per-job pipeline: download, encode, upload, each gated by a state
//! transition that is persisted and queued before the next stage starts.
//! Every exit path — success, storage failure, encoder failure — cleans up
//! its working directory; `tempfile::TempDir` does that on drop, including
//! during a panicking unwind.

use std::sync::Arc;

use nommer_queue::Queue;
use nommer_store::JobStore;
use nommer_storage::StorageRegistry;
use nommer_types::{Job, JobState, STATE_DETAIL_MAX_LEN, truncate_tail};
use tracing::{error, info, warn};

use crate::nommers::EncoderRegistry;

pub struct PipelineContext {
    pub job_store: Arc<dyn JobStore>,
    pub state_change_queue: Arc<dyn Queue>,
    pub storage: StorageRegistry,
    pub encoders: EncoderRegistry,
}

/// Run a single job end to end. Failures are recorded on the job itself
/// (ERROR + detail) rather than propagated, since there is nothing above
/// this call that could usefully react to a `Result`.
pub async fn process_job(ctx: &PipelineContext, job_id: &str) {
    let mut job = match ctx.job_store.get(job_id).await {
        Ok(job) => job,
        Err(e) => {
            warn!(job_id, error = %e, "pipeline could not load job, dropping");
            return;
        }
    };

    let workdir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            fail(ctx, &mut job, format!("could not allocate working directory: {e}")).await;
            return;
        }
    };

    if !advance(ctx, &mut job, JobState::Downloading).await {
        return;
    }

    let input_path = workdir.path().join("input");
    {
        let mut file = match tokio::fs::File::create(&input_path).await {
            Ok(f) => f,
            Err(e) => {
                fail(ctx, &mut job, format!("could not open input file: {e}")).await;
                return;
            }
        };
        if let Err(e) = ctx.storage.download(&job.source_location, &mut file).await {
            fail(ctx, &mut job, format!("download failed: {e}")).await;
            return;
        }
    }

    if !advance(ctx, &mut job, JobState::Encoding).await {
        return;
    }

    let encoder = match ctx.encoders.resolve(&job.encoder_kind) {
        Some(encoder) => encoder,
        None => {
            fail(ctx, &mut job, format!("unknown encoder kind: {}", job.encoder_kind)).await;
            return;
        }
    };

    let output_path = workdir.path().join("output");
    if let Err(e) = encoder
        .run(&input_path, &output_path, &job.options, workdir.path())
        .await
    {
        fail(ctx, &mut job, e.to_string()).await;
        return;
    }

    if !advance(ctx, &mut job, JobState::Uploading).await {
        return;
    }

    {
        let mut file = match tokio::fs::File::open(&output_path).await {
            Ok(f) => f,
            Err(e) => {
                fail(ctx, &mut job, format!("could not open encoder output: {e}")).await;
                return;
            }
        };
        if let Err(e) = ctx.storage.upload(&job.dest_location, &mut file).await {
            fail(ctx, &mut job, format!("upload failed: {e}")).await;
            return;
        }
    }

    if !advance(ctx, &mut job, JobState::Finished).await {
        return;
    }
    info!(job_id = %job.id, "job finished");
}

/// Transition, persist, and enqueue the notice. Returns false (and has
/// already reported the failure) if persisting the transition itself fails;
/// the caller should stop rather than continue a pipeline whose state the
/// store disagrees with.
async fn advance(ctx: &PipelineContext, job: &mut Job, next: JobState) -> bool {
    if let Err(e) = job.transition_to(next, None) {
        error!(job_id = %job.id, error = %e, "unreachable: pipeline attempted an invalid transition");
        return false;
    }
    persist_and_notify(ctx, job).await
}

async fn fail(ctx: &PipelineContext, job: &mut Job, detail: String) {
    let detail = truncate_tail(&detail, STATE_DETAIL_MAX_LEN);
    warn!(job_id = %job.id, detail = %detail, "job failed");
    if job.transition_to(JobState::Error, Some(detail)).is_err() {
        // Already terminal (e.g. abandoned by the controller mid-flight).
        return;
    }
    persist_and_notify(ctx, job).await;
}

async fn persist_and_notify(ctx: &PipelineContext, job: &Job) -> bool {
    if let Err(e) = ctx.job_store.put(job).await {
        error!(job_id = %job.id, error = %e, "could not persist job state, abandoning pipeline for this job");
        return false;
    }
    if let Err(e) = ctx.state_change_queue.push(job.id.clone()).await {
        warn!(job_id = %job.id, error = %e, "could not enqueue state change notice");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use nommer_queue::InMemoryQueue;
    use nommer_store::InMemoryJobStore;
    use nommer_storage::MemStorage;
    use nommer_types::{Job, JobOptions};

    fn context(storage: StorageRegistry, encoders: EncoderRegistry) -> (PipelineContext, Arc<dyn JobStore>, Arc<dyn Queue>) {
        let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let state_change_queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new());
        let ctx = PipelineContext {
            job_store: job_store.clone(),
            state_change_queue: state_change_queue.clone(),
            storage,
            encoders,
        };
        (ctx, job_store, state_change_queue)
    }

    fn sample_job(source: &str, dest: &str) -> Job {
        Job::new(
            source.to_string(),
            dest.to_string(),
            JobOptions {
                nommer: "noop".to_string(),
                options: serde_json::json!({}),
            },
            None,
        )
    }

    #[tokio::test]
    async fn happy_path_copies_source_to_dest_and_finishes() {
        let mem = Arc::new(MemStorage::new());
        mem.put("mem://in/a", b"hello".to_vec()).await;

        let mut storage = StorageRegistry::new();
        storage.register("mem", mem.clone());

        let (ctx, job_store, _queue) = context(storage, crate::nommers::default_registry());

        let job = sample_job("mem://in/a", "mem://out/a");
        job_store.put(&job).await.unwrap();

        process_job(&ctx, &job.id).await;

        let finished = job_store.get(&job.id).await.unwrap();
        assert_eq!(finished.state, JobState::Finished);
        assert_eq!(mem.get("mem://out/a").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn missing_source_errors_without_ever_reaching_uploading() {
        let storage = StorageRegistry::new(); // no backend registered for "mem"
        let (ctx, job_store, _queue) = context(storage, crate::nommers::default_registry());

        let job = sample_job("mem://in/missing", "mem://out/a");
        job_store.put(&job).await.unwrap();

        process_job(&ctx, &job.id).await;

        let failed = job_store.get(&job.id).await.unwrap();
        assert_eq!(failed.state, JobState::Error);
        assert!(failed.state_detail.unwrap().contains("download failed"));
    }

    #[tokio::test]
    async fn encoder_failure_surfaces_truncated_stderr() {
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl crate::nommers::Encoder for AlwaysFails {
            async fn run(
                &self,
                _input: &std::path::Path,
                _output: &std::path::Path,
                _options: &serde_json::Value,
                _workdir: &std::path::Path,
            ) -> Result<(), crate::nommers::EncoderError> {
                Err(crate::nommers::EncoderError::Failed("x".repeat(2000)))
            }
        }

        let mem = Arc::new(MemStorage::new());
        mem.put("mem://in/a", b"hello".to_vec()).await;
        let mut storage = StorageRegistry::new();
        storage.register("mem", mem.clone());

        let mut encoders = EncoderRegistry::new();
        encoders.register("noop", Arc::new(AlwaysFails));

        let (ctx, job_store, _queue) = context(storage, encoders);
        let job = sample_job("mem://in/a", "mem://out/a");
        job_store.put(&job).await.unwrap();

        process_job(&ctx, &job.id).await;

        let failed = job_store.get(&job.id).await.unwrap();
        assert_eq!(failed.state, JobState::Error);
        let detail = failed.state_detail.unwrap();
        assert!(detail.len() <= STATE_DETAIL_MAX_LEN);
        assert!(mem.get("mem://out/a").await.is_none(), "upload never ran");
    }
}
