//! Sqlite-backed `JobStore`/`NodeStore`, matching the authoritative record
//! schema: every attribute round-trips as a string, timestamps at
//! microsecond precision.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use nommer_types::{Job, JobState, Node, NodeState};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::{JobStore, NodeStore, StoreError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| e.to_string())
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Transient(e.to_string())
    }
}

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(&format!("sqlite:{path}?mode=rwc")).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                unique_id          TEXT PRIMARY KEY,
                source_path        TEXT NOT NULL,
                dest_path          TEXT NOT NULL,
                nommer             TEXT NOT NULL,
                job_options        TEXT NOT NULL,
                job_state          TEXT NOT NULL,
                job_state_details  TEXT,
                notify_url         TEXT,
                last_modified_dtime TEXT NOT NULL,
                creation_dtime     TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(SqliteJobStore { pool })
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job, String> {
        let state: String = row.try_get("job_state").map_err(|e| e.to_string())?;
        let options: String = row.try_get("job_options").map_err(|e| e.to_string())?;
        Ok(Job {
            id: row.try_get("unique_id").map_err(|e| e.to_string())?,
            source_location: row.try_get("source_path").map_err(|e| e.to_string())?,
            dest_location: row.try_get("dest_path").map_err(|e| e.to_string())?,
            encoder_kind: row.try_get("nommer").map_err(|e| e.to_string())?,
            options: serde_json::from_str(&options).map_err(|e| e.to_string())?,
            state: state.parse::<JobState>().map_err(|e| e.to_string())?,
            state_detail: row.try_get("job_state_details").map_err(|e| e.to_string())?,
            notify_url: row.try_get("notify_url").map_err(|e| e.to_string())?,
            created_at: parse_timestamp(&row.try_get::<String, _>("creation_dtime").map_err(|e| e.to_string())?)?,
            updated_at: parse_timestamp(&row.try_get::<String, _>("last_modified_dtime").map_err(|e| e.to_string())?)?,
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn put(&self, job: &Job) -> Result<String, StoreError> {
        if let Ok(existing) = self.get(&job.id).await {
            if existing.state.is_terminal() {
                return Ok(job.id.clone());
            }
        }
        sqlx::query(
            r#"
            INSERT INTO jobs (unique_id, source_path, dest_path, nommer, job_options,
                               job_state, job_state_details, notify_url,
                               last_modified_dtime, creation_dtime)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(unique_id) DO UPDATE SET
                job_state = excluded.job_state,
                job_state_details = excluded.job_state_details,
                last_modified_dtime = excluded.last_modified_dtime
            "#,
        )
        .bind(&job.id)
        .bind(&job.source_location)
        .bind(&job.dest_location)
        .bind(&job.encoder_kind)
        .bind(job.options.to_string())
        .bind(job.state.as_str())
        .bind(&job.state_detail)
        .bind(&job.notify_url)
        .bind(format_timestamp(job.updated_at))
        .bind(format_timestamp(job.created_at))
        .execute(&self.pool)
        .await?;
        Ok(job.id.clone())
    }

    async fn get(&self, id: &str) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE unique_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::row_to_job(&row).map_err(StoreError::Malformed)
    }

    async fn list_active(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE job_state NOT IN ('FINISHED', 'ERROR', 'ABANDONED')",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_job(row) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!("skipping malformed job row: {e}"),
            }
        }
        Ok(jobs)
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM jobs").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct SqliteNodeStore {
    pool: SqlitePool,
}

impl SqliteNodeStore {
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(&format!("sqlite:{path}?mode=rwc")).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id              TEXT PRIMARY KEY,
                active_jobs     INTEGER NOT NULL,
                state           TEXT NOT NULL,
                last_report_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(SqliteNodeStore { pool })
    }

    fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> Result<Node, String> {
        let state: String = row.try_get("state").map_err(|e| e.to_string())?;
        Ok(Node {
            id: row.try_get("id").map_err(|e| e.to_string())?,
            active_jobs: row.try_get::<i64, _>("active_jobs").map_err(|e| e.to_string())? as u32,
            state: match state.as_str() {
                "ACTIVE" => NodeState::Active,
                "TERMINATED" => NodeState::Terminated,
                other => return Err(format!("unknown node state {other:?}")),
            },
            last_report_at: parse_timestamp(
                &row.try_get::<String, _>("last_report_at").map_err(|e| e.to_string())?,
            )?,
        })
    }
}

#[async_trait]
impl NodeStore for SqliteNodeStore {
    async fn put(&self, node: &Node) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO nodes (id, active_jobs, state, last_report_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                active_jobs = excluded.active_jobs,
                state = excluded.state,
                last_report_at = excluded.last_report_at
            "#,
        )
        .bind(&node.id)
        .bind(node.active_jobs as i64)
        .bind(node.state.as_str())
        .bind(format_timestamp(node.last_report_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Node, StoreError> {
        let row = sqlx::query("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::row_to_node(&row).map_err(StoreError::Malformed)
    }

    async fn list_active(&self) -> Result<Vec<Node>, StoreError> {
        let rows = sqlx::query("SELECT * FROM nodes WHERE state = 'ACTIVE'")
            .fetch_all(&self.pool)
            .await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_node(row) {
                Ok(node) => nodes.push(node),
                Err(e) => warn!("skipping malformed node row: {e}"),
            }
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nommer_types::JobOptions;

    async fn temp_store() -> (SqliteJobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let store = SqliteJobStore::open(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (store, _dir) = temp_store().await;
        let job = Job::new(
            "mem://in/a".into(),
            "mem://out/a".into(),
            JobOptions {
                nommer: "noop".into(),
                options: serde_json::json!({"preset": "fast"}),
            },
            Some("http://example.com/hook".into()),
        );
        store.put(&job).await.unwrap();
        let fetched = store.get(&job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.state, JobState::Pending);
        assert_eq!(fetched.options, serde_json::json!({"preset": "fast"}));
    }

    #[tokio::test]
    async fn list_active_excludes_terminal_rows() {
        let (store, _dir) = temp_store().await;
        let mut job = Job::new(
            "mem://in/a".into(),
            "mem://out/a".into(),
            JobOptions {
                nommer: "noop".into(),
                options: serde_json::json!({}),
            },
            None,
        );
        store.put(&job).await.unwrap();
        job.transition_to(JobState::Error, Some("boom".into())).unwrap();
        store.put(&job).await.unwrap();

        assert!(store.list_active().await.unwrap().is_empty());
    }
}
