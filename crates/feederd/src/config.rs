//! Controller configuration: compiled defaults, optionally overridden by a
//! `config.toml` on disk, then by `NOMMER_*` environment variables.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http_host: String,
    pub http_port: u16,

    pub max_jobs_per_node: u32,
    pub max_nodes: u32,
    pub job_overflow_threshold: i64,

    pub state_change_interval_s: u64,
    pub prune_interval_s: u64,
    pub autoscale_interval_s: u64,
    pub abandon_threshold_s: i64,
    pub autoscale_enabled: bool,

    pub job_store_path: String,
    pub node_store_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 8080,
            max_jobs_per_node: 1,
            max_nodes: 3,
            job_overflow_threshold: 2,
            state_change_interval_s: 60,
            prune_interval_s: 300,
            autoscale_interval_s: 60,
            abandon_threshold_s: 24 * 3600,
            autoscale_enabled: true,
            job_store_path: "feederd-jobs.db".to_string(),
            node_store_path: "feederd-nodes.db".to_string(),
        }
    }
}

impl Config {
    /// Compiled defaults, then `config.toml` (if present), then `NOMMER_*`
    /// environment variables, applied in that precedence order.
    pub fn load() -> anyhow::Result<Config> {
        let mut config = Config::default();

        let config_path = env::var("NOMMER_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        if let Ok(contents) = std::fs::read_to_string(&config_path) {
            config = toml::from_str(&contents)?;
            tracing::info!(path = %config_path, "loaded controller config from disk");
        }

        config.http_host = env_override("NOMMER_HTTP_HOST", config.http_host);
        config.http_port = env_override("NOMMER_HTTP_PORT", config.http_port);
        config.max_jobs_per_node = env_override("NOMMER_MAX_JOBS_PER_NODE", config.max_jobs_per_node);
        config.max_nodes = env_override("NOMMER_MAX_NODES", config.max_nodes);
        config.job_overflow_threshold =
            env_override("NOMMER_JOB_OVERFLOW_THRESHOLD", config.job_overflow_threshold);
        config.state_change_interval_s =
            env_override("NOMMER_STATE_CHANGE_INTERVAL", config.state_change_interval_s);
        config.prune_interval_s = env_override("NOMMER_PRUNE_INTERVAL", config.prune_interval_s);
        config.autoscale_interval_s =
            env_override("NOMMER_AUTOSCALE_INTERVAL", config.autoscale_interval_s);
        config.abandon_threshold_s =
            env_override("NOMMER_ABANDON_THRESHOLD", config.abandon_threshold_s);
        config.autoscale_enabled = env_override("NOMMER_AUTOSCALE_ENABLED", config.autoscale_enabled);
        config.job_store_path = env_override("NOMMER_JOB_STORE_PATH", config.job_store_path);
        config.node_store_path = env_override("NOMMER_NODE_STORE_PATH", config.node_store_path);

        config.clamp_floors();
        Ok(config)
    }

    /// Intervals and ceilings too small to be meaningful are floored to 1
    /// rather than rejected.
    fn clamp_floors(&mut self) {
        self.max_jobs_per_node = self.max_jobs_per_node.max(1);
        self.max_nodes = self.max_nodes.max(1);
        self.state_change_interval_s = self.state_change_interval_s.max(1);
        self.prune_interval_s = self.prune_interval_s.max(1);
        self.autoscale_interval_s = self.autoscale_interval_s.max(1);
    }
}

fn env_override<T: FromStr>(key: &str, current: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = Config::default();
        assert_eq!(config.max_jobs_per_node, 1);
        assert_eq!(config.max_nodes, 3);
        assert_eq!(config.abandon_threshold_s, 86400);
    }

    #[test]
    fn clamp_floors_rejects_zero_intervals() {
        let mut config = Config {
            max_jobs_per_node: 0,
            state_change_interval_s: 0,
            ..Config::default()
        };
        config.clamp_floors();
        assert_eq!(config.max_jobs_per_node, 1);
        assert_eq!(config.state_change_interval_s, 1);
    }
}
