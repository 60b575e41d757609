//! Worker configuration: compiled defaults, optionally overridden by a
//! `config.toml` on disk, then by `NOMMER_*` environment variables.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_id: String,
    pub max_jobs_per_node: u32,
    pub new_job_check_interval_s: u64,
    pub heartbeat_interval_s: u64,
    pub idle_threshold_s: i64,
    pub idle_termination_enabled: bool,
    pub node_store_path: String,
    pub job_store_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_id: "local".to_string(),
            max_jobs_per_node: 1,
            new_job_check_interval_s: 60,
            heartbeat_interval_s: 60,
            idle_threshold_s: 3600,
            idle_termination_enabled: false,
            node_store_path: "feederd-nodes.db".to_string(),
            job_store_path: "feederd-jobs.db".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Config> {
        let mut config = Config::default();

        let config_path = env::var("NOMMER_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        if let Ok(contents) = std::fs::read_to_string(&config_path) {
            config = toml::from_str(&contents)?;
            tracing::info!(path = %config_path, "loaded worker config from disk");
        }

        config.node_id = env_override("NOMMER_NODE_ID", config.node_id);
        config.max_jobs_per_node = env_override("NOMMER_MAX_JOBS_PER_NODE", config.max_jobs_per_node);
        config.new_job_check_interval_s =
            env_override("NOMMER_NEW_JOB_CHECK_INTERVAL", config.new_job_check_interval_s);
        config.heartbeat_interval_s =
            env_override("NOMMER_HEARTBEAT_INTERVAL", config.heartbeat_interval_s);
        config.idle_threshold_s = env_override("NOMMER_IDLE_THRESHOLD", config.idle_threshold_s);
        config.idle_termination_enabled =
            env_override("NOMMER_IDLE_TERMINATION_ENABLED", config.idle_termination_enabled);
        config.node_store_path = env_override("NOMMER_NODE_STORE_PATH", config.node_store_path);
        config.job_store_path = env_override("NOMMER_JOB_STORE_PATH", config.job_store_path);

        config.clamp_floors();
        Ok(config)
    }

    fn clamp_floors(&mut self) {
        self.max_jobs_per_node = self.max_jobs_per_node.max(1);
        self.new_job_check_interval_s = self.new_job_check_interval_s.max(1);
        self.heartbeat_interval_s = self.heartbeat_interval_s.max(1);
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
        assert_eq!(config.idle_threshold_s, 3600);
        assert!(!config.idle_termination_enabled);
    }
}
