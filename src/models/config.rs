use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Consecutive read failures tolerated before a job is declared failed.
    #[serde(default = "default_read_retry_limit")]
    pub read_retry_limit: u32,
    /// Capacity of the registry's recent-samples tap.
    #[serde(default = "default_recent_samples_capacity")]
    pub recent_samples_capacity: usize,
    /// How long shutdown waits for stopped jobs to flush and exit.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8641
}

fn default_read_retry_limit() -> u32 {
    3
}

fn default_recent_samples_capacity() -> usize {
    256
}

fn default_stop_grace_secs() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            read_retry_limit: default_read_retry_limit(),
            recent_samples_capacity: default_recent_samples_capacity(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}
