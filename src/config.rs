//! Process configuration
//!
//! Every setting is a command-line flag with an environment fallback.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::cluster::GatewayConfig;
use crate::index::{expand, Resolution, TimeWindow};
use crate::observability::LogFormat;
use crate::worker::WorkerConfig;

/// Configuration errors detected before startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `--es-host` is blank
    #[error("Elasticsearch host must not be empty")]
    EmptyHost,

    /// A concurrency cap was set to zero
    #[error("{setting} must be at least 1")]
    ZeroConcurrency {
        /// Flag name
        setting: &'static str,
    },

    /// Default pattern does not format to `repository/snapshot/index`
    #[error("Repository pattern '{pattern}' is unusable: {reason}")]
    InvalidPattern {
        /// Pattern as configured
        pattern: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Snapshot index orchestrator
#[derive(Debug, Clone, Parser)]
#[command(name = "esio")]
#[command(about = "Restores and removes time-partitioned indices from snapshot repositories")]
#[command(version)]
pub struct Config {
    /// Elasticsearch base URL
    #[arg(long, env = "ES_HOST")]
    pub es_host: String,

    /// Restores allowed in service at once
    #[arg(long, env = "MAX_RESTORE", default_value_t = 1)]
    pub max_restore: usize,

    /// Deletes allowed in service at once
    #[arg(long, env = "MAX_DELETE", default_value_t = 1)]
    pub max_delete: usize,

    /// Default index resolution (day, month or year)
    #[arg(long, env = "INDEX_RESOLUTION", default_value = "day")]
    pub resolution: Resolution,

    /// Default strftime pattern producing `repository/snapshot/index`
    #[arg(long, env = "REPO_PATTERN")]
    pub repo_pattern: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "ESIO_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen: SocketAddr,

    /// Timeout for listing, delete and health calls
    #[arg(long, env = "ESIO_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Timeout for a single restore waiting for completion
    #[arg(long, env = "ESIO_OPERATION_TIMEOUT_SECS", default_value_t = 3600)]
    pub operation_timeout_secs: u64,

    /// Idle poll interval of queue workers
    #[arg(long, env = "ESIO_POLL_INTERVAL_MS", default_value_t = 2000)]
    pub poll_interval_ms: u64,

    /// Pause before each restore or delete
    #[arg(long, env = "ESIO_SETTLE_DELAY_MS", default_value_t = 1000)]
    pub settle_delay_ms: u64,

    /// Log output format
    #[arg(long, env = "ESIO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Config {
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.es_host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.max_restore == 0 {
            return Err(ConfigError::ZeroConcurrency {
                setting: "max-restore",
            });
        }
        if self.max_delete == 0 {
            return Err(ConfigError::ZeroConcurrency {
                setting: "max-delete",
            });
        }

        // Format one step to prove the pattern yields repo/snapshot/index
        let sample = TimeWindow::from_epoch_secs(0, 1).map_err(|err| self.pattern_error(err))?;
        let identifiers = expand(&sample, self.resolution, &self.repo_pattern)
            .map_err(|err| self.pattern_error(err))?;
        if let Some(identifier) = identifiers.first() {
            if !identifier.repository_path().contains('/') {
                return Err(self.pattern_error(format!(
                    "'{identifier}' has no snapshot segment"
                )));
            }
        }

        Ok(())
    }

    /// Bound for listing, delete and health calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Bound for one restore
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Idle poll interval of the queue workers
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pause before each restore or delete
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Gateway settings derived from the flags
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(self.es_host.trim())
            .with_request_timeout(self.request_timeout())
            .with_operation_timeout(self.operation_timeout())
    }

    /// Worker settings derived from the flags
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default().with_settle_delay(self.settle_delay())
    }

    fn pattern_error(&self, err: impl std::fmt::Display) -> ConfigError {
        ConfigError::InvalidPattern {
            pattern: self.repo_pattern.clone(),
            reason: err.to_string(),
        }
    }
}
