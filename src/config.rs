//! Configuration for the audit, event, and repository layers
//!
//! A `CoreConfig` is built (or loaded from JSON) by the hosting application
//! and handed to `Platform::init`. Every section has working defaults, so
//! `CoreConfig::default()` gives a fully in-memory setup.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    pub audit: AuditConfig,
    pub bus: BusConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
}

/// Audit store backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "camelCase")]
pub enum AuditConfig {
    /// In-process store, lost on restart
    #[default]
    Memory,
    /// JSONL files under `dir`
    #[serde(rename_all = "camelCase")]
    File {
        dir: PathBuf,
        /// Active file size that triggers rotation (bytes)
        #[serde(default = "default_max_file_bytes")]
        max_file_bytes: u64,
        /// Rotated files to keep; 0 keeps all
        #[serde(default)]
        max_rotated_files: usize,
    },
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

/// Event bus sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BusConfig {
    /// Published events kept for `recent`/`counts`
    pub history_capacity: usize,
    /// Broadcast buffer for `stream` observers
    pub stream_capacity: usize,
    /// Failed deliveries kept by the in-memory failure sink
    pub failure_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            stream_capacity: 256,
            failure_capacity: 10_000,
        }
    }
}

/// Repository persistence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// When set, each repository snapshots to `<dir>/<kind>.json`
    pub snapshot_dir: Option<PathBuf>,
}

/// Log filter used by `telemetry::init_tracing`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `"info,backstage_core=debug"`
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: CoreConfig = serde_json::from_str(&json).map_err(|e| {
            CoreError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.bus.stream_capacity == 0 {
            return Err(CoreError::Config(
                "bus.streamCapacity must be >= 1".to_string(),
            ));
        }
        if self.bus.history_capacity == 0 {
            return Err(CoreError::Config(
                "bus.historyCapacity must be >= 1".to_string(),
            ));
        }
        if self.bus.failure_capacity == 0 {
            return Err(CoreError::Config(
                "bus.failureCapacity must be >= 1".to_string(),
            ));
        }
        if let AuditConfig::File {
            dir,
            max_file_bytes,
            ..
        } = &self.audit
        {
            if dir.as_os_str().is_empty() {
                return Err(CoreError::Config("audit.dir cannot be empty".to_string()));
            }
            if *max_file_bytes == 0 {
                return Err(CoreError::Config(
                    "audit.maxFileBytes must be >= 1".to_string(),
                ));
            }
        }
        if let Some(dir) = &self.store.snapshot_dir {
            if dir.as_os_str().is_empty() {
                return Err(CoreError::Config(
                    "store.snapshotDir cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
