//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use shelter_types::Address;

use crate::logging::LogFormat;
use crate::sync::transfers::transfer_lookback_blocks;
use crate::NodeError;

/// Configuration for a shelter node.
///
/// Can be loaded from a TOML file via [`ShelterConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShelterConfig {
    /// This node's ledger address.
    #[serde(default = "default_node_address")]
    pub node_address: String,

    /// Directory of the checkpoint database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum blocks per event query.
    #[serde(default = "default_event_fetch_step")]
    pub event_fetch_step: u64,

    /// Window size of the backward onboarding scan on a cold start.
    #[serde(default = "default_onboarding_scan_chunk")]
    pub onboarding_scan_chunk: u64,

    /// Lifetime of a challenge or transfer on the ledger.
    #[serde(default = "default_challenge_duration_secs")]
    pub challenge_duration_secs: u64,

    /// Lower bound of the ledger's block time.
    #[serde(default = "default_min_block_time_secs")]
    pub min_block_time_secs: u64,

    /// Maximum simultaneously ongoing outbound transfers.
    #[serde(default = "default_release_concurrency")]
    pub release_concurrency: usize,

    /// Seconds a failed transfer start or resolution is skipped for.
    #[serde(default = "default_failed_start_cooldown_secs")]
    pub failed_start_cooldown_secs: u64,

    /// Entries kept by the worker activity log.
    #[serde(default = "default_activity_log_capacity")]
    pub activity_log_capacity: usize,

    /// Hand every sheltered bundle over to other nodes.
    #[serde(default)]
    pub retire: bool,

    /// Store the assets and events of composite bundles individually.
    #[serde(default)]
    pub unpack_bundles: bool,

    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    #[serde(default = "default_restore_interval_secs")]
    pub restore_interval_secs: u64,

    #[serde(default = "default_release_interval_secs")]
    pub release_interval_secs: u64,

    #[serde(default = "default_resolve_interval_secs")]
    pub resolve_interval_secs: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_node_address() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./shelter_data")
}

fn default_event_fetch_step() -> u64 {
    5_000
}

fn default_onboarding_scan_chunk() -> u64 {
    10_000
}

fn default_challenge_duration_secs() -> u64 {
    172_800
}

fn default_min_block_time_secs() -> u64 {
    5
}

fn default_release_concurrency() -> usize {
    20
}

fn default_failed_start_cooldown_secs() -> u64 {
    3_600
}

fn default_activity_log_capacity() -> usize {
    1_000
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_restore_interval_secs() -> u64 {
    300
}

fn default_release_interval_secs() -> u64 {
    60
}

fn default_resolve_interval_secs() -> u64 {
    60
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ShelterConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn node_address(&self) -> Result<Address, NodeError> {
        Address::parse(&self.node_address)
            .filter(Address::is_valid)
            .ok_or_else(|| NodeError::Config(format!("invalid node_address {}", self.node_address)))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        match self.log_format.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(NodeError::Config(format!("unknown log_format {other}"))),
        }
    }

    /// Cold-start lookback of the transfer engines, in blocks.
    pub fn transfer_lookback_blocks(&self) -> u64 {
        transfer_lookback_blocks(self.challenge_duration_secs, self.min_block_time_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn restore_interval(&self) -> Duration {
        Duration::from_secs(self.restore_interval_secs.max(1))
    }

    pub fn release_interval(&self) -> Duration {
        Duration::from_secs(self.release_interval_secs.max(1))
    }

    pub fn resolve_interval(&self) -> Duration {
        Duration::from_secs(self.resolve_interval_secs.max(1))
    }
}

impl Default for ShelterConfig {
    fn default() -> Self {
        Self {
            node_address: default_node_address(),
            data_dir: default_data_dir(),
            event_fetch_step: default_event_fetch_step(),
            onboarding_scan_chunk: default_onboarding_scan_chunk(),
            challenge_duration_secs: default_challenge_duration_secs(),
            min_block_time_secs: default_min_block_time_secs(),
            release_concurrency: default_release_concurrency(),
            failed_start_cooldown_secs: default_failed_start_cooldown_secs(),
            activity_log_capacity: default_activity_log_capacity(),
            retire: false,
            unpack_bundles: false,
            sync_interval_secs: default_sync_interval_secs(),
            restore_interval_secs: default_restore_interval_secs(),
            release_interval_secs: default_release_interval_secs(),
            resolve_interval_secs: default_resolve_interval_secs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
