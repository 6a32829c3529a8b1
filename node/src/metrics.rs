//! Prometheus metrics for the shelter node.
//!
//! [`ShelterMetrics`] owns a dedicated [`Registry`]; services hold an
//! `Arc<ShelterMetrics>` and update it as they work. [`ShelterMetrics::encode_text`]
//! renders the registry in the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

pub struct ShelterMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Sync cycles that scanned a non-empty block range.
    pub sync_cycles: IntCounter,
    /// Sync cycles aborted by a fetch or decode error.
    pub sync_failures: IntCounter,
    pub bundles_restored: IntCounter,
    /// Bundles for which every donor failed.
    pub restore_failures: IntCounter,
    pub transfers_started: IntCounter,
    /// Outbound transfers whose bundle was removed locally after resolution.
    pub transfers_finalized: IntCounter,
    /// Inbound transfers this node took over.
    pub transfers_resolved: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub active_resolutions: IntGauge,
    pub last_scanned_block: IntGauge,
}

impl ShelterMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let sync_cycles = register_int_counter_with_registry!(
            Opts::new("shelter_sync_cycles_total", "Completed sync cycles"),
            registry
        )
        .expect("failed to register sync_cycles counter");

        let sync_failures = register_int_counter_with_registry!(
            Opts::new("shelter_sync_failures_total", "Aborted sync cycles"),
            registry
        )
        .expect("failed to register sync_failures counter");

        let bundles_restored = register_int_counter_with_registry!(
            Opts::new(
                "shelter_bundles_restored_total",
                "Bundles downloaded from a donor and stored"
            ),
            registry
        )
        .expect("failed to register bundles_restored counter");

        let restore_failures = register_int_counter_with_registry!(
            Opts::new(
                "shelter_restore_failures_total",
                "Bundles left missing after every donor failed"
            ),
            registry
        )
        .expect("failed to register restore_failures counter");

        let transfers_started = register_int_counter_with_registry!(
            Opts::new(
                "shelter_transfers_started_total",
                "Outbound transfers started"
            ),
            registry
        )
        .expect("failed to register transfers_started counter");

        let transfers_finalized = register_int_counter_with_registry!(
            Opts::new(
                "shelter_transfers_finalized_total",
                "Outbound transfers finalized locally"
            ),
            registry
        )
        .expect("failed to register transfers_finalized counter");

        let transfers_resolved = register_int_counter_with_registry!(
            Opts::new(
                "shelter_transfers_resolved_total",
                "Inbound transfers resolved by this node"
            ),
            registry
        )
        .expect("failed to register transfers_resolved counter");

        let active_resolutions = register_int_gauge_with_registry!(
            Opts::new(
                "shelter_active_resolutions",
                "Active resolutions after the last sync cycle"
            ),
            registry
        )
        .expect("failed to register active_resolutions gauge");

        let last_scanned_block = register_int_gauge_with_registry!(
            Opts::new(
                "shelter_last_scanned_block",
                "Last block fully scanned by a sync engine"
            ),
            registry
        )
        .expect("failed to register last_scanned_block gauge");

        Self {
            registry,
            sync_cycles,
            sync_failures,
            bundles_restored,
            restore_failures,
            transfers_started,
            transfers_finalized,
            transfers_resolved,
            active_resolutions,
            last_scanned_block,
        }
    }

    /// Render every metric in the text exposition format.
    pub fn encode_text(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ShelterMetrics {
    fn default() -> Self {
        Self::new()
    }
}
