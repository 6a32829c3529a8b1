//! Shelter node core.
//!
//! Mirrors the ledger's custody obligations for this node into local
//! caches and reconciles them against local storage:
//! - [`collector`] fetches ledger events over chunked block ranges
//! - [`active_resolutions`] keeps the live obligations, replaying events in
//!   ledger order
//! - [`sync`] runs resumable sync cycles for sheltering, transfer and
//!   retirement-transfer events
//! - [`restorer`] downloads bundles that are missing locally
//! - [`release`] hands bundles over to other nodes when retiring
//! - [`resolver`] takes over bundles other nodes hand away

pub mod active_resolutions;
pub mod activity_log;
pub mod collector;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod release;
pub mod resolver;
pub mod restorer;
pub mod sync;
pub mod workers;

pub use active_resolutions::{merge_resolution_events, ActiveResolutions, ResolutionEvent};
pub use activity_log::{ActivityEntry, ActivityLog};
pub use collector::{
    block_ranges, collect_events_with_step, collect_filtered_events_with_step, EventFilter,
    EventRecord,
};
pub use config::ShelterConfig;
pub use cooldown::FailedResolutions;
pub use error::{NodeError, SyncError};
pub use logging::{init_logging, LogFormat};
pub use metrics::ShelterMetrics;
pub use node::{open_checkpoint_store, Collaborators, ShelterNode};
pub use release::{BundleReleaseService, ReleaseModeInfo};
pub use resolver::{ResolveReport, TransferResolver};
pub use restorer::{bundle_donors, BundleRestorer, PayloadHandling, RestoreReport};
pub use sync::{
    EventBatch, ResolutionSyncEngine, RetirementSync, RetirementTransferEvents, ShelteringEvents,
    ShelteringSync, SyncVariant, TransferEvents, TransferSync,
};
pub use workers::{spawn_periodic, PeriodicTask, ShutdownController};
