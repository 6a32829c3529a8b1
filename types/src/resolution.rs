//! The resolution record: one live custody obligation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Address, BundleId, EventPosition, TransferId};

/// Field names used by ledger events and carried in [`Resolution::fields`].
pub mod fields {
    pub const BUNDLE_ID: &str = "bundleId";
    pub const SHELTERER: &str = "shelterer";
    pub const TRANSFER_ID: &str = "transferId";
    pub const DONOR_ID: &str = "donorId";
    pub const NODE_ADDRESS: &str = "nodeAddress";
    pub const COUNT: &str = "count";
}

/// A custody obligation instance (a sheltering commitment or a transfer).
///
/// `id` holds the value of the variant's identifier field (`bundleId` for
/// sheltering, `transferId` for transfers). `count` is the number of
/// resolutions still required before the obligation is discharged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: String,
    pub block_number: u64,
    pub log_index: u64,
    pub count: u32,
    /// Variant-specific payload (`shelterer`, `donorId`, `bundleId`, ...).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Resolution {
    pub fn new(id: impl Into<String>, block_number: u64, log_index: u64) -> Self {
        Self {
            id: id.into(),
            block_number,
            log_index,
            count: 1,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter for the remaining count.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Builder-style setter for a payload field.
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The bundle this obligation refers to. Sheltering records use the
    /// bundle id as their identifier.
    pub fn bundle_id(&self) -> BundleId {
        match self.field(fields::BUNDLE_ID) {
            Some(bundle) => BundleId::new(bundle),
            None => BundleId::new(self.id.as_str()),
        }
    }

    pub fn transfer_id(&self) -> TransferId {
        TransferId::new(self.id.as_str())
    }

    pub fn shelterer(&self) -> Option<Address> {
        self.field(fields::SHELTERER).and_then(Address::parse)
    }

    pub fn donor(&self) -> Option<Address> {
        self.field(fields::DONOR_ID).and_then(Address::parse)
    }
}
