//! Fundamental types for the shelter node.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! ledger addresses, bundle and transfer identifiers, event positions, timestamps
//! and the [`Resolution`] record tracked by the sync engines.

pub mod address;
pub mod error;
pub mod hash;
pub mod position;
pub mod resolution;
pub mod time;

pub use address::Address;
pub use error::ShelterError;
pub use hash::{BundleId, TransferId};
pub use position::EventPosition;
pub use resolution::{fields, Resolution};
pub use time::{Clock, SystemClock, Timestamp};
