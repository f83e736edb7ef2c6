//! Replica reconciliation.
//!
//! The [`Policer`] periodically takes a batch of locally stored addresses
//! and, for each, compares the current placement with the copies peers
//! actually hold. Missing copies become [`ReplicationTask`]s for a
//! [`Replicator`]; a local copy that placement no longer needs is reported
//! through a [`RedundantCopyCallback`]. Objects of removed containers are
//! inhumed locally.
//!
//! A pass never fails: per-object errors are logged and the pass moves on.

pub mod config;
pub mod error;
pub mod policer;
pub mod replicator;
pub mod source;

pub use config::PolicerConfig;
pub use error::{PolicerError, PolicerResult};
pub use policer::{Outcome, PassReport, Policer, PolicerDeps, RedundantCopyCallback};
pub use replicator::{ChannelReplicator, ReplicationTask, Replicator};
pub use source::{ObjectInhumer, ObjectListSource};
