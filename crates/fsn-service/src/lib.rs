//! Distributed object operations.
//!
//! Every operation here is driven by a [`fsn_placement::Traverser`]: the
//! object's placement is computed, nodes are contacted batch by batch, and
//! results are counted against the success threshold. Each node is served
//! either by the local engine or through a [`RemoteClient`], chosen once per
//! node by [`Source::resolve`].
//!
//! All operations take a [`CancelToken`]; cancelling abandons in-flight
//! calls without undoing writes that already landed.

pub mod cancel;
pub mod client;
pub mod context;
pub mod error;
pub mod head;
pub mod put;
pub mod range_hash;
pub mod source;

pub use cancel::{CancelHandle, CancelToken};
pub use client::{InProcessClient, RemoteClient};
pub use context::ServiceContext;
pub use error::{ServiceError, ServiceResult};
pub use head::{HeadRequest, HeadService};
pub use put::{DistributeTarget, PutService};
pub use range_hash::{RangeHashRequest, RangeHashService};
pub use source::{Answer, Query, Source};

#[cfg(test)]
pub(crate) mod test_util;
