//! Object placement.
//!
//! A [`PlacementBuilder`] turns an address and the container's
//! [`PlacementPolicy`] into ordered groups of candidate nodes, one group per
//! replica descriptor. A [`Traverser`] walks those groups for a single
//! operation, handing out node batches and counting successes until the
//! policy (or a flat threshold) is satisfied.

pub mod builder;
pub mod error;
pub mod netmap;
pub mod policy;
pub mod traverser;

pub use builder::{LocalPlacementBuilder, NetmapPlacementBuilder, PlacementBuilder};
pub use error::{PlacementError, PlacementResult};
pub use netmap::{LocalInfo, Netmap, NetmapSource, NodeInfo, StaticNetmap};
pub use policy::{ContainerInfo, ContainerSource, InMemoryContainerSource, PlacementPolicy, Replica};
pub use traverser::{SuccessPolicy, Traverser};
