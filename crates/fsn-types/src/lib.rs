//! Foundation types for the FSN object-storage node.
//!
//! Every other FSN crate depends on `fsn-types`. The types here carry no
//! behavior beyond encoding, parsing, and the split-info merge rule.
//!
//! # Key Types
//!
//! - [`ContainerId`], [`ObjectId`], [`OwnerId`]: fixed-size 32-byte identifiers
//! - [`Address`]: `(ContainerId, ObjectId)`, the universal object key
//! - [`Header`] / [`Object`]: immutable object metadata and payload
//! - [`SplitHeader`]: chain links carried by children of a split object
//! - [`SplitInfo`]: what is known about a split chain, merged monotonically
//! - [`SearchFilters`]: predicates evaluated by shard `Select`

pub mod address;
pub mod error;
pub mod filter;
pub mod id;
pub mod object;
pub mod split;

pub use address::Address;
pub use error::TypeError;
pub use filter::{Candidate, FilterKey, MatchType, SearchFilter, SearchFilters};
pub use id::{ContainerId, ObjectId, OwnerId};
pub use object::{
    Attribute, Checksum, ChecksumType, Header, Object, ObjectType, PayloadRange, SplitHeader,
};
pub use split::{SplitId, SplitInfo, SplitInfoCollector};
