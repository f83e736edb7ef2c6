//! Storage engine for the FSN node.
//!
//! The [`StorageEngine`] owns a set of shards and routes every object
//! operation through them:
//!
//! - point reads visit shards in the ranked order of [`ranking::rank`],
//!   skipping "not found" and merging partial split info along the way
//! - writes land on exactly one shard, the first in ranked order
//! - `Select`, `List` and container queries scatter over every shard and
//!   deduplicate the union
//!
//! Only shard-set changes take the write side of the shard-map lock.

pub mod config;
pub mod engine;
pub mod error;
pub mod ranking;

pub use config::EngineConfig;
pub use engine::StorageEngine;
pub use error::{EngineError, EngineResult};
