//! Object formatting and payload splitting.
//!
//! Writes flow through an [`ObjectTarget`]: a header, any number of payload
//! chunks, then `close`. The [`PayloadSizeLimiter`] is the target that cuts
//! an unbounded payload into children of at most `max_size` bytes, hashing
//! as data streams through, and hands each finished object to an
//! [`ObjectSink`] in creation order: children first, the linking object last.
//!
//! Reading split objects back goes the other way: the [`Assembler`] follows
//! a chain through the local engine, using a [`RangeTraverser`] for ranges.

pub mod assembler;
pub mod error;
pub mod format;
pub mod local;
pub mod range;
pub mod target;
pub mod transformer;

pub use assembler::Assembler;
pub use error::{ObjectError, ObjectResult};
pub use local::LocalTarget;
pub use range::{RangeStep, RangeTraverser};
pub use target::{AccessIdentifiers, CollectingSink, ObjectSink, ObjectTarget};
pub use transformer::{PayloadSizeLimiter, TransformerConfig};
