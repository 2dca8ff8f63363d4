//! Request queue, per-account dispatch and TTL cache.
//!
//! Multiplexes many concurrent client requests onto per-account serialized
//! work lines, each guaranteeing at-most-one in-flight terminal call for
//! that account. Fresh results populate a short-lived cache and are
//! forwarded to the snapshot tracker.

pub mod cache;
pub mod dispatcher;
pub mod error;

pub use cache::{CacheEntry, CacheStore};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, DispatchResult};
