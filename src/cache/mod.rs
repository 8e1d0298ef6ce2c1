//! Generic caching engine shared by every resource repository.
//!
//! This module is tenant- and resource-agnostic. It provides:
//! - A bounded, TTL-expiring store with FIFO eviction and optional
//!   read-promotion (`store`)
//! - Request coalescing plus invalidation versioning on top of it (`layer`),
//!   so concurrent reads share one network call and a slow fetch can never
//!   overwrite an entry that was invalidated while it was in flight

mod layer;
mod store;

pub use layer::CacheLayer;
pub use store::{BoundedCache, CacheConfig};
