//! In-process entity caching.
//!
//! # Responsibility
//! - Provide a thread-safe keyed store with TTL, priority and capacity.
//! - Hand out one isolated store per cached value type.
//! - Implement the repository cache policies on top of it.
//!
//! # Invariants
//! - Stored and returned values are clones; callers never share instances.
//! - Expired entries are never returned.

pub mod policy;
pub mod runtime;

pub use policy::{DefaultCachePolicy, FullDataSetCachePolicy, NoCachePolicy, RepositoryCachePolicy};
pub use runtime::{CacheItemPolicy, CachePriority, CacheRegistry, RuntimeCache};
