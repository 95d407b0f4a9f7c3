//! Short-horizon cache of recent chat messages.
//!
//! Keeps the newest messages of every chat (and a separate expiring
//! "last message" slot) available without a database round trip. The cache is
//! never a source of truth: callers fall back to durable storage on any miss.
//!
//! # Modules
//!
//! - `recent`: the per-chat policy (`RecentMessageCache`) over an abstract store
//! - `store`: the `CacheStore` trait with push-and-trim and set-with-expiry operations
//! - `memory`: an in-process `CacheStore` on `DashMap`
//! - `redis_store`: a Redis `CacheStore`

pub mod error;
pub mod memory;
pub mod recent;
pub mod redis_store;
pub mod store;

pub use error::Error;
pub use memory::MemoryStore;
pub use recent::{CachePolicy, RecentMessageCache};
pub use redis_store::RedisStore;
pub use store::CacheStore;
