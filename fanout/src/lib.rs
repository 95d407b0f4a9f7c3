//! Live fan-out of chat messages to connected viewers.
//!
//! # Architecture
//!
//! - **Single consumer**: every producer hands events to one unbounded channel;
//!   a single broadcast task drains it and is the only writer to viewer
//!   connections. A viewer therefore never sees two concurrent writes and every
//!   viewer observes events in the same order.
//! - **Concurrent registry**: viewers register and unregister from their own
//!   session tasks through a `DashMap`; the broadcast loop iterates over a
//!   snapshot so no shard lock is held while writing.
//! - **Ephemeral events**: a viewer that connects late misses earlier events.
//!   History comes from the message endpoints, not from this crate.
//! - **Failure isolation**: a write that fails or exceeds the write timeout
//!   removes and closes that one viewer; delivery to the rest continues.
//!
//! # Modules
//!
//! - `connection`: `ConnectionRegistry`, `ConnectionId` and the `ViewerConnection` trait
//! - `manager`: `LiveFanout`, the broadcast loop and its lifecycle
//! - `error`: per-viewer write failures

pub mod connection;
pub mod error;
pub mod manager;

pub use connection::{ConnectionId, ViewerConnection};
pub use error::{Error, FanoutErrorKind};
pub use manager::LiveFanout;
