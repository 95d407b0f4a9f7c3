//! Resilient message-broker connection management.
//!
//! This crate owns the one logical connection between the chat service and its
//! message broker and keeps it alive across broker restarts and network faults.
//!
//! # Architecture
//!
//! - **BrokerLink**: the connection/channel pair behind a single state lock, a
//!   connect sequence that rolls back on any failed sub-step, and a bounded-retry
//!   `publish` that is safe under any number of concurrent callers.
//! - **Watcher**: one task per connection epoch that waits for the first close
//!   notification from the connection or the channel and flips the link to
//!   disconnected.
//! - **Reconnect driver**: one task for the lifetime of the link, woken by a
//!   depth-one signal (redundant signals coalesce), that redials with exponential
//!   backoff until connected or closed.
//! - **Transport seam**: the `transport` traits isolate the state machine from the
//!   wire client; `amqp` implements them with `lapin`.
//!
//! # Example
//!
//! ```rust,ignore
//! let link = BrokerLink::start(settings, Arc::new(AmqpConnector)).await;
//! let request = settings.topology.publish_request(payload, "application/json");
//! if let Err(e) = link.publish(&request).await {
//!     warn!("Message was not queued: {e}");
//! }
//! ```

pub mod amqp;
pub mod backoff;
pub mod error;
pub mod link;
pub mod topology;
pub mod transport;

#[cfg(test)]
mod fake;

pub use amqp::AmqpConnector;
pub use backoff::BackoffPolicy;
pub use error::{BrokerErrorKind, Error};
pub use link::{BrokerLink, LinkSettings};
pub use topology::{PublishRequest, Topology};
