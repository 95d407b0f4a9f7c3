//! The seam between the broker link and a concrete broker client.
//!
//! [`BrokerLink`](crate::BrokerLink) only ever talks to these traits, which keeps the
//! reconnect state machine independent of the wire protocol. The AMQP implementation
//! lives in [`crate::amqp`].

use crate::error::TransportError;
use crate::topology::{PublishRequest, Topology};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Resolves once with a human readable reason when the watched handle closes.
///
/// A dropped sender is treated the same as an explicit close notification.
pub type CloseNotice = oneshot::Receiver<String>;

/// Dials new broker connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn dial(&self, uri: &str) -> Result<Arc<dyn BrokerConnection>, TransportError>;
}

/// A physical connection to the broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, TransportError>;

    /// Subscribes to the closure of this connection.
    fn notify_close(&self) -> CloseNotice;

    /// Closes the connection; errors are swallowed since the handle is being discarded.
    async fn close(&self);
}

/// A channel multiplexed over a [`BrokerConnection`].
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declares the exchange, the queue and the binding between them.
    async fn declare_topology(&self, topology: &Topology) -> Result<(), TransportError>;

    /// Cheap liveness probe against a queue that is known to exist.
    async fn inspect_queue(&self, queue: &str) -> Result<(), TransportError>;

    async fn publish(&self, request: &PublishRequest) -> Result<(), TransportError>;

    /// Subscribes to the closure of this channel.
    fn notify_close(&self) -> CloseNotice;

    async fn close(&self);
}
