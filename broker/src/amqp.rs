//! AMQP 0-9-1 transport backed by `lapin`.

use crate::error::TransportError;
use crate::topology::{PublishRequest, Topology};
use crate::transport::{BrokerChannel, BrokerConnection, CloseNotice, Connector};
use async_trait::async_trait;
use lapin::{
    options::{
        BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use log::*;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

const REPLY_SUCCESS: u16 = 200;

/// Dials RabbitMQ (or any AMQP 0-9-1 broker) through `lapin`.
#[derive(Clone, Debug, Default)]
pub struct AmqpConnector;

#[async_trait]
impl Connector for AmqpConnector {
    async fn dial(&self, uri: &str) -> Result<Arc<dyn BrokerConnection>, TransportError> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        Ok(Arc::new(AmqpConnection { inner: connection }))
    }
}

pub struct AmqpConnection {
    inner: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, TransportError> {
        let channel = self.inner.create_channel().await?;
        Ok(Arc::new(AmqpChannel { inner: channel }))
    }

    fn notify_close(&self) -> CloseNotice {
        let (tx, rx) = close_notice();
        self.inner.on_error(move |err| tx.fire(err.to_string()));
        rx
    }

    async fn close(&self) {
        if let Err(e) = self.inner.close(REPLY_SUCCESS, "closing").await {
            debug!("Ignoring error while closing AMQP connection: {e}");
        }
    }
}

pub struct AmqpChannel {
    inner: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_topology(&self, topology: &Topology) -> Result<(), TransportError> {
        self.inner
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| format!("failed to declare exchange {}: {e}", topology.exchange))?;

        self.inner
            .queue_declare(
                &topology.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| format!("failed to declare queue {}: {e}", topology.queue))?;

        self.inner
            .queue_bind(
                &topology.queue,
                &topology.exchange,
                &topology.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| format!("failed to bind queue {}: {e}", topology.queue))?;

        Ok(())
    }

    async fn inspect_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.inner
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(&self, request: &PublishRequest) -> Result<(), TransportError> {
        let properties =
            BasicProperties::default().with_content_type(request.content_type.as_str().into());

        self.inner
            .basic_publish(
                &request.exchange,
                &request.routing_key,
                BasicPublishOptions::default(),
                &request.payload,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }

    fn notify_close(&self) -> CloseNotice {
        let (tx, rx) = close_notice();
        self.inner.on_error(move |err| tx.fire(err.to_string()));
        rx
    }

    async fn close(&self) {
        if let Err(e) = self.inner.close(REPLY_SUCCESS, "closing").await {
            debug!("Ignoring error while closing AMQP channel: {e}");
        }
    }
}

/// Adapts lapin's repeatable error callback to a single-shot notice.
struct CloseSender(Mutex<Option<oneshot::Sender<String>>>);

impl CloseSender {
    fn fire(&self, reason: String) {
        if let Ok(mut slot) = self.0.lock() {
            if let Some(tx) = slot.take() {
                let _ = tx.send(reason);
            }
        }
    }
}

fn close_notice() -> (CloseSender, CloseNotice) {
    let (tx, rx) = oneshot::channel();
    (CloseSender(Mutex::new(Some(tx))), rx)
}
