/// One durable direct exchange and one durable queue bound to it by a routing key.
///
/// Declared on every newly established channel; declarations are idempotent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

impl Topology {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Builds a request that targets this topology's exchange and routing key.
    pub fn publish_request(&self, payload: Vec<u8>, content_type: &str) -> PublishRequest {
        PublishRequest {
            exchange: self.exchange.clone(),
            routing_key: self.routing_key.clone(),
            payload,
            content_type: content_type.to_owned(),
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new("chat_messages", "chat_messages_queue", "chat_messages_queue")
    }
}

/// Immutable value handed to the broker link for publishing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishRequest {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub content_type: String,
}
