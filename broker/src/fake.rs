//! In-memory broker used by the unit tests of this crate.

use crate::error::TransportError;
use crate::topology::{PublishRequest, Topology};
use crate::transport::{BrokerChannel, BrokerConnection, CloseNotice, Connector};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::time::Instant;

#[derive(Default)]
struct FakeState {
    unreachable: bool,
    topology_fails: bool,
    channel_open_fails: bool,
    publish_fails: bool,
    fail_next_probe: bool,
    dials: Vec<Instant>,
    declared: Vec<Topology>,
    published: Vec<PublishRequest>,
    publish_attempts: usize,
    open_connections: usize,
    open_channels: usize,
    last_connection: Option<Arc<FakeConnection>>,
    last_channel: Option<Arc<FakeChannel>>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBroker {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBroker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.with(|s| s.unreachable = !reachable);
    }

    pub(crate) fn set_topology_fails(&self, fails: bool) {
        self.with(|s| s.topology_fails = fails);
    }

    pub(crate) fn set_channel_open_fails(&self, fails: bool) {
        self.with(|s| s.channel_open_fails = fails);
    }

    pub(crate) fn set_publish_fails(&self, fails: bool) {
        self.with(|s| s.publish_fails = fails);
    }

    pub(crate) fn fail_next_probe(&self) {
        self.with(|s| s.fail_next_probe = true);
    }

    /// Simulates the broker dropping the most recent connection.
    pub(crate) fn drop_connection(&self) {
        if let Some(connection) = self.with(|s| s.last_connection.clone()) {
            connection.notice.fire("connection reset by peer");
        }
    }

    /// Simulates the broker closing the most recent channel.
    pub(crate) fn drop_channel(&self) {
        if let Some(channel) = self.with(|s| s.last_channel.clone()) {
            channel.notice.fire("channel closed by broker");
        }
    }

    pub(crate) fn dial_count(&self) -> usize {
        self.with(|s| s.dials.len())
    }

    pub(crate) fn dial_instants(&self) -> Vec<Instant> {
        self.with(|s| s.dials.clone())
    }

    pub(crate) fn declared_topologies(&self) -> Vec<Topology> {
        self.with(|s| s.declared.clone())
    }

    pub(crate) fn published(&self) -> Vec<PublishRequest> {
        self.with(|s| s.published.clone())
    }

    pub(crate) fn publish_attempts(&self) -> usize {
        self.with(|s| s.publish_attempts)
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.with(|s| s.open_connections)
    }

    pub(crate) fn open_channels(&self) -> usize {
        self.with(|s| s.open_channels)
    }
}

#[async_trait]
impl Connector for FakeBroker {
    async fn dial(&self, _uri: &str) -> Result<Arc<dyn BrokerConnection>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.dials.push(Instant::now());
        if state.unreachable {
            return Err("connection refused".into());
        }
        let connection = Arc::new(FakeConnection {
            broker: self.clone(),
            open: AtomicBool::new(true),
            notice: Notice::default(),
        });
        state.open_connections += 1;
        state.last_connection = Some(Arc::clone(&connection));
        Ok(connection)
    }
}

#[derive(Default)]
struct Notice(Mutex<Option<oneshot::Sender<String>>>);

impl Notice {
    fn subscribe(&self) -> CloseNotice {
        let (tx, rx) = oneshot::channel();
        *self.0.lock().unwrap() = Some(tx);
        rx
    }

    fn fire(&self, reason: &str) {
        if let Some(tx) = self.0.lock().unwrap().take() {
            let _ = tx.send(reason.to_owned());
        }
    }

    fn discard(&self) {
        self.0.lock().unwrap().take();
    }
}

struct FakeConnection {
    broker: FakeBroker,
    open: AtomicBool,
    notice: Notice,
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, TransportError> {
        let mut state = self.broker.state.lock().unwrap();
        if state.channel_open_fails {
            return Err("channel open refused".into());
        }
        let channel = Arc::new(FakeChannel {
            broker: self.broker.clone(),
            open: AtomicBool::new(true),
            notice: Notice::default(),
        });
        state.open_channels += 1;
        state.last_channel = Some(Arc::clone(&channel));
        Ok(channel)
    }

    fn notify_close(&self) -> CloseNotice {
        self.notice.subscribe()
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.broker.with(|s| s.open_connections -= 1);
        }
        self.notice.discard();
    }
}

struct FakeChannel {
    broker: FakeBroker,
    open: AtomicBool,
    notice: Notice,
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    async fn declare_topology(&self, topology: &Topology) -> Result<(), TransportError> {
        let mut state = self.broker.state.lock().unwrap();
        if state.topology_fails {
            return Err("access refused".into());
        }
        state.declared.push(topology.clone());
        Ok(())
    }

    async fn inspect_queue(&self, _queue: &str) -> Result<(), TransportError> {
        let mut state = self.broker.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_probe) {
            return Err("channel is not open".into());
        }
        Ok(())
    }

    async fn publish(&self, request: &PublishRequest) -> Result<(), TransportError> {
        let mut state = self.broker.state.lock().unwrap();
        state.publish_attempts += 1;
        if state.publish_fails {
            return Err("publish nacked".into());
        }
        state.published.push(request.clone());
        Ok(())
    }

    fn notify_close(&self) -> CloseNotice {
        self.notice.subscribe()
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.broker.with(|s| s.open_channels -= 1);
        }
        self.notice.discard();
    }
}
