use crate::backoff::BackoffPolicy;
use crate::error::{BrokerErrorKind, Error};
use crate::topology::{PublishRequest, Topology};
use crate::transport::{BrokerChannel, BrokerConnection, CloseNotice, Connector};
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Number of attempts `publish` makes before giving up.
pub const PUBLISH_ATTEMPTS: u32 = 3;

/// The wait after the n-th failed publish attempt is `n * PUBLISH_RETRY_STEP`.
pub const PUBLISH_RETRY_STEP: Duration = Duration::from_millis(200);

/// Connection settings for a [`BrokerLink`].
#[derive(Clone, Debug)]
pub struct LinkSettings {
    pub uri: String,
    pub topology: Topology,
    pub backoff: BackoffPolicy,
}

/// The live connection/channel pair of one connection epoch.
struct Session {
    connection: Arc<dyn BrokerConnection>,
    channel: Arc<dyn BrokerChannel>,
}

impl Session {
    async fn close(self) {
        self.channel.close().await;
        self.connection.close().await;
    }
}

struct LinkState {
    /// Present exactly while the link is connected.
    session: Option<Session>,
    closing: bool,
    /// Bumped every time `connect` installs a new session.
    epoch: u64,
    /// Bumped every time a channel is installed, including in-place reopens.
    channel_seq: u64,
}

struct Shared {
    settings: LinkSettings,
    connector: Arc<dyn Connector>,
    state: Mutex<LinkState>,
    /// Serializes connect and channel recovery so that concurrent callers
    /// never dial twice. The state lock is never held across network calls.
    connect_gate: Mutex<()>,
    reconnect_tx: mpsc::Sender<()>,
    shutdown: watch::Sender<bool>,
}

/// Owns the single logical connection to the message broker.
///
/// Construction starts a reconnect driver that runs until [`BrokerLink::close`].
/// A watcher task is started for every connection epoch; the first close
/// notification from the connection or the channel marks the link disconnected
/// and signals the driver, which redials with exponential backoff.
///
/// Every method is safe to call from any number of tasks.
pub struct BrokerLink {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerLink {
    /// Creates a disconnected link and starts its reconnect driver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(settings: LinkSettings, connector: Arc<dyn Connector>) -> Self {
        // Depth one: a pending reconnect request absorbs any further ones.
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            settings,
            connector,
            state: Mutex::new(LinkState {
                session: None,
                closing: false,
                epoch: 0,
                channel_seq: 0,
            }),
            connect_gate: Mutex::new(()),
            reconnect_tx,
            shutdown,
        });

        let driver = tokio::spawn(drive_reconnects(Arc::clone(&shared), reconnect_rx));

        Self {
            shared,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Creates the link and makes the first connection attempt.
    ///
    /// A failed first attempt is logged and handed to the reconnect driver so that
    /// an outage at boot heals itself.
    pub async fn start(settings: LinkSettings, connector: Arc<dyn Connector>) -> Self {
        let link = Self::new(settings, connector);
        if let Err(e) = link.connect().await {
            warn!("Initial broker connection failed: {e}");
            link.shared.signal_reconnect();
        }
        link
    }

    /// Connects if not already connected. Idempotent.
    pub async fn connect(&self) -> Result<(), Error> {
        self.shared.connect().await
    }

    /// The exchange, queue and routing key declared on every new channel.
    pub fn topology(&self) -> &Topology {
        &self.shared.settings.topology
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.state.lock().await.session.is_some()
    }

    /// Returns the live channel, recovering it in place if the liveness probe fails.
    pub async fn get_channel(&self) -> Result<Arc<dyn BrokerChannel>, Error> {
        self.shared.get_channel().await
    }

    /// Publishes with up to [`PUBLISH_ATTEMPTS`] attempts.
    pub async fn publish(&self, request: &PublishRequest) -> Result<(), Error> {
        let mut last_error = None;

        for attempt in 1..=PUBLISH_ATTEMPTS {
            let outcome = match self.shared.get_channel().await {
                Ok(channel) => channel
                    .publish(request)
                    .await
                    .map_err(|e| Error::new(BrokerErrorKind::PublishRejected, e)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Failed to publish message (attempt {attempt}/{PUBLISH_ATTEMPTS}): {e}");
                    last_error = Some(e);
                }
            }

            if attempt < PUBLISH_ATTEMPTS {
                tokio::time::sleep(PUBLISH_RETRY_STEP * attempt).await;
            }
        }

        Err(Error {
            source: last_error.map(|e| Box::new(e) as _),
            error_kind: BrokerErrorKind::RetriesExhausted {
                attempts: PUBLISH_ATTEMPTS,
            },
        })
    }

    /// Shuts the link down for good and waits for the reconnect driver to exit. Idempotent.
    pub async fn close(&self) {
        let session = {
            let mut state = self.shared.state.lock().await;
            state.closing = true;
            state.session.take()
        };
        self.shared.shutdown.send_replace(true);

        if let Some(session) = session {
            session.close().await;
        }

        if let Some(driver) = self.driver.lock().await.take() {
            if let Err(e) = driver.await {
                error!("Broker reconnect driver ended abnormally: {e}");
            }
            info!("Broker link closed");
        }
    }
}

impl Shared {
    async fn connect(self: &Arc<Self>) -> Result<(), Error> {
        let _gate = self.connect_gate.lock().await;

        {
            let state = self.state.lock().await;
            if state.closing {
                return Err(Error::kind(BrokerErrorKind::ShuttingDown));
            }
            if state.session.is_some() {
                return Ok(());
            }
        }

        let connection = self
            .connector
            .dial(&self.settings.uri)
            .await
            .map_err(|e| Error::new(BrokerErrorKind::Dial, e))?;

        let channel = match connection.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                connection.close().await;
                return Err(Error::new(BrokerErrorKind::OpenChannel, e));
            }
        };

        if let Err(e) = channel.declare_topology(&self.settings.topology).await {
            channel.close().await;
            connection.close().await;
            return Err(Error::new(BrokerErrorKind::Topology, e));
        }

        // Subscribe before publishing the session so no closure can slip past the watcher.
        let connection_closed = connection.notify_close();
        let channel_closed = channel.notify_close();

        let (epoch, channel_seq) = {
            let mut state = self.state.lock().await;
            if state.closing {
                drop(state);
                Session {
                    connection,
                    channel,
                }
                .close()
                .await;
                return Err(Error::kind(BrokerErrorKind::ShuttingDown));
            }
            state.epoch += 1;
            state.channel_seq += 1;
            state.session = Some(Session {
                connection,
                channel,
            });
            (state.epoch, state.channel_seq)
        };

        tokio::spawn(Arc::clone(self).watch(
            epoch,
            channel_seq,
            connection_closed,
            channel_closed,
        ));

        info!(
            "Successfully connected to broker at {}",
            redact(&self.settings.uri)
        );
        Ok(())
    }

    async fn get_channel(self: &Arc<Self>) -> Result<Arc<dyn BrokerChannel>, Error> {
        let (channel, connection, epoch, channel_seq) = {
            let state = self.state.lock().await;
            match &state.session {
                Some(session) => (
                    Arc::clone(&session.channel),
                    Arc::clone(&session.connection),
                    state.epoch,
                    state.channel_seq,
                ),
                None => return Err(Error::kind(BrokerErrorKind::NotConnected)),
            }
        };

        match channel.inspect_queue(&self.settings.topology.queue).await {
            Ok(()) => Ok(channel),
            Err(e) => {
                warn!("Broker channel failed its liveness probe, reopening: {e}");
                self.reopen_channel(connection, epoch, channel_seq).await
            }
        }
    }

    /// Replaces a stale channel on the existing connection. On failure the whole
    /// session is torn down and the reconnect driver takes over.
    async fn reopen_channel(
        self: &Arc<Self>,
        connection: Arc<dyn BrokerConnection>,
        epoch: u64,
        channel_seq: u64,
    ) -> Result<Arc<dyn BrokerChannel>, Error> {
        let _gate = self.connect_gate.lock().await;

        {
            let state = self.state.lock().await;
            match &state.session {
                None => return Err(Error::kind(BrokerErrorKind::NotConnected)),
                // Another caller already recovered or reconnected while we waited.
                Some(session) if state.epoch != epoch || state.channel_seq != channel_seq => {
                    return Ok(Arc::clone(&session.channel));
                }
                Some(_) => {}
            }
        }

        let recovered = match connection.open_channel().await {
            Ok(channel) => match channel.declare_topology(&self.settings.topology).await {
                Ok(()) => Ok(channel),
                Err(e) => {
                    channel.close().await;
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        match recovered {
            Ok(channel) => {
                let channel_closed = channel.notify_close();
                let installed = {
                    let mut guard = self.state.lock().await;
                    let state = &mut *guard;
                    match state.session.as_mut() {
                        Some(session) if state.epoch == epoch => {
                            state.channel_seq += 1;
                            let stale =
                                std::mem::replace(&mut session.channel, Arc::clone(&channel));
                            Some((stale, state.channel_seq))
                        }
                        _ => None,
                    }
                };
                match installed {
                    Some((stale, new_seq)) => {
                        tokio::spawn(Arc::clone(self).watch_channel(
                            epoch,
                            new_seq,
                            channel_closed,
                        ));
                        stale.close().await;
                        info!("Reopened broker channel");
                        Ok(channel)
                    }
                    None => {
                        channel.close().await;
                        Err(Error::kind(BrokerErrorKind::NotConnected))
                    }
                }
            }
            Err(e) => {
                self.mark_lost(epoch, None).await;
                Err(Error::new(BrokerErrorKind::ChannelRecovery, e))
            }
        }
    }

    /// Single-shot watch over one connection epoch.
    async fn watch(
        self: Arc<Self>,
        epoch: u64,
        channel_seq: u64,
        mut connection_closed: CloseNotice,
        channel_closed: CloseNotice,
    ) {
        let mut shutdown = self.shutdown.subscribe();

        tokio::select! {
            reason = &mut connection_closed => {
                warn!("Broker connection closed: {}", describe(reason));
                self.mark_lost(epoch, None).await;
                return;
            }
            reason = channel_closed => {
                warn!("Broker channel closed: {}", describe(reason));
                if self.mark_lost(epoch, Some(channel_seq)).await {
                    return;
                }
            }
            _ = shutting_down(&mut shutdown) => return,
        }

        // The channel was already replaced in place; the connection remains watched.
        tokio::select! {
            reason = connection_closed => {
                warn!("Broker connection closed: {}", describe(reason));
                self.mark_lost(epoch, None).await;
            }
            _ = shutting_down(&mut shutdown) => {}
        }
    }

    /// Watches a channel that replaced a stale one in place. Its connection is
    /// still covered by the epoch's original watcher.
    async fn watch_channel(
        self: Arc<Self>,
        epoch: u64,
        channel_seq: u64,
        channel_closed: CloseNotice,
    ) {
        let mut shutdown = self.shutdown.subscribe();

        tokio::select! {
            reason = channel_closed => {
                warn!("Reopened broker channel closed: {}", describe(reason));
                self.mark_lost(epoch, Some(channel_seq)).await;
            }
            _ = shutting_down(&mut shutdown) => {}
        }
    }

    /// Flips the link to disconnected if `epoch` (and `channel_seq`, when given) is
    /// still current. Returns whether the flip happened.
    async fn mark_lost(&self, epoch: u64, channel_seq: Option<u64>) -> bool {
        let session = {
            let mut state = self.state.lock().await;
            let current = state.epoch == epoch
                && channel_seq.map_or(true, |seq| seq == state.channel_seq);
            if !current {
                return false;
            }
            match state.session.take() {
                Some(session) => session,
                None => return false,
            }
        };

        session.close().await;
        warn!("Broker connection lost, scheduling reconnection...");
        self.signal_reconnect();
        true
    }

    fn signal_reconnect(&self) {
        match self.reconnect_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("Reconnect driver has exited; dropping reconnect signal")
            }
        }
    }

    async fn is_settled(&self) -> Settled {
        let state = self.state.lock().await;
        if state.closing {
            Settled::ShuttingDown
        } else if state.session.is_some() {
            Settled::Connected
        } else {
            Settled::Disconnected
        }
    }
}

enum Settled {
    Connected,
    Disconnected,
    ShuttingDown,
}

/// Waits for reconnect signals for the lifetime of the link.
async fn drive_reconnects(shared: Arc<Shared>, mut signals: mpsc::Receiver<()>) {
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        tokio::select! {
            signal = signals.recv() => {
                if signal.is_none() {
                    return;
                }
            }
            _ = shutting_down(&mut shutdown) => return,
        }

        let mut backoff = shared.settings.backoff.start();
        loop {
            match shared.is_settled().await {
                Settled::Connected => break,
                Settled::ShuttingDown => return,
                Settled::Disconnected => {}
            }

            let delay = backoff.next_delay();
            info!("Attempting to reconnect to broker in {delay:?}...");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutting_down(&mut shutdown) => return,
            }

            match shared.connect().await {
                Ok(()) => {
                    info!("Reconnected to broker after {} attempt(s)", backoff.attempts());
                    break;
                }
                Err(e) if !e.is_transient() => return,
                Err(e) => warn!("Failed to reconnect: {e}"),
            }
        }
    }
}

async fn shutting_down(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means the link itself is gone.
    let _ = shutdown.wait_for(|closing| *closing).await;
}

fn describe(reason: Result<String, tokio::sync::oneshot::error::RecvError>) -> String {
    reason.unwrap_or_else(|_| "notifier dropped".to_owned())
}

/// Strips credentials from a broker URI before it is logged.
pub fn redact(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &uri[..scheme_end], &uri[at + 1..])
        }
        _ => uri.to_owned(),
    }
}
