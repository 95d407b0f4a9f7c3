use crate::connection::{ConnectionId, ConnectionRegistry, ViewerConnection};
use crate::error::{Error, FanoutErrorKind};
use events::BroadcastEvent;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Multiplexes many live viewers against one inbound event stream.
///
/// Producers `submit` events onto a single channel; one broadcast task consumes
/// them in order and is the only writer to viewer connections. A viewer whose
/// write fails is removed and closed without affecting delivery to the others.
pub struct LiveFanout {
    registry: Arc<ConnectionRegistry>,
    inbound: mpsc::UnboundedSender<BroadcastEvent>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LiveFanout {
    /// Creates the fan-out and starts its broadcast loop.
    ///
    /// `write_timeout` bounds each write to a single viewer.
    pub fn start(write_timeout: Duration) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let (inbound, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(broadcast_loop(
            Arc::clone(&registry),
            events,
            write_timeout,
            shutdown_rx,
        ));

        Self {
            registry,
            inbound,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Register a new viewer and return its unique ID
    pub fn register_connection(&self, connection: Arc<dyn ViewerConnection>) -> ConnectionId {
        let connection_id = self.registry.register(connection);
        info!("Registered live viewer {}", connection_id.as_str());
        connection_id
    }

    /// Unregister a viewer by ID. A no-op if the broadcast loop already pruned it.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        if self.registry.unregister(connection_id).is_some() {
            info!("Unregistered live viewer {}", connection_id.as_str());
        }
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.registry.contains(connection_id)
    }

    pub fn viewer_count(&self) -> usize {
        self.registry.len()
    }

    /// Enqueues an event for the broadcast loop. Never blocks.
    pub fn submit(&self, event: BroadcastEvent) {
        if self.inbound.send(event).is_err() {
            warn!("Broadcast loop has stopped; dropping live event");
        }
    }

    /// Stops the broadcast loop and closes every remaining viewer. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!("Broadcast loop ended abnormally: {e}");
            }
        }

        for (connection_id, connection) in self.registry.snapshot() {
            self.registry.unregister(&connection_id);
            connection.close().await;
        }
    }
}

async fn broadcast_loop(
    registry: Arc<ConnectionRegistry>,
    mut events: mpsc::UnboundedReceiver<BroadcastEvent>,
    write_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Broadcast loop started");

    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stopping| *stopping) => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        deliver(&registry, &event, write_timeout).await;
    }

    debug!("Broadcast loop stopped");
}

/// Writes one event to every registered viewer, pruning the ones that fail.
async fn deliver(registry: &ConnectionRegistry, event: &BroadcastEvent, write_timeout: Duration) {
    for (connection_id, connection) in registry.snapshot() {
        let outcome = match tokio::time::timeout(write_timeout, connection.send(event)).await {
            Ok(result) => result,
            Err(_) => Err(Error {
                source: None,
                error_kind: FanoutErrorKind::WriteTimedOut,
            }),
        };

        if let Err(e) = outcome {
            warn!(
                "Failed to write to live viewer {}: {}. Removing it.",
                connection_id.as_str(),
                e
            );
            registry.unregister(&connection_id);
            connection.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingViewer {
        received: StdMutex<Vec<Vec<u8>>>,
        broken: AtomicBool,
        stalled: AtomicBool,
        closed: AtomicBool,
    }

    impl RecordingViewer {
        fn received(&self) -> Vec<Vec<u8>> {
            self.received.lock().unwrap().clone()
        }

        fn break_connection(&self) {
            self.broken.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ViewerConnection for RecordingViewer {
        async fn send(&self, event: &BroadcastEvent) -> Result<(), Error> {
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.broken.load(Ordering::SeqCst) {
                return Err(Error::write_failed("broken pipe"));
            }
            self.received.lock().unwrap().push(event.as_bytes().to_vec());
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn viewer() -> Arc<RecordingViewer> {
        Arc::new(RecordingViewer::default())
    }

    #[tokio::test]
    async fn every_viewer_receives_events_in_submission_order() {
        let fanout = LiveFanout::start(Duration::from_secs(1));
        let viewers = [viewer(), viewer(), viewer()];
        for v in &viewers {
            fanout.register_connection(v.clone());
        }

        fanout.submit(BroadcastEvent::new(b"e1".to_vec()));
        fanout.submit(BroadcastEvent::new(b"e2".to_vec()));

        eventually(|| viewers.iter().all(|v| v.received().len() == 2)).await;
        for v in &viewers {
            assert_eq!(v.received(), vec![b"e1".to_vec(), b"e2".to_vec()]);
        }
        fanout.shutdown().await;
    }

    #[tokio::test]
    async fn a_broken_viewer_is_pruned_without_affecting_the_others() {
        let fanout = LiveFanout::start(Duration::from_secs(1));
        let (a, b, c) = (viewer(), viewer(), viewer());
        fanout.register_connection(a.clone());
        let b_id = fanout.register_connection(b.clone());
        fanout.register_connection(c.clone());

        fanout.submit(BroadcastEvent::new(b"e1".to_vec()));
        eventually(|| [&a, &b, &c].iter().all(|v| v.received().len() == 1)).await;

        b.break_connection();
        fanout.submit(BroadcastEvent::new(b"e2".to_vec()));
        eventually(|| a.received().len() == 2 && c.received().len() == 2).await;

        assert_eq!(b.received(), vec![b"e1".to_vec()]);
        assert!(b.closed.load(Ordering::SeqCst));
        assert!(!fanout.is_registered(&b_id));
        assert_eq!(fanout.viewer_count(), 2);
        fanout.shutdown().await;
    }

    #[tokio::test]
    async fn late_viewers_get_no_backfill() {
        let fanout = LiveFanout::start(Duration::from_secs(1));
        let early = viewer();
        fanout.register_connection(early.clone());

        fanout.submit(BroadcastEvent::new(b"e1".to_vec()));
        eventually(|| early.received().len() == 1).await;

        let late = viewer();
        fanout.register_connection(late.clone());
        fanout.submit(BroadcastEvent::new(b"e2".to_vec()));
        eventually(|| early.received().len() == 2).await;
        eventually(|| late.received().len() == 1).await;

        assert_eq!(late.received(), vec![b"e2".to_vec()]);
        fanout.shutdown().await;
    }

    #[tokio::test]
    async fn many_producers_keep_their_own_order() {
        let fanout = Arc::new(LiveFanout::start(Duration::from_secs(1)));
        let v = viewer();
        fanout.register_connection(v.clone());

        let mut producers = Vec::new();
        for producer in 0..4_u8 {
            let fanout = Arc::clone(&fanout);
            producers.push(tokio::spawn(async move {
                for seq in 0..25_u8 {
                    fanout.submit(BroadcastEvent::new(vec![producer, seq]));
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }

        eventually(|| v.received().len() == 100).await;
        for producer in 0..4_u8 {
            let seqs: Vec<u8> = v
                .received()
                .iter()
                .filter(|frame| frame[0] == producer)
                .map(|frame| frame[1])
                .collect();
            assert_eq!(seqs, (0..25).collect::<Vec<u8>>());
        }
        fanout.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_stalled_viewer_is_dropped_after_the_write_timeout() {
        let fanout = LiveFanout::start(Duration::from_secs(2));
        let (stalled, healthy) = (viewer(), viewer());
        stalled.stalled.store(true, Ordering::SeqCst);
        let stalled_id = fanout.register_connection(stalled.clone());
        fanout.register_connection(healthy.clone());

        fanout.submit(BroadcastEvent::new(b"e1".to_vec()));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(healthy.received(), vec![b"e1".to_vec()]);
        assert!(!fanout.is_registered(&stalled_id));
        assert!(stalled.closed.load(Ordering::SeqCst));
        fanout.shutdown().await;
    }

    #[tokio::test]
    async fn unregistered_viewers_stop_receiving() {
        let fanout = LiveFanout::start(Duration::from_secs(1));
        let (stays, leaves) = (viewer(), viewer());
        fanout.register_connection(stays.clone());
        let leaves_id = fanout.register_connection(leaves.clone());

        fanout.unregister_connection(&leaves_id);
        fanout.unregister_connection(&leaves_id);
        fanout.submit(BroadcastEvent::new(b"e1".to_vec()));
        eventually(|| stays.received().len() == 1).await;

        assert!(leaves.received().is_empty());
        fanout.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_remaining_viewers() {
        let fanout = LiveFanout::start(Duration::from_secs(1));
        let v = viewer();
        fanout.register_connection(v.clone());

        fanout.shutdown().await;
        fanout.shutdown().await;
        fanout.submit(BroadcastEvent::new(b"late".to_vec()));

        assert!(v.closed.load(Ordering::SeqCst));
        assert_eq!(fanout.viewer_count(), 0);
    }
}
