//! Periodic move of old messages into cold storage.
//!
//! Each chat is archived in its own transaction. The newest `keep_latest` messages of
//! every chat stay in place regardless of age, so the history fallback behind the
//! recent-message cache can always be answered from `messages`.

use crate::error::Error;
use chrono::{DateTime, Utc};
use entity_api::message;
use log::*;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Clone, Debug, PartialEq)]
pub struct ArchivePolicy {
    /// Time between sweeps.
    pub interval: Duration,
    /// Messages older than this are eligible.
    pub archive_after: chrono::Duration,
    /// Newest messages per chat that are never archived.
    pub keep_latest: u64,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            archive_after: chrono::Duration::days(3),
            keep_latest: 100,
        }
    }
}

impl ArchivePolicy {
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.archive_after
    }
}

/// Runs one sweep over every chat with eligible messages. A failing chat is
/// logged and skipped. Returns the number of messages archived.
pub async fn archive_once<C>(db: &C, policy: &ArchivePolicy, now: DateTime<Utc>) -> Result<u64, Error>
where
    C: ConnectionTrait + TransactionTrait,
{
    let cutoff = policy.cutoff(now);
    let chat_ids = message::find_chat_ids_with_messages_before(db, cutoff).await?;

    let mut archived = 0;
    for chat_id in chat_ids {
        match message::archive_older_than(db, chat_id, cutoff, policy.keep_latest).await {
            Ok(count) => archived += count,
            Err(e) => warn!("Failed to archive messages of chat {chat_id}: {e}"),
        }
    }

    Ok(archived)
}

/// Background task running [`archive_once`] every `policy.interval` until stopped.
pub struct ArchiveTask {
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ArchiveTask {
    /// Starts the task. The first sweep runs one interval after start.
    pub fn start(db: Arc<DatabaseConnection>, policy: ArchivePolicy) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run(db, policy, shutdown_rx));

        Self {
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stops the task, waiting for an in-flight sweep to finish. Idempotent.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!("Archive task ended abnormally: {e}");
            }
        }
    }
}

async fn run(
    db: Arc<DatabaseConnection>,
    policy: ArchivePolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticks = interval_at(Instant::now() + policy.interval, policy.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stopping(&mut shutdown) => break,
            _ = ticks.tick() => {
                match archive_once(db.as_ref(), &policy, Utc::now()).await {
                    Ok(0) => debug!("Archive sweep found nothing to move"),
                    Ok(count) => info!("Archived {count} messages"),
                    Err(e) => error!("Archive sweep failed: {e}"),
                }
            }
        }
    }

    debug!("Archive task stopped");
}

async fn stopping(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means the task handle is gone.
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}


#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod mock_tests {
    use super::*;
    use entity_api::messages::Model;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn message(id: i64, chat_id: i64, age_days: i64) -> Model {
        let created_at = Utc::now() - chrono::Duration::days(age_days);
        Model {
            id,
            chat_id,
            sender_id: 1,
            content: format!("message {id}"),
            is_read: true,
            read_at: None,
            created_at: created_at.into(),
            updated_at: created_at.into(),
        }
    }

    fn chat_row(chat_id: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([("chat_id".to_string(), Value::BigInt(Some(chat_id)))])
    }

    #[tokio::test]
    async fn archive_once_sums_archived_rows_across_chats() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![chat_row(1), chat_row(2)]])
            // chat 1: protected floor, then two stale rows
            .append_query_results(vec![vec![message(50, 1, 1)]])
            .append_query_results(vec![vec![message(3, 1, 9), message(4, 1, 8)]])
            .append_exec_results(vec![
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            // chat 2: fewer messages than the protected window
            .append_query_results(vec![Vec::<Model>::new()])
            .into_connection();

        let archived = archive_once(&db, &ArchivePolicy::default(), Utc::now()).await?;

        assert_eq!(archived, 2);

        Ok(())
    }
}
