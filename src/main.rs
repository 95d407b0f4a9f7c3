use broker::link::redact;
use broker::{AmqpConnector, BackoffPolicy, BrokerLink, LinkSettings, Topology};
use cache::{CachePolicy, CacheStore, MemoryStore, RecentMessageCache, RedisStore};
use domain::archive::{ArchivePolicy, ArchiveTask};
use domain::{DatabaseMessageStore, MessageIngress};
use fanout::LiveFanout;
use log::*;
use service::{config::Config, logging::Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
    }

    info!("Starting up Heydays in {} mode", config.runtime_env());

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    let broker_uri = config.broker_uri();
    info!("Connecting to message broker at {}", redact(&broker_uri));
    let broker = Arc::new(
        BrokerLink::start(
            LinkSettings {
                uri: broker_uri,
                topology: Topology::new(
                    config.broker_exchange.clone(),
                    config.broker_queue.clone(),
                    config.broker_routing_key.clone(),
                ),
                backoff: BackoffPolicy::new(
                    config.reconnect_backoff_initial(),
                    config.reconnect_backoff_max(),
                ),
            },
            Arc::new(AmqpConnector),
        )
        .await,
    );

    let cache_store: Arc<dyn CacheStore> = match RedisStore::connect(&config.redis_url()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Redis unavailable, caching recent messages in process memory: {e}");
            Arc::new(MemoryStore::new())
        }
    };
    let cache = Arc::new(RecentMessageCache::new(
        cache_store,
        CachePolicy {
            max_messages: config.cache_max_messages,
            last_message_ttl: config.cache_last_message_ttl(),
        },
    ));

    let fanout = Arc::new(LiveFanout::start(config.fanout_write_timeout()));

    let archive = ArchiveTask::start(
        Arc::clone(&db),
        ArchivePolicy {
            interval: config.archive_interval(),
            archive_after: chrono::Duration::days(config.archive_after_days),
            keep_latest: config.cache_max_messages as u64,
        },
    );

    let ingress = Arc::new(MessageIngress::new(
        Arc::new(DatabaseMessageStore::new(db)),
        Arc::clone(&broker),
        cache,
        Arc::clone(&fanout),
    ));

    let app_state = web::AppState::new(config, ingress, Arc::clone(&fanout));

    // Viewer sockets only end once the fan-out closes them, so graceful shutdown
    // has to stop the fan-out before the server waits on open connections.
    let shutdown_fanout = Arc::clone(&fanout);
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for the shutdown signal: {e}");
        }
        info!("Shutting down...");
        shutdown_fanout.shutdown().await;
    };

    if let Err(e) = web::init_server(app_state, shutdown).await {
        error!("Server failed: {e}");
    }

    broker.close().await;
    archive.stop().await;
    fanout.shutdown().await;

    info!("Shutdown complete");
}
