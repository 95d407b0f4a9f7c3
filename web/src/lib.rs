use axum::http::{header, HeaderValue, Method};
use domain::MessageIngress;
use fanout::LiveFanout;
use log::*;
use service::config::Config;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

mod controller;
mod error;
mod extractors;
mod params;
pub mod router;
mod ws;

pub use error::{Error, Result};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ingress: Arc<MessageIngress>,
    pub fanout: Arc<LiveFanout>,
}

impl AppState {
    pub fn new(config: Config, ingress: Arc<MessageIngress>, fanout: Arc<LiveFanout>) -> Self {
        Self {
            config,
            ingress,
            fanout,
        }
    }
}

/// Serves the HTTP and websocket surface until `shutdown` resolves.
pub async fn init_server(
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let host = app_state.config.interface.clone();
    let port = app_state.config.port;
    let cors = cors_layer(&app_state.config);

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("Server starting... listening for connections on http://{host}:{port}");

    let app = router::define_routes(app_state).layer(cors);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(extractors::authenticated_user::USER_ID_HEADER),
        ])
}
