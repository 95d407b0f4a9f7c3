use crate::controller::{chat_controller, health_check_controller};
use crate::ws::handler::ws_handler;
use crate::{params, AppState};
use axum::{
    routing::{get, post},
    Json, Router,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Heydays Chat API"
        ),
        paths(
            chat_controller::send,
            chat_controller::messages,
            chat_controller::last_message,
            health_check_controller::health_check,
        ),
        components(
            schemas(
                events::MessageRecord,
                domain::MessageHistory,
                params::chat::SendParams,
            )
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "heydays", description = "Heydays chat message API")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// Callers identify themselves with the upstream-asserted user id header.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id_header",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    crate::extractors::authenticated_user::USER_ID_HEADER,
                    "Id of the calling user, set by the authenticating proxy",
                ))),
            )
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(chat_routes(app_state.clone()))
        .merge(health_routes())
        .merge(ws_routes(app_state))
        .route("/api-docs/openapi.json", get(openapi_json))
}

fn chat_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/chat/send", post(chat_controller::send))
        .route("/chat/:chat_id/messages", get(chat_controller::messages))
        .route(
            "/chat/:chat_id/last_message",
            get(chat_controller::last_message),
        )
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn ws_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
