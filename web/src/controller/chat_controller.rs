use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::params::chat::{HistoryParams, SendParams};
use crate::{AppState, Error};
use domain::Id;
use log::*;

/// POST send a message to a chat
#[utoipa::path(
    post,
    path = "/chat/send",
    request_body = SendParams,
    responses(
        (status = 200, description = "Message persisted; queuing and live delivery are best-effort", body = events::MessageRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not a member of the chat"),
        (status = 422, description = "Unprocessable Entity"),
        (status = 500, description = "Message could not be stored")
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub async fn send(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Json(params): Json<SendParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST message from user {user_id} to chat {}", params.chat_id);

    let record = app_state
        .ingress
        .send(user_id, params.chat_id, params.content)
        .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), record)))
}

/// GET a page of a chat's messages, newest first
#[utoipa::path(
    get,
    path = "/chat/{chat_id}/messages",
    params(
        ("chat_id" = i64, Path, description = "Chat to read"),
        HistoryParams
    ),
    responses(
        (status = 200, description = "Successfully retrieved a page of messages", body = domain::MessageHistory),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not a member of the chat"),
        (status = 422, description = "Page or limit out of range")
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub async fn messages(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(chat_id): Path<Id>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET messages of chat {chat_id} for user {user_id}: {params:?}");

    let history = app_state
        .ingress
        .history(user_id, chat_id, params.page(), params.limit())
        .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), history)))
}

/// GET the newest message of a chat
#[utoipa::path(
    get,
    path = "/chat/{chat_id}/last_message",
    params(
        ("chat_id" = i64, Path, description = "Chat to read")
    ),
    responses(
        (status = 200, description = "Successfully retrieved the newest message", body = events::MessageRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not a member of the chat"),
        (status = 404, description = "The chat has no messages")
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub async fn last_message(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(chat_id): Path<Id>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET last message of chat {chat_id} for user {user_id}");

    match app_state.ingress.latest(user_id, chat_id).await? {
        Some(record) => Ok(Json(ApiResponse::new(StatusCode::OK.into(), record))),
        None => Err(Error::not_found()),
    }
}
