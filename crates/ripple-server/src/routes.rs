//! REST boundary onto the chat core.
//!
//! These routes are the non-realtime path to the same store and delivery
//! pipeline the WebSocket gateway drives. Identity arrives in the
//! `x-user-id` header, placed there by the authentication layer in front
//! of this service.

use crate::gateway::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use ripple_core::{ChatStore, DeliveryError, StoreError};
use ripple_protocol::{Chat, Message, SendMessageBody};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Build the REST router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chats", post(create_chat).get(list_chats))
        .route("/chats/:chat_id", get(get_chat))
        .route(
            "/chats/:chat_id/messages",
            get(list_messages).post(send_message),
        )
        .route(
            "/chats/:chat_id/messages/:message_id/read",
            patch(mark_read),
        )
}

/// JSON error envelope.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Missing x-user-id header")
    }

    fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "You are not a member of this chat")
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{what} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "statusCode": self.status.as_u16(),
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::new(StatusCode::NOT_FOUND, what),
            StoreError::Unavailable(reason) => {
                warn!(error = %reason, "Store unavailable");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Store unavailable")
            }
        }
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        let status = match &err {
            DeliveryError::PermissionDenied => StatusCode::FORBIDDEN,
            DeliveryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DeliveryError::NotFound(_) => StatusCode::NOT_FOUND,
            DeliveryError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            DeliveryError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            DeliveryError::StoreTimeout => StatusCode::GATEWAY_TIMEOUT,
        };
        Self::new(status, err.to_string())
    }
}

/// Pull the acting user out of the `x-user-id` header.
fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(ApiError::unauthorized)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatRequest {
    #[serde(default)]
    name: Option<String>,
    member_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn create_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Chat>), ApiError> {
    let user = user_id(&headers)?;
    let chat = state
        .hub
        .store()
        .create_chat(body.name, &user, body.member_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_chats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Chat>>, ApiError> {
    let user = user_id(&headers)?;
    let chats = state.hub.store().chats_for_user(&user).await?;
    Ok(Json(chats))
}

async fn get_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<Json<Chat>, ApiError> {
    let user = user_id(&headers)?;
    let chat = state
        .hub
        .store()
        .chat_by_id(&chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat"))?;

    if !chat.has_member(&user) {
        return Err(ApiError::forbidden());
    }
    Ok(Json(chat))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = user_id(&headers)?;

    if !state.hub.store().is_member(&chat_id, &user).await? {
        return Err(ApiError::forbidden());
    }

    let limit = page.limit.unwrap_or(state.config.limits.default_page_size);
    let offset = page.offset.unwrap_or(0);
    let messages = state
        .hub
        .store()
        .messages_for_chat(&chat_id, limit, offset)
        .await?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let user = user_id(&headers)?;
    let message = state.hub.pipeline().send(&chat_id, &user, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((_chat_id, message_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let user = user_id(&headers)?;
    state.hub.pipeline().mark_read(&message_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_extraction() {
        let mut headers = HeaderMap::new();
        assert!(user_id(&headers).is_err());

        headers.insert("x-user-id", "  ".parse().unwrap());
        assert!(user_id(&headers).is_err());

        headers.insert("x-user-id", "alice".parse().unwrap());
        assert_eq!(user_id(&headers).unwrap(), "alice");
    }

    #[test]
    fn test_delivery_error_status_mapping() {
        let cases = [
            (DeliveryError::PermissionDenied, StatusCode::FORBIDDEN),
            (
                DeliveryError::InvalidInput("bad"),
                StatusCode::BAD_REQUEST,
            ),
            (
                DeliveryError::NotFound("message m1".into()),
                StatusCode::NOT_FOUND,
            ),
            (DeliveryError::StoreTimeout, StatusCode::GATEWAY_TIMEOUT),
            (
                DeliveryError::Store(StoreError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
