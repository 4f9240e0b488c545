use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use devtinder_db::StoreError;
use devtinder_types::api::{
    Claims, MessageDto, MessagesResponse, Pagination, SendMessageRequest, SentMessageResponse,
    UnreadCountResponse,
};
use devtinder_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::{ApiError, join_error};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

/// Paginated conversation history, anchored to the newest end: page 1 is
/// the most recent `limit` messages in chronological order. Fetching a page
/// marks the conversation read for the caller.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 200);

    let (messages, total, pages) = tokio::task::spawn_blocking(move || {
        let result = db.list_messages(caller, user_id, page, limit)?;
        db.mark_conversation_read(caller, user_id)?;
        Ok::<_, StoreError>(result)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(MessagesResponse {
        success: true,
        messages: messages.into_iter().map(MessageDto::from).collect(),
        pagination: Pagination {
            page,
            limit,
            total,
            pages,
        },
    }))
}

/// HTTP send path. Persists through the same idempotent append as the
/// socket path — the two firing for one logical send collapse to a single
/// row — then pushes `message-delivered` to the recipient's live channel.
/// The HTTP response itself is the sender's confirmation.
pub async fn send_message(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let sender = claims.sub;

    let message = tokio::task::spawn_blocking(move || {
        if !db.user_exists(user_id)? {
            return Err(StoreError::UserNotFound);
        }
        db.append_message(sender, user_id, &req.content)
    })
    .await
    .map_err(join_error)?
    .map_err(|e| match e {
        StoreError::NotConnected => {
            ApiError::forbidden("You can only message users you are connected with")
        }
        other => other.into(),
    })?;

    state
        .dispatcher
        .send_to_user(
            user_id,
            GatewayEvent::MessageDelivered {
                id: message.id,
                sender: message.sender,
                content: message.content.clone(),
                timestamp: message.created_at,
            },
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(SentMessageResponse {
            success: true,
            message: MessageDto::from(message),
        }),
    ))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;

    let unread_count = tokio::task::spawn_blocking(move || db.count_unread(caller))
        .await
        .map_err(join_error)??;

    Ok(Json(UnreadCountResponse {
        success: true,
        unread_count,
    }))
}
