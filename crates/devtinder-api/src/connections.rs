//! HTTP surface of the connection state machine. Handlers stay thin: check
//! the target user exists, invoke the store operation, map the typed error
//! to the `{success, message}` envelope.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use devtinder_db::{Database, StoreError};
use devtinder_types::api::{Claims, ConnectionsResponse, RequestsResponse, StatusMessage};
use devtinder_types::models::UserSummary;

use crate::auth::AppState;
use crate::error::{ApiError, join_error};

pub async fn request_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let requester = claims.sub;

    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        if !db.user_exists(user_id)? {
            return Err(StoreError::UserNotFound.into());
        }
        db.request_connection(requester, user_id)?;
        Ok(())
    })
    .await
    .map_err(join_error)??;

    Ok(Json(StatusMessage {
        success: true,
        message: "Connection request sent successfully".into(),
    }))
}

pub async fn accept_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let recipient = claims.sub;

    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        if !db.user_exists(user_id)? {
            return Err(StoreError::UserNotFound.into());
        }
        db.accept_connection(recipient, user_id)?;
        Ok(())
    })
    .await
    .map_err(join_error)??;

    Ok(Json(StatusMessage {
        success: true,
        message: "Connection request accepted".into(),
    }))
}

pub async fn reject_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let recipient = claims.sub;

    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        if !db.user_exists(user_id)? {
            return Err(StoreError::UserNotFound.into());
        }
        db.reject_connection(recipient, user_id)?;
        Ok(())
    })
    .await
    .map_err(join_error)??;

    Ok(Json(StatusMessage {
        success: true,
        message: "Connection request rejected".into(),
    }))
}

pub async fn remove_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;

    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        if !db.user_exists(user_id)? {
            return Err(StoreError::UserNotFound.into());
        }
        db.remove_connection(caller, user_id)?;
        Ok(())
    })
    .await
    .map_err(join_error)??;

    Ok(Json(StatusMessage {
        success: true,
        message: "Connection removed successfully".into(),
    }))
}

pub async fn get_connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user = claims.sub;

    let connections = tokio::task::spawn_blocking(move || -> Result<Vec<UserSummary>, ApiError> {
        let ids = db.list_accepted(user)?;
        Ok(summaries(&db, ids)?)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(ConnectionsResponse {
        success: true,
        connections,
    }))
}

pub async fn get_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user = claims.sub;

    let requests = tokio::task::spawn_blocking(move || -> Result<Vec<UserSummary>, ApiError> {
        let ids = db.list_pending_incoming(user)?;
        Ok(summaries(&db, ids)?)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(RequestsResponse {
        success: true,
        requests,
    }))
}

pub async fn get_sent_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user = claims.sub;

    let requests = tokio::task::spawn_blocking(move || -> Result<Vec<UserSummary>, ApiError> {
        let ids = db.list_pending_outgoing(user)?;
        Ok(summaries(&db, ids)?)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(RequestsResponse {
        success: true,
        requests,
    }))
}

/// Resolve other-party IDs into `{id, username}` summaries. Users deleted
/// since the record was written are skipped rather than failing the page.
fn summaries(db: &Database, ids: Vec<Uuid>) -> Result<Vec<UserSummary>, StoreError> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(row) = db.get_user_by_id(id)? {
            out.push(UserSummary {
                id,
                username: row.username,
            });
        }
    }
    Ok(out)
}
