//! services/api/src/web/notifications.rs
//!
//! The per-user notification inbox and the externally triggered sweep.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;
use crate::web::{Ack, ErrorBody, ErrorResponse};
use circulation_core::domain::{Notification, Principal};

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct NotificationDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationDto {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            kind: notification.kind.as_str().to_string(),
            title: notification.title,
            message: notification.message,
            read: notification.read,
            related_id: notification.related_id,
            created_at: notification.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    pub success: bool,
    pub overdue_count: usize,
    pub upcoming_count: usize,
    pub low_stock_count: usize,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the caller's notifications, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    responses((status = 200, description = "The caller's inbox", body = [NotificationDto]))
)]
pub async fn list_notifications_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let notifications = state
        .store
        .notifications_for_user(principal.user_id)
        .await?;
    Ok(Json(
        notifications
            .into_iter()
            .map(NotificationDto::from)
            .collect::<Vec<_>>(),
    ))
}

/// Mark one of the caller's notifications as read.
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked read", body = Ack),
        (status = 404, description = "Not the caller's notification", body = ErrorBody)
    )
)]
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    state
        .store
        .mark_notification_read(principal.user_id, id)
        .await?;
    Ok(Json(Ack::ok()))
}

/// Mark the caller's whole inbox as read.
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    responses((status = 200, description = "All marked read", body = Ack))
)]
pub async fn mark_all_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ErrorResponse> {
    state
        .store
        .mark_all_notifications_read(principal.user_id)
        .await?;
    Ok(Json(Ack::ok()))
}

/// Delete one of the caller's notifications.
#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Deleted", body = Ack),
        (status = 404, description = "Not the caller's notification", body = ErrorBody)
    )
)]
pub async fn delete_notification_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    state
        .store
        .delete_notification(principal.user_id, id)
        .await?;
    Ok(Json(Ack::ok()))
}

/// Run the overdue / due-soon / low-stock sweeps (staff only).
///
/// Intended to be hit by an external scheduler; the counts report matched
/// records, while the per-day dedup keeps re-runs from piling up duplicates.
#[utoipa::path(
    post,
    path = "/sweeps/run",
    responses(
        (status = 200, description = "Sweep completed", body = SweepResponse),
        (status = 403, description = "Caller is not staff", body = ErrorBody)
    )
)]
pub async fn run_sweep_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let report = state.circulation.run_sweeps(&principal).await?;
    info!(
        "sweep complete: {} overdue, {} due soon, {} low stock",
        report.overdue_count, report.due_soon_count, report.low_stock_count
    );
    Ok(Json(SweepResponse {
        success: true,
        overdue_count: report.overdue_count,
        upcoming_count: report.due_soon_count,
        low_stock_count: report.low_stock_count,
    }))
}
