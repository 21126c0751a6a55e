//! services/api/src/web/requests.rs
//!
//! The extension/renewal request workflow: member submissions and staff
//! decisions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::state::AppState;
use crate::web::{ErrorBody, ErrorResponse};
use circulation_core::domain::{
    ExtensionRequest, Principal, RenewalRequest, RequestStatus,
};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ExtensionRequestDto {
    pub id: Uuid,
    pub borrow_record_id: Uuid,
    pub member_id: Uuid,
    pub requested_days: i32,
    pub reason: String,
    pub status: String,
    pub librarian_id: Option<Uuid>,
    pub librarian_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ExtensionRequest> for ExtensionRequestDto {
    fn from(request: ExtensionRequest) -> Self {
        Self {
            id: request.id,
            borrow_record_id: request.borrow_record_id,
            member_id: request.member_id,
            requested_days: request.requested_days,
            reason: request.reason,
            status: request.status.as_str().to_string(),
            librarian_id: request.librarian_id,
            librarian_reason: request.librarian_reason,
            processed_at: request.processed_at,
            created_at: request.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RenewalRequestDto {
    pub id: Uuid,
    pub borrow_record_id: Uuid,
    pub member_id: Uuid,
    pub status: String,
    pub librarian_id: Option<Uuid>,
    pub librarian_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<RenewalRequest> for RenewalRequestDto {
    fn from(request: RenewalRequest) -> Self {
        Self {
            id: request.id,
            borrow_record_id: request.borrow_record_id,
            member_id: request.member_id,
            status: request.status.as_str().to_string(),
            librarian_id: request.librarian_id,
            librarian_reason: request.librarian_reason,
            processed_at: request.processed_at,
            created_at: request.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitExtensionRequest {
    pub borrow_record_id: Uuid,
    pub requested_days: i32,
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitRenewalRequest {
    pub borrow_record_id: Uuid,
}

/// Staff verdict payload. `status` must be "approved" or "rejected".
#[derive(Deserialize, ToSchema)]
pub struct DecisionRequest {
    pub status: String,
    pub reason: Option<String>,
}

impl DecisionRequest {
    fn approve(&self) -> Result<bool, ErrorResponse> {
        match RequestStatus::parse(&self.status) {
            Ok(RequestStatus::Approved) => Ok(true),
            Ok(RequestStatus::Rejected) => Ok(false),
            _ => Err(ErrorResponse::bad_request("Invalid request parameters")),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SubmitResponse {
    pub success: bool,
    pub request_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct DecisionResponse {
    pub success: bool,
    pub status: String,
    pub new_due_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize, IntoParams)]
pub struct RequestFilter {
    /// Optional status filter: pending, approved or rejected.
    pub status: Option<String>,
}

impl RequestFilter {
    fn parse(&self) -> Result<Option<RequestStatus>, ErrorResponse> {
        match &self.status {
            None => Ok(None),
            Some(raw) => RequestStatus::parse(raw)
                .map(Some)
                .map_err(|_| ErrorResponse::bad_request("Invalid status filter")),
        }
    }
}

fn require_staff(principal: &Principal) -> Result<(), ErrorResponse> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(ErrorResponse::forbidden("Forbidden: Staff access required"))
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Submit an extension request for one of the caller's borrows.
#[utoipa::path(
    post,
    path = "/extension-requests",
    request_body = SubmitExtensionRequest,
    responses(
        (status = 201, description = "Request submitted", body = SubmitResponse),
        (status = 400, description = "Invalid days/reason or already pending", body = ErrorBody),
        (status = 404, description = "Not the caller's issued record", body = ErrorBody)
    )
)]
pub async fn submit_extension_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<SubmitExtensionRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let request = state
        .circulation
        .submit_extension_request(
            &principal,
            req.borrow_record_id,
            req.requested_days,
            &req.reason,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            request_id: request.id,
        }),
    ))
}

/// Decide a pending extension request (staff only).
#[utoipa::path(
    post,
    path = "/extension-requests/{id}/decision",
    request_body = DecisionRequest,
    params(("id" = Uuid, Path, description = "Extension request id")),
    responses(
        (status = 200, description = "Request decided", body = DecisionResponse),
        (status = 403, description = "Caller is not staff", body = ErrorBody),
        (status = 404, description = "Request missing or already processed", body = ErrorBody)
    )
)]
pub async fn decide_extension_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let approve = req.approve()?;
    let outcome = state
        .circulation
        .decide_extension_request(&principal, id, approve, req.reason)
        .await?;
    Ok(Json(DecisionResponse {
        success: true,
        status: outcome.status.as_str().to_string(),
        new_due_date: outcome.new_due_date,
    }))
}

/// List extension requests, optionally filtered by status (staff only).
#[utoipa::path(
    get,
    path = "/extension-requests",
    params(RequestFilter),
    responses(
        (status = 200, description = "Matching requests", body = [ExtensionRequestDto]),
        (status = 403, description = "Caller is not staff", body = ErrorBody)
    )
)]
pub async fn list_extensions_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<RequestFilter>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_staff(&principal)?;
    let status = filter.parse()?;
    let requests = state.store.list_extension_requests(status).await?;
    Ok(Json(
        requests
            .into_iter()
            .map(ExtensionRequestDto::from)
            .collect::<Vec<_>>(),
    ))
}

/// Submit a renewal request for one of the caller's borrows.
#[utoipa::path(
    post,
    path = "/renewal-requests",
    request_body = SubmitRenewalRequest,
    responses(
        (status = 201, description = "Request submitted", body = SubmitResponse),
        (status = 400, description = "Limit reached, overdue or already pending", body = ErrorBody),
        (status = 404, description = "Not the caller's issued record", body = ErrorBody)
    )
)]
pub async fn submit_renewal_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<SubmitRenewalRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let request = state
        .circulation
        .submit_renewal_request(&principal, req.borrow_record_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            request_id: request.id,
        }),
    ))
}

/// Decide a pending renewal request (staff only).
#[utoipa::path(
    post,
    path = "/renewal-requests/{id}/decision",
    request_body = DecisionRequest,
    params(("id" = Uuid, Path, description = "Renewal request id")),
    responses(
        (status = 200, description = "Request decided", body = DecisionResponse),
        (status = 403, description = "Caller is not staff", body = ErrorBody),
        (status = 404, description = "Request missing or already processed", body = ErrorBody)
    )
)]
pub async fn decide_renewal_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let approve = req.approve()?;
    let outcome = state
        .circulation
        .decide_renewal_request(&principal, id, approve, req.reason)
        .await?;
    Ok(Json(DecisionResponse {
        success: true,
        status: outcome.status.as_str().to_string(),
        new_due_date: outcome.new_due_date,
    }))
}

/// List renewal requests, optionally filtered by status (staff only).
#[utoipa::path(
    get,
    path = "/renewal-requests",
    params(RequestFilter),
    responses(
        (status = 200, description = "Matching requests", body = [RenewalRequestDto]),
        (status = 403, description = "Caller is not staff", body = ErrorBody)
    )
)]
pub async fn list_renewals_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<RequestFilter>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_staff(&principal)?;
    let status = filter.parse()?;
    let requests = state.store.list_renewal_requests(status).await?;
    Ok(Json(
        requests
            .into_iter()
            .map(RenewalRequestDto::from)
            .collect::<Vec<_>>(),
    ))
}
