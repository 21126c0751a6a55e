//! services/api/src/web/loans.rs
//!
//! Borrow record endpoints: issuing, returning, renewing and history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;
use crate::web::{ErrorBody, ErrorResponse};
use circulation_core::domain::{BorrowRecord, Principal};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct LoanDto {
    pub id: Uuid,
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub issued_by: Option<Uuid>,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    /// Display status: an issued record past its due date reads "overdue".
    pub status: String,
    pub fine_amount: f64,
    pub renewal_count: i32,
    pub max_renewals: i32,
}

impl LoanDto {
    fn from_record(record: BorrowRecord, now: DateTime<Utc>) -> Self {
        let status = record.effective_status(now).as_str().to_string();
        Self {
            id: record.id,
            book_id: record.book_id,
            member_id: record.member_id,
            issued_by: record.issued_by,
            issue_date: record.issue_date,
            due_date: record.due_date,
            return_date: record.return_date,
            status,
            fine_amount: record.fine_amount,
            renewal_count: record.renewal_count,
            max_renewals: record.max_renewals,
        }
    }
}

/// A borrow record joined with its book and member for staff listings.
#[derive(Serialize, ToSchema)]
pub struct LoanViewDto {
    #[serde(flatten)]
    pub loan: LoanDto,
    pub book_title: Option<String>,
    pub book_author: Option<String>,
    pub member_email: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct IssueRequest {
    pub book_id: Uuid,
    pub member_id: Uuid,
    /// Defaults to the configured lending period when omitted.
    pub lending_days: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct IssueResponse {
    pub success: bool,
    pub record: LoanDto,
}

#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub success: bool,
    pub fine_amount: f64,
    pub record: LoanDto,
}

#[derive(Serialize, ToSchema)]
pub struct RenewResponse {
    pub success: bool,
    pub new_due_date: DateTime<Utc>,
    pub renewals_remaining: i32,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List every borrow record with book and member details (staff only).
#[utoipa::path(
    get,
    path = "/loans",
    responses(
        (status = 200, description = "All borrow records", body = [LoanViewDto]),
        (status = 403, description = "Caller is not staff", body = ErrorBody)
    )
)]
pub async fn list_loans_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ErrorResponse> {
    if !principal.is_staff() {
        return Err(ErrorResponse::forbidden("Forbidden: Staff access required"));
    }
    let records = state.store.list_borrow_records().await?;

    // Assemble the joined view with explicit map-by-id lookups.
    let mut book_ids: Vec<Uuid> = records.iter().map(|r| r.book_id).collect();
    book_ids.sort_unstable();
    book_ids.dedup();
    let books: HashMap<Uuid, (String, String)> = state
        .store
        .books_by_ids(&book_ids)
        .await?
        .into_iter()
        .map(|b| (b.id, (b.title, b.author)))
        .collect();

    let mut member_ids: Vec<Uuid> = records.iter().map(|r| r.member_id).collect();
    member_ids.sort_unstable();
    member_ids.dedup();
    let members: HashMap<Uuid, String> = state
        .store
        .profiles_by_ids(&member_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p.email))
        .collect();

    let now = Utc::now();
    let views: Vec<LoanViewDto> = records
        .into_iter()
        .map(|record| {
            let book = books.get(&record.book_id);
            let member_email = members.get(&record.member_id).cloned();
            LoanViewDto {
                book_title: book.map(|(title, _)| title.clone()),
                book_author: book.map(|(_, author)| author.clone()),
                member_email,
                loan: LoanDto::from_record(record, now),
            }
        })
        .collect();
    Ok(Json(views))
}

/// List the caller's own borrow records.
#[utoipa::path(
    get,
    path = "/loans/mine",
    responses((status = 200, description = "The caller's borrow records", body = [LoanDto]))
)]
pub async fn my_loans_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let records = state
        .store
        .borrow_records_for_member(principal.user_id)
        .await?;
    let now = Utc::now();
    Ok(Json(
        records
            .into_iter()
            .map(|r| LoanDto::from_record(r, now))
            .collect::<Vec<_>>(),
    ))
}

/// Issue a book to a member (staff only).
#[utoipa::path(
    post,
    path = "/loans",
    request_body = IssueRequest,
    responses(
        (status = 201, description = "Book issued", body = IssueResponse),
        (status = 400, description = "Out of stock or borrow limit reached", body = ErrorBody),
        (status = 403, description = "Caller is not staff", body = ErrorBody),
        (status = 404, description = "Unknown book or member", body = ErrorBody)
    )
)]
pub async fn issue_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<IssueRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let lending_days = req
        .lending_days
        .unwrap_or(state.config.default_lending_days);
    let record = state
        .circulation
        .issue_book(&principal, req.book_id, req.member_id, lending_days)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(IssueResponse {
            success: true,
            record: LoanDto::from_record(record, Utc::now()),
        }),
    ))
}

/// Return an issued book, computing any overdue fine (staff only).
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    params(("id" = Uuid, Path, description = "Borrow record id")),
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 403, description = "Caller is not staff", body = ErrorBody),
        (status = 404, description = "Record missing or already returned", body = ErrorBody)
    )
)]
pub async fn return_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let record = state.circulation.return_book(&principal, id).await?;
    Ok(Json(ReturnResponse {
        success: true,
        fine_amount: record.fine_amount,
        record: LoanDto::from_record(record, Utc::now()),
    }))
}

/// Renew the caller's own borrow for the standard renewal period.
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    params(("id" = Uuid, Path, description = "Borrow record id")),
    responses(
        (status = 200, description = "Borrow renewed", body = RenewResponse),
        (status = 400, description = "Renewal limit reached or overdue", body = ErrorBody),
        (status = 404, description = "Not the caller's issued record", body = ErrorBody)
    )
)]
pub async fn renew_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let record = state.circulation.renew_book(&principal, id).await?;
    Ok(Json(RenewResponse {
        success: true,
        new_due_date: record.due_date,
        renewals_remaining: record.renewals_remaining(),
    }))
}
