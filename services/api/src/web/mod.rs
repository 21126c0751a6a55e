//! services/api/src/web/mod.rs
//!
//! The HTTP surface: handler modules, the shared failure-to-response
//! mapping, and the master OpenAPI definition.

pub mod books;
pub mod loans;
pub mod members;
pub mod middleware;
pub mod notifications;
pub mod requests;
pub mod state;

pub use middleware::require_auth;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

use circulation_core::ports::StoreError;
use circulation_core::service::LendingError;

//=========================================================================================
// Failure Mapping
//=========================================================================================

/// JSON body returned for every failed request.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Minimal acknowledgement body for mutations with nothing else to report.
#[derive(Serialize, ToSchema)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// A failure ready to be serialized: an HTTP status plus an `{"error": ...}` body.
pub struct ErrorResponse {
    status: StatusCode,
    message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<LendingError> for ErrorResponse {
    fn from(err: LendingError) -> Self {
        let status = match &err {
            LendingError::InvalidInput(_)
            | LendingError::OutOfStock
            | LendingError::BorrowLimitReached { .. }
            | LendingError::RenewalLimitReached { .. }
            | LendingError::AlreadyOverdue
            | LendingError::AlreadyPending(_) => StatusCode::BAD_REQUEST,
            LendingError::Forbidden(_) => StatusCode::FORBIDDEN,
            LendingError::NotFound(_) => StatusCode::NOT_FOUND,
            // Absent and already-processed are deliberately the same category.
            LendingError::Store(StoreError::NotFound(_))
            | LendingError::Store(StoreError::Conflict(_)) => StatusCode::NOT_FOUND,
            LendingError::Store(StoreError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {:?}", err);
            return Self::new(status, "internal error");
        }
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for ErrorResponse {
    fn from(err: StoreError) -> Self {
        ErrorResponse::from(LendingError::Store(err))
    }
}

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        books::list_books_handler,
        books::create_book_handler,
        books::update_book_handler,
        books::delete_book_handler,
        books::list_categories_handler,
        books::create_category_handler,
        members::list_plans_handler,
        members::create_plan_handler,
        members::update_plan_handler,
        members::list_members_handler,
        members::get_member_handler,
        loans::list_loans_handler,
        loans::my_loans_handler,
        loans::issue_handler,
        loans::return_handler,
        loans::renew_handler,
        requests::submit_extension_handler,
        requests::decide_extension_handler,
        requests::list_extensions_handler,
        requests::submit_renewal_handler,
        requests::decide_renewal_handler,
        requests::list_renewals_handler,
        notifications::list_notifications_handler,
        notifications::mark_read_handler,
        notifications::mark_all_read_handler,
        notifications::delete_notification_handler,
        notifications::run_sweep_handler,
    ),
    components(schemas(
        ErrorBody,
        Ack,
        books::BookDto,
        books::CreateBookRequest,
        books::UpdateBookRequest,
        books::CategoryDto,
        books::CreateCategoryRequest,
        members::PlanDto,
        members::PlanPayload,
        members::MemberDto,
        loans::LoanDto,
        loans::LoanViewDto,
        loans::IssueRequest,
        loans::IssueResponse,
        loans::ReturnResponse,
        loans::RenewResponse,
        requests::ExtensionRequestDto,
        requests::RenewalRequestDto,
        requests::SubmitExtensionRequest,
        requests::SubmitRenewalRequest,
        requests::DecisionRequest,
        requests::SubmitResponse,
        requests::DecisionResponse,
        notifications::NotificationDto,
        notifications::SweepResponse,
    )),
    tags(
        (name = "Circulation API", description = "Book cataloging, lending, request workflow and notifications.")
    )
)]
pub struct ApiDoc;
