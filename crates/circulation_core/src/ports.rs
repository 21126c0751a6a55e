//! crates/circulation_core/src/ports.rs
//!
//! Defines the storage contract (trait) for the circulation core.
//! The trait forms the boundary of the hexagonal architecture, keeping the
//! core independent of the concrete database behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Book, BorrowRecord, Category, ExtensionRequest, MemberProfile, MembershipPlan, NewBook,
    NewBorrow, NewMembershipPlan, NewNotification, Notification, RenewalRequest, RequestDecision,
    RequestStatus, Role,
};

//=========================================================================================
// Port Error and Result Types
//=========================================================================================

/// Error type for all store operations, abstracting the concrete backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The targeted row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The targeted row exists but is not in the state the operation requires
    /// (already processed, out of stock, already returned).
    #[error("conflict: {0}")]
    Conflict(String),
    /// The underlying store rejected the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Convenience alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

//=========================================================================================
// Storage Port
//=========================================================================================

/// Storage contract for the circulation system.
///
/// Multi-row state changes (issue, return, request decision) are single
/// composite methods so an adapter can wrap each one in one transaction;
/// a crash can never leave the paired rows inconsistent.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    // --- Identity ---

    /// Resolves an opaque bearer token to a user id. Unknown or expired
    /// tokens are `NotFound`.
    async fn resolve_token(&self, token: &str) -> StoreResult<Uuid>;

    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>>;

    /// Every user holding the admin role, for low-stock fan-out.
    async fn admin_user_ids(&self) -> StoreResult<Vec<Uuid>>;

    // --- Catalog ---

    async fn book(&self, id: Uuid) -> StoreResult<Book>;

    /// Batch fetch for map-by-id joins; missing ids are silently skipped.
    async fn books_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Book>>;

    async fn list_books(&self) -> StoreResult<Vec<Book>>;

    async fn create_book(&self, book: NewBook) -> StoreResult<Book>;

    async fn update_book(&self, book: Book) -> StoreResult<Book>;

    async fn delete_book(&self, id: Uuid) -> StoreResult<()>;

    /// Books with `0 < available_copies < threshold`.
    async fn low_stock_books(&self, threshold: i32) -> StoreResult<Vec<Book>>;

    async fn list_categories(&self) -> StoreResult<Vec<Category>>;

    async fn create_category(&self, name: &str, description: Option<&str>)
        -> StoreResult<Category>;

    // --- Membership ---

    async fn plan(&self, id: Uuid) -> StoreResult<MembershipPlan>;

    async fn plans_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<MembershipPlan>>;

    async fn list_plans(&self) -> StoreResult<Vec<MembershipPlan>>;

    async fn create_plan(&self, plan: NewMembershipPlan) -> StoreResult<MembershipPlan>;

    async fn update_plan(&self, plan: MembershipPlan) -> StoreResult<MembershipPlan>;

    async fn profile(&self, id: Uuid) -> StoreResult<MemberProfile>;

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<MemberProfile>>;

    async fn list_profiles(&self) -> StoreResult<Vec<MemberProfile>>;

    // --- Borrow records ---

    async fn borrow_record(&self, id: Uuid) -> StoreResult<BorrowRecord>;

    async fn borrow_records_for_member(&self, member_id: Uuid) -> StoreResult<Vec<BorrowRecord>>;

    async fn list_borrow_records(&self) -> StoreResult<Vec<BorrowRecord>>;

    /// How many records the member currently has in the issued state.
    async fn issued_count_for_member(&self, member_id: Uuid) -> StoreResult<i64>;

    /// Issued records whose due date is strictly before `cutoff`.
    async fn issued_due_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<BorrowRecord>>;

    /// Issued records with `from <= due_date <= to`.
    async fn issued_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BorrowRecord>>;

    /// Inserts the borrow record and decrements the book's available copies
    /// in one transaction. `Conflict` when no copy is available.
    async fn create_borrow(&self, borrow: NewBorrow) -> StoreResult<BorrowRecord>;

    /// Marks the record returned with the given fine and increments the
    /// book's available copies in one transaction. `Conflict` when the
    /// record is not in the issued state.
    async fn complete_return(
        &self,
        record_id: Uuid,
        returned_at: DateTime<Utc>,
        fine_amount: f64,
    ) -> StoreResult<BorrowRecord>;

    /// Advances the due date and renewal count of an issued record.
    async fn renew_borrow(
        &self,
        record_id: Uuid,
        new_due_date: DateTime<Utc>,
        new_renewal_count: i32,
    ) -> StoreResult<BorrowRecord>;

    // --- Extension requests ---

    async fn create_extension_request(
        &self,
        borrow_record_id: Uuid,
        member_id: Uuid,
        requested_days: i32,
        reason: &str,
    ) -> StoreResult<ExtensionRequest>;

    async fn pending_extension_exists(&self, borrow_record_id: Uuid) -> StoreResult<bool>;

    /// Applies a staff decision to a pending extension request. On approval
    /// the borrow record's due date advances by the request's
    /// `requested_days` in the same transaction, guarded on the request
    /// still being pending: the first decision wins and later ones are
    /// `NotFound`. Returns the resolved request and, on approval, the
    /// updated borrow record.
    async fn resolve_extension_request(
        &self,
        request_id: Uuid,
        decision: &RequestDecision,
    ) -> StoreResult<(ExtensionRequest, Option<BorrowRecord>)>;

    async fn list_extension_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<ExtensionRequest>>;

    // --- Renewal requests ---

    async fn create_renewal_request(
        &self,
        borrow_record_id: Uuid,
        member_id: Uuid,
    ) -> StoreResult<RenewalRequest>;

    async fn pending_renewal_exists(&self, borrow_record_id: Uuid) -> StoreResult<bool>;

    /// Same contract as [`LibraryStore::resolve_extension_request`], except
    /// approval advances the due date by `grant_days` and increments the
    /// renewal count.
    async fn resolve_renewal_request(
        &self,
        request_id: Uuid,
        decision: &RequestDecision,
        grant_days: i64,
    ) -> StoreResult<(RenewalRequest, Option<BorrowRecord>)>;

    async fn list_renewal_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<RenewalRequest>>;

    // --- Notifications ---

    async fn create_notification(&self, notification: NewNotification)
        -> StoreResult<Notification>;

    /// Inserts unless a notification with the same user, kind and related id
    /// already exists at or after `since`. Returns whether a row was
    /// inserted. Used by the sweeps to deduplicate per day bucket.
    async fn create_notification_once(
        &self,
        notification: NewNotification,
        since: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// The user's inbox, newest first.
    async fn notifications_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Notification>>;

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<()>;

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> StoreResult<()>;

    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> StoreResult<()>;
}
