//! crates/circulation_core/src/domain.rs
//!
//! Defines the pure, core data structures for the library circulation system.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Closed Status Enumerations
//=========================================================================================

/// Error returned when a stored status string does not match any known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle state of a borrow record.
///
/// `Overdue` is a derived display state: stored records are only ever
/// `Issued` or `Returned`, and [`BorrowRecord::effective_status`] computes
/// `Overdue` from the due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowStatus {
    Issued,
    Returned,
    Overdue,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Issued => "issued",
            BorrowStatus::Returned => "returned",
            BorrowStatus::Overdue => "overdue",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ParseStatusError> {
        match value {
            "issued" => Ok(BorrowStatus::Issued),
            "returned" => Ok(BorrowStatus::Returned),
            "overdue" => Ok(BorrowStatus::Overdue),
            other => Err(ParseStatusError {
                kind: "borrow status",
                value: other.to_string(),
            }),
        }
    }
}

/// State of an extension or renewal request. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ParseStatusError> {
        match value {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(ParseStatusError {
                kind: "request status",
                value: other.to_string(),
            }),
        }
    }
}

/// The two kinds of member-submitted requests, which share one protocol shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Extension,
    Renewal,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Extension => "extension",
            RequestKind::Renewal => "renewal",
        }
    }
}

/// Tag identifying why a notification was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Overdue,
    DueReminder,
    LowStock,
    ExtensionRequested,
    ExtensionApproved,
    ExtensionRejected,
    RenewalRequested,
    RenewalApproved,
    RenewalRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Overdue => "overdue",
            NotificationKind::DueReminder => "due_reminder",
            NotificationKind::LowStock => "low_stock",
            NotificationKind::ExtensionRequested => "extension_requested",
            NotificationKind::ExtensionApproved => "extension_approved",
            NotificationKind::ExtensionRejected => "extension_rejected",
            NotificationKind::RenewalRequested => "renewal_requested",
            NotificationKind::RenewalApproved => "renewal_approved",
            NotificationKind::RenewalRejected => "renewal_rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ParseStatusError> {
        match value {
            "overdue" => Ok(NotificationKind::Overdue),
            "due_reminder" => Ok(NotificationKind::DueReminder),
            "low_stock" => Ok(NotificationKind::LowStock),
            "extension_requested" => Ok(NotificationKind::ExtensionRequested),
            "extension_approved" => Ok(NotificationKind::ExtensionApproved),
            "extension_rejected" => Ok(NotificationKind::ExtensionRejected),
            "renewal_requested" => Ok(NotificationKind::RenewalRequested),
            "renewal_approved" => Ok(NotificationKind::RenewalApproved),
            "renewal_rejected" => Ok(NotificationKind::RenewalRejected),
            other => Err(ParseStatusError {
                kind: "notification kind",
                value: other.to_string(),
            }),
        }
    }
}

//=========================================================================================
// Identity
//=========================================================================================

/// Application role granted to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Librarian,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Librarian => "librarian",
            Role::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ParseStatusError> {
        match value {
            "admin" => Ok(Role::Admin),
            "librarian" => Ok(Role::Librarian),
            "member" => Ok(Role::Member),
            other => Err(ParseStatusError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// The caller's identity, resolved once per request at the boundary and
/// passed explicitly into every operation.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Admins and librarians count as staff.
    pub fn is_staff(&self) -> bool {
        self.has_role(Role::Admin) || self.has_role(Role::Librarian)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

//=========================================================================================
// Catalog Entities
//=========================================================================================

/// A book category.
#[derive(Debug, Clone)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// A catalog entry. `available_copies` must stay within
/// `0..=total_copies`; issuing decrements it and returning increments it.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a new catalog entry.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub total_copies: i32,
}

//=========================================================================================
// Membership Entities
//=========================================================================================

/// A membership tier. Bounds concurrent borrows and sets the per-day fine rate.
#[derive(Debug, Clone)]
pub struct MembershipPlan {
    pub id: Uuid,
    pub name: String,
    pub max_books_allowed: i32,
    pub fine_per_day: f64,
    pub duration_days: i32,
    pub annual_fee: f64,
}

#[derive(Debug, Clone)]
pub struct NewMembershipPlan {
    pub name: String,
    pub max_books_allowed: i32,
    pub fine_per_day: f64,
    pub duration_days: i32,
    pub annual_fee: f64,
}

/// A library member. Members without a plan fall back to the default
/// borrow limit and fine rate.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub membership_plan_id: Option<Uuid>,
    pub membership_start_date: Option<DateTime<Utc>>,
    pub membership_expiry_date: Option<DateTime<Utc>>,
}

//=========================================================================================
// Borrowing
//=========================================================================================

/// One lending of one copy of a book to one member.
///
/// Created at issue time, mutated by renew/extend/return, never deleted.
#[derive(Debug, Clone)]
pub struct BorrowRecord {
    pub id: Uuid,
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub issued_by: Option<Uuid>,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub fine_amount: f64,
    pub renewal_count: i32,
    pub max_renewals: i32,
}

impl BorrowRecord {
    /// An issued record past its due date is overdue.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == BorrowStatus::Issued && now > self.due_date
    }

    /// The status to display: `Overdue` is derived, never stored.
    pub fn effective_status(&self, now: DateTime<Utc>) -> BorrowStatus {
        if self.is_overdue(now) {
            BorrowStatus::Overdue
        } else {
            self.status
        }
    }

    pub fn renewals_remaining(&self) -> i32 {
        (self.max_renewals - self.renewal_count).max(0)
    }
}

/// Fields required to issue a book.
#[derive(Debug, Clone)]
pub struct NewBorrow {
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub issued_by: Uuid,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub max_renewals: i32,
}

//=========================================================================================
// Requests
//=========================================================================================

/// A member's request to extend a borrow by a chosen number of days.
#[derive(Debug, Clone)]
pub struct ExtensionRequest {
    pub id: Uuid,
    pub borrow_record_id: Uuid,
    pub member_id: Uuid,
    pub requested_days: i32,
    pub reason: String,
    pub status: RequestStatus,
    pub librarian_id: Option<Uuid>,
    pub librarian_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A member's request to renew a borrow for the standard renewal period.
#[derive(Debug, Clone)]
pub struct RenewalRequest {
    pub id: Uuid,
    pub borrow_record_id: Uuid,
    pub member_id: Uuid,
    pub status: RequestStatus,
    pub librarian_id: Option<Uuid>,
    pub librarian_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Staff verdict applied to a pending request.
#[derive(Debug, Clone)]
pub struct RequestDecision {
    pub approve: bool,
    pub staff_id: Uuid,
    pub reason: Option<String>,
    pub processed_at: DateTime<Utc>,
}

//=========================================================================================
// Notifications
//=========================================================================================

/// A per-user inbox row created by system events.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<Uuid>,
}
