//! crates/circulation_core/src/service.rs
//!
//! The circulation service: issuing, returning and renewing books, the
//! extension/renewal request workflow, and notification sweeps. All storage
//! goes through the [`LibraryStore`] port; every caller identity arrives as
//! an explicit [`Principal`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use uuid::Uuid;

use crate::domain::{
    BorrowRecord, BorrowStatus, ExtensionRequest, NewBorrow, NewNotification, NotificationKind,
    Principal, RenewalRequest, RequestDecision, RequestKind, RequestStatus,
};
use crate::lending;
use crate::ports::{LibraryStore, StoreError, StoreResult};

//=========================================================================================
// Error Taxonomy
//=========================================================================================

/// Failures surfaced by circulation operations.
///
/// `NotFound` deliberately collapses "never existed" and "already
/// processed": callers are not told which.
#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("no copies of this book are available")]
    OutOfStock,

    #[error("member has reached the maximum limit of {max} books")]
    BorrowLimitReached { max: i32 },

    #[error("maximum renewals ({max}) reached")]
    RenewalLimitReached { max: i32 },

    #[error("cannot renew overdue books")]
    AlreadyOverdue,

    #[error("a pending {} request already exists for this borrow record", .0.as_str())]
    AlreadyPending(RequestKind),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LendingResult<T> = Result<T, LendingError>;

//=========================================================================================
// Operation Outcomes
//=========================================================================================

/// Result of a staff decision on a request.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub status: RequestStatus,
    /// Present only when the request was approved.
    pub new_due_date: Option<DateTime<Utc>>,
}

/// Counts reported by a notification sweep: records matched, not rows
/// inserted (same-day re-runs insert nothing new).
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub overdue_count: usize,
    pub due_soon_count: usize,
    pub low_stock_count: usize,
}

//=========================================================================================
// CirculationService
//=========================================================================================

/// Implements the borrow lifecycle, the request workflow and notification
/// dispatch over a [`LibraryStore`].
#[derive(Clone)]
pub struct CirculationService {
    store: Arc<dyn LibraryStore>,
}

impl CirculationService {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    // --- Borrow lifecycle -------------------------------------------------

    /// Issues a book to a member for `lending_days` days.
    ///
    /// The copy decrement and the record insert happen in one composite
    /// store operation; a conflict there means the last copy was taken
    /// between the read and the write.
    pub async fn issue_book(
        &self,
        staff: &Principal,
        book_id: Uuid,
        member_id: Uuid,
        lending_days: i64,
    ) -> LendingResult<BorrowRecord> {
        require_staff(staff)?;
        if lending_days < 1 {
            return Err(LendingError::InvalidInput(
                "lending days must be at least 1".to_string(),
            ));
        }

        let book = self.store.book(book_id).await?;
        if book.available_copies <= 0 {
            return Err(LendingError::OutOfStock);
        }

        let profile = self.store.profile(member_id).await?;
        let max_books = match profile.membership_plan_id {
            Some(plan_id) => self.store.plan(plan_id).await?.max_books_allowed,
            None => lending::DEFAULT_MAX_BOOKS,
        };
        let issued = self.store.issued_count_for_member(member_id).await?;
        if issued >= i64::from(max_books) {
            return Err(LendingError::BorrowLimitReached { max: max_books });
        }

        let now = Utc::now();
        let created = self
            .store
            .create_borrow(NewBorrow {
                book_id,
                member_id,
                issued_by: staff.user_id,
                issue_date: now,
                due_date: now + Duration::days(lending_days),
                max_renewals: lending::DEFAULT_MAX_RENEWALS,
            })
            .await;
        match created {
            Ok(record) => Ok(record),
            Err(StoreError::Conflict(_)) => Err(LendingError::OutOfStock),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns a book, computing the fine from the member's plan rate.
    pub async fn return_book(
        &self,
        staff: &Principal,
        record_id: Uuid,
    ) -> LendingResult<BorrowRecord> {
        require_staff(staff)?;

        let record = self.store.borrow_record(record_id).await?;
        if record.status != BorrowStatus::Issued {
            return Err(LendingError::NotFound(
                "borrow record not found or already returned".to_string(),
            ));
        }

        let fine_per_day = self.fine_rate_for_member(record.member_id).await?;
        let now = Utc::now();
        let fine = lending::late_fine(record.due_date, now, fine_per_day);

        Ok(self.store.complete_return(record_id, now, fine).await?)
    }

    /// Renews the caller's own borrow, pushing the due date out by the
    /// standard renewal period.
    pub async fn renew_book(
        &self,
        member: &Principal,
        record_id: Uuid,
    ) -> LendingResult<BorrowRecord> {
        let record = self.owned_issued_record(member, record_id).await?;

        if record.renewal_count >= record.max_renewals {
            return Err(LendingError::RenewalLimitReached {
                max: record.max_renewals,
            });
        }
        let now = Utc::now();
        if now > record.due_date {
            return Err(LendingError::AlreadyOverdue);
        }

        let new_due = record.due_date + Duration::days(lending::RENEWAL_PERIOD_DAYS);
        let updated = self
            .store
            .renew_borrow(record_id, new_due, record.renewal_count + 1)
            .await?;

        let book = self.store.book(record.book_id).await?;
        self.store
            .create_notification(NewNotification {
                user_id: member.user_id,
                kind: NotificationKind::RenewalApproved,
                title: "Book Renewal Approved".to_string(),
                message: format!(
                    "Your book \"{}\" has been renewed. New due date: {}.",
                    book.title,
                    new_due.format("%Y-%m-%d")
                ),
                related_id: Some(record_id),
            })
            .await?;

        Ok(updated)
    }

    // --- Request workflow -------------------------------------------------

    /// Submits an extension request for one of the caller's issued borrows.
    pub async fn submit_extension_request(
        &self,
        member: &Principal,
        record_id: Uuid,
        requested_days: i32,
        reason: &str,
    ) -> LendingResult<ExtensionRequest> {
        if !(lending::MIN_EXTENSION_DAYS..=lending::MAX_EXTENSION_DAYS).contains(&requested_days) {
            return Err(LendingError::InvalidInput(format!(
                "requested days must be between {} and {}",
                lending::MIN_EXTENSION_DAYS,
                lending::MAX_EXTENSION_DAYS
            )));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LendingError::InvalidInput(
                "a reason is required for extension requests".to_string(),
            ));
        }

        let record = self.owned_issued_record(member, record_id).await?;
        if self.store.pending_extension_exists(record_id).await? {
            return Err(LendingError::AlreadyPending(RequestKind::Extension));
        }

        let request = self
            .store
            .create_extension_request(record_id, member.user_id, requested_days, reason)
            .await?;

        let book = self.store.book(record.book_id).await?;
        self.store
            .create_notification(NewNotification {
                user_id: member.user_id,
                kind: NotificationKind::ExtensionRequested,
                title: "Extension Request Submitted".to_string(),
                message: format!(
                    "Your extension request for \"{}\" ({} days) has been submitted and is pending librarian approval.",
                    book.title, requested_days
                ),
                related_id: Some(request.id),
            })
            .await?;

        Ok(request)
    }

    /// Submits a renewal request for one of the caller's issued borrows.
    /// The same renewal preconditions as a direct renewal apply at submit
    /// time.
    pub async fn submit_renewal_request(
        &self,
        member: &Principal,
        record_id: Uuid,
    ) -> LendingResult<RenewalRequest> {
        let record = self.owned_issued_record(member, record_id).await?;

        if record.renewal_count >= record.max_renewals {
            return Err(LendingError::RenewalLimitReached {
                max: record.max_renewals,
            });
        }
        if Utc::now() > record.due_date {
            return Err(LendingError::AlreadyOverdue);
        }
        if self.store.pending_renewal_exists(record_id).await? {
            return Err(LendingError::AlreadyPending(RequestKind::Renewal));
        }

        let request = self
            .store
            .create_renewal_request(record_id, member.user_id)
            .await?;

        let book = self.store.book(record.book_id).await?;
        self.store
            .create_notification(NewNotification {
                user_id: member.user_id,
                kind: NotificationKind::RenewalRequested,
                title: "Renewal Request Submitted".to_string(),
                message: format!(
                    "Your renewal request for \"{}\" has been submitted and is pending librarian approval.",
                    book.title
                ),
                related_id: Some(request.id),
            })
            .await?;

        Ok(request)
    }

    /// Applies a staff decision to a pending extension request.
    pub async fn decide_extension_request(
        &self,
        staff: &Principal,
        request_id: Uuid,
        approve: bool,
        reason: Option<String>,
    ) -> LendingResult<DecisionOutcome> {
        require_staff(staff)?;

        let decision = RequestDecision {
            approve,
            staff_id: staff.user_id,
            reason,
            processed_at: Utc::now(),
        };
        let (request, updated) = self
            .store
            .resolve_extension_request(request_id, &decision)
            .await
            .map_err(request_gone("extension request"))?;

        let new_due = updated.as_ref().map(|r| r.due_date);
        let book_title = self.book_title_for(request.borrow_record_id).await?;
        let message = match new_due {
            Some(due) => format!(
                "Your extension request for \"{}\" has been approved. New due date: {}.",
                book_title,
                due.format("%Y-%m-%d")
            ),
            None => rejection_message("extension", &book_title, decision.reason.as_deref()),
        };
        self.store
            .create_notification(NewNotification {
                user_id: request.member_id,
                kind: if approve {
                    NotificationKind::ExtensionApproved
                } else {
                    NotificationKind::ExtensionRejected
                },
                title: format!(
                    "Extension Request {}",
                    if approve { "Approved" } else { "Rejected" }
                ),
                message,
                related_id: Some(request_id),
            })
            .await?;

        Ok(DecisionOutcome {
            status: request.status,
            new_due_date: new_due,
        })
    }

    /// Applies a staff decision to a pending renewal request. Approval
    /// grants the standard renewal period.
    pub async fn decide_renewal_request(
        &self,
        staff: &Principal,
        request_id: Uuid,
        approve: bool,
        reason: Option<String>,
    ) -> LendingResult<DecisionOutcome> {
        require_staff(staff)?;

        let decision = RequestDecision {
            approve,
            staff_id: staff.user_id,
            reason,
            processed_at: Utc::now(),
        };
        let (request, updated) = self
            .store
            .resolve_renewal_request(request_id, &decision, lending::RENEWAL_PERIOD_DAYS)
            .await
            .map_err(request_gone("renewal request"))?;

        let new_due = updated.as_ref().map(|r| r.due_date);
        let book_title = self.book_title_for(request.borrow_record_id).await?;
        let message = match new_due {
            Some(due) => format!(
                "Your renewal request for \"{}\" has been approved. New due date: {}.",
                book_title,
                due.format("%Y-%m-%d")
            ),
            None => rejection_message("renewal", &book_title, decision.reason.as_deref()),
        };
        self.store
            .create_notification(NewNotification {
                user_id: request.member_id,
                kind: if approve {
                    NotificationKind::RenewalApproved
                } else {
                    NotificationKind::RenewalRejected
                },
                title: format!(
                    "Renewal Request {}",
                    if approve { "Approved" } else { "Rejected" }
                ),
                message,
                related_id: Some(request_id),
            })
            .await?;

        Ok(DecisionOutcome {
            status: request.status,
            new_due_date: new_due,
        })
    }

    // --- Notification sweeps ----------------------------------------------

    /// Runs the overdue, due-soon and low-stock sweeps. Notifications are
    /// deduplicated per (user, related id, kind, UTC day), so re-running a
    /// sweep within the same day inserts nothing new.
    pub async fn run_sweeps(&self, staff: &Principal) -> LendingResult<SweepReport> {
        require_staff(staff)?;

        let now = Utc::now();
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();

        let overdue = self.store.issued_due_before(now).await?;
        let books = self.book_map(&overdue).await?;
        for record in &overdue {
            let Some(book) = books.get(&record.book_id) else {
                continue;
            };
            let days = lending::days_overdue(record.due_date, now);
            self.store
                .create_notification_once(
                    NewNotification {
                        user_id: record.member_id,
                        kind: NotificationKind::Overdue,
                        title: "Book Overdue".to_string(),
                        message: format!(
                            "Your book \"{}\" is {} day(s) overdue. Please return it to avoid additional fines.",
                            book.title, days
                        ),
                        related_id: Some(record.id),
                    },
                    day_start,
                )
                .await?;
        }

        let due_soon = self
            .store
            .issued_due_between(now, now + Duration::days(lending::DUE_SOON_WINDOW_DAYS))
            .await?;
        let books = self.book_map(&due_soon).await?;
        for record in &due_soon {
            let Some(book) = books.get(&record.book_id) else {
                continue;
            };
            let days = lending::days_until_due(record.due_date, now);
            self.store
                .create_notification_once(
                    NewNotification {
                        user_id: record.member_id,
                        kind: NotificationKind::DueReminder,
                        title: "Book Due Soon".to_string(),
                        message: format!(
                            "Your book \"{}\" is due in {} day(s). Due date: {}.",
                            book.title,
                            days,
                            record.due_date.format("%Y-%m-%d")
                        ),
                        related_id: Some(record.id),
                    },
                    day_start,
                )
                .await?;
        }

        let low_stock = self
            .store
            .low_stock_books(lending::LOW_STOCK_THRESHOLD)
            .await?;
        let admins = self.store.admin_user_ids().await?;
        for book in &low_stock {
            let copies = if book.available_copies == 1 {
                "copy"
            } else {
                "copies"
            };
            for admin in &admins {
                self.store
                    .create_notification_once(
                        NewNotification {
                            user_id: *admin,
                            kind: NotificationKind::LowStock,
                            title: "Low Stock Alert".to_string(),
                            message: format!(
                                "Book \"{}\" has only {} {} available.",
                                book.title, book.available_copies, copies
                            ),
                            related_id: Some(book.id),
                        },
                        day_start,
                    )
                    .await?;
            }
        }

        Ok(SweepReport {
            overdue_count: overdue.len(),
            due_soon_count: due_soon.len(),
            low_stock_count: low_stock.len(),
        })
    }

    // --- Helpers ----------------------------------------------------------

    /// Fetches a borrow record that belongs to the caller and is still
    /// issued. Anything else is the collapsed not-found.
    async fn owned_issued_record(
        &self,
        member: &Principal,
        record_id: Uuid,
    ) -> LendingResult<BorrowRecord> {
        let record = match self.store.borrow_record(record_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Err(LendingError::NotFound(
                    "borrow record not found".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        if record.member_id != member.user_id || record.status != BorrowStatus::Issued {
            return Err(LendingError::NotFound(
                "borrow record not found".to_string(),
            ));
        }
        Ok(record)
    }

    async fn fine_rate_for_member(&self, member_id: Uuid) -> LendingResult<f64> {
        let profile = self.store.profile(member_id).await?;
        Ok(match profile.membership_plan_id {
            Some(plan_id) => self.store.plan(plan_id).await?.fine_per_day,
            None => lending::DEFAULT_FINE_PER_DAY,
        })
    }

    async fn book_title_for(&self, borrow_record_id: Uuid) -> LendingResult<String> {
        let record = self.store.borrow_record(borrow_record_id).await?;
        Ok(self.store.book(record.book_id).await?.title)
    }

    /// Map-by-id lookup for the books behind a batch of borrow records.
    async fn book_map(
        &self,
        records: &[BorrowRecord],
    ) -> StoreResult<HashMap<Uuid, crate::domain::Book>> {
        let mut ids: Vec<Uuid> = records.iter().map(|r| r.book_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let books = self.store.books_by_ids(&ids).await?;
        Ok(books.into_iter().map(|b| (b.id, b)).collect())
    }
}

fn require_staff(principal: &Principal) -> LendingResult<()> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(LendingError::Forbidden("staff access required"))
    }
}

/// A decision targeting a missing or already-resolved request reports the
/// collapsed not-found regardless of which case it was.
fn request_gone(kind: &'static str) -> impl Fn(StoreError) -> LendingError {
    move |e| match e {
        StoreError::NotFound(_) | StoreError::Conflict(_) => {
            LendingError::NotFound(format!("{kind} not found or already processed"))
        }
        other => LendingError::Store(other),
    }
}

fn rejection_message(kind: &str, book_title: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) if !reason.trim().is_empty() => format!(
            "Your {kind} request for \"{book_title}\" has been rejected. Reason: {reason}",
        ),
        _ => format!("Your {kind} request for \"{book_title}\" has been rejected."),
    }
}
