//! In-memory implementation of the `LibraryStore` port for service tests,
//! mirroring the conditional guards of the real adapter.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use circulation_core::domain::{
    Book, BorrowRecord, BorrowStatus, Category, ExtensionRequest, MemberProfile, MembershipPlan,
    NewBook, NewBorrow, NewMembershipPlan, NewNotification, Notification, NotificationKind,
    Principal, RenewalRequest, RequestDecision, RequestStatus, Role,
};
use circulation_core::ports::{LibraryStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    roles: HashMap<Uuid, Vec<Role>>,
    tokens: HashMap<String, Uuid>,
    books: HashMap<Uuid, Book>,
    categories: Vec<Category>,
    plans: HashMap<Uuid, MembershipPlan>,
    profiles: HashMap<Uuid, MemberProfile>,
    borrows: HashMap<Uuid, BorrowRecord>,
    extensions: HashMap<Uuid, ExtensionRequest>,
    renewals: HashMap<Uuid, RenewalRequest>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

//=========================================================================================
// Seeding and Inspection Helpers
//=========================================================================================

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_book(&self, title: &str, total: i32, available: i32) -> Uuid {
        let id = Uuid::new_v4();
        let book = Book {
            id,
            title: title.to_string(),
            author: "Test Author".to_string(),
            isbn: None,
            publisher: None,
            publication_year: None,
            description: None,
            category_id: None,
            total_copies: total,
            available_copies: available,
            created_at: Utc::now(),
        };
        self.inner.lock().unwrap().books.insert(id, book);
        id
    }

    pub fn add_plan(&self, max_books: i32, fine_per_day: f64) -> Uuid {
        let id = Uuid::new_v4();
        let plan = MembershipPlan {
            id,
            name: "Test Plan".to_string(),
            max_books_allowed: max_books,
            fine_per_day,
            duration_days: 365,
            annual_fee: 0.0,
        };
        self.inner.lock().unwrap().plans.insert(id, plan);
        id
    }

    pub fn add_member(&self, plan_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        let profile = MemberProfile {
            id,
            email: format!("{id}@example.com"),
            full_name: None,
            phone: None,
            address: None,
            membership_plan_id: plan_id,
            membership_start_date: Some(Utc::now()),
            membership_expiry_date: None,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.profiles.insert(id, profile);
        inner.roles.insert(id, vec![Role::Member]);
        id
    }

    pub fn add_admin(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().roles.insert(id, vec![Role::Admin]);
        id
    }

    /// Inserts an issued borrow record directly, for crafting histories the
    /// service could not produce in a fresh test (past due dates, spent
    /// renewals).
    pub fn seed_borrow(
        &self,
        book_id: Uuid,
        member_id: Uuid,
        due_date: DateTime<Utc>,
        renewal_count: i32,
        max_renewals: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let record = BorrowRecord {
            id,
            book_id,
            member_id,
            issued_by: None,
            issue_date: due_date - Duration::days(14),
            due_date,
            return_date: None,
            status: BorrowStatus::Issued,
            fine_amount: 0.0,
            renewal_count,
            max_renewals,
        };
        self.inner.lock().unwrap().borrows.insert(id, record);
        id
    }

    pub fn book_snapshot(&self, id: Uuid) -> Book {
        self.inner.lock().unwrap().books[&id].clone()
    }

    pub fn borrow_snapshot(&self, id: Uuid) -> BorrowRecord {
        self.inner.lock().unwrap().borrows[&id].clone()
    }

    pub fn notifications_snapshot(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().notifications.clone()
    }

    pub fn notifications_of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.notifications_snapshot()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }
}

/// A librarian principal.
pub fn staff() -> Principal {
    Principal {
        user_id: Uuid::new_v4(),
        roles: vec![Role::Librarian],
    }
}

pub fn member(user_id: Uuid) -> Principal {
    Principal {
        user_id,
        roles: vec![Role::Member],
    }
}

//=========================================================================================
// LibraryStore Implementation
//=========================================================================================

fn not_found(what: &str) -> StoreError {
    StoreError::NotFound(what.to_string())
}

#[async_trait]
impl LibraryStore for MemStore {
    async fn resolve_token(&self, token: &str) -> StoreResult<Uuid> {
        self.inner
            .lock()
            .unwrap()
            .tokens
            .get(token)
            .copied()
            .ok_or_else(|| not_found("session token"))
    }

    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .roles
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn admin_user_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .roles
            .iter()
            .filter(|(_, roles)| roles.contains(&Role::Admin))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn book(&self, id: Uuid) -> StoreResult<Book> {
        self.inner
            .lock()
            .unwrap()
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("book"))
    }

    async fn books_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Book>> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.books.get(id).cloned())
            .collect())
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        Ok(self.inner.lock().unwrap().books.values().cloned().collect())
    }

    async fn create_book(&self, book: NewBook) -> StoreResult<Book> {
        let created = Book {
            id: Uuid::new_v4(),
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            publisher: book.publisher,
            publication_year: book.publication_year,
            description: book.description,
            category_id: book.category_id,
            total_copies: book.total_copies,
            available_copies: book.total_copies,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .books
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_book(&self, book: Book) -> StoreResult<Book> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.books.contains_key(&book.id) {
            return Err(not_found("book"));
        }
        inner.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn delete_book(&self, id: Uuid) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .books
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("book"))
    }

    async fn low_stock_books(&self, threshold: i32) -> StoreResult<Vec<Book>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .books
            .values()
            .filter(|b| b.available_copies > 0 && b.available_copies < threshold)
            .cloned()
            .collect())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.inner.lock().unwrap().categories.clone())
    }

    async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> StoreResult<Category> {
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        self.inner
            .lock()
            .unwrap()
            .categories
            .push(category.clone());
        Ok(category)
    }

    async fn plan(&self, id: Uuid) -> StoreResult<MembershipPlan> {
        self.inner
            .lock()
            .unwrap()
            .plans
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("membership plan"))
    }

    async fn plans_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<MembershipPlan>> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.plans.get(id).cloned())
            .collect())
    }

    async fn list_plans(&self) -> StoreResult<Vec<MembershipPlan>> {
        Ok(self.inner.lock().unwrap().plans.values().cloned().collect())
    }

    async fn create_plan(&self, plan: NewMembershipPlan) -> StoreResult<MembershipPlan> {
        let created = MembershipPlan {
            id: Uuid::new_v4(),
            name: plan.name,
            max_books_allowed: plan.max_books_allowed,
            fine_per_day: plan.fine_per_day,
            duration_days: plan.duration_days,
            annual_fee: plan.annual_fee,
        };
        self.inner
            .lock()
            .unwrap()
            .plans
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_plan(&self, plan: MembershipPlan) -> StoreResult<MembershipPlan> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.plans.contains_key(&plan.id) {
            return Err(not_found("membership plan"));
        }
        inner.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn profile(&self, id: Uuid) -> StoreResult<MemberProfile> {
        self.inner
            .lock()
            .unwrap()
            .profiles
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("member profile"))
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<MemberProfile>> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.profiles.get(id).cloned())
            .collect())
    }

    async fn list_profiles(&self) -> StoreResult<Vec<MemberProfile>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .profiles
            .values()
            .cloned()
            .collect())
    }

    async fn borrow_record(&self, id: Uuid) -> StoreResult<BorrowRecord> {
        self.inner
            .lock()
            .unwrap()
            .borrows
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("borrow record"))
    }

    async fn borrow_records_for_member(&self, member_id: Uuid) -> StoreResult<Vec<BorrowRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .borrows
            .values()
            .filter(|r| r.member_id == member_id)
            .cloned()
            .collect())
    }

    async fn list_borrow_records(&self) -> StoreResult<Vec<BorrowRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .borrows
            .values()
            .cloned()
            .collect())
    }

    async fn issued_count_for_member(&self, member_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .borrows
            .values()
            .filter(|r| r.member_id == member_id && r.status == BorrowStatus::Issued)
            .count() as i64)
    }

    async fn issued_due_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<BorrowRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .borrows
            .values()
            .filter(|r| r.status == BorrowStatus::Issued && r.due_date < cutoff)
            .cloned()
            .collect())
    }

    async fn issued_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BorrowRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .borrows
            .values()
            .filter(|r| {
                r.status == BorrowStatus::Issued && r.due_date >= from && r.due_date <= to
            })
            .cloned()
            .collect())
    }

    async fn create_borrow(&self, borrow: NewBorrow) -> StoreResult<BorrowRecord> {
        let mut inner = self.inner.lock().unwrap();
        let book = inner
            .books
            .get_mut(&borrow.book_id)
            .ok_or_else(|| not_found("book"))?;
        if book.available_copies <= 0 {
            return Err(StoreError::Conflict(
                "no available copies to issue".to_string(),
            ));
        }
        book.available_copies -= 1;

        let record = BorrowRecord {
            id: Uuid::new_v4(),
            book_id: borrow.book_id,
            member_id: borrow.member_id,
            issued_by: Some(borrow.issued_by),
            issue_date: borrow.issue_date,
            due_date: borrow.due_date,
            return_date: None,
            status: BorrowStatus::Issued,
            fine_amount: 0.0,
            renewal_count: 0,
            max_renewals: borrow.max_renewals,
        };
        inner.borrows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn complete_return(
        &self,
        record_id: Uuid,
        returned_at: DateTime<Utc>,
        fine_amount: f64,
    ) -> StoreResult<BorrowRecord> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .borrows
            .get_mut(&record_id)
            .ok_or_else(|| not_found("borrow record"))?;
        if record.status != BorrowStatus::Issued {
            return Err(StoreError::Conflict(
                "borrow record is not in the issued state".to_string(),
            ));
        }
        record.status = BorrowStatus::Returned;
        record.return_date = Some(returned_at);
        record.fine_amount = fine_amount;
        let updated = record.clone();

        if let Some(book) = inner.books.get_mut(&updated.book_id) {
            book.available_copies += 1;
        }
        Ok(updated)
    }

    async fn renew_borrow(
        &self,
        record_id: Uuid,
        new_due_date: DateTime<Utc>,
        new_renewal_count: i32,
    ) -> StoreResult<BorrowRecord> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .borrows
            .get_mut(&record_id)
            .ok_or_else(|| not_found("borrow record"))?;
        if record.status != BorrowStatus::Issued {
            return Err(StoreError::Conflict(
                "borrow record is not in the issued state".to_string(),
            ));
        }
        record.due_date = new_due_date;
        record.renewal_count = new_renewal_count;
        Ok(record.clone())
    }

    async fn create_extension_request(
        &self,
        borrow_record_id: Uuid,
        member_id: Uuid,
        requested_days: i32,
        reason: &str,
    ) -> StoreResult<ExtensionRequest> {
        let request = ExtensionRequest {
            id: Uuid::new_v4(),
            borrow_record_id,
            member_id,
            requested_days,
            reason: reason.to_string(),
            status: RequestStatus::Pending,
            librarian_id: None,
            librarian_reason: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .extensions
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn pending_extension_exists(&self, borrow_record_id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().extensions.values().any(|r| {
            r.borrow_record_id == borrow_record_id && r.status == RequestStatus::Pending
        }))
    }

    async fn resolve_extension_request(
        &self,
        request_id: Uuid,
        decision: &RequestDecision,
    ) -> StoreResult<(ExtensionRequest, Option<BorrowRecord>)> {
        let mut inner = self.inner.lock().unwrap();
        let request = inner
            .extensions
            .get_mut(&request_id)
            .filter(|r| r.status == RequestStatus::Pending)
            .ok_or_else(|| not_found("extension request not found or already processed"))?;
        request.status = if decision.approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        request.librarian_id = Some(decision.staff_id);
        request.librarian_reason = decision.reason.clone();
        request.processed_at = Some(decision.processed_at);
        let resolved = request.clone();

        let updated = if decision.approve {
            let record = inner
                .borrows
                .get_mut(&resolved.borrow_record_id)
                .ok_or_else(|| not_found("borrow record"))?;
            record.due_date += Duration::days(i64::from(resolved.requested_days));
            Some(record.clone())
        } else {
            None
        };
        Ok((resolved, updated))
    }

    async fn list_extension_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<ExtensionRequest>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .extensions
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn create_renewal_request(
        &self,
        borrow_record_id: Uuid,
        member_id: Uuid,
    ) -> StoreResult<RenewalRequest> {
        let request = RenewalRequest {
            id: Uuid::new_v4(),
            borrow_record_id,
            member_id,
            status: RequestStatus::Pending,
            librarian_id: None,
            librarian_reason: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .renewals
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn pending_renewal_exists(&self, borrow_record_id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().renewals.values().any(|r| {
            r.borrow_record_id == borrow_record_id && r.status == RequestStatus::Pending
        }))
    }

    async fn resolve_renewal_request(
        &self,
        request_id: Uuid,
        decision: &RequestDecision,
        grant_days: i64,
    ) -> StoreResult<(RenewalRequest, Option<BorrowRecord>)> {
        let mut inner = self.inner.lock().unwrap();
        if decision.approve {
            let record_id = inner
                .renewals
                .get(&request_id)
                .filter(|r| r.status == RequestStatus::Pending)
                .map(|r| r.borrow_record_id)
                .ok_or_else(|| not_found("renewal request not found or already processed"))?;
            let record = inner
                .borrows
                .get(&record_id)
                .ok_or_else(|| not_found("borrow record"))?;
            if record.renewal_count >= record.max_renewals {
                return Err(StoreError::Conflict(
                    "borrow record has no renewals left".to_string(),
                ));
            }
        }
        let request = inner
            .renewals
            .get_mut(&request_id)
            .filter(|r| r.status == RequestStatus::Pending)
            .ok_or_else(|| not_found("renewal request not found or already processed"))?;
        request.status = if decision.approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        request.librarian_id = Some(decision.staff_id);
        request.librarian_reason = decision.reason.clone();
        request.processed_at = Some(decision.processed_at);
        let resolved = request.clone();

        let updated = if decision.approve {
            let record = inner
                .borrows
                .get_mut(&resolved.borrow_record_id)
                .ok_or_else(|| not_found("borrow record"))?;
            record.due_date += Duration::days(grant_days);
            record.renewal_count += 1;
            Some(record.clone())
        } else {
            None
        };
        Ok((resolved, updated))
    }

    async fn list_renewal_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<RenewalRequest>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .renewals
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let created = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            read: false,
            related_id: notification.related_id,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .notifications
            .push(created.clone());
        Ok(created)
    }

    async fn create_notification_once(
        &self,
        notification: NewNotification,
        since: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner.notifications.iter().any(|n| {
            n.user_id == notification.user_id
                && n.kind == notification.kind
                && n.related_id == notification.related_id
                && n.created_at >= since
        });
        if duplicate {
            return Ok(false);
        }
        inner.notifications.push(Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            read: false,
            related_id: notification.related_id,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn notifications_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let notification = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .ok_or_else(|| not_found("notification"))?;
        notification.read = true;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> StoreResult<()> {
        for notification in self
            .inner
            .lock()
            .unwrap()
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id)
        {
            notification.read = true;
        }
        Ok(())
    }

    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.notifications.len();
        inner
            .notifications
            .retain(|n| !(n.id == id && n.user_id == user_id));
        if inner.notifications.len() == before {
            return Err(not_found("notification"));
        }
        Ok(())
    }
}
