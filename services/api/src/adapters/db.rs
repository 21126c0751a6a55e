//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `LibraryStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Composite operations (issue, return, request decisions) each run inside a
//! single transaction with a conditional guard, so the paired rows can never
//! be left inconsistent and the first concurrent writer wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use circulation_core::domain::{
    Book, BorrowRecord, BorrowStatus, Category, ExtensionRequest, MemberProfile, MembershipPlan,
    NewBook, NewBorrow, NewMembershipPlan, NewNotification, Notification, NotificationKind,
    RenewalRequest, RequestDecision, RequestStatus, Role,
};
use circulation_core::ports::{LibraryStore, StoreError, StoreResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `LibraryStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn bad_row(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("invalid stored value: {e}"))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const BOOK_COLUMNS: &str = "id, title, author, isbn, publisher, publication_year, description, \
     category_id, total_copies, available_copies, created_at";

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    title: String,
    author: String,
    isbn: Option<String>,
    publisher: Option<String>,
    publication_year: Option<i32>,
    description: Option<String>,
    category_id: Option<Uuid>,
    total_copies: i32,
    available_copies: i32,
    created_at: DateTime<Utc>,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            publisher: self.publisher,
            publication_year: self.publication_year,
            description: self.description,
            category_id: self.category_id,
            total_copies: self.total_copies,
            available_copies: self.available_copies,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CategoryRecord {
    id: Uuid,
    name: String,
    description: Option<String>,
}
impl CategoryRecord {
    fn to_domain(self) -> Category {
        Category {
            id: self.id,
            name: self.name,
            description: self.description,
        }
    }
}

#[derive(FromRow)]
struct PlanRecord {
    id: Uuid,
    name: String,
    max_books_allowed: i32,
    fine_per_day: f64,
    duration_days: i32,
    annual_fee: f64,
}
impl PlanRecord {
    fn to_domain(self) -> MembershipPlan {
        MembershipPlan {
            id: self.id,
            name: self.name,
            max_books_allowed: self.max_books_allowed,
            fine_per_day: self.fine_per_day,
            duration_days: self.duration_days,
            annual_fee: self.annual_fee,
        }
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    email: String,
    full_name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    membership_plan_id: Option<Uuid>,
    membership_start_date: Option<DateTime<Utc>>,
    membership_expiry_date: Option<DateTime<Utc>>,
}
impl ProfileRecord {
    fn to_domain(self) -> MemberProfile {
        MemberProfile {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            phone: self.phone,
            address: self.address,
            membership_plan_id: self.membership_plan_id,
            membership_start_date: self.membership_start_date,
            membership_expiry_date: self.membership_expiry_date,
        }
    }
}

const BORROW_COLUMNS: &str = "id, book_id, member_id, issued_by, issue_date, due_date, \
     return_date, status, fine_amount, renewal_count, max_renewals";

#[derive(FromRow)]
struct BorrowRow {
    id: Uuid,
    book_id: Uuid,
    member_id: Uuid,
    issued_by: Option<Uuid>,
    issue_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: String,
    fine_amount: f64,
    renewal_count: i32,
    max_renewals: i32,
}
impl BorrowRow {
    fn to_domain(self) -> StoreResult<BorrowRecord> {
        Ok(BorrowRecord {
            id: self.id,
            book_id: self.book_id,
            member_id: self.member_id,
            issued_by: self.issued_by,
            issue_date: self.issue_date,
            due_date: self.due_date,
            return_date: self.return_date,
            status: BorrowStatus::parse(&self.status).map_err(bad_row)?,
            fine_amount: self.fine_amount,
            renewal_count: self.renewal_count,
            max_renewals: self.max_renewals,
        })
    }
}

const EXTENSION_COLUMNS: &str = "id, borrow_record_id, member_id, requested_days, reason, \
     status, librarian_id, librarian_reason, processed_at, created_at";

#[derive(FromRow)]
struct ExtensionRow {
    id: Uuid,
    borrow_record_id: Uuid,
    member_id: Uuid,
    requested_days: i32,
    reason: String,
    status: String,
    librarian_id: Option<Uuid>,
    librarian_reason: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl ExtensionRow {
    fn to_domain(self) -> StoreResult<ExtensionRequest> {
        Ok(ExtensionRequest {
            id: self.id,
            borrow_record_id: self.borrow_record_id,
            member_id: self.member_id,
            requested_days: self.requested_days,
            reason: self.reason,
            status: RequestStatus::parse(&self.status).map_err(bad_row)?,
            librarian_id: self.librarian_id,
            librarian_reason: self.librarian_reason,
            processed_at: self.processed_at,
            created_at: self.created_at,
        })
    }
}

const RENEWAL_COLUMNS: &str = "id, borrow_record_id, member_id, status, librarian_id, \
     librarian_reason, processed_at, created_at";

#[derive(FromRow)]
struct RenewalRow {
    id: Uuid,
    borrow_record_id: Uuid,
    member_id: Uuid,
    status: String,
    librarian_id: Option<Uuid>,
    librarian_reason: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl RenewalRow {
    fn to_domain(self) -> StoreResult<RenewalRequest> {
        Ok(RenewalRequest {
            id: self.id,
            borrow_record_id: self.borrow_record_id,
            member_id: self.member_id,
            status: RequestStatus::parse(&self.status).map_err(bad_row)?,
            librarian_id: self.librarian_id,
            librarian_reason: self.librarian_reason,
            processed_at: self.processed_at,
            created_at: self.created_at,
        })
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, message, read, related_id, created_at";

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    #[sqlx(rename = "type")]
    kind: String,
    title: String,
    message: String,
    read: bool,
    related_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}
impl NotificationRow {
    fn to_domain(self) -> StoreResult<Notification> {
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            kind: NotificationKind::parse(&self.kind).map_err(bad_row)?,
            title: self.title,
            message: self.message,
            read: self.read,
            related_id: self.related_id,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `LibraryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl LibraryStore for DbAdapter {
    // --- Identity ---

    async fn resolve_token(&self, token: &str) -> StoreResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE token = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        user_id.ok_or_else(|| StoreError::NotFound("session token not found".to_string()))
    }

    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>> {
        let roles: Vec<String> =
            sqlx::query_scalar("SELECT role FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        roles
            .iter()
            .map(|r| Role::parse(r).map_err(bad_row))
            .collect()
    }

    async fn admin_user_ids(&self) -> StoreResult<Vec<Uuid>> {
        sqlx::query_scalar("SELECT user_id FROM user_roles WHERE role = 'admin'")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)
    }

    // --- Catalog ---

    async fn book(&self, id: Uuid) -> StoreResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::NotFound(format!("book {} not found", id)))?;
        Ok(record.to_domain())
    }

    async fn books_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Book>> {
        let records = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = ANY($1)"
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        let records = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY title ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_book(&self, book: NewBook) -> StoreResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "INSERT INTO books (id, title, author, isbn, publisher, publication_year, \
             description, category_id, total_copies, available_copies) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING {BOOK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.description)
        .bind(book.category_id)
        .bind(book.total_copies)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(record.to_domain())
    }

    async fn update_book(&self, book: Book) -> StoreResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "UPDATE books SET title = $2, author = $3, isbn = $4, publisher = $5, \
             publication_year = $6, description = $7, category_id = $8, \
             total_copies = $9, available_copies = $10, updated_at = now() \
             WHERE id = $1 RETURNING {BOOK_COLUMNS}"
        ))
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.description)
        .bind(book.category_id)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::NotFound(format!("book {} not found", book.id)))?;
        Ok(record.to_domain())
    }

    async fn delete_book(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("book {} not found", id)));
        }
        Ok(())
    }

    async fn low_stock_books(&self, threshold: i32) -> StoreResult<Vec<Book>> {
        let records = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books \
             WHERE available_copies > 0 AND available_copies < $1 ORDER BY title ASC"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, name, description FROM categories ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> StoreResult<Category> {
        let record = sqlx::query_as::<_, CategoryRecord>(
            "INSERT INTO categories (id, name, description) VALUES ($1, $2, $3) \
             RETURNING id, name, description",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(record.to_domain())
    }

    // --- Membership ---

    async fn plan(&self, id: Uuid) -> StoreResult<MembershipPlan> {
        let record = sqlx::query_as::<_, PlanRecord>(
            "SELECT id, name, max_books_allowed, fine_per_day, duration_days, annual_fee \
             FROM membership_plans WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::NotFound(format!("membership plan {} not found", id)))?;
        Ok(record.to_domain())
    }

    async fn plans_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<MembershipPlan>> {
        let records = sqlx::query_as::<_, PlanRecord>(
            "SELECT id, name, max_books_allowed, fine_per_day, duration_days, annual_fee \
             FROM membership_plans WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_plans(&self) -> StoreResult<Vec<MembershipPlan>> {
        let records = sqlx::query_as::<_, PlanRecord>(
            "SELECT id, name, max_books_allowed, fine_per_day, duration_days, annual_fee \
             FROM membership_plans ORDER BY annual_fee ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_plan(&self, plan: NewMembershipPlan) -> StoreResult<MembershipPlan> {
        let record = sqlx::query_as::<_, PlanRecord>(
            "INSERT INTO membership_plans (id, name, max_books_allowed, fine_per_day, \
             duration_days, annual_fee) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, name, max_books_allowed, fine_per_day, duration_days, annual_fee",
        )
        .bind(Uuid::new_v4())
        .bind(&plan.name)
        .bind(plan.max_books_allowed)
        .bind(plan.fine_per_day)
        .bind(plan.duration_days)
        .bind(plan.annual_fee)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(record.to_domain())
    }

    async fn update_plan(&self, plan: MembershipPlan) -> StoreResult<MembershipPlan> {
        let record = sqlx::query_as::<_, PlanRecord>(
            "UPDATE membership_plans SET name = $2, max_books_allowed = $3, fine_per_day = $4, \
             duration_days = $5, annual_fee = $6, updated_at = now() WHERE id = $1 \
             RETURNING id, name, max_books_allowed, fine_per_day, duration_days, annual_fee",
        )
        .bind(plan.id)
        .bind(&plan.name)
        .bind(plan.max_books_allowed)
        .bind(plan.fine_per_day)
        .bind(plan.duration_days)
        .bind(plan.annual_fee)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::NotFound(format!("membership plan {} not found", plan.id)))?;
        Ok(record.to_domain())
    }

    async fn profile(&self, id: Uuid) -> StoreResult<MemberProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, email, full_name, phone, address, membership_plan_id, \
             membership_start_date, membership_expiry_date FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::NotFound(format!("member profile {} not found", id)))?;
        Ok(record.to_domain())
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<MemberProfile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, email, full_name, phone, address, membership_plan_id, \
             membership_start_date, membership_expiry_date FROM profiles WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_profiles(&self) -> StoreResult<Vec<MemberProfile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, email, full_name, phone, address, membership_plan_id, \
             membership_start_date, membership_expiry_date FROM profiles ORDER BY email ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Borrow records ---

    async fn borrow_record(&self, id: Uuid) -> StoreResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRow>(&format!(
            "SELECT {BORROW_COLUMNS} FROM borrow_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::NotFound(format!("borrow record {} not found", id)))?
        .to_domain()
    }

    async fn borrow_records_for_member(&self, member_id: Uuid) -> StoreResult<Vec<BorrowRecord>> {
        let rows = sqlx::query_as::<_, BorrowRow>(&format!(
            "SELECT {BORROW_COLUMNS} FROM borrow_records WHERE member_id = $1 \
             ORDER BY issue_date DESC"
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_borrow_records(&self) -> StoreResult<Vec<BorrowRecord>> {
        let rows = sqlx::query_as::<_, BorrowRow>(&format!(
            "SELECT {BORROW_COLUMNS} FROM borrow_records ORDER BY issue_date DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn issued_count_for_member(&self, member_id: Uuid) -> StoreResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE member_id = $1 AND status = 'issued'",
        )
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn issued_due_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<BorrowRecord>> {
        let rows = sqlx::query_as::<_, BorrowRow>(&format!(
            "SELECT {BORROW_COLUMNS} FROM borrow_records \
             WHERE status = 'issued' AND due_date < $1 ORDER BY due_date ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn issued_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BorrowRecord>> {
        let rows = sqlx::query_as::<_, BorrowRow>(&format!(
            "SELECT {BORROW_COLUMNS} FROM borrow_records \
             WHERE status = 'issued' AND due_date >= $1 AND due_date <= $2 \
             ORDER BY due_date ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_borrow(&self, borrow: NewBorrow) -> StoreResult<BorrowRecord> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let taken = sqlx::query(
            "UPDATE books SET available_copies = available_copies - 1, updated_at = now() \
             WHERE id = $1 AND available_copies > 0",
        )
        .bind(borrow.book_id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if taken.rows_affected() == 0 {
            return Err(StoreError::Conflict(
                "no available copies to issue".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, BorrowRow>(&format!(
            "INSERT INTO borrow_records (id, book_id, member_id, issued_by, issue_date, \
             due_date, status, fine_amount, renewal_count, max_renewals) \
             VALUES ($1, $2, $3, $4, $5, $6, 'issued', 0, 0, $7) \
             RETURNING {BORROW_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(borrow.book_id)
        .bind(borrow.member_id)
        .bind(borrow.issued_by)
        .bind(borrow.issue_date)
        .bind(borrow.due_date)
        .bind(borrow.max_renewals)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        row.to_domain()
    }

    async fn complete_return(
        &self,
        record_id: Uuid,
        returned_at: DateTime<Utc>,
        fine_amount: f64,
    ) -> StoreResult<BorrowRecord> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query_as::<_, BorrowRow>(&format!(
            "UPDATE borrow_records SET status = 'returned', return_date = $2, \
             fine_amount = $3, updated_at = now() \
             WHERE id = $1 AND status = 'issued' RETURNING {BORROW_COLUMNS}"
        ))
        .bind(record_id)
        .bind(returned_at)
        .bind(fine_amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| {
            StoreError::Conflict("borrow record is not in the issued state".to_string())
        })?;

        sqlx::query(
            "UPDATE books SET available_copies = available_copies + 1, updated_at = now() \
             WHERE id = $1",
        )
        .bind(row.book_id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        row.to_domain()
    }

    async fn renew_borrow(
        &self,
        record_id: Uuid,
        new_due_date: DateTime<Utc>,
        new_renewal_count: i32,
    ) -> StoreResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRow>(&format!(
            "UPDATE borrow_records SET due_date = $2, renewal_count = $3, updated_at = now() \
             WHERE id = $1 AND status = 'issued' RETURNING {BORROW_COLUMNS}"
        ))
        .bind(record_id)
        .bind(new_due_date)
        .bind(new_renewal_count)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| {
            StoreError::Conflict("borrow record is not in the issued state".to_string())
        })?
        .to_domain()
    }

    // --- Extension requests ---

    async fn create_extension_request(
        &self,
        borrow_record_id: Uuid,
        member_id: Uuid,
        requested_days: i32,
        reason: &str,
    ) -> StoreResult<ExtensionRequest> {
        sqlx::query_as::<_, ExtensionRow>(&format!(
            "INSERT INTO extension_requests (id, borrow_record_id, member_id, requested_days, \
             reason, status) VALUES ($1, $2, $3, $4, $5, 'pending') \
             RETURNING {EXTENSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(borrow_record_id)
        .bind(member_id)
        .bind(requested_days)
        .bind(reason)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?
        .to_domain()
    }

    async fn pending_extension_exists(&self, borrow_record_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM extension_requests \
             WHERE borrow_record_id = $1 AND status = 'pending')",
        )
        .bind(borrow_record_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn resolve_extension_request(
        &self,
        request_id: Uuid,
        decision: &RequestDecision,
    ) -> StoreResult<(ExtensionRequest, Option<BorrowRecord>)> {
        let status = if decision.approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let request = sqlx::query_as::<_, ExtensionRow>(&format!(
            "UPDATE extension_requests SET status = $2, librarian_id = $3, \
             librarian_reason = $4, processed_at = $5, updated_at = now() \
             WHERE id = $1 AND status = 'pending' RETURNING {EXTENSION_COLUMNS}"
        ))
        .bind(request_id)
        .bind(status.as_str())
        .bind(decision.staff_id)
        .bind(&decision.reason)
        .bind(decision.processed_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| {
            StoreError::NotFound("extension request not found or already processed".to_string())
        })?;

        let updated = if decision.approve {
            let row = sqlx::query_as::<_, BorrowRow>(&format!(
                "UPDATE borrow_records \
                 SET due_date = due_date + make_interval(days => $2), updated_at = now() \
                 WHERE id = $1 RETURNING {BORROW_COLUMNS}"
            ))
            .bind(request.borrow_record_id)
            .bind(request.requested_days)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
            Some(row.to_domain()?)
        } else {
            None
        };

        tx.commit().await.map_err(backend)?;
        Ok((request.to_domain()?, updated))
    }

    async fn list_extension_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<ExtensionRequest>> {
        let rows = sqlx::query_as::<_, ExtensionRow>(&format!(
            "SELECT {EXTENSION_COLUMNS} FROM extension_requests \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str().to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    // --- Renewal requests ---

    async fn create_renewal_request(
        &self,
        borrow_record_id: Uuid,
        member_id: Uuid,
    ) -> StoreResult<RenewalRequest> {
        sqlx::query_as::<_, RenewalRow>(&format!(
            "INSERT INTO renewal_requests (id, borrow_record_id, member_id, status) \
             VALUES ($1, $2, $3, 'pending') RETURNING {RENEWAL_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(borrow_record_id)
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?
        .to_domain()
    }

    async fn pending_renewal_exists(&self, borrow_record_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM renewal_requests \
             WHERE borrow_record_id = $1 AND status = 'pending')",
        )
        .bind(borrow_record_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn resolve_renewal_request(
        &self,
        request_id: Uuid,
        decision: &RequestDecision,
        grant_days: i64,
    ) -> StoreResult<(RenewalRequest, Option<BorrowRecord>)> {
        let status = if decision.approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let request = sqlx::query_as::<_, RenewalRow>(&format!(
            "UPDATE renewal_requests SET status = $2, librarian_id = $3, \
             librarian_reason = $4, processed_at = $5, updated_at = now() \
             WHERE id = $1 AND status = 'pending' RETURNING {RENEWAL_COLUMNS}"
        ))
        .bind(request_id)
        .bind(status.as_str())
        .bind(decision.staff_id)
        .bind(&decision.reason)
        .bind(decision.processed_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| {
            StoreError::NotFound("renewal request not found or already processed".to_string())
        })?;

        let updated = if decision.approve {
            // The guard keeps a concurrent direct renewal from pushing the
            // count past the limit; failing here rolls the whole decision back.
            let row = sqlx::query_as::<_, BorrowRow>(&format!(
                "UPDATE borrow_records \
                 SET due_date = due_date + make_interval(days => $2), \
                 renewal_count = renewal_count + 1, updated_at = now() \
                 WHERE id = $1 AND renewal_count < max_renewals \
                 RETURNING {BORROW_COLUMNS}"
            ))
            .bind(request.borrow_record_id)
            .bind(i32::try_from(grant_days).map_err(bad_row)?)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or_else(|| {
                StoreError::Conflict("borrow record has no renewals left".to_string())
            })?;
            Some(row.to_domain()?)
        } else {
            None
        };

        tx.commit().await.map_err(backend)?;
        Ok((request.to_domain()?, updated))
    }

    async fn list_renewal_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<RenewalRequest>> {
        let rows = sqlx::query_as::<_, RenewalRow>(&format!(
            "SELECT {RENEWAL_COLUMNS} FROM renewal_requests \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str().to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    // --- Notifications ---

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (id, user_id, type, title, message, read, related_id) \
             VALUES ($1, $2, $3, $4, $5, false, $6) RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.related_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?
        .to_domain()
    }

    async fn create_notification_once(
        &self,
        notification: NewNotification,
        since: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO notifications (id, user_id, type, title, message, read, related_id) \
             SELECT $1, $2, $3, $4, $5, false, $6 \
             WHERE NOT EXISTS (SELECT 1 FROM notifications \
             WHERE user_id = $2 AND type = $3 \
             AND related_id IS NOT DISTINCT FROM $6 AND created_at >= $7)",
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.related_id)
        .bind(since)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn notifications_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET read = true, updated_at = now() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "notification {} not found",
                id
            )));
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE notifications SET read = true, updated_at = now() \
             WHERE user_id = $1 AND read = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "notification {} not found",
                id
            )));
        }
        Ok(())
    }
}
