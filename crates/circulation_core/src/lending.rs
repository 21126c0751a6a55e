//! crates/circulation_core/src/lending.rs
//!
//! Lending policy arithmetic. Everything in here is a pure function of its
//! arguments so the fine and due-date rules can be tested without a store.

use chrono::{DateTime, Duration, Utc};

/// Days added to the due date by a renewal (direct or via an approved request).
pub const RENEWAL_PERIOD_DAYS: i64 = 14;

/// Renewals allowed per borrow record, stamped onto new records at issue time.
pub const DEFAULT_MAX_RENEWALS: i32 = 2;

/// Inclusive bounds for the days a member may ask for in an extension request.
pub const MIN_EXTENSION_DAYS: i32 = 1;
pub const MAX_EXTENSION_DAYS: i32 = 30;

/// Books with fewer available copies than this (but more than zero) are low stock.
pub const LOW_STOCK_THRESHOLD: i32 = 3;

/// How far ahead the due-soon sweep looks.
pub const DUE_SOON_WINDOW_DAYS: i64 = 2;

/// Fallbacks for members without a membership plan.
pub const DEFAULT_MAX_BOOKS: i32 = 3;
pub const DEFAULT_FINE_PER_DAY: f64 = 5.0;

/// Whole days elapsed past the due date, truncated. Zero when `now` is at or
/// before the due date.
pub fn days_overdue(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed = now.signed_duration_since(due_date);
    if elapsed <= Duration::zero() {
        0
    } else {
        elapsed.num_days()
    }
}

/// Fine owed at return time: days overdue times the member's per-day rate.
/// Fine accrues only past the due date; no partial-day rounding beyond the
/// whole-day truncation of [`days_overdue`].
pub fn late_fine(due_date: DateTime<Utc>, returned_at: DateTime<Utc>, fine_per_day: f64) -> f64 {
    days_overdue(due_date, returned_at) as f64 * fine_per_day
}

/// Whole days until the due date, rounded up. Zero when already due or past due.
pub fn days_until_due(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = due_date.signed_duration_since(now).num_seconds();
    if remaining <= 0 {
        0
    } else {
        (remaining + 86_399) / 86_400
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn no_days_overdue_before_due_date() {
        let due = at(2024, 3, 10, 12);
        assert_eq!(days_overdue(due, at(2024, 3, 8, 12)), 0);
        assert_eq!(days_overdue(due, due), 0);
    }

    #[test]
    fn days_overdue_truncates_partial_days() {
        let due = at(2024, 3, 10, 12);
        // 1 day 6 hours late still counts as one whole day.
        assert_eq!(days_overdue(due, at(2024, 3, 11, 18)), 1);
        assert_eq!(days_overdue(due, at(2024, 3, 12, 12)), 2);
    }

    #[test]
    fn fine_is_zero_on_time_and_accrues_per_day() {
        let due = at(2024, 3, 10, 12);
        assert_eq!(late_fine(due, at(2024, 3, 9, 12), 5.0), 0.0);
        assert_eq!(late_fine(due, at(2024, 3, 12, 12), 5.0), 10.0);
        assert_eq!(late_fine(due, at(2024, 3, 12, 12), 2.5), 5.0);
    }

    #[test]
    fn days_until_due_rounds_up() {
        let due = at(2024, 3, 10, 12);
        // 36 hours away rounds up to two days.
        assert_eq!(days_until_due(due, at(2024, 3, 9, 0)), 2);
        assert_eq!(days_until_due(due, at(2024, 3, 9, 12)), 1);
        assert_eq!(days_until_due(due, at(2024, 3, 10, 12)), 0);
        assert_eq!(days_until_due(due, at(2024, 3, 11, 12)), 0);
    }
}
