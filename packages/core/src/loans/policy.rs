//! Circulation policy: loan quota and the fine window.

use chrono::{DateTime, Duration, Utc};

/// Maximum number of books a user may hold on loan at once.
pub const LOAN_QUOTA: usize = 3;

/// Loan period before a fine applies. Days here are exactly 86 400
/// seconds; leap seconds and calendar drift do not factor in.
pub const LOAN_PERIOD_DAYS: i64 = 7;

const LOAN_PERIOD_SECONDS: i64 = LOAN_PERIOD_DAYS * 86_400;

pub const ON_TIME_MESSAGE: &str = "Book returned on time.";
pub const FINE_MESSAGE: &str = "Fine applies for exceeding the 7-day loan period.";

/// A fine applies only when strictly more than the loan period has
/// elapsed. A return at exactly seven days is still on time, as is a
/// return whose loan date sits in the future.
pub fn fine_payable(loan_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(loan_date) > Duration::seconds(LOAN_PERIOD_SECONDS)
}

pub fn return_message(fine: bool) -> &'static str {
    if fine {
        FINE_MESSAGE
    } else {
        ON_TIME_MESSAGE
    }
}
