//! Subscription durations and the date/price arithmetic derived from them.
//!
//! This is the single place where a duration is turned into months, an end
//! date, or a checkout total. Both the pricing preview and the persisted
//! payment amount go through [`checkout_total`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::PlatformError;

/// Purchasable subscription length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionDuration {
    /// One calendar month.
    OneMonth,
    /// Three calendar months.
    ThreeMonths,
    /// Six calendar months.
    SixMonths,
}

impl SubscriptionDuration {
    /// All durations, shortest first.
    pub const ALL: [Self; 3] = [Self::OneMonth, Self::ThreeMonths, Self::SixMonths];

    /// Number of calendar months covered.
    #[must_use]
    pub const fn months(self) -> u32 {
        match self {
            Self::OneMonth => 1,
            Self::ThreeMonths => 3,
            Self::SixMonths => 6,
        }
    }

    /// Wire name (`"ONE_MONTH"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMonth => "ONE_MONTH",
            Self::ThreeMonths => "THREE_MONTHS",
            Self::SixMonths => "SIX_MONTHS",
        }
    }
}

impl fmt::Display for SubscriptionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionDuration {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONE_MONTH" => Ok(Self::OneMonth),
            "THREE_MONTHS" => Ok(Self::ThreeMonths),
            "SIX_MONTHS" => Ok(Self::SixMonths),
            other => Err(PlatformError::Validation(format!(
                "unknown duration: {other}"
            ))),
        }
    }
}

/// Adds the duration to `start` using calendar-month arithmetic.
///
/// When the start day does not exist in the target month the result is
/// clamped to that month's last day: `2025-01-31 + ONE_MONTH` is
/// `2025-02-28`, never a date in March. Time of day is preserved.
///
/// # Errors
///
/// Returns [`PlatformError::Validation`] if the result falls outside the
/// representable date range.
pub fn compute_end_date(
    start: DateTime<Utc>,
    duration: SubscriptionDuration,
) -> Result<DateTime<Utc>, PlatformError> {
    start
        .checked_add_months(Months::new(duration.months()))
        .ok_or_else(|| PlatformError::Validation(format!("end date out of range for {start}")))
}

/// Total charged for a plan over the given duration, in minor units.
///
/// # Errors
///
/// Returns [`PlatformError::Validation`] on arithmetic overflow.
pub fn checkout_total(plan_price: u64, duration: SubscriptionDuration) -> Result<u64, PlatformError> {
    plan_price
        .checked_mul(u64::from(duration.months()))
        .ok_or_else(|| PlatformError::Validation("checkout total overflows".to_string()))
}
