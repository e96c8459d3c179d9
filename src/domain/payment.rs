//! Payment transactions tied to a subscription checkout.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{PaymentId, SubscriptionId};
use crate::error::PlatformError;

/// Status of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Checkout link issued, no verified result yet.
    Pending,
    /// Provider confirmed the money arrived.
    Paid,
    /// Provider reported a failure.
    Failed,
    /// Buyer abandoned or the link was cancelled.
    Cancelled,
}

impl PaymentStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Returns `true` once the attempt can no longer change.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(PlatformError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// One checkout attempt for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    /// Payment identifier.
    pub id: PaymentId,
    /// Subscription being paid for.
    pub subscription_id: SubscriptionId,
    /// Numeric order code shared with the provider.
    pub order_code: i64,
    /// Amount in minor currency units.
    pub amount: u64,
    /// Attempt status.
    pub status: PaymentStatus,
    /// Provider-side transaction reference, once known.
    pub provider_reference: Option<String>,
    /// Hosted checkout page.
    pub checkout_url: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a PENDING payment for `amount`.
    #[must_use]
    pub fn new(subscription_id: SubscriptionId, amount: u64, now: DateTime<Utc>) -> Self {
        let id = PaymentId::new();
        Self {
            id,
            subscription_id,
            order_code: order_code_for(id),
            amount,
            status: PaymentStatus::Pending,
            provider_reference: None,
            checkout_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Highest order code accepted by the provider (2^53 - 1).
pub const MAX_ORDER_CODE: i64 = 9_007_199_254_740_991;

/// Derives a positive, JSON-safe order code from a payment id.
#[must_use]
pub fn order_code_for(id: PaymentId) -> i64 {
    let folded = id.as_uuid().as_u128() % (MAX_ORDER_CODE as u128);
    i64::try_from(folded).unwrap_or(MAX_ORDER_CODE).max(1)
}

/// Verified outcome of a payment, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResult {
    /// Money received.
    Success {
        /// Provider transaction reference.
        reference: Option<String>,
        /// Amount the provider says was paid, in minor units.
        amount: u64,
    },
    /// The provider reported a failure.
    Failure {
        /// Provider reason text.
        reason: String,
    },
}

impl ProviderResult {
    /// Returns `true` for [`ProviderResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_codes_are_positive_and_json_safe() {
        for _ in 0..1_000 {
            let code = order_code_for(PaymentId::new());
            assert!(code >= 1);
            assert!(code <= MAX_ORDER_CODE);
        }
    }

    #[test]
    fn order_code_is_stable_per_payment() {
        let id = PaymentId::new();
        assert_eq!(order_code_for(id), order_code_for(id));
    }

    #[test]
    fn new_payment_is_pending() {
        let payment = Payment::new(SubscriptionId::new(), 897_000, Utc::now());
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(!payment.status.is_settled());
        assert_eq!(payment.amount, 897_000);
    }
}
