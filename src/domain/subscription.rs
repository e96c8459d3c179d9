//! Subscription aggregate and its status state machine.
//!
//! The transition table lives in [`SubscriptionStatus::allowed_targets`];
//! every status change in the crate goes through
//! [`Subscription::transition`], which consults it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::duration::{SubscriptionDuration, compute_end_date};
use super::{PlanId, SubscriptionId, UserId};
use crate::error::PlatformError;

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Created, awaiting payment.
    Pending,
    /// Payment confirmed; eligible for provisioning.
    Paid,
    /// In service.
    Active,
    /// Ran past its end date. Terminal.
    Expired,
    /// Cancelled by the owner, an admin, or an abandoned checkout. Terminal.
    Cancelled,
}

impl SubscriptionStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Paid,
        Self::Active,
        Self::Expired,
        Self::Cancelled,
    ];

    /// Statuses reachable in one step from `self`.
    #[must_use]
    pub const fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Paid, Self::Cancelled],
            Self::Paid => &[Self::Active, Self::Cancelled],
            Self::Active => &[Self::Expired, Self::Cancelled],
            Self::Expired | Self::Cancelled => &[],
        }
    }

    /// Returns `true` if `to` is reachable in one step from `self`.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// EXPIRED and CANCELLED admit no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }

    /// Returns `true` once payment has been confirmed (PAID or later, not
    /// cancelled before payment).
    #[must_use]
    pub const fn is_paid_or_later(self) -> bool {
        matches!(self, Self::Paid | Self::Active | Self::Expired)
    }

    /// Wire name (`"PENDING"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PlatformError::Validation(format!("unknown subscription status: {s}")))
    }
}

/// Restaurant metadata captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RestaurantInfo {
    /// Restaurant name.
    #[serde(rename = "restaurant_name")]
    pub name: String,
    /// Street address.
    #[serde(rename = "restaurant_address")]
    pub address: String,
    /// Contact phone number.
    #[serde(rename = "restaurant_phone")]
    pub phone: String,
    /// Cuisine / venue type (e.g. `"cafe"`).
    #[serde(rename = "restaurant_type")]
    pub restaurant_type: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RestaurantInfo {
    /// Trims every field and checks the required ones.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Validation`] naming the first missing or
    /// malformed field.
    pub fn normalized(self) -> Result<Self, PlatformError> {
        let required = |value: String, field: &str| {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                Err(PlatformError::Validation(format!("{field} is required")))
            } else {
                Ok(trimmed)
            }
        };

        let name = required(self.name, "restaurant_name")?;
        let address = required(self.address, "restaurant_address")?;
        let phone = required(self.phone, "restaurant_phone")?;
        let restaurant_type = required(self.restaurant_type, "restaurant_type")?;

        let digits = phone.chars().filter(char::is_ascii_digit).count();
        let well_formed = phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'));
        if !well_formed || !(8..=15).contains(&digits) {
            return Err(PlatformError::Validation(format!(
                "restaurant_phone is not a valid phone number: {phone}"
            )));
        }

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(Self {
            name,
            address,
            phone,
            restaurant_type,
            description,
        })
    }
}

/// A customer's purchase of a service plan for one restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Owner.
    pub user_id: UserId,
    /// Purchased plan.
    pub service_plan_id: PlanId,
    /// Restaurant metadata.
    #[serde(flatten)]
    pub restaurant: RestaurantInfo,
    /// Purchased length.
    pub duration: SubscriptionDuration,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// Start of the paid period; set when payment is confirmed.
    pub start_date: Option<DateTime<Utc>>,
    /// End of the paid period, derived from `start_date + duration`.
    pub end_date: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter, bumped on every write.
    #[serde(default)]
    pub revision: u64,
}

impl Subscription {
    /// Creates a new PENDING subscription.
    #[must_use]
    pub fn new(
        user_id: UserId,
        service_plan_id: PlanId,
        restaurant: RestaurantInfo,
        duration: SubscriptionDuration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id,
            service_plan_id,
            restaurant,
            duration,
            status: SubscriptionStatus::Pending,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            revision: 0,
        }
    }

    /// Returns `true` once soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Moves the subscription to `to` if the transition table allows it.
    ///
    /// Entering PAID stamps `start_date` (if not already set) and derives
    /// `end_date`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidTransition`] if `to` is not reachable
    /// from the current status, or a validation error if the end date
    /// cannot be represented.
    pub fn transition(
        &mut self,
        to: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PlatformError> {
        if !self.status.can_transition_to(to) {
            return Err(PlatformError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to == SubscriptionStatus::Paid && self.start_date.is_none() {
            self.start_date = Some(now);
        }
        self.derive_end_date()?;
        self.updated_at = now;
        Ok(())
    }

    /// Recomputes `end_date` from `start_date` once the subscription is
    /// PAID or later.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Validation`] if the end date overflows.
    pub fn derive_end_date(&mut self) -> Result<(), PlatformError> {
        if self.status.is_paid_or_later()
            && let Some(start) = self.start_date
        {
            self.end_date = Some(compute_end_date(start, self.duration)?);
        }
        Ok(())
    }

    /// Returns `true` for an ACTIVE subscription whose end date has passed.
    #[must_use]
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date.is_some_and(|end| end <= now)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn restaurant() -> RestaurantInfo {
        RestaurantInfo {
            name: "Pho 24".to_string(),
            address: "12 Nguyen Hue, District 1".to_string(),
            phone: "+84 28 3822 1234".to_string(),
            restaurant_type: "noodle".to_string(),
            description: None,
        }
    }

    fn subscription() -> Subscription {
        Subscription::new(
            UserId::new(),
            PlanId::new(),
            restaurant(),
            SubscriptionDuration::OneMonth,
            Utc::now(),
        )
    }

    #[test]
    fn transition_table_is_forward_only() {
        use SubscriptionStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Active));
        assert!(Paid.can_transition_to(Active));
        assert!(!Active.can_transition_to(Paid));
        assert!(Active.can_transition_to(Expired));
        for terminal in [Expired, Cancelled] {
            assert!(terminal.is_terminal());
            for to in SubscriptionStatus::ALL {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn active_is_only_reachable_through_paid() {
        for from in SubscriptionStatus::ALL {
            if from.can_transition_to(SubscriptionStatus::Active) {
                assert_eq!(from, SubscriptionStatus::Paid);
            }
        }
    }

    #[test]
    fn paying_stamps_start_and_end_dates() {
        let mut sub = subscription();
        let Some(now) = Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).single() else {
            panic!("invalid date");
        };
        assert!(sub.transition(SubscriptionStatus::Paid, now).is_ok());
        assert_eq!(sub.start_date, Some(now));
        assert_eq!(
            sub.end_date.map(|d| d.date_naive().to_string()),
            Some("2025-02-28".to_string())
        );
    }

    #[test]
    fn skipping_paid_is_rejected() {
        let mut sub = subscription();
        let err = sub.transition(SubscriptionStatus::Active, Utc::now());
        assert!(matches!(
            err,
            Err(PlatformError::InvalidTransition {
                from: SubscriptionStatus::Pending,
                to: SubscriptionStatus::Active
            })
        ));
        assert_eq!(sub.status, SubscriptionStatus::Pending);
    }

    #[test]
    fn restaurant_info_requires_core_fields() {
        let mut info = restaurant();
        info.address = "   ".to_string();
        let Err(PlatformError::Validation(msg)) = info.normalized() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("restaurant_address"));
    }

    #[test]
    fn restaurant_info_rejects_garbage_phone() {
        let mut info = restaurant();
        info.phone = "call me".to_string();
        assert!(info.normalized().is_err());
    }

    #[test]
    fn restaurant_info_trims_and_drops_blank_description() {
        let mut info = restaurant();
        info.name = "  Pho 24 ".to_string();
        info.description = Some("  ".to_string());
        let Ok(info) = info.normalized() else {
            panic!("expected valid info");
        };
        assert_eq!(info.name, "Pho 24");
        assert_eq!(info.description, None);
    }

    #[test]
    fn flattened_restaurant_fields_on_the_wire() {
        let sub = subscription();
        let Ok(json) = serde_json::to_value(&sub) else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("restaurant_name").cloned().unwrap_or_default(), "Pho 24");
        assert_eq!(json.get("status").cloned().unwrap_or_default(), "PENDING");
        assert_eq!(json.get("duration").cloned().unwrap_or_default(), "ONE_MONTH");
        assert!(json.get("deleted_at").is_none());
    }

    #[test]
    fn expiry_due_only_for_active_past_end() {
        let mut sub = subscription();
        let start = Utc::now() - chrono::Duration::days(40);
        assert!(sub.transition(SubscriptionStatus::Paid, start).is_ok());
        assert!(!sub.is_due_for_expiry(Utc::now()));
        assert!(sub.transition(SubscriptionStatus::Active, start).is_ok());
        assert!(sub.is_due_for_expiry(Utc::now()));
    }
}
