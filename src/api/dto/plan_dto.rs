//! Plan catalog DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{ServicePlan, SubscriptionDuration};
use crate::service::PriceQuote;

/// Query parameters for `GET /plans`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PlanListParams {
    /// Include plans that can no longer be purchased.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Query parameters for `GET /plans/{id}/pricing`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PricingParams {
    /// Duration to price.
    pub duration: SubscriptionDuration,
}

/// Response body for `GET /plans/{id}/pricing`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PricingResponse {
    /// The plan quoted.
    pub plan: ServicePlan,
    /// Requested duration.
    pub duration: SubscriptionDuration,
    /// Months billed.
    pub months: u32,
    /// Monthly price in minor units.
    pub unit_price: u64,
    /// Total for the whole duration.
    pub total: u64,
}

impl From<PriceQuote> for PricingResponse {
    fn from(quote: PriceQuote) -> Self {
        Self {
            unit_price: quote.plan.price,
            plan: quote.plan,
            duration: quote.duration,
            months: quote.months,
            total: quote.total,
        }
    }
}
