//! Read-only catalog of purchasable service plans.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::PlanId;
use crate::error::PlatformError;

/// A purchasable service tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServicePlan {
    /// Plan identifier.
    pub id: PlanId,
    /// Display name.
    pub name: String,
    /// Monthly price in minor currency units.
    pub price: u64,
    /// Marketing description.
    pub description: String,
    /// Whether the plan can still be purchased.
    pub active: bool,
}

/// Immutable, in-memory plan catalog.
///
/// Loaded once at startup (from PostgreSQL or the built-in defaults) and
/// shared behind an `Arc`. The core never mutates plans.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, ServicePlan>,
}

impl PlanCatalog {
    /// Builds a catalog from a list of plans.
    #[must_use]
    pub fn new(plans: Vec<ServicePlan>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    /// The catalog used when no database is configured.
    #[must_use]
    pub fn builtin() -> Self {
        let plan = |name: &str, price: u64, description: &str| ServicePlan {
            id: PlanId::new(),
            name: name.to_string(),
            price,
            description: description.to_string(),
            active: true,
        };
        Self::new(vec![
            plan("Basic", 199_000, "QR menu and ordering for up to 10 tables"),
            plan("Standard", 299_000, "Up to 30 tables, kitchen display and reports"),
            plan("Premium", 499_000, "Unlimited tables, multi-branch and priority support"),
        ])
    }

    /// Looks up a plan by id, active or not.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotFound`] for unknown ids.
    pub fn get(&self, id: PlanId) -> Result<&ServicePlan, PlatformError> {
        self.plans
            .get(&id)
            .ok_or_else(|| PlatformError::not_found("service plan", id))
    }

    /// Looks up a plan that can be purchased right now.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Validation`] if the plan does not exist or
    /// is no longer active.
    pub fn purchasable(&self, id: PlanId) -> Result<&ServicePlan, PlatformError> {
        match self.plans.get(&id) {
            Some(plan) if plan.active => Ok(plan),
            Some(_) => Err(PlatformError::Validation(format!(
                "service plan {id} is no longer available"
            ))),
            None => Err(PlatformError::Validation(format!(
                "service plan {id} does not exist"
            ))),
        }
    }

    /// Returns plans sorted by price, optionally including inactive ones.
    #[must_use]
    pub fn list(&self, include_inactive: bool) -> Vec<ServicePlan> {
        let mut plans: Vec<ServicePlan> = self
            .plans
            .values()
            .filter(|p| include_inactive || p.active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        plans
    }

    /// Number of plans in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Returns `true` if the catalog holds no plans.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
