//! REST endpoint handlers organized by resource.

pub mod admin;
pub mod instances;
pub mod payments;
pub mod plans;
pub mod subscriptions;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(plans::routes())
        .merge(subscriptions::routes())
        .merge(payments::routes())
        .merge(instances::routes())
        .merge(admin::routes())
}
