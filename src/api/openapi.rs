//! OpenAPI document for the REST API.

use utoipa::OpenApi;

use super::handlers::{admin, instances, payments, plans, subscriptions, system};
use crate::error::ErrorResponse;

/// Generated OpenAPI description, served at `/api-docs/openapi.json`.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "QOS lifecycle API",
        description = "Subscriptions, payments and instance provisioning for the QR Ordering platform. Callers identify themselves with the `x-user-id` and `x-user-role` headers."
    ),
    paths(
        system::health_handler,
        plans::list_plans,
        plans::get_plan,
        plans::get_pricing,
        subscriptions::create_subscription,
        subscriptions::list_subscriptions,
        subscriptions::get_subscription,
        subscriptions::update_subscription,
        subscriptions::update_status,
        subscriptions::cancel_subscription,
        subscriptions::delete_subscription,
        subscriptions::get_subscription_instance,
        subscriptions::instance_exists,
        subscriptions::subscription_health,
        payments::create_payment,
        payments::payment_webhook,
        payments::payment_return,
        instances::create_instance,
        instances::list_instances,
        instances::get_instance,
        instances::update_instance,
        instances::delete_instance,
        instances::deploy_all,
        instances::activate_all,
        instances::maintenance_all,
        instances::set_service_status,
        admin::reconciliation,
    ),
    components(schemas(ErrorResponse)),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Plans", description = "Plan catalog and pricing"),
        (name = "Subscriptions", description = "Subscription lifecycle"),
        (name = "Payments", description = "Checkout and provider callbacks"),
        (name = "Instances", description = "Instance provisioning and status"),
        (name = "Admin", description = "Operational reports"),
    )
)]
pub struct ApiDoc;
