//! Payment handlers: checkout, provider webhook, buyer return page.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CreatePaymentRequest, CreatePaymentResponse, PaymentReturnQuery, PaymentReturnResponse,
    WebhookResponse,
};
use crate::app_state::AppState;
use crate::domain::Actor;
use crate::error::{ErrorResponse, PlatformError};

/// `POST /payments` — Open a checkout for a PENDING subscription.
///
/// # Errors
///
/// Returns [`PlatformError::NotEligible`] unless the subscription is
/// PENDING, or [`PlatformError::PaymentProvider`] if the provider fails.
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    tag = "Payments",
    summary = "Start checkout",
    description = "Creates a payment link for `price × months` of the subscription's plan. An open link is reused.",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Checkout link", body = CreatePaymentResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
        (status = 422, description = "Subscription not PENDING", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
    )
)]
pub async fn create_payment(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, PlatformError> {
    let session = state.payments.start_checkout(&actor, req.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse::from(session)),
    ))
}

/// `POST /payments/webhook` — Signed provider callback.
///
/// # Errors
///
/// Returns [`PlatformError::PaymentVerification`] for a body whose
/// signature does not verify.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    tag = "Payments",
    summary = "Provider webhook",
    description = "The only endpoint that settles payments. Redelivery is idempotent; unknown order codes are acknowledged.",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Delivery processed", body = WebhookResponse),
        (status = 400, description = "Signature verification failed", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, PlatformError> {
    let ack = state
        .payments
        .handle_webhook(&body)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "webhook rejected"))?;
    Ok(Json(WebhookResponse::from(ack)))
}

/// `GET /payments/return` — Buyer redirect target.
///
/// # Errors
///
/// Returns [`PlatformError::Persistence`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/payments/return",
    tag = "Payments",
    summary = "Payment return page",
    description = "Echoes the untrusted redirect parameters next to the recorded state. Never changes state.",
    params(PaymentReturnQuery),
    responses(
        (status = 200, description = "Recorded state", body = PaymentReturnResponse),
    )
)]
pub async fn payment_return(
    State(state): State<AppState>,
    Query(query): Query<PaymentReturnQuery>,
) -> Result<impl IntoResponse, PlatformError> {
    let view = state.payments.payment_return(query.into()).await?;
    Ok(Json(PaymentReturnResponse::from(view)))
}

/// Payment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments/webhook", post(payment_webhook))
        .route("/payments/return", get(payment_return))
}
