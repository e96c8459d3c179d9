//! Payment DTOs: checkout, webhook acknowledgement, return page.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{PaymentId, PaymentStatus, SubscriptionId, SubscriptionStatus};
use crate::service::{CheckoutInput, CheckoutSession, ReturnHints, ReturnView, WebhookAck};

/// Request body for `POST /payments`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    /// Subscription to pay for.
    pub subscription_id: SubscriptionId,
    /// Buyer display name.
    #[serde(default)]
    pub buyer_name: Option<String>,
    /// Buyer email.
    #[serde(default)]
    pub buyer_email: Option<String>,
    /// Buyer phone.
    #[serde(default)]
    pub buyer_phone: Option<String>,
}

impl From<CreatePaymentRequest> for CheckoutInput {
    fn from(req: CreatePaymentRequest) -> Self {
        Self {
            subscription_id: req.subscription_id,
            buyer_name: req.buyer_name,
            buyer_email: req.buyer_email,
            buyer_phone: req.buyer_phone,
        }
    }
}

/// Provider checkout details.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PayosData {
    /// Hosted checkout page.
    pub checkout_url: String,
    /// Provider order code.
    pub order_code: i64,
}

/// Response body for `POST /payments`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentResponse {
    /// Payment attempt.
    pub payment_id: PaymentId,
    /// Amount charged, in minor units.
    pub amount: u64,
    /// Attempt status.
    pub status: PaymentStatus,
    /// Provider checkout details.
    pub payos_data: PayosData,
}

impl From<CheckoutSession> for CreatePaymentResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            payment_id: session.payment.id,
            amount: session.payment.amount,
            status: session.payment.status,
            payos_data: PayosData {
                checkout_url: session.checkout_url,
                order_code: session.payment.order_code,
            },
        }
    }
}

/// Response body for `POST /payments/webhook`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    /// Always `true`; a rejected delivery is an error response instead.
    pub success: bool,
    /// Order code the delivery named.
    pub order_code: i64,
    /// Payment status after processing; absent for unknown orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    /// Subscription status after processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<SubscriptionStatus>,
}

impl From<WebhookAck> for WebhookResponse {
    fn from(ack: WebhookAck) -> Self {
        Self {
            success: true,
            order_code: ack.order_code,
            payment_status: ack.payment_status,
            subscription_status: ack.subscription_status,
        }
    }
}

/// Query string appended by the provider to the return redirect.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReturnQuery {
    /// Order code.
    #[serde(default)]
    pub order_code: Option<i64>,
    /// Claimed amount.
    #[serde(default)]
    pub amount: Option<u64>,
    /// Provider result code.
    #[serde(default)]
    pub code: Option<String>,
    /// Provider status text.
    #[serde(default)]
    pub status: Option<String>,
}

impl From<PaymentReturnQuery> for ReturnHints {
    fn from(q: PaymentReturnQuery) -> Self {
        Self {
            order_code: q.order_code,
            amount: q.amount,
            code: q.code,
            status: q.status,
        }
    }
}

/// Response body for `GET /payments/return`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentReturnResponse {
    /// Order code from the redirect.
    pub order_code: Option<i64>,
    /// Untrusted provider code from the redirect.
    pub reported_code: Option<String>,
    /// Untrusted provider status from the redirect.
    pub reported_status: Option<String>,
    /// Untrusted amount from the redirect.
    pub reported_amount: Option<u64>,
    /// Recorded payment status.
    pub payment_status: Option<PaymentStatus>,
    /// Subscription the payment belongs to.
    pub subscription_id: Option<SubscriptionId>,
    /// Recorded subscription status; the only authoritative field.
    pub subscription_status: Option<SubscriptionStatus>,
}

impl From<ReturnView> for PaymentReturnResponse {
    fn from(view: ReturnView) -> Self {
        Self {
            order_code: view.hints.order_code,
            reported_code: view.hints.code,
            reported_status: view.hints.status,
            reported_amount: view.hints.amount,
            payment_status: view.payment_status,
            subscription_id: view.subscription_id,
            subscription_status: view.subscription_status,
        }
    }
}
