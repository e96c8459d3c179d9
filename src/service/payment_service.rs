//! Checkout initiation and provider webhook settlement.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    Actor, EventBus, LifecycleEvent, Payment, PaymentStatus, ProviderResult, SubscriptionId,
    SubscriptionStatus, checkout_total,
};
use crate::error::PlatformError;
use crate::payment::{CheckoutRequest, PaymentGateway};
use crate::persistence::LifecycleStore;
use crate::service::SubscriptionService;

/// Buyer details for [`PaymentService::start_checkout`].
#[derive(Debug, Clone, Default)]
pub struct CheckoutInput {
    /// Subscription to pay for.
    pub subscription_id: SubscriptionId,
    /// Buyer display name.
    pub buyer_name: Option<String>,
    /// Buyer email.
    pub buyer_email: Option<String>,
    /// Buyer phone.
    pub buyer_phone: Option<String>,
}

/// An open checkout for a PENDING subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// The pending payment attempt.
    pub payment: Payment,
    /// Hosted checkout page.
    pub checkout_url: String,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    /// Order code named by the provider.
    pub order_code: i64,
    /// Payment status after processing; `None` for an unknown order code.
    pub payment_status: Option<PaymentStatus>,
    /// Subscription status after processing, when it could be read.
    pub subscription_status: Option<SubscriptionStatus>,
}

/// Query hints the provider appends to the return redirect. Untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnHints {
    /// Order code.
    pub order_code: Option<i64>,
    /// Claimed amount.
    pub amount: Option<u64>,
    /// Provider result code.
    pub code: Option<String>,
    /// Provider status text.
    pub status: Option<String>,
}

/// Server-side view shown on the return page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnView {
    /// The hints as received.
    pub hints: ReturnHints,
    /// Recorded payment status, if the order code is known.
    pub payment_status: Option<PaymentStatus>,
    /// Subscription the payment belongs to.
    pub subscription_id: Option<SubscriptionId>,
    /// Recorded subscription status.
    pub subscription_status: Option<SubscriptionStatus>,
}

/// Bridges the payment provider and the subscription manager.
///
/// Only a verified webhook moves money state. The return redirect is
/// display-only.
#[derive(Debug, Clone)]
pub struct PaymentService {
    store: Arc<dyn LifecycleStore>,
    subscriptions: Arc<SubscriptionService>,
    gateway: Arc<dyn PaymentGateway>,
    event_bus: EventBus,
    return_url: String,
    cancel_url: String,
}

impl PaymentService {
    /// Creates a new `PaymentService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        subscriptions: Arc<SubscriptionService>,
        gateway: Arc<dyn PaymentGateway>,
        event_bus: EventBus,
        return_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            store,
            subscriptions,
            gateway,
            event_bus,
            return_url,
            cancel_url,
        }
    }

    /// Opens (or reuses) a checkout for a PENDING subscription.
    ///
    /// A still-pending attempt that already has a link is returned as is.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::NotFound`] if the actor cannot see the
    ///   subscription.
    /// - [`PlatformError::NotEligible`] unless it is PENDING.
    /// - [`PlatformError::PaymentProvider`] if the provider fails; the
    ///   attempt is then recorded as FAILED.
    pub async fn start_checkout(
        &self,
        actor: &Actor,
        input: CheckoutInput,
    ) -> Result<CheckoutSession, PlatformError> {
        let sub = self
            .subscriptions
            .get_subscription(actor, input.subscription_id)
            .await?;
        if sub.status != SubscriptionStatus::Pending {
            return Err(PlatformError::NotEligible(format!(
                "subscription is {}, only PENDING subscriptions can be paid",
                sub.status
            )));
        }

        if let Some(open) = self.store.latest_payment_for_subscription(sub.id).await?
            && open.status == PaymentStatus::Pending
            && let Some(url) = open.checkout_url.clone()
        {
            return Ok(CheckoutSession {
                payment: open,
                checkout_url: url,
            });
        }

        let plan = self.subscriptions.catalog().get(sub.service_plan_id)?;
        let amount = checkout_total(plan.price, sub.duration)?;
        let payment = Payment::new(sub.id, amount, Utc::now());
        self.store.insert_payment(&payment).await?;

        let request = CheckoutRequest {
            order_code: payment.order_code,
            amount,
            description: format!("QOS {}", plan.name),
            buyer_name: input.buyer_name,
            buyer_email: input.buyer_email,
            buyer_phone: input.buyer_phone,
            return_url: self.return_url.clone(),
            cancel_url: self.cancel_url.clone(),
        };

        let link = match self.gateway.create_checkout(&request).await {
            Ok(link) => link,
            Err(e) => {
                let mut failed = payment.clone();
                failed.status = PaymentStatus::Failed;
                failed.updated_at = Utc::now();
                if let Err(mark) = self.store.replace_payment(&failed, PaymentStatus::Pending).await {
                    tracing::warn!(error = %mark, payment_id = %payment.id, "could not mark payment failed");
                }
                tracing::warn!(error = %e, subscription_id = %sub.id, "checkout link creation failed");
                return Err(e);
            }
        };

        let mut issued = payment;
        issued.checkout_url = Some(link.checkout_url.clone());
        issued.updated_at = Utc::now();
        if !self
            .store
            .replace_payment(&issued, PaymentStatus::Pending)
            .await?
        {
            return Err(PlatformError::StateConflict(format!(
                "payment {} settled before its link was stored",
                issued.id
            )));
        }

        self.event_bus.publish(LifecycleEvent::PaymentInitiated {
            payment_id: issued.id,
            subscription_id: sub.id,
            order_code: issued.order_code,
            amount,
            timestamp: issued.updated_at,
        });
        tracing::info!(
            subscription_id = %sub.id,
            order_code = issued.order_code,
            amount,
            "checkout link issued"
        );
        Ok(CheckoutSession {
            payment: issued,
            checkout_url: link.checkout_url,
        })
    }

    /// Verifies a provider callback and settles the payment it names.
    ///
    /// Redelivery is safe: a payment that is already PAID re-runs the
    /// idempotent subscription confirmation, and a payment settled any
    /// other way is left alone. A success for less than the recorded
    /// amount is treated as a failure. Unknown order codes are
    /// acknowledged without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::PaymentVerification`] for an unsigned or
    /// tampered body, or [`PlatformError::Persistence`] on storage failure.
    pub async fn handle_webhook(&self, body: &[u8]) -> Result<WebhookAck, PlatformError> {
        let notification = self.gateway.verify_notification(body)?;
        let order_code = notification.order_code;

        let Some(payment) = self.store.get_payment_by_order_code(order_code).await? else {
            tracing::warn!(order_code, "webhook for unknown order code ignored");
            return Ok(WebhookAck {
                order_code,
                payment_status: None,
                subscription_status: None,
            });
        };

        let result = match notification.result {
            ProviderResult::Success { amount, .. } if amount < payment.amount => {
                tracing::warn!(
                    order_code,
                    expected = payment.amount,
                    received = amount,
                    "underpaid order treated as failed"
                );
                ProviderResult::Failure {
                    reason: format!("paid {amount}, expected {}", payment.amount),
                }
            }
            other => other,
        };

        let settled = self.settle(payment, &result).await?;

        let subscription_status = if settled.status == PaymentStatus::Paid {
            match self
                .subscriptions
                .confirm_payment(settled.subscription_id, &result)
                .await
            {
                Ok(sub) => Some(sub.status),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        subscription_id = %settled.subscription_id,
                        "paid order could not confirm its subscription"
                    );
                    None
                }
            }
        } else {
            self.store
                .get_subscription(settled.subscription_id)
                .await?
                .map(|sub| sub.status)
        };

        Ok(WebhookAck {
            order_code,
            payment_status: Some(settled.status),
            subscription_status,
        })
    }

    /// Reports recorded state for a return redirect. Never writes.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    pub async fn payment_return(&self, hints: ReturnHints) -> Result<ReturnView, PlatformError> {
        let payment = match hints.order_code {
            Some(code) => self.store.get_payment_by_order_code(code).await?,
            None => None,
        };
        let subscription = match &payment {
            Some(p) => self.store.get_subscription(p.subscription_id).await?,
            None => None,
        };
        Ok(ReturnView {
            hints,
            payment_status: payment.as_ref().map(|p| p.status),
            subscription_id: payment.map(|p| p.subscription_id),
            subscription_status: subscription.map(|s| s.status),
        })
    }

    /// Moves a PENDING payment to PAID or FAILED. Already-settled payments
    /// are returned unchanged.
    async fn settle(
        &self,
        payment: Payment,
        result: &ProviderResult,
    ) -> Result<Payment, PlatformError> {
        if payment.status.is_settled() {
            return Ok(payment);
        }

        let mut next = payment.clone();
        match result {
            ProviderResult::Success { reference, .. } => {
                next.status = PaymentStatus::Paid;
                next.provider_reference.clone_from(reference);
            }
            ProviderResult::Failure { .. } => next.status = PaymentStatus::Failed,
        }
        next.updated_at = Utc::now();

        if !self
            .store
            .replace_payment(&next, PaymentStatus::Pending)
            .await?
        {
            // A concurrent delivery settled it first.
            return self
                .store
                .get_payment_by_order_code(payment.order_code)
                .await?
                .ok_or_else(|| PlatformError::not_found("payment", payment.order_code));
        }

        self.event_bus.publish(LifecycleEvent::PaymentSettled {
            payment_id: next.id,
            subscription_id: next.subscription_id,
            status: next.status,
            timestamp: next.updated_at,
        });
        tracing::info!(
            order_code = next.order_code,
            status = %next.status,
            "payment settled"
        );
        Ok(next)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde::Deserialize;

    use super::*;
    use crate::domain::{
        PlanCatalog, RestaurantInfo, Subscription, SubscriptionDuration, UserId,
    };
    use crate::payment::{CheckoutLink, PaymentNotification};
    use crate::persistence::memory::MemoryStore;
    use crate::service::subscription_service::NewSubscription;

    /// Gateway double: records checkouts, trusts any JSON body.
    #[derive(Debug, Default)]
    struct FakeGateway {
        requests: Mutex<Vec<CheckoutRequest>>,
        fail: bool,
    }

    #[derive(Deserialize)]
    struct FakeBody {
        order_code: i64,
        success: bool,
        amount: u64,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_checkout(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutLink, PlatformError> {
            if self.fail {
                return Err(PlatformError::PaymentProvider("provider down".to_string()));
            }
            if let Ok(mut seen) = self.requests.lock() {
                seen.push(request.clone());
            }
            Ok(CheckoutLink {
                checkout_url: format!("https://pay.example.com/{}", request.order_code),
                payment_link_id: None,
            })
        }

        fn verify_notification(&self, body: &[u8]) -> Result<PaymentNotification, PlatformError> {
            let parsed: FakeBody = serde_json::from_slice(body)
                .map_err(|e| PlatformError::PaymentVerification(e.to_string()))?;
            let result = if parsed.success {
                ProviderResult::Success {
                    reference: Some("FT123".to_string()),
                    amount: parsed.amount,
                }
            } else {
                ProviderResult::Failure {
                    reason: "declined".to_string(),
                }
            };
            Ok(PaymentNotification {
                order_code: parsed.order_code,
                result,
            })
        }
    }

    struct Fixture {
        payments: PaymentService,
        subscriptions: Arc<SubscriptionService>,
        gateway: Arc<FakeGateway>,
        owner: Actor,
        subscription: Subscription,
    }

    async fn fixture_with(gateway: FakeGateway) -> Fixture {
        let store: Arc<dyn LifecycleStore> = Arc::new(MemoryStore::new());
        let catalog = Arc::new(PlanCatalog::builtin());
        let bus = EventBus::new(64);
        let subscriptions = Arc::new(SubscriptionService::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            bus.clone(),
            None,
        ));
        let gateway = Arc::new(gateway);
        let payments = PaymentService::new(
            store,
            Arc::clone(&subscriptions),
            Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
            bus,
            "https://qos.example.com/payment/return".to_string(),
            "https://qos.example.com/payment/cancel".to_string(),
        );

        let owner = Actor::user(UserId::new());
        let Some(plan) = catalog.list(false).into_iter().next() else {
            panic!("builtin catalog has plans");
        };
        let Ok(subscription) = subscriptions
            .create_subscription(
                &owner,
                NewSubscription {
                    plan_id: plan.id,
                    restaurant: RestaurantInfo {
                        name: "Banh Mi Huynh Hoa".to_string(),
                        address: "26 Le Thi Rieng, District 1".to_string(),
                        phone: "0283 925 0885".to_string(),
                        restaurant_type: "street food".to_string(),
                        description: None,
                    },
                    duration: SubscriptionDuration::ThreeMonths,
                },
            )
            .await
        else {
            panic!("create subscription");
        };

        Fixture {
            payments,
            subscriptions,
            gateway,
            owner,
            subscription,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(FakeGateway::default()).await
    }

    async fn checkout(fx: &Fixture) -> CheckoutSession {
        let input = CheckoutInput {
            subscription_id: fx.subscription.id,
            buyer_name: Some("Tran Van B".to_string()),
            ..CheckoutInput::default()
        };
        let Ok(session) = fx.payments.start_checkout(&fx.owner, input).await else {
            panic!("checkout");
        };
        session
    }

    fn webhook(order_code: i64, success: bool, amount: u64) -> Vec<u8> {
        serde_json::json!({ "order_code": order_code, "success": success, "amount": amount })
            .to_string()
            .into_bytes()
    }

    #[tokio::test]
    async fn checkout_charges_plan_price_times_months() {
        let fx = fixture().await;
        let session = checkout(&fx).await;
        let Ok(plan) = fx.subscriptions.catalog().get(fx.subscription.service_plan_id) else {
            panic!("plan");
        };
        assert_eq!(session.payment.amount, plan.price * 3);
        assert_eq!(session.payment.status, PaymentStatus::Pending);
        assert!(session.checkout_url.ends_with(&session.payment.order_code.to_string()));
    }

    #[tokio::test]
    async fn second_checkout_reuses_open_link() {
        let fx = fixture().await;
        let first = checkout(&fx).await;
        let second = checkout(&fx).await;
        assert_eq!(first.payment.id, second.payment.id);
        let calls = fx.gateway.requests.lock().map(|r| r.len()).unwrap_or_default();
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn strangers_cannot_open_checkout() {
        let fx = fixture().await;
        let input = CheckoutInput {
            subscription_id: fx.subscription.id,
            ..CheckoutInput::default()
        };
        assert!(matches!(
            fx.payments
                .start_checkout(&Actor::user(UserId::new()), input)
                .await,
            Err(PlatformError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn provider_failure_is_surfaced() {
        let fx = fixture_with(FakeGateway {
            fail: true,
            ..FakeGateway::default()
        })
        .await;
        let input = CheckoutInput {
            subscription_id: fx.subscription.id,
            ..CheckoutInput::default()
        };
        assert!(matches!(
            fx.payments.start_checkout(&fx.owner, input).await,
            Err(PlatformError::PaymentProvider(_))
        ));
    }

    #[tokio::test]
    async fn successful_webhook_marks_subscription_paid() {
        let fx = fixture().await;
        let session = checkout(&fx).await;
        let body = webhook(session.payment.order_code, true, session.payment.amount);

        let Ok(ack) = fx.payments.handle_webhook(&body).await else {
            panic!("webhook");
        };
        assert_eq!(ack.payment_status, Some(PaymentStatus::Paid));
        assert_eq!(ack.subscription_status, Some(SubscriptionStatus::Paid));
    }

    #[tokio::test]
    async fn redelivered_webhook_is_idempotent() {
        let fx = fixture().await;
        let session = checkout(&fx).await;
        let body = webhook(session.payment.order_code, true, session.payment.amount);

        let Ok(_) = fx.payments.handle_webhook(&body).await else {
            panic!("first delivery");
        };
        let Ok(first) = fx.subscriptions.get_subscription(&fx.owner, fx.subscription.id).await
        else {
            panic!("read back");
        };
        let Ok(ack) = fx.payments.handle_webhook(&body).await else {
            panic!("second delivery");
        };
        assert_eq!(ack.subscription_status, Some(SubscriptionStatus::Paid));
        let Ok(second) = fx.subscriptions.get_subscription(&fx.owner, fx.subscription.id).await
        else {
            panic!("read back");
        };
        assert_eq!(first.start_date, second.start_date);
    }

    #[tokio::test]
    async fn failed_webhook_leaves_subscription_pending() {
        let fx = fixture().await;
        let session = checkout(&fx).await;
        let body = webhook(session.payment.order_code, false, 0);

        let Ok(ack) = fx.payments.handle_webhook(&body).await else {
            panic!("webhook");
        };
        assert_eq!(ack.payment_status, Some(PaymentStatus::Failed));
        assert_eq!(ack.subscription_status, Some(SubscriptionStatus::Pending));
    }

    #[tokio::test]
    async fn underpayment_counts_as_failure() {
        let fx = fixture().await;
        let session = checkout(&fx).await;
        let body = webhook(session.payment.order_code, true, session.payment.amount - 1);

        let Ok(ack) = fx.payments.handle_webhook(&body).await else {
            panic!("webhook");
        };
        assert_eq!(ack.payment_status, Some(PaymentStatus::Failed));
        assert_eq!(ack.subscription_status, Some(SubscriptionStatus::Pending));
    }

    #[tokio::test]
    async fn unknown_order_code_is_acknowledged() {
        let fx = fixture().await;
        let Ok(ack) = fx.payments.handle_webhook(&webhook(42, true, 1)).await else {
            panic!("webhook");
        };
        assert_eq!(ack.payment_status, None);
    }

    #[tokio::test]
    async fn unverifiable_body_is_rejected() {
        let fx = fixture().await;
        assert!(matches!(
            fx.payments.handle_webhook(b"not json").await,
            Err(PlatformError::PaymentVerification(_))
        ));
    }

    #[tokio::test]
    async fn return_page_never_mutates() {
        let fx = fixture().await;
        let session = checkout(&fx).await;
        let hints = ReturnHints {
            order_code: Some(session.payment.order_code),
            code: Some("00".to_string()),
            status: Some("PAID".to_string()),
            amount: Some(session.payment.amount),
        };
        let Ok(view) = fx.payments.payment_return(hints).await else {
            panic!("return");
        };
        assert_eq!(view.payment_status, Some(PaymentStatus::Pending));
        assert_eq!(view.subscription_status, Some(SubscriptionStatus::Pending));
        assert_eq!(view.subscription_id, Some(fx.subscription.id));
    }
}
