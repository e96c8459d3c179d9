//! Payment provider boundary.
//!
//! The lifecycle core only needs two things from a provider: a hosted
//! checkout link for an order, and a way to turn a signed callback into a
//! trusted [`ProviderResult`]. [`PaymentGateway`] captures exactly that;
//! [`payos::PayosGateway`] is the production implementation.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::ProviderResult;
use crate::error::PlatformError;

pub mod payos;

pub use payos::{PayosConfig, PayosGateway};

/// Everything the provider needs to open a checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Numeric order code, unique per payment attempt.
    pub order_code: i64,
    /// Amount in minor currency units.
    pub amount: u64,
    /// Short order description shown to the buyer.
    pub description: String,
    /// Buyer display name.
    pub buyer_name: Option<String>,
    /// Buyer email.
    pub buyer_email: Option<String>,
    /// Buyer phone.
    pub buyer_phone: Option<String>,
    /// Where the provider redirects after payment.
    pub return_url: String,
    /// Where the provider redirects on cancellation.
    pub cancel_url: String,
}

/// A hosted checkout page issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLink {
    /// URL the buyer is redirected to.
    pub checkout_url: String,
    /// Provider-side identifier of the link, if returned.
    pub payment_link_id: Option<String>,
}

/// A verified provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    /// Order code the callback refers to.
    pub order_code: i64,
    /// Outcome reported by the provider.
    pub result: ProviderResult,
}

/// Outbound and inbound operations against a payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync + Debug {
    /// Creates a hosted checkout link.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::PaymentProvider`] if the provider is
    /// unreachable or rejects the request.
    async fn create_checkout(&self, request: &CheckoutRequest)
    -> Result<CheckoutLink, PlatformError>;

    /// Authenticates and parses a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::PaymentVerification`] if the body is
    /// malformed or its signature does not match.
    fn verify_notification(&self, body: &[u8]) -> Result<PaymentNotification, PlatformError>;
}
