//! PayOS payment-link client built on reqwest.
//!
//! Outbound requests are signed with HMAC-SHA256 over
//! `amount=..&cancelUrl=..&description=..&orderCode=..&returnUrl=..`.
//! Webhooks carry a `data` object and a `signature` computed over the
//! alphabetically sorted `key=value&...` form of that object.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;

use super::{CheckoutLink, CheckoutRequest, PaymentGateway, PaymentNotification};
use crate::domain::ProviderResult;
use crate::error::PlatformError;

type HmacSha256 = Hmac<Sha256>;

/// Provider success code, used both for API responses and payment results.
const SUCCESS_CODE: &str = "00";

/// PayOS limits payment-link descriptions to 25 characters.
const MAX_DESCRIPTION_CHARS: usize = 25;

/// Credentials and endpoint for the PayOS API.
#[derive(Clone, Default)]
pub struct PayosConfig {
    /// `x-client-id` header value.
    pub client_id: String,
    /// `x-api-key` header value.
    pub api_key: String,
    /// HMAC key for request and webhook signatures.
    pub checksum_key: String,
    /// API base URL, e.g. `https://api-merchant.payos.vn`.
    pub api_base: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for PayosConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayosConfig")
            .field("client_id", &self.client_id)
            .field("api_key", &"<redacted>")
            .field("checksum_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PayosConfig {
    /// Returns `true` when every credential is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.api_key.is_empty() && !self.checksum_key.is_empty()
    }
}

/// [`PaymentGateway`] backed by the PayOS REST API.
#[derive(Debug, Clone)]
pub struct PayosGateway {
    http: reqwest::Client,
    config: PayosConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentLinkBody<'a> {
    order_code: i64,
    amount: u64,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_phone: Option<&'a str>,
    return_url: &'a str,
    cancel_url: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: String,
    #[serde(default)]
    desc: String,
    data: Option<PaymentLinkData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentLinkData {
    checkout_url: String,
    payment_link_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    data: Map<String, Value>,
    signature: String,
}

impl PayosGateway {
    /// Builds a gateway with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Internal`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: PayosConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlatformError::Internal(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    fn request_signature(&self, request: &CheckoutRequest, description: &str) -> String {
        let canonical = format!(
            "amount={}&cancelUrl={}&description={}&orderCode={}&returnUrl={}",
            request.amount, request.cancel_url, description, request.order_code, request.return_url
        );
        hmac_hex(&self.config.checksum_key, &canonical)
    }
}

#[async_trait]
impl PaymentGateway for PayosGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutLink, PlatformError> {
        if !self.config.is_configured() {
            return Err(PlatformError::PaymentProvider(
                "payment provider credentials are not configured".to_string(),
            ));
        }

        let description: String = request.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        let body = PaymentLinkBody {
            order_code: request.order_code,
            amount: request.amount,
            description: &description,
            buyer_name: request.buyer_name.as_deref(),
            buyer_email: request.buyer_email.as_deref(),
            buyer_phone: request.buyer_phone.as_deref(),
            return_url: &request.return_url,
            cancel_url: &request.cancel_url,
            signature: self.request_signature(request, &description),
        };

        let url = format!(
            "{}/v2/payment-requests",
            self.config.api_base.trim_end_matches('/')
        );
        let resp = self
            .http
            .post(&url)
            .header("x-client-id", &self.config.client_id)
            .header("x-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::PaymentProvider(format!("request failed: {e}")))?;

        let status = resp.status();
        let envelope: ApiEnvelope = resp.json().await.map_err(|e| {
            PlatformError::PaymentProvider(format!("unreadable response (status {status}): {e}"))
        })?;

        if envelope.code != SUCCESS_CODE {
            tracing::error!(
                order_code = request.order_code,
                provider_code = %envelope.code,
                provider_desc = %envelope.desc,
                "payment link creation rejected"
            );
            return Err(PlatformError::PaymentProvider(format!(
                "{} (code {})",
                envelope.desc, envelope.code
            )));
        }
        let data = envelope.data.ok_or_else(|| {
            PlatformError::PaymentProvider("response carried no payment link".to_string())
        })?;

        tracing::info!(order_code = request.order_code, "payment link created");
        Ok(CheckoutLink {
            checkout_url: data.checkout_url,
            payment_link_id: data.payment_link_id,
        })
    }

    fn verify_notification(&self, body: &[u8]) -> Result<PaymentNotification, PlatformError> {
        if self.config.checksum_key.is_empty() {
            return Err(PlatformError::PaymentVerification(
                "no checksum key configured".to_string(),
            ));
        }
        let webhook: WebhookBody = serde_json::from_slice(body)
            .map_err(|e| PlatformError::PaymentVerification(format!("malformed body: {e}")))?;

        let expected = hex::decode(webhook.signature.trim())
            .map_err(|_| PlatformError::PaymentVerification("signature is not hex".to_string()))?;
        let mut mac = HmacSha256::new_from_slice(self.config.checksum_key.as_bytes())
            .map_err(|_| PlatformError::PaymentVerification("invalid checksum key".to_string()))?;
        mac.update(canonical_data(&webhook.data).as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| PlatformError::PaymentVerification("signature mismatch".to_string()))?;

        parse_notification(&webhook.data)
    }
}

fn parse_notification(data: &Map<String, Value>) -> Result<PaymentNotification, PlatformError> {
    let order_code = data
        .get("orderCode")
        .and_then(Value::as_i64)
        .ok_or_else(|| PlatformError::PaymentVerification("missing orderCode".to_string()))?;

    let code = data.get("code").and_then(Value::as_str).unwrap_or_default();
    let result = if code == SUCCESS_CODE {
        ProviderResult::Success {
            reference: data
                .get("reference")
                .and_then(Value::as_str)
                .map(str::to_string),
            amount: data.get("amount").and_then(Value::as_u64).unwrap_or(0),
        }
    } else {
        ProviderResult::Failure {
            reason: data
                .get("desc")
                .and_then(Value::as_str)
                .unwrap_or("payment failed")
                .to_string(),
        }
    };
    Ok(PaymentNotification { order_code, result })
}

/// `key=value` pairs sorted by key and joined with `&`. `null` renders as
/// an empty string; nested values render as compact JSON.
fn canonical_data(data: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| {
            let value = match data.get(key) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac_hex(key: &str, message: &str) -> String {
    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return String::new();
    };
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Signs a webhook `data` object the way PayOS does.
///
/// Used to build verifiable callbacks in tests and local tooling.
#[must_use]
pub fn sign_data(data: &Map<String, Value>, checksum_key: &str) -> String {
    hmac_hex(checksum_key, &canonical_data(data))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    const KEY: &str = "test-checksum-key";

    fn gateway() -> PayosGateway {
        let Ok(gw) = PayosGateway::new(PayosConfig {
            client_id: "client".to_string(),
            api_key: "api".to_string(),
            checksum_key: KEY.to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(1),
        }) else {
            panic!("gateway");
        };
        gw
    }

    fn data(code: &str) -> Map<String, Value> {
        let desc = if code == "00" { "success" } else { "cancelled by buyer" };
        let Value::Object(map) = json!({
            "orderCode": 123_456,
            "amount": 897_000,
            "description": "QOS 123456",
            "reference": "FT2501310001",
            "code": code,
            "desc": desc,
            "counterAccountName": null,
        }) else {
            panic!("object literal");
        };
        map
    }

    fn body(data: &Map<String, Value>, signature: &str) -> Vec<u8> {
        json!({ "code": "00", "desc": "success", "success": true, "data": data, "signature": signature })
            .to_string()
            .into_bytes()
    }

    #[test]
    fn canonical_form_sorts_keys_and_blanks_nulls() {
        let canonical = canonical_data(&data("00"));
        assert!(canonical.starts_with("amount=897000&code=00&counterAccountName=&desc=success"));
        assert!(canonical.ends_with("orderCode=123456&reference=FT2501310001"));
    }

    #[test]
    fn valid_signature_yields_success() {
        let d = data("00");
        let sig = sign_data(&d, KEY);
        let Ok(notification) = gateway().verify_notification(&body(&d, &sig)) else {
            panic!("signature should verify");
        };
        assert_eq!(notification.order_code, 123_456);
        assert_eq!(
            notification.result,
            ProviderResult::Success {
                reference: Some("FT2501310001".to_string()),
                amount: 897_000,
            }
        );
    }

    #[test]
    fn non_success_code_yields_failure() {
        let d = data("01");
        let sig = sign_data(&d, KEY);
        let Ok(notification) = gateway().verify_notification(&body(&d, &sig)) else {
            panic!("signature should verify");
        };
        assert!(!notification.result.is_success());
    }

    #[test]
    fn tampered_data_is_rejected() {
        let d = data("00");
        let sig = sign_data(&d, KEY);
        let mut tampered = d;
        tampered.insert("amount".to_string(), json!(1));
        assert!(matches!(
            gateway().verify_notification(&body(&tampered, &sig)),
            Err(PlatformError::PaymentVerification(_))
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let d = data("00");
        let sig = sign_data(&d, "another-key");
        assert!(gateway().verify_notification(&body(&d, &sig)).is_err());
        assert!(gateway().verify_notification(b"not json").is_err());
    }

    #[tokio::test]
    async fn unconfigured_gateway_refuses_checkout() {
        let Ok(gw) = PayosGateway::new(PayosConfig::default()) else {
            panic!("gateway");
        };
        let request = CheckoutRequest {
            order_code: 1,
            amount: 199_000,
            description: "QOS 1".to_string(),
            buyer_name: None,
            buyer_email: None,
            buyer_phone: None,
            return_url: "http://localhost/return".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
        };
        assert!(matches!(
            gw.create_checkout(&request).await,
            Err(PlatformError::PaymentProvider(_))
        ));
    }
}
