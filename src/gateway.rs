//! Hosted checkout provider: session creation and signed event verification.
//!
//! The service talks to the provider only through [`PaymentGateway`], so the
//! reconciler can be driven by a fake in tests.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::StripeConfig;

type HmacSha256 = Hmac<Sha256>;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(String),

    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),

    #[error("Payment gateway unreachable: {0}")]
    Transport(String),

    #[error("Payment gateway rejected request ({status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    pub product_name: String,
    pub images: Vec<String>,
    pub unit_amount: i64,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    CheckoutSessionCompleted,
    Other(String),
}

impl GatewayEventKind {
    fn from_type(kind: &str) -> Self {
        match kind {
            CHECKOUT_SESSION_COMPLETED => GatewayEventKind::CheckoutSessionCompleted,
            other => GatewayEventKind::Other(other.to_string()),
        }
    }
}

/// A verified notification from the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub kind: GatewayEventKind,
    pub session_id: Option<String>,
    pub amount_total: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    fn verify_and_parse_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, GatewayError>;
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Checks a `t=<unix>,v1=<hex>` signature header against the raw payload.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), GatewayError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::SignatureInvalid("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(GatewayError::SignatureInvalid(
            "missing v1 signature".to_string(),
        ));
    }

    let issued_at: i64 = timestamp
        .parse()
        .map_err(|_| GatewayError::SignatureInvalid("malformed timestamp".to_string()))?;
    if now.abs_diff(issued_at) > tolerance_secs.unsigned_abs() {
        return Err(GatewayError::SignatureInvalid(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::SignatureInvalid(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(GatewayError::SignatureInvalid(
            "no matching signature".to_string(),
        ))
    }
}

/// Decodes an already-verified event payload.
pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;

    Ok(GatewayEvent {
        kind: GatewayEventKind::from_type(&raw.kind),
        session_id: raw
            .data
            .object
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        amount_total: raw.data.object.get("amount_total").and_then(|v| v.as_i64()),
    })
}

/// Stripe-compatible hosted checkout client.
pub struct StripeGateway {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self { http, config })
    }

    fn session_form(&self, request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.config.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.product_name.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.unit_amount.to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];

        for (i, image) in request.images.iter().enumerate() {
            form.push((
                format!("line_items[0][price_data][product_data][images][{i}]"),
                image.clone(),
            ));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        form
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = format!(
            "{}/v1/checkout/sessions",
            self.config.api_base.trim_end_matches('/')
        );

        let res = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(&self.session_form(&request))
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<CheckoutSession>()
                .await
                .map_err(|e| GatewayError::Api {
                    status: status.as_u16(),
                    message: format!("unexpected session response: {e}"),
                });
        }

        let error_text = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&error_text)
            .map(|body| body.error.message)
            .unwrap_or(error_text);

        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn verify_and_parse_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        verify_signature(
            payload,
            signature,
            &self.config.webhook_secret,
            self.config.webhook_tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;
        parse_event(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign(payload, SECRET, 1_700_000_000);

        assert!(verify_signature(payload, &header, SECRET, 300, 1_700_000_010).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign(payload, "another_secret", 1_700_000_000);

        let result = verify_signature(payload, &header, SECRET, 300, 1_700_000_000);
        assert!(matches!(result, Err(GatewayError::SignatureInvalid(_))));
    }

    #[test]
    fn rejects_modified_payload() {
        let header = sign(br#"{"amount_total":500}"#, SECRET, 1_700_000_000);

        let result = verify_signature(br#"{"amount_total":1}"#, &header, SECRET, 300, 1_700_000_000);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = b"{}";
        let header = sign(payload, SECRET, 1_700_000_000);

        let result = verify_signature(payload, &header, SECRET, 300, 1_700_000_301);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_extreme_timestamps() {
        for timestamp in [i64::MIN, i64::MAX] {
            let header = format!("t={timestamp},v1=00");
            let result = verify_signature(b"{}", &header, SECRET, 300, 1_700_000_000);
            assert!(matches!(result, Err(GatewayError::SignatureInvalid(_))));
        }

        let header = sign(b"{}", SECRET, 1_700_000_000);
        assert!(verify_signature(b"{}", &header, SECRET, 300, i64::MIN).is_err());
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(verify_signature(b"{}", "garbage", SECRET, 300, 0).is_err());
        assert!(verify_signature(b"{}", "t=0", SECRET, 300, 0).is_err());
        assert!(verify_signature(b"{}", "v1=abcd", SECRET, 300, 0).is_err());
    }

    #[test]
    fn accepts_any_matching_v1_entry() {
        let payload = b"{}";
        let valid = sign(payload, SECRET, 1_700_000_000);
        let header = format!("{},v1=deadbeef", valid);

        assert!(verify_signature(payload, &header, SECRET, 300, 1_700_000_000).is_ok());
    }

    #[test]
    fn parses_checkout_completed_event() {
        let payload = br#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_test_1", "amount_total": 500 } }
        }"#;

        let event = parse_event(payload).unwrap();
        assert_eq!(event.kind, GatewayEventKind::CheckoutSessionCompleted);
        assert_eq!(event.session_id.as_deref(), Some("cs_test_1"));
        assert_eq!(event.amount_total, Some(500));
    }

    #[test]
    fn keeps_unknown_event_kinds() {
        let payload = br#"{"type":"invoice.paid","data":{"object":{"id":"in_1"}}}"#;

        let event = parse_event(payload).unwrap();
        assert_eq!(event.kind, GatewayEventKind::Other("invoice.paid".to_string()));
        assert_eq!(event.amount_total, None);
    }

    #[test]
    fn session_form_flattens_line_item_and_metadata() {
        let gateway = StripeGateway::new(StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: SECRET.to_string(),
            api_base: "http://localhost".to_string(),
            currency: "inr".to_string(),
            webhook_tolerance_secs: 300,
            timeout_ms: 1_000,
        })
        .unwrap();

        let mut metadata = BTreeMap::new();
        metadata.insert("purchaseId".to_string(), "p1".to_string());

        let form = gateway.session_form(&CheckoutSessionRequest {
            product_name: "Rust 101".to_string(),
            images: vec!["https://img/1.png".to_string()],
            unit_amount: 500,
            success_url: "https://app/success".to_string(),
            cancel_url: "https://app/cancel".to_string(),
            metadata,
        });

        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("500"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("inr"));
        assert_eq!(
            get("line_items[0][price_data][product_data][images][0]"),
            Some("https://img/1.png")
        );
        assert_eq!(get("metadata[purchaseId]"), Some("p1"));
    }
}
