use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

/// Parameters for a new checkout session. Everything the reconciler later
/// needs to grant access travels in the session metadata, so a webhook
/// delivery alone is enough to process the purchase.
#[derive(Debug)]
pub struct CheckoutRequest<'a> {
    pub price_id: &'a str,
    pub customer_email: Option<&'a str>,
    pub coupon: Option<&'a str>,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    pub metadata: CheckoutMetadata,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Create a Stripe checkout session using a pre-configured price.
    ///
    /// `price_id` is the Stripe Price ID (e.g., "price_1ABC...") configured in
    /// the Stripe dashboard. Returns the session id and the hosted checkout URL.
    pub async fn create_checkout_session(&self, req: &CheckoutRequest<'_>) -> Result<(String, String)> {
        let mut form: Vec<(&str, String)> = vec![
            ("mode", "payment".into()),
            ("success_url", req.success_url.into()),
            ("cancel_url", req.cancel_url.into()),
            ("line_items[0][price]", req.price_id.into()),
            ("line_items[0][quantity]", "1".into()),
            ("metadata[productId]", req.metadata.product_id.clone().unwrap_or_default()),
            ("metadata[productName]", req.metadata.product_name.clone().unwrap_or_default()),
            ("metadata[productType]", req.metadata.product_type.clone().unwrap_or_default()),
            ("metadata[courseType]", req.metadata.course_type.clone().unwrap_or_default()),
            ("metadata[contentAccess]", req.metadata.content_access.clone().unwrap_or_default()),
        ];
        if let Some(email) = req.customer_email {
            form.push(("customer_email", email.into()));
        }
        if let Some(coupon) = req.coupon {
            form.push(("discounts[0][coupon]", coupon.into()));
        }

        let response = self
            .client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Stripe response: {}", e)))?;

        Ok((session.id, session.url))
    }

    /// Fetch a checkout session by id (cs_xxx). Used by the polling
    /// verification endpoint to confirm payment state server-side.
    pub async fn retrieve_checkout_session(&self, session_id: &str) -> Result<StripeCheckoutSession> {
        let response = self
            .client
            .get(format!(
                "https://api.stripe.com/v1/checkout/sessions/{}",
                session_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe API error: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(msg::SESSION_NOT_FOUND.into()));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Stripe response: {}", e)))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        // Parse and validate timestamp to prevent replay attacks.
        // Reject webhooks older than WEBHOOK_TIMESTAMP_TOLERANCE_SECS.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        // Construct signed payload
        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        // Compute expected signature
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Use constant-time comparison to prevent timing attacks.
        // An attacker could otherwise measure response times to progressively
        // discover the correct signature byte-by-byte.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Length check is not constant-time, but that's fine - signature length
        // is not secret (it's always 64 hex chars for SHA-256)
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

/// Generic Stripe webhook event - object is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout.session ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    /// "open", "complete" or "expired"
    pub status: Option<String>,
    /// "paid", "unpaid" or "no_payment_required"
    pub payment_status: String,
    pub customer: Option<String>,
    pub payment_intent: Option<String>,
    pub currency: Option<String>,
    pub amount_total: Option<i64>,
    pub customer_details: Option<StripeCustomerDetails>,
    #[serde(default)]
    pub metadata: Option<CheckoutMetadata>,
}

impl StripeCheckoutSession {
    /// Whether Stripe considers this session settled. Sessions fully covered
    /// by a 100% coupon come back as "no_payment_required" and must flow
    /// through the same fulfillment path as regular payments.
    pub fn is_paid(&self) -> bool {
        matches!(self.payment_status.as_str(), "paid" | "no_payment_required")
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

/// The metadata bag attached at checkout creation. Key names are fixed by
/// what the storefront writes into the session, hence the camelCase renames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    #[serde(rename = "productId")]
    pub product_id: Option<String>,
    #[serde(rename = "productName")]
    pub product_name: Option<String>,
    #[serde(rename = "productType")]
    pub product_type: Option<String>,
    #[serde(rename = "courseType")]
    pub course_type: Option<String>,
    /// JSON-encoded array of grants (metadata values are always strings)
    #[serde(rename = "contentAccess")]
    pub content_access: Option<String>,
}

/// One entry of the decoded `contentAccess` metadata value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentGrant {
    #[serde(rename = "type")]
    pub content_type: String,
    pub id: String,
    #[serde(rename = "courseType")]
    pub course_type: Option<String>,
}

// ============ payment_intent.payment_failed ============

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
    pub last_payment_error: Option<StripePaymentError>,
}

#[derive(Debug, Deserialize)]
pub struct StripePaymentError {
    pub message: Option<String>,
}
