//! Transactional email for purchase fulfillment.
//!
//! Two messages can follow a reconciled purchase:
//! 1. Welcome email with temporary credentials (new accounts only)
//! 2. Purchase confirmation with the access window
//!
//! Both are fire-and-forget: they run after the purchase transaction has
//! committed and a delivery failure never rolls back or blocks fulfillment.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2024")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

/// Result of attempting to send a notification email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    /// Email was sent successfully via Resend
    Sent,
    /// No API key configured (dev environments)
    NoApiKey,
}

/// Everything the post-purchase notifications need, captured before the
/// handler returns so the background task owns its data.
#[derive(Debug, Clone)]
pub struct PurchaseNotification {
    pub to_email: String,
    pub product_name: String,
    pub amount: i64,
    pub currency: String,
    pub expires_at: i64,
    /// Set only when the account was provisioned by this purchase
    pub temp_password: Option<String>,
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    text: String,
    html: String,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

/// Email dispatcher using the Resend API.
#[derive(Clone)]
pub struct NotificationService {
    /// Resend API key (from ENV; None disables sending)
    api_key: Option<String>,
    /// "From" email address
    from_email: String,
    /// HTTP client for API calls
    http_client: Client,
}

impl NotificationService {
    pub fn new(api_key: Option<String>, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            http_client: Client::new(),
        }
    }

    /// Send the welcome email with temporary credentials.
    pub async fn send_welcome(
        &self,
        to_email: &str,
        temp_password: &str,
    ) -> Result<EmailSendResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("No Resend API key configured, skipping welcome email");
            return Ok(EmailSendResult::NoApiKey);
        };

        let subject = "Tu cuenta de Aula esta lista".to_string();
        let text = format!(
            "Bienvenido a Aula\n\nHemos creado tu cuenta automaticamente con tu compra.\n\nEmail: {}\nContrasena temporal: {}\n\nInicia sesion y cambia la contrasena cuanto antes.\n\nSi no realizaste esta compra, responde a este correo.",
            to_email, temp_password
        );
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Bienvenido a Aula</h2>
<p>Hemos creado tu cuenta automaticamente con tu compra.</p>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px;">
<p style="margin: 0 0 8px 0;"><strong>Email:</strong> {}</p>
<p style="margin: 0;"><strong>Contrasena temporal:</strong> <code style="font-size: 18px; font-weight: bold;">{}</code></p>
</div>
<p style="color: #666;">Inicia sesion y cambia la contrasena cuanto antes.</p>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Si no realizaste esta compra, responde a este correo.</p>
</body>
</html>"#,
            to_email, temp_password
        );

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![to_email],
            subject,
            text,
            html,
        };

        self.send_request_with_retry(api_key, &request, to_email)
            .await
    }

    /// Send the purchase confirmation with the access window.
    pub async fn send_purchase_confirmation(
        &self,
        notification: &PurchaseNotification,
    ) -> Result<EmailSendResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("No Resend API key configured, skipping confirmation email");
            return Ok(EmailSendResult::NoApiKey);
        };

        let amount = format!(
            "{:.2} {}",
            notification.amount as f64 / 100.0,
            notification.currency.to_uppercase()
        );
        let expires = format_date(notification.expires_at);

        let subject = format!("Confirmacion de compra: {}", notification.product_name);
        let text = format!(
            "Gracias por tu compra\n\nProducto: {}\nImporte: {}\nAcceso hasta: {}\n\nYa puedes acceder al contenido desde tu cuenta.",
            notification.product_name, amount, expires
        );
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Gracias por tu compra</h2>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px;">
<p style="margin: 0 0 8px 0;"><strong>Producto:</strong> {}</p>
<p style="margin: 0 0 8px 0;"><strong>Importe:</strong> {}</p>
<p style="margin: 0;"><strong>Acceso hasta:</strong> {}</p>
</div>
<p>Ya puedes acceder al contenido desde tu cuenta.</p>
</body>
</html>"#,
            notification.product_name, amount, expires
        );

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![&notification.to_email],
            subject,
            text,
            html,
        };

        self.send_request_with_retry(api_key, &request, &notification.to_email)
            .await
    }

    /// Send a request to Resend API with exponential backoff retry.
    ///
    /// Retries on transient errors (network issues, 5xx, 429 rate limit).
    /// Fails immediately on non-transient errors (4xx except 429).
    async fn send_request_with_retry(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
        to_email: &str,
    ) -> Result<EmailSendResult> {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            // Sleep before retry (skip on first attempt)
            if *delay_secs > 0 {
                tracing::warn!(
                    attempt,
                    delay_secs,
                    "Retrying email send after transient failure"
                );
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(api_key, request).await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(attempt, to = %to_email, "Email sent successfully after retry");
                    } else {
                        tracing::info!(to = %to_email, "Email sent via Resend");
                    }
                    return Ok(EmailSendResult::Sent);
                }
                Err((error, is_transient)) => {
                    if is_transient {
                        last_error = Some(error);
                        // Continue to next retry
                    } else {
                        // Non-transient error, fail immediately
                        return Err(error);
                    }
                }
            }
        }

        // All retries exhausted
        tracing::error!(
            to = %to_email,
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Email service error: all retries exhausted".into())
        }))
    }

    /// Send a single request to Resend API.
    ///
    /// Returns Ok(()) on success, or Err((AppError, is_transient)) on failure.
    async fn send_resend_request(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .http_client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                // Network errors are transient
                (
                    AppError::Internal(format!("Email service error: {}", e)),
                    true,
                )
            })?;

        let status = response.status();

        if status.is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                // Parse errors after success are weird but not transient
                (
                    AppError::Internal("Email service response error".into()),
                    false,
                )
            })?;
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();

            // Determine if error is transient (should retry)
            let is_transient = status.as_u16() == 429 // Rate limited
                || status.is_server_error(); // 5xx errors

            if is_transient {
                tracing::warn!(status = %status, body = %body, "Resend API returned transient error");
            } else {
                tracing::error!(status = %status, body = %body, "Resend API returned non-transient error");
            }

            Err((
                AppError::Internal(format!("Email service error: {} - {}", status, body)),
                is_transient,
            ))
        }
    }
}

/// Spawn fire-and-forget post-purchase notifications.
///
/// Runs after the purchase transaction committed. Delivery failures are
/// logged only; panics in the spawned task are logged rather than silently
/// swallowed.
pub fn spawn_purchase_notifications(
    notifier: Arc<NotificationService>,
    notification: PurchaseNotification,
) {
    let to_email = notification.to_email.clone();
    tokio::spawn(
        AssertUnwindSafe(async move {
            if let Some(ref password) = notification.temp_password {
                if let Err(e) = notifier.send_welcome(&notification.to_email, password).await {
                    tracing::error!(error = %e, to = %notification.to_email, "Welcome email failed");
                }
            }
            if let Err(e) = notifier.send_purchase_confirmation(&notification).await {
                tracing::error!(
                    error = %e,
                    to = %notification.to_email,
                    "Purchase confirmation email failed"
                );
            }
        })
        .catch_unwind()
        .map(move |result| {
            if let Err(panic) = result {
                let panic_msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Notification task panicked for {}: {}", to_email, panic_msg);
            }
        }),
    );
}
